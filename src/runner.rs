use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::AuthPolicy;
use crate::error::{Error, Result};
use crate::judge::{SubmissionChannel, TaskSource};
use crate::model::{RunSummary, TaskId};
use crate::retry::RetryController;

pub struct BatchRunner {
    source: Arc<dyn TaskSource>,
    controller: RetryController,
}

impl BatchRunner {
    pub fn new(source: Arc<dyn TaskSource>, controller: RetryController) -> Self {
        Self { source, controller }
    }

    /// Solve `task_ids` in order. A failing task is skipped; only fatal errors (store failure,
    /// lost authorization) end the run early.
    pub async fn run(&self, task_ids: &[TaskId], max_attempts_per_task: u32) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        if max_attempts_per_task == 0 {
            warn!("no attempts allowed per task, nothing to do");
            return Ok(summary);
        }

        let total = task_ids.len();
        for (i, task_id) in task_ids.iter().enumerate() {
            info!(task = %task_id, "processing task {}/{}", i + 1, total);
            match self.controller.solve_task(task_id, max_attempts_per_task).await {
                Ok(true) => summary.solved += 1,
                Ok(false) => {}
                Err(e) if e.is_fatal() => {
                    error!(task = %task_id, error = %e, "run aborted");
                    return Err(e);
                }
                Err(e) => warn!(task = %task_id, error = %e, "task skipped"),
            }
            summary.attempted += 1;

            if i + 1 < total {
                if let Err(e) = self.source.reset().await {
                    warn!(error = %e, "failed to return to the task list");
                }
            }
        }

        info!(%summary, "run finished");
        Ok(summary)
    }
}

/// Wait until the judge session is authorized, checking every `policy.interval`.
pub async fn await_authorization(channel: &dyn SubmissionChannel, policy: &AuthPolicy) -> Result<()> {
    let started = Instant::now();
    loop {
        match channel.is_authorized().await {
            Ok(true) => {
                info!("authorization detected");
                return Ok(());
            }
            Ok(false) => info!("waiting for authorization"),
            Err(e) => warn!(error = %e, "authorization check failed"),
        }
        if started.elapsed() >= policy.timeout {
            return Err(Error::AuthorizationTimeout(policy.timeout));
        }
        sleep(policy.interval).await;
    }
}
