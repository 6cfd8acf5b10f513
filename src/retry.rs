use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::attempt::AttemptCycle;
use crate::config::{ContextPolicy, RetryPolicy};
use crate::error::{ChannelError, Error, Result};
use crate::history::HistoryStore;
use crate::judge::TaskSource;
use crate::model::{Task, TaskId};

/// Drives attempts on one task until it is accepted or the attempt bound is reached.
pub struct RetryController {
    source: Arc<dyn TaskSource>,
    cycle: AttemptCycle,
    store: Arc<HistoryStore>,
    policy: RetryPolicy,
    context: ContextPolicy,
}

impl RetryController {
    pub fn new(
        source: Arc<dyn TaskSource>,
        cycle: AttemptCycle,
        store: Arc<HistoryStore>,
        policy: RetryPolicy,
        context: ContextPolicy,
    ) -> Self {
        Self {
            source,
            cycle,
            store,
            policy,
            context,
        }
    }

    /// Returns `Ok(true)` on the first accepted attempt, `Ok(false)` once `max_attempts`
    /// attempts were recorded without acceptance. Error pages served while loading the task do
    /// not use up an attempt.
    pub async fn solve_task(&self, task_id: &TaskId, max_attempts: u32) -> Result<bool> {
        let mut attempt = 1;
        while attempt <= max_attempts {
            info!(task = %task_id, attempt, max_attempts, "starting attempt");
            let task = self.load_task(task_id, attempt).await?;
            let context = self.store.get_context_for_task(task_id, &self.context);

            let recorded = self.cycle.attempt(&task, &context).await?;
            if recorded.outcome.is_accepted() {
                info!(task = %task_id, attempt, "task solved");
                return Ok(true);
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff_delay(attempt);
                info!(task = %task_id, attempt, outcome = %recorded.outcome, ?delay, "not accepted, retrying");
                sleep(delay).await;
            }
            attempt += 1;
        }

        warn!(task = %task_id, max_attempts, "attempts exhausted");
        Ok(false)
    }

    async fn load_task(&self, task_id: &TaskId, attempt: u32) -> Result<Task> {
        let started = Instant::now();
        loop {
            match self.source.fetch_statement(task_id).await {
                Ok(task) => return Ok(task),
                Err(ChannelError::Navigation(e)) => {
                    let elapsed = started.elapsed();
                    if elapsed >= self.policy.navigation_deadline {
                        return Err(Error::NavigationDeadline {
                            task_id: task_id.clone(),
                            elapsed,
                        });
                    }
                    warn!(task = %task_id, attempt, url = %e.url, "judge served an error page, reloading");
                    sleep(self.policy.navigation_delay).await;
                }
                Err(ChannelError::Unauthorized) => return Err(Error::Unauthorized),
                Err(source) => {
                    return Err(Error::Task {
                        task_id: task_id.clone(),
                        source,
                    })
                }
            }
        }
    }
}
