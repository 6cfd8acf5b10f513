use askama::Template;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::error::{ProviderError, StoreError};
use crate::history::HistoryStore;
use crate::judge::{Language, SubmissionChannel, SubmissionIdentity};
use crate::model::{Attempt, Outcome, Task, TaskId};
use crate::poller::VerdictPoller;
use crate::provider::{SolutionPrompt, SolutionProvider, FALLBACK_SOLUTION};

pub const SUBMISSION_FAILED: &str = "submission failed";

/// Pull the program out of a provider reply: the first block fenced with the language's info
/// string, else the first fenced block of any kind, else the whole trimmed reply.
pub fn extract_code(response: &str, language: Language) -> String {
    static ANY_FENCE: OnceLock<Regex> = OnceLock::new();
    let any_fence = ANY_FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[\w+#-]*[ \t]*\r?\n?(.*?)```").expect("valid fence regex")
    });

    let code = language_fence(language)
        .captures(response)
        .or_else(|| any_fence.captures(response))
        .and_then(|caps| caps.get(1))
        .map_or(response, |m| m.as_str());
    code.trim().to_string()
}

fn language_fence(language: Language) -> &'static Regex {
    static PYTHON: OnceLock<Regex> = OnceLock::new();
    static CPP: OnceLock<Regex> = OnceLock::new();
    let cell = match language {
        Language::Python => &PYTHON,
        Language::Cpp => &CPP,
    };
    cell.get_or_init(|| {
        let pattern = format!(
            r"(?s)```{}[ \t]*\r?\n(.*?)```",
            regex::escape(language.fence())
        );
        Regex::new(&pattern).expect("valid fence regex")
    })
}

/// One attempt: ask for code, submit it, wait for the verdict, record the outcome.
pub struct AttemptCycle {
    provider: Arc<dyn SolutionProvider>,
    channel: Arc<dyn SubmissionChannel>,
    poller: VerdictPoller,
    store: Arc<HistoryStore>,
    language: Language,
    author: String,
}

impl AttemptCycle {
    pub fn new(
        provider: Arc<dyn SolutionProvider>,
        channel: Arc<dyn SubmissionChannel>,
        poller: VerdictPoller,
        store: Arc<HistoryStore>,
        language: Language,
        author: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            channel,
            poller,
            store,
            language,
            author: author.into(),
        }
    }

    /// Run one attempt for `task`. Every path records exactly one attempt; only a store failure
    /// is returned as an error.
    pub async fn attempt(&self, task: &Task, prior_context: &str) -> Result<Attempt, StoreError> {
        let code = match self.request_code(task, prior_context).await {
            Ok(code) => code,
            Err(e) => {
                warn!(task = %task.id, error = %e, "solution provider failed, using fallback");
                FALLBACK_SOLUTION.to_string()
            }
        };

        let outcome = match self.submit(&task.id, &code).await {
            Some(identity) => self.poller.await_verdict(&identity).await.into_outcome(),
            None => Outcome::Error(SUBMISSION_FAILED.to_string()),
        };

        let attempt = self.store.record_attempt(&task.id, &code, outcome)?;
        info!(task = %task.id, attempt = attempt.number, outcome = %attempt.outcome, "attempt finished");
        Ok(attempt)
    }

    /// Post `code` and return the identity of its future status row, or `None` when the judge did
    /// not take it. The newest existing row is read first so that an earlier verdict for the same
    /// task is never mistaken for this one.
    async fn submit(&self, task_id: &TaskId, code: &str) -> Option<SubmissionIdentity> {
        let identity = SubmissionIdentity::new(self.author.clone(), task_id.clone());
        let baseline = match self.channel.latest_submission(&identity).await {
            Ok(baseline) => baseline,
            Err(e) => {
                warn!(task = %task_id, error = %e, "cannot read the status table before submitting");
                return None;
            }
        };

        match self.channel.submit(task_id, code, self.language).await {
            Ok(true) => Some(identity.newer_than(baseline)),
            Ok(false) => {
                warn!(task = %task_id, "judge did not register the submission");
                None
            }
            Err(e) => {
                warn!(task = %task_id, error = %e, "submission failed");
                None
            }
        }
    }

    async fn request_code(&self, task: &Task, prior_context: &str) -> Result<String, ProviderError> {
        let prompt = SolutionPrompt {
            task,
            language: self.language,
            context: prior_context,
        }
        .render()?;
        let response = self.provider.propose(&prompt).await?;
        let code = extract_code(&response, self.language);
        if code.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(code)
    }
}
