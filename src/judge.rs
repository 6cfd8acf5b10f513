use async_trait::async_trait;
use strum::{Display, EnumString};

use crate::error::ChannelError;
use crate::model::{Task, TaskId};

/// Submission language, displayed as the judge's form value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum Language {
    #[default]
    #[strum(serialize = "PY")]
    Python,
    #[strum(serialize = "CPP")]
    Cpp,
}

impl Language {
    /// Info string used on fenced code blocks.
    pub fn fence(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Cpp => "cpp",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Cpp => "C++",
        }
    }
}

/// Who submitted what; used to find our row in the judge status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionIdentity {
    pub author: String,
    pub task_id: TaskId,
    /// Newest matching submission id listed before ours was posted. Rows up to it are not ours.
    pub after: Option<u64>,
}

impl SubmissionIdentity {
    pub fn new(author: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            author: author.into(),
            task_id,
            after: None,
        }
    }

    pub fn newer_than(self, after: Option<u64>) -> Self {
        Self { after, ..self }
    }

    pub fn matches(&self, row: &StatusRow) -> bool {
        self.after.map_or(true, |after| row.id > after)
            && row.author.contains(self.author.as_str())
            && row
                .task
                .split(|c: char| !c.is_ascii_digit())
                .any(|token| token == self.task_id.as_str())
    }
}

/// One row of the judge status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub id: u64,
    pub author: String,
    pub task: String,
    pub verdict: String,
}

#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<TaskId>, ChannelError>;

    /// Load a task statement. A `ChannelError::Navigation` means the judge served an error page.
    async fn fetch_statement(&self, task_id: &TaskId) -> Result<Task, ChannelError>;

    /// Return the session to a neutral page between tasks.
    async fn reset(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[async_trait]
pub trait SubmissionChannel: Send + Sync {
    async fn is_authorized(&self) -> Result<bool, ChannelError>;

    /// Id of the newest status row for `identity`, ignoring its baseline. Read before submitting
    /// so older rows are never taken for the new submission.
    async fn latest_submission(
        &self,
        identity: &SubmissionIdentity,
    ) -> Result<Option<u64>, ChannelError>;

    /// Submit `code` for `task_id`. `Ok(false)` means the judge did not register the submission.
    async fn submit(
        &self,
        task_id: &TaskId,
        code: &str,
        language: Language,
    ) -> Result<bool, ChannelError>;

    /// Newest status row matching `identity` and newer than its baseline, if the judge lists one
    /// yet.
    async fn query_status(
        &self,
        identity: &SubmissionIdentity,
    ) -> Result<Option<StatusRow>, ChannelError>;
}
