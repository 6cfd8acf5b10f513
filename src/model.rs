use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a judge task. Persisted as text, ordered as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for TaskId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A task statement as fetched from the judge. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Accepted,
    Rejected(String),
    Error(String),
    Timeout,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }

    /// Short status tag, as persisted in the `status` field.
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Accepted => "accepted",
            Outcome::Rejected(_) => "rejected",
            Outcome::Error(_) => "error",
            Outcome::Timeout => "timeout",
        }
    }

    /// Judge feedback text, as persisted in the `result` field.
    pub fn verdict(&self) -> &str {
        match self {
            Outcome::Pending => "Pending",
            Outcome::Accepted => "Accepted",
            Outcome::Rejected(reason) | Outcome::Error(reason) => reason,
            Outcome::Timeout => "Timeout",
        }
    }

    pub(crate) fn from_parts(status: &str, result: &str) -> Self {
        match status {
            "accepted" => Outcome::Accepted,
            "rejected" => Outcome::Rejected(result.to_string()),
            "timeout" => Outcome::Timeout,
            "pending" => Outcome::Pending,
            _ => Outcome::Error(result.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Rejected(reason) | Outcome::Error(reason) => {
                write!(f, "{}: {}", self.status(), reason)
            }
            _ => f.write_str(self.status()),
        }
    }
}

/// One submission trial. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub task_id: TaskId,
    /// 1-based, monotonic per task.
    pub number: u32,
    pub timestamp: DateTime<Utc>,
    pub code: String,
    pub outcome: Outcome,
}

impl Attempt {
    pub fn verdict(&self) -> &str {
        self.outcome.verdict()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub solved: usize,
}

impl RunSummary {
    /// `solved / attempted`, or 0 when nothing was attempted.
    pub fn success_ratio(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.solved as f64 / self.attempted as f64
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted: {}, solved: {}, success: {:.1}%",
            self.attempted,
            self.solved,
            self.success_ratio() * 100.0
        )
    }
}
