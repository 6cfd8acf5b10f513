use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::model::TaskId;

/// Persistence failure. The previously committed files are left intact.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The solution provider could not produce usable text.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("provider returned no content")]
    Empty,
    #[error("failed to render prompt: {0}")]
    Prompt(#[from] askama::Error),
}

/// The judge served an error page instead of the requested one.
#[derive(Debug, Error)]
#[error("judge returned an error page for {url}")]
pub struct NavigationError {
    pub url: String,
}

/// Failure talking to the judge (task pages, submission form, status table).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("judge returned {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error("{0} not found on page")]
    MissingElement(&'static str),
    #[error("judge session is not authorized")]
    Unauthorized,
    #[error("session cookie is not a valid header value")]
    InvalidCookie,
}

/// Errors that escape the retry controller.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("judge session is not authorized")]
    Unauthorized,
    #[error("authorization not detected within {0:?}")]
    AuthorizationTimeout(Duration),
    #[error("task {task_id}: {source}")]
    Task {
        task_id: TaskId,
        #[source]
        source: ChannelError,
    },
    #[error("task {task_id}: judge kept serving error pages for {elapsed:?}")]
    NavigationDeadline { task_id: TaskId, elapsed: Duration },
}

impl Error {
    /// Fatal errors end the whole run; the rest only skip the current task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Store(_) | Error::Unauthorized | Error::AuthorizationTimeout(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
