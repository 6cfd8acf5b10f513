pub mod acmp;
pub mod attempt;
pub mod config;
pub mod error;
pub mod history;
pub mod judge;
pub mod model;
pub mod poller;
pub mod provider;
pub mod retry;
pub mod runner;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use model::{Attempt, Outcome, RunSummary, Task, TaskId};
