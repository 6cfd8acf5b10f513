//! Durable record of every attempt per task plus the best accepted attempt per task.
//!
//! Two JSON files live in the data directory: `solutions_history.json` maps a task id to its
//! ordered attempts, `best_solutions.json` maps a task id to its latest accepted attempt. Every
//! mutation rewrites the affected file in full through a temp file that is synced and renamed over
//! the old one, so a reader only ever sees a complete file.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::ContextPolicy;
use crate::error::StoreError;
use crate::model::{Attempt, Outcome, TaskId};

pub const HISTORY_FILE: &str = "solutions_history.json";
pub const BEST_FILE: &str = "best_solutions.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AttemptRecord {
    timestamp: DateTime<Utc>,
    attempt: u32,
    code: String,
    status: String,
    result: String,
    accepted: bool,
}

impl AttemptRecord {
    fn from_attempt(attempt: &Attempt) -> Self {
        Self {
            timestamp: attempt.timestamp,
            attempt: attempt.number,
            code: attempt.code.clone(),
            status: attempt.outcome.status().to_string(),
            result: attempt.verdict().to_string(),
            accepted: attempt.outcome.is_accepted(),
        }
    }

    fn into_attempt(self, task_id: TaskId) -> Attempt {
        let outcome = if self.accepted {
            Outcome::Accepted
        } else {
            Outcome::from_parts(&self.status, &self.result)
        };
        Attempt {
            task_id,
            number: self.attempt,
            timestamp: self.timestamp,
            code: self.code,
            outcome,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    history: BTreeMap<TaskId, Vec<Attempt>>,
    best: BTreeMap<TaskId, Attempt>,
}

impl State {
    /// Make sure every task with an accepted attempt has its latest one as best solution.
    /// Repairs a crash between the history write and the best-solution write.
    fn reconcile(&mut self) -> usize {
        let mut repaired = 0;
        for (task_id, attempts) in &self.history {
            let Some(latest) = attempts.iter().rev().find(|a| a.outcome.is_accepted()) else {
                continue;
            };
            let stale = self
                .best
                .get(task_id)
                .map_or(true, |best| best.number < latest.number);
            if stale {
                self.best.insert(task_id.clone(), latest.clone());
                repaired += 1;
            }
        }
        repaired
    }
}

pub struct HistoryStore {
    history_path: PathBuf,
    best_path: PathBuf,
    state: Mutex<State>,
}

impl HistoryStore {
    /// Open the store in `dir`. Missing or unreadable files start out empty.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let history_path = dir.join(HISTORY_FILE);
        let best_path = dir.join(BEST_FILE);

        let history: BTreeMap<TaskId, Vec<AttemptRecord>> = load_table(&history_path);
        let best: BTreeMap<TaskId, AttemptRecord> = load_table(&best_path);

        let mut state = State {
            history: history
                .into_iter()
                .map(|(id, records)| {
                    let attempts = records
                        .into_iter()
                        .map(|r| r.into_attempt(id.clone()))
                        .collect();
                    (id, attempts)
                })
                .collect(),
            best: best
                .into_iter()
                .map(|(id, record)| {
                    let attempt = record.into_attempt(id.clone());
                    (id, attempt)
                })
                .collect(),
        };
        let repaired = state.reconcile();
        if repaired > 0 {
            warn!(repaired, "best solutions were behind the attempt history");
        }
        info!(
            tasks = state.history.len(),
            solved = state.best.len(),
            "history store loaded from {}",
            dir.display()
        );

        Self {
            history_path,
            best_path,
            state: Mutex::new(state),
        }
    }

    /// Append an attempt with the next sequence number for `task_id`. Returns once the attempt
    /// (and, when accepted, the new best solution) is on disk.
    pub fn record_attempt(
        &self,
        task_id: &TaskId,
        code: &str,
        outcome: Outcome,
    ) -> Result<Attempt, StoreError> {
        let mut state = self.lock();

        let previous = state.history.get(task_id).and_then(|a| a.last());
        let number = previous.map_or(1, |a| a.number + 1);
        let now = Utc::now();
        let timestamp = previous.map_or(now, |a| now.max(a.timestamp));
        let attempt = Attempt {
            task_id: task_id.clone(),
            number,
            timestamp,
            code: code.to_string(),
            outcome,
        };

        state
            .history
            .entry(task_id.clone())
            .or_default()
            .push(attempt.clone());
        if let Err(e) = write_json_atomic(&self.history_path, &history_records(&state.history)) {
            if let Some(attempts) = state.history.get_mut(task_id) {
                attempts.pop();
                if attempts.is_empty() {
                    state.history.remove(task_id);
                }
            }
            return Err(e);
        }

        if attempt.outcome.is_accepted() {
            let replaced = state.best.insert(task_id.clone(), attempt.clone());
            if let Err(e) = write_json_atomic(&self.best_path, &best_records(&state.best)) {
                // the attempt itself is durable; the next load repairs the best table
                match replaced {
                    Some(old) => state.best.insert(task_id.clone(), old),
                    None => state.best.remove(task_id),
                };
                return Err(e);
            }
        }

        debug!(task = %task_id, attempt = number, outcome = %attempt.outcome, "attempt recorded");
        Ok(attempt)
    }

    /// All attempts for `task_id`, oldest first.
    pub fn get_history(&self, task_id: &TaskId) -> Vec<Attempt> {
        self.lock().history.get(task_id).cloned().unwrap_or_default()
    }

    pub fn get_best_solutions(&self) -> BTreeMap<TaskId, Attempt> {
        self.lock().best.clone()
    }

    pub fn best_solution(&self, task_id: &TaskId) -> Option<Attempt> {
        self.lock().best.get(task_id).cloned()
    }

    /// Bounded plain-text summary used as retry context for the solution provider: accepted
    /// solutions of other tasks (newest first, short ones only) and the latest attempts on this
    /// task. Sections without data are left out; an empty string means no context.
    pub fn get_context_for_task(&self, task_id: &TaskId, policy: &ContextPolicy) -> String {
        let state = self.lock();

        let mut others: Vec<&Attempt> = state
            .best
            .values()
            .filter(|a| &a.task_id != task_id)
            .filter(|a| a.code.chars().count() < policy.max_solution_length)
            .collect();
        others.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        others.truncate(policy.max_other_solutions);

        let attempts = state.history.get(task_id).map(Vec::as_slice).unwrap_or(&[]);
        let recent = &attempts[attempts.len().saturating_sub(policy.max_attempts)..];

        let mut sections = Vec::new();
        if !others.is_empty() {
            let mut section = String::from("Accepted solutions of other tasks:");
            for attempt in others {
                section.push_str(&format!(
                    "\n\nTask {}:\n```\n{}\n```",
                    attempt.task_id,
                    attempt.code.trim_end()
                ));
            }
            sections.push(section);
        }
        if !recent.is_empty() {
            let mut section = String::from("Previous attempts for this task:");
            for attempt in recent {
                section.push_str(&format!(
                    "\n\nAttempt {} ({}): {}\n```\n{}\n```",
                    attempt.number,
                    attempt.outcome.status(),
                    attempt.verdict(),
                    attempt.code.trim_end()
                ));
            }
            sections.push(section);
        }
        sections.join("\n\n")
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn history_records(history: &BTreeMap<TaskId, Vec<Attempt>>) -> BTreeMap<&TaskId, Vec<AttemptRecord>> {
    history
        .iter()
        .map(|(id, attempts)| (id, attempts.iter().map(AttemptRecord::from_attempt).collect()))
        .collect()
}

fn best_records(best: &BTreeMap<TaskId, Attempt>) -> BTreeMap<&TaskId, AttemptRecord> {
    best.iter()
        .map(|(id, attempt)| (id, AttemptRecord::from_attempt(attempt)))
        .collect()
}

fn load_table<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(error = %e, "cannot read {}, starting empty", path.display());
            return T::default();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(error = %e, "corrupt store file {}, starting empty", path.display());
        T::default()
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value).map_err(|source| StoreError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
    }
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
