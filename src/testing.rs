//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{ChannelError, NavigationError, ProviderError};
use crate::judge::{Language, StatusRow, SubmissionChannel, SubmissionIdentity, TaskSource};
use crate::model::{Task, TaskId};
use crate::provider::SolutionProvider;

pub const AUTHOR: &str = "Test Author";
pub const SUM_SOLUTION: &str = "```python\na, b = map(int, input().split())\nprint(a + b)\n```";

#[derive(Default)]
pub struct FakeJudge {
    tasks: Vec<TaskId>,
    fetches: Mutex<VecDeque<Result<Task, ChannelError>>>,
    submits: Mutex<VecDeque<Result<bool, ChannelError>>>,
    statuses: Mutex<VecDeque<Result<Option<StatusRow>, ChannelError>>>,
    default_verdict: Option<String>,
    auth: Mutex<VecDeque<bool>>,
    latest: Mutex<VecDeque<Result<Option<u64>, ChannelError>>>,
    pub submitted: Mutex<Vec<String>>,
    pub fetch_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
}

impl FakeJudge {
    /// Judge that accepts every submission on the first poll.
    pub fn accepting() -> Self {
        Self::with_default_verdict("Accepted")
    }

    pub fn with_default_verdict(verdict: &str) -> Self {
        Self {
            default_verdict: Some(verdict.to_string()),
            ..Default::default()
        }
    }

    pub fn tasks(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.tasks = ids.into_iter().map(TaskId::from).collect();
        self
    }

    pub fn verdicts(self, verdicts: &[&str]) -> Self {
        {
            let mut statuses = self.statuses.lock().unwrap();
            for verdict in verdicts {
                statuses.push_back(Ok(Some(row(verdict))));
            }
        }
        self
    }

    pub fn status(self, status: Result<Option<StatusRow>, ChannelError>) -> Self {
        self.statuses.lock().unwrap().push_back(status);
        self
    }

    pub fn submit_result(self, result: Result<bool, ChannelError>) -> Self {
        self.submits.lock().unwrap().push_back(result);
        self
    }

    pub fn fetch_result(self, result: Result<Task, ChannelError>) -> Self {
        self.fetches.lock().unwrap().push_back(result);
        self
    }

    pub fn navigation_errors(self, count: usize) -> Self {
        for _ in 0..count {
            self.fetches
                .lock()
                .unwrap()
                .push_back(Err(navigation_error()));
        }
        self
    }

    pub fn latest_submission(self, result: Result<Option<u64>, ChannelError>) -> Self {
        self.latest.lock().unwrap().push_back(result);
        self
    }

    pub fn authorization(self, checks: &[bool]) -> Self {
        self.auth.lock().unwrap().extend(checks.iter().copied());
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub fn row(verdict: &str) -> StatusRow {
    StatusRow {
        id: 1,
        author: AUTHOR.to_string(),
        task: "1".to_string(),
        verdict: verdict.to_string(),
    }
}

pub fn navigation_error() -> ChannelError {
    NavigationError {
        url: "https://acmp.ru/error.asp".to_string(),
    }
    .into()
}

pub fn task(id: &TaskId) -> Task {
    Task {
        id: id.clone(),
        title: "A+B".to_string(),
        statement: "Read two integers and print their sum.".to_string(),
    }
}

pub fn identity(id: u32) -> SubmissionIdentity {
    SubmissionIdentity::new(AUTHOR, TaskId::from(id))
}

#[async_trait]
impl TaskSource for FakeJudge {
    async fn list_tasks(&self) -> Result<Vec<TaskId>, ChannelError> {
        Ok(self.tasks.clone())
    }

    async fn fetch_statement(&self, task_id: &TaskId) -> Result<Task, ChannelError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.fetches.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(task(task_id)),
        }
    }

    async fn reset(&self) -> Result<(), ChannelError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SubmissionChannel for FakeJudge {
    async fn is_authorized(&self) -> Result<bool, ChannelError> {
        Ok(self.auth.lock().unwrap().pop_front().unwrap_or(true))
    }

    async fn latest_submission(
        &self,
        _identity: &SubmissionIdentity,
    ) -> Result<Option<u64>, ChannelError> {
        self.latest.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn submit(
        &self,
        _task_id: &TaskId,
        code: &str,
        _language: Language,
    ) -> Result<bool, ChannelError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(code.to_string());
        self.submits.lock().unwrap().pop_front().unwrap_or(Ok(true))
    }

    async fn query_status(
        &self,
        _identity: &SubmissionIdentity,
    ) -> Result<Option<StatusRow>, ChannelError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().pop_front() {
            Some(status) => status,
            None => Ok(self.default_verdict.as_deref().map(row)),
        }
    }
}

/// Status table that lists a submission only after `lag` further status queries, the way a busy
/// judge does. Submissions get increasing ids and take their verdicts from the script in order.
pub struct TableJudge {
    lag: usize,
    verdicts: Mutex<VecDeque<String>>,
    table: Mutex<Table>,
}

#[derive(Default)]
struct Table {
    queries: usize,
    next_id: u64,
    // row plus the query count after which it is listed
    rows: Vec<(StatusRow, usize)>,
}

impl TableJudge {
    pub fn new(lag: usize, verdicts: &[&str]) -> Self {
        Self {
            lag,
            verdicts: Mutex::new(verdicts.iter().map(|v| v.to_string()).collect()),
            table: Mutex::new(Table {
                next_id: 100,
                ..Default::default()
            }),
        }
    }

    fn newest(&self, identity: &SubmissionIdentity, count_query: bool) -> Option<StatusRow> {
        let mut table = self.table.lock().unwrap();
        if count_query {
            table.queries += 1;
        }
        let queries = table.queries;
        table
            .rows
            .iter()
            .filter(|(row, listed_after)| queries > *listed_after && identity.matches(row))
            .map(|(row, _)| row.clone())
            .max_by_key(|row| row.id)
    }
}

#[async_trait]
impl TaskSource for TableJudge {
    async fn list_tasks(&self) -> Result<Vec<TaskId>, ChannelError> {
        Ok(vec![])
    }

    async fn fetch_statement(&self, task_id: &TaskId) -> Result<Task, ChannelError> {
        Ok(task(task_id))
    }
}

#[async_trait]
impl SubmissionChannel for TableJudge {
    async fn is_authorized(&self) -> Result<bool, ChannelError> {
        Ok(true)
    }

    async fn latest_submission(
        &self,
        identity: &SubmissionIdentity,
    ) -> Result<Option<u64>, ChannelError> {
        let identity = identity.clone().newer_than(None);
        Ok(self.newest(&identity, false).map(|row| row.id))
    }

    async fn submit(
        &self,
        task_id: &TaskId,
        _code: &str,
        _language: Language,
    ) -> Result<bool, ChannelError> {
        let verdict = self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Accepted".to_string());
        let mut table = self.table.lock().unwrap();
        let row = StatusRow {
            id: table.next_id,
            author: AUTHOR.to_string(),
            task: task_id.to_string(),
            verdict,
        };
        let listed_after = table.queries + self.lag;
        table.next_id += 1;
        table.rows.push((row, listed_after));
        Ok(true)
    }

    async fn query_status(
        &self,
        identity: &SubmissionIdentity,
    ) -> Result<Option<StatusRow>, ChannelError> {
        Ok(self.newest(identity, true))
    }
}

pub struct FakeProvider {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_response: String,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn always(response: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: response.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, response: Result<String, ProviderError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::always(SUM_SOLUTION)
    }
}

#[async_trait]
impl SolutionProvider for FakeProvider {
    async fn propose(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.default_response.clone()),
        }
    }
}
