use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::ChannelError;
use crate::judge::{SubmissionChannel, SubmissionIdentity};
use crate::model::Outcome;

/// Terminal state of one poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Accepted,
    Rejected(String),
    Error(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: PollStatus,
    /// Verdict text as shown by the judge.
    pub raw: String,
}

impl Verdict {
    fn timed_out() -> Self {
        Self {
            status: PollStatus::TimedOut,
            raw: "Timeout".to_string(),
        }
    }

    pub fn into_outcome(self) -> Outcome {
        match self.status {
            PollStatus::Accepted => Outcome::Accepted,
            PollStatus::Rejected(reason) => Outcome::Rejected(reason),
            PollStatus::Error(reason) => Outcome::Error(reason),
            PollStatus::TimedOut => Outcome::Timeout,
        }
    }
}

/// Classify a status-table verdict. `None` means the judge is not done yet.
pub fn classify(text: &str, policy: &PollPolicy) -> Option<PollStatus> {
    let text = text.trim();
    if text.contains(policy.accepted_marker.as_str()) {
        return Some(PollStatus::Accepted);
    }
    if text.is_empty() || policy.pending_markers.iter().any(|m| text.contains(m.as_str())) {
        return None;
    }
    Some(PollStatus::Rejected(text.to_string()))
}

pub struct VerdictPoller {
    channel: Arc<dyn SubmissionChannel>,
    policy: PollPolicy,
}

impl VerdictPoller {
    pub fn new(channel: Arc<dyn SubmissionChannel>, policy: PollPolicy) -> Self {
        Self { channel, policy }
    }

    /// Poll the status table until our row shows a terminal verdict, `max_polls` queries were
    /// spent, or the next query would start past the wall-clock ceiling. Failed queries use up
    /// their poll slot.
    pub async fn await_verdict(&self, identity: &SubmissionIdentity) -> Verdict {
        let started = Instant::now();

        for poll in 1..=self.policy.max_polls {
            if started.elapsed() + self.policy.interval > self.policy.timeout {
                warn!(task = %identity.task_id, poll, "verdict poll ceiling reached");
                break;
            }
            sleep(self.policy.interval).await;

            match self.channel.query_status(identity).await {
                Ok(Some(row)) => match classify(&row.verdict, &self.policy) {
                    Some(status) => {
                        info!(task = %identity.task_id, poll, verdict = %row.verdict, "verdict received");
                        return Verdict {
                            status,
                            raw: row.verdict.trim().to_string(),
                        };
                    }
                    None => debug!(task = %identity.task_id, poll, verdict = %row.verdict, "still judging"),
                },
                Ok(None) => debug!(task = %identity.task_id, poll, "submission not listed yet"),
                Err(ChannelError::Unauthorized) => {
                    let reason = ChannelError::Unauthorized.to_string();
                    return Verdict {
                        status: PollStatus::Error(reason.clone()),
                        raw: reason,
                    };
                }
                Err(e) => warn!(task = %identity.task_id, poll, error = %e, "status query failed"),
            }
        }

        Verdict::timed_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollPolicyBuilder;
    use crate::testing::{identity, FakeJudge};
    use std::time::Duration;

    fn poller(judge: &Arc<FakeJudge>, max_polls: u32) -> VerdictPoller {
        let policy = PollPolicyBuilder::default()
            .max_polls(max_polls)
            .build()
            .unwrap();
        VerdictPoller::new(judge.clone(), policy)
    }

    #[test]
    fn classify_should_work() {
        let policy = PollPolicy::default();
        assert_eq!(classify("Accepted", &policy), Some(PollStatus::Accepted));
        assert_eq!(classify("  Testing 4 ", &policy), None);
        assert_eq!(classify("Compiling", &policy), None);
        assert_eq!(classify("", &policy), None);
        assert_eq!(
            classify("Wrong answer on test 2 ", &policy),
            Some(PollStatus::Rejected("Wrong answer on test 2".into()))
        );
        assert_eq!(
            classify("Compilation error", &policy),
            Some(PollStatus::Rejected("Compilation error".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_on_first_poll_should_stop() {
        let judge = Arc::new(FakeJudge::accepting());
        let verdict = poller(&judge, 10).await_verdict(&identity(1)).await;

        assert_eq!(verdict.status, PollStatus::Accepted);
        assert_eq!(verdict.raw, "Accepted");
        assert_eq!(FakeJudge::count(&judge.status_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn testing_then_wrong_answer_should_reject() {
        let judge = Arc::new(
            FakeJudge::accepting().verdicts(&["Testing", "Testing", "Testing", "Wrong Answer"]),
        );
        let verdict = poller(&judge, 10).await_verdict(&identity(1)).await;

        assert_eq!(verdict.status, PollStatus::Rejected("Wrong Answer".into()));
        assert_eq!(
            verdict.into_outcome(),
            Outcome::Rejected("Wrong Answer".into())
        );
        assert_eq!(FakeJudge::count(&judge.status_calls), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_row_should_keep_polling() {
        let judge = Arc::new(FakeJudge::accepting().status(Ok(None)).status(Ok(None)));
        let verdict = poller(&judge, 10).await_verdict(&identity(1)).await;

        assert_eq!(verdict.status, PollStatus::Accepted);
        assert_eq!(FakeJudge::count(&judge.status_calls), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn query_failures_should_use_up_polls() {
        let judge = Arc::new(
            FakeJudge::accepting()
                .status(Err(ChannelError::MissingElement("status table")))
                .status(Err(ChannelError::Status(reqwest::StatusCode::BAD_GATEWAY)))
                .status(Err(ChannelError::MissingElement("status table"))),
        );
        let verdict = poller(&judge, 3).await_verdict(&identity(1)).await;

        assert_eq!(verdict.status, PollStatus::TimedOut);
        assert_eq!(verdict.into_outcome(), Outcome::Timeout);
        assert_eq!(FakeJudge::count(&judge.status_calls), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn endless_testing_should_time_out() {
        let judge = Arc::new(FakeJudge::with_default_verdict("Testing"));
        let verdict = poller(&judge, 4).await_verdict(&identity(1)).await;

        assert_eq!(verdict.status, PollStatus::TimedOut);
        assert_eq!(FakeJudge::count(&judge.status_calls), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_ceiling_should_stop_polling() {
        let judge = Arc::new(FakeJudge::with_default_verdict("Testing"));
        let policy = PollPolicyBuilder::default()
            .max_polls(10)
            .interval(Duration::from_secs(5))
            .timeout(Duration::from_secs(12))
            .build()
            .unwrap();
        let started = Instant::now();
        let verdict = VerdictPoller::new(judge.clone(), policy)
            .await_verdict(&identity(1))
            .await;

        assert_eq!(verdict.status, PollStatus::TimedOut);
        assert_eq!(FakeJudge::count(&judge.status_calls), 2);
        assert!(started.elapsed() <= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_session_should_end_with_error() {
        let judge = Arc::new(FakeJudge::accepting().status(Err(ChannelError::Unauthorized)));
        let verdict = poller(&judge, 10).await_verdict(&identity(1)).await;

        assert!(matches!(verdict.status, PollStatus::Error(_)));
        assert_eq!(FakeJudge::count(&judge.status_calls), 1);
    }
}
