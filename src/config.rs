use derive_builder::Builder;
use std::time::Duration;

/// How the verdict poller waits for a terminal verdict.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct PollPolicy {
    pub max_polls: u32,
    /// Pause before every status query.
    pub interval: Duration,
    /// Wall-clock ceiling for the whole poll loop.
    pub timeout: Duration,
    #[builder(setter(into))]
    pub accepted_marker: String,
    pub pending_markers: Vec<String>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_polls: 10,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
            accepted_marker: "Accepted".to_string(),
            pending_markers: vec!["Compiling".to_string(), "Testing".to_string()],
        }
    }
}

/// Pauses used by the retry controller between attempts and page reloads.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt, doubled after each further one.
    pub backoff: Duration,
    pub max_backoff: Duration,
    /// Delay before reloading a task page that came back as an error page.
    pub navigation_delay: Duration,
    /// Cap on error-page reloads for a single attempt.
    pub navigation_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(30),
            navigation_delay: Duration::from_secs(2),
            navigation_deadline: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Pause after `failed_attempt` (1-based) did not get accepted.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Bounds for the retry context handed to the solution provider.
#[derive(Debug, Clone, Copy, Builder)]
#[builder(default)]
pub struct ContextPolicy {
    pub max_attempts: usize,
    pub max_other_solutions: usize,
    pub max_solution_length: usize,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_other_solutions: 3,
            max_solution_length: 1500,
        }
    }
}

/// Waiting for the judge session to become authorized.
#[derive(Debug, Clone, Copy, Builder)]
#[builder(default)]
pub struct AuthPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_should_double_until_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(3));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(6));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(12));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn builder_should_keep_defaults() {
        let policy = PollPolicyBuilder::default()
            .max_polls(3)
            .build()
            .unwrap();
        assert_eq!(policy.max_polls, 3);
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.accepted_marker, "Accepted");
    }
}
