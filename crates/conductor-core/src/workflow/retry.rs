//! Retry policy for workflow step execution.
//!
//! Stateless: all logic is in methods that take the attempt number and the
//! failure. Attempts are 1-based (first execution is attempt 1). The delay
//! between attempts is fixed.

use std::fmt;
use std::time::Duration;

use conductor_types::error::NodeError;
use conductor_types::workflow::StepDefinition;

/// Why a single attempt of a step failed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepFailure {
    Node(NodeError),
    TimedOut(Duration),
    /// The handler task panicked or was aborted.
    Panicked(String),
}

impl StepFailure {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Node(e) => e.is_retryable(),
            Self::TimedOut(_) => true,
            Self::Panicked(_) => false,
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(e) => write!(f, "{e}"),
            Self::TimedOut(d) => write!(f, "step timed out after {:.1}s", d.as_secs_f64()),
            Self::Panicked(msg) => write!(f, "node handler panicked: {msg}"),
        }
    }
}

/// How many times a step may run and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn for_step(step: &StepDefinition, delay: Duration) -> Self {
        Self {
            max_attempts: step.max_attempts.max(1),
            delay,
        }
    }

    /// Whether another attempt should follow a failed `attempt`.
    pub fn should_retry(&self, attempt: u32, failure: &StepFailure) -> bool {
        attempt < self.max_attempts && failure.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let failure = StepFailure::Node(NodeError::Upstream("503".into()));
        let p = policy(3);
        assert!(p.should_retry(1, &failure));
        assert!(p.should_retry(2, &failure));
        assert!(!p.should_retry(3, &failure));
        assert!(!policy(1).should_retry(1, &failure));
    }

    #[test]
    fn test_permanent_failures_not_retried() {
        let p = policy(5);
        assert!(!p.should_retry(1, &StepFailure::Node(NodeError::UnknownNodeType("x".into()))));
        assert!(!p.should_retry(1, &StepFailure::Node(NodeError::InvalidInput("x".into()))));
        assert!(!p.should_retry(1, &StepFailure::Panicked("boom".into())));
        assert!(p.should_retry(1, &StepFailure::TimedOut(Duration::from_secs(1))));
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(
            StepFailure::TimedOut(Duration::from_millis(1500)).to_string(),
            "step timed out after 1.5s"
        );
        assert_eq!(
            StepFailure::Node(NodeError::UnknownNodeType("nope".into())).to_string(),
            "unknown node type 'nope'"
        );
    }
}
