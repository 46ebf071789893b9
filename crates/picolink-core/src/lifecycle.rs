//! Connection lifecycle state machine.
//!
//! `RetryMachine` is the single authoritative state for the reconnect loop.
//! It performs no I/O: callers feed it socket and timer events and execute the
//! [`Step`] it returns. Keeping it sans-I/O makes the attempt counter, the
//! delay and the re-entrancy guard testable without sockets.
//!
//! ```text
//! Idle ──begin──▶ Connecting ──connected──▶ Connected
//!                   │   ▲                      │
//!           failure │   │ delay elapsed        │ failure
//!                   ▼   │ (within budget)      │
//!                 Retrying ◀───────────────────┘
//!                   │
//!                   │ delay elapsed (budget spent)
//!                   ▼
//!                 Failed
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::ReconnectPolicy;

// ============================================================================
// Failure Reasons
// ============================================================================

/// Why a socket (or the process behind it) stopped being usable.
///
/// All variants funnel into the same retry path; they differ only in what
/// gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The connect did not complete in time.
    Timeout,
    /// Connect refused, or an I/O error on an established socket.
    Error,
    /// The peer reset or aborted the connection.
    Closed,
    /// The peer finished the stream (EOF).
    Ended,
    /// The bridge process exited without us asking it to.
    ProcessExited,
}

impl FailureReason {
    /// Log line describing this failure.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::Error => "Error while connecting to term",
            Self::Closed => "Term connection closed",
            Self::Ended => "Term connection ended",
            Self::ProcessExited => "Term process exited",
        }
    }

    /// Short machine-friendly name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Closed => "closed",
            Self::Ended => "ended",
            Self::ProcessExited => "process_exited",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Phases and Steps
// ============================================================================

/// Where the retry loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// A reattempt is scheduled; further failures are ignored.
    Retrying,
    /// Budget spent or creation failed. Terminal until `begin` is called again.
    Failed,
}

/// What the caller must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Tear down any socket and dial again.
    Connect { attempt: u32 },
    /// Wait `delay`, then call [`RetryMachine::on_retry_elapsed`].
    Retry { attempt: u32, delay: Duration },
    /// Invoke the success callback.
    Connected,
    /// Invoke the callback with a terminal error. No further attempts.
    Exhausted { attempts: u32 },
    /// Nothing to do (duplicate or stale event).
    Ignore,
}

/// Observable retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempt: u32,
    /// True while a reattempt is already scheduled.
    pub stopped: bool,
}

// ============================================================================
// Retry Machine
// ============================================================================

/// Sans-I/O driver of the connect/retry loop.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: ReconnectPolicy,
    phase: Phase,
    attempt: u32,
}

impl RetryMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            phase: Phase::Idle,
            attempt: 1,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> ReconnectState {
        ReconnectState {
            attempt: self.attempt,
            stopped: self.phase == Phase::Retrying,
        }
    }

    /// Starts a lifecycle from `Idle` or `Failed` with a fresh budget.
    pub fn begin(&mut self) -> Step {
        match self.phase {
            Phase::Idle | Phase::Failed => {
                self.attempt = 1;
                self.dial()
            }
            Phase::Connecting | Phase::Connected | Phase::Retrying => Step::Ignore,
        }
    }

    /// The socket of the current attempt connected.
    pub fn on_connected(&mut self) -> Step {
        if self.phase != Phase::Connecting {
            return Step::Ignore;
        }
        self.phase = Phase::Connected;
        self.attempt = 1;
        Step::Connected
    }

    /// The current socket or process failed.
    ///
    /// Only the first failure per attempt schedules a retry; an `error`
    /// followed by a `close` for the same fault is collapsed here.
    pub fn on_failure(&mut self, _reason: FailureReason) -> Step {
        match self.phase {
            Phase::Connecting | Phase::Connected => {
                self.attempt = self.attempt.saturating_add(1);
                self.phase = Phase::Retrying;
                Step::Retry {
                    attempt: self.attempt,
                    delay: self.policy.next_delay(),
                }
            }
            Phase::Idle | Phase::Retrying | Phase::Failed => Step::Ignore,
        }
    }

    /// The retry delay elapsed.
    pub fn on_retry_elapsed(&mut self) -> Step {
        if self.phase != Phase::Retrying {
            return Step::Ignore;
        }
        self.dial()
    }

    /// Stops the lifecycle without delivering anything (e.g. spawn failed).
    pub fn halt(&mut self) {
        self.phase = Phase::Failed;
    }

    /// Returns to `Idle` with a fresh budget.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.attempt = 1;
    }

    fn dial(&mut self) -> Step {
        if self.policy.should_retry(self.attempt) {
            self.phase = Phase::Connecting;
            Step::Connect {
                attempt: self.attempt,
            }
        } else {
            self.phase = Phase::Failed;
            Step::Exhausted {
                attempts: self.attempt.saturating_sub(1),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> RetryMachine {
        RetryMachine::new(ReconnectPolicy::default())
    }

    #[test]
    fn test_begin_dials_first_attempt() {
        let mut m = machine();
        assert_eq!(m.begin(), Step::Connect { attempt: 1 });
        assert_eq!(m.phase(), Phase::Connecting);
    }

    #[test]
    fn test_begin_is_ignored_while_active() {
        let mut m = machine();
        m.begin();
        assert_eq!(m.begin(), Step::Ignore);
    }

    #[test]
    fn test_timeout_then_success_resets_counter() {
        let mut m = machine();
        m.begin();

        let step = m.on_failure(FailureReason::Timeout);
        assert_eq!(
            step,
            Step::Retry {
                attempt: 2,
                delay: Duration::from_millis(200)
            }
        );
        assert!(m.state().stopped);

        assert_eq!(m.on_retry_elapsed(), Step::Connect { attempt: 2 });
        assert!(!m.state().stopped);

        assert_eq!(m.on_connected(), Step::Connected);
        assert_eq!(m.attempt(), 1);
        assert_eq!(m.phase(), Phase::Connected);

        // A second connect notification for the same socket is not a new success.
        assert_eq!(m.on_connected(), Step::Ignore);
    }

    #[test]
    fn test_error_then_close_yields_one_retry() {
        let mut m = machine();
        m.begin();

        let first = m.on_failure(FailureReason::Error);
        let second = m.on_failure(FailureReason::Closed);

        assert!(matches!(first, Step::Retry { attempt: 2, .. }));
        assert_eq!(second, Step::Ignore);
        assert_eq!(m.attempt(), 2);
    }

    #[test]
    fn test_guard_clears_when_next_attempt_starts() {
        let mut m = machine();
        m.begin();
        m.on_failure(FailureReason::Error);
        m.on_retry_elapsed();

        // The new attempt's failure must schedule another retry.
        assert!(matches!(
            m.on_failure(FailureReason::Ended),
            Step::Retry { attempt: 3, .. }
        ));
    }

    #[test]
    fn test_exhaustion_after_twenty_attempts() {
        let mut m = machine();
        let mut connects = 0;
        let mut step = m.begin();

        loop {
            match step {
                Step::Connect { .. } => {
                    connects += 1;
                    step = m.on_failure(FailureReason::Error);
                }
                Step::Retry { .. } => step = m.on_retry_elapsed(),
                Step::Exhausted { attempts } => {
                    assert_eq!(attempts, 20);
                    break;
                }
                other => panic!("unexpected step {other:?}"),
            }
        }

        assert_eq!(connects, 20);
        assert_eq!(m.attempt(), 21);
        assert_eq!(m.phase(), Phase::Failed);

        // Nothing moves the machine once failed.
        assert_eq!(m.on_failure(FailureReason::Closed), Step::Ignore);
        assert_eq!(m.on_retry_elapsed(), Step::Ignore);
        assert_eq!(m.on_connected(), Step::Ignore);
    }

    #[test]
    fn test_failure_while_connected_retries() {
        let mut m = machine();
        m.begin();
        m.on_connected();

        assert!(matches!(
            m.on_failure(FailureReason::ProcessExited),
            Step::Retry { attempt: 2, .. }
        ));
    }

    #[test]
    fn test_begin_after_failure_restores_budget() {
        let mut m = RetryMachine::new(ReconnectPolicy::new(1, Duration::from_millis(1)));
        m.begin();
        m.on_failure(FailureReason::Timeout);
        assert_eq!(m.on_retry_elapsed(), Step::Exhausted { attempts: 1 });

        assert_eq!(m.begin(), Step::Connect { attempt: 1 });
    }

    #[test]
    fn test_zero_budget_exhausts_immediately() {
        let mut m = RetryMachine::new(ReconnectPolicy::new(0, Duration::from_millis(1)));
        assert_eq!(m.begin(), Step::Exhausted { attempts: 0 });
    }

    #[test]
    fn test_halt_and_reset() {
        let mut m = machine();
        m.begin();
        m.halt();
        assert_eq!(m.on_failure(FailureReason::Error), Step::Ignore);

        m.reset();
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.attempt(), 1);
        assert_eq!(m.on_failure(FailureReason::Error), Step::Ignore);
    }

    #[test]
    fn test_reason_descriptions_are_distinct() {
        let reasons = [
            FailureReason::Timeout,
            FailureReason::Error,
            FailureReason::Closed,
            FailureReason::Ended,
            FailureReason::ProcessExited,
        ];
        for (i, a) in reasons.iter().enumerate() {
            for b in reasons.iter().skip(i + 1) {
                assert_ne!(a.describe(), b.describe());
            }
        }
        assert_eq!(FailureReason::Ended.to_string(), "ended");
    }
}
