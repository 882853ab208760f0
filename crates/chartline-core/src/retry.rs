//! Retry/backoff state machine shared by every fetch call.
//!
//! ```text
//! Ready ─► Calling ─► Success                     (200)
//!             │  ├──► AuthExpired ─► Calling      (401: wait, refresh token)
//!             │  ├──► RateLimited ─► Calling      (429: wait, rotate, refresh token)
//!             │  ├──► Pending     ─► Calling      ("processing": wait 30s·2^n)
//!             │  ├──► NetworkError ─► Calling     (no wait)
//!             │  └──► HardFailure                 (any other status)
//!             └─ attempts exhausted ─► HardFailure
//! ```
//!
//! [`next_action`] is the pure transition function; the session performs the
//! side effects it names.

use std::time::Duration;

use crate::error::CallError;

/// Bounds and waits for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// HTTP attempts per logical call
    pub max_attempts: u32,
    /// Wait before refreshing an expired token
    pub auth_backoff: Duration,
    /// Wait before rotating credentials after a 429
    pub rate_limit_backoff: Duration,
    /// First wait after a "processing" response, doubled on each repeat
    pub pending_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            auth_backoff: Duration::from_secs(60),
            rate_limit_backoff: Duration::from_secs(60),
            pending_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the n-th consecutive pending response
    /// (1-based): 30s, 60s, 120s, ...
    pub fn pending_backoff_for(&self, pending_count: u32) -> Duration {
        let shift = pending_count.saturating_sub(1).min(16);
        self.pending_backoff.saturating_mul(1u32 << shift)
    }
}

/// How a call authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Bearer,
    Anonymous,
}

/// Classification of one HTTP attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Success,
    AuthExpired,
    RateLimited,
    Pending,
    Network(String),
    Hard { status: u16, body: String },
}

impl Signal {
    /// Classify a status code (200 is [`Signal::Success`] unless `pending`
    /// says the payload is a "still processing" sentinel).
    pub fn classify(status: u16, body: &str, pending: Option<fn(&str) -> bool>) -> Self {
        match status {
            200 if pending.is_some_and(|is_pending| is_pending(body)) => Self::Pending,
            200 => Self::Success,
            401 => Self::AuthExpired,
            429 => Self::RateLimited,
            _ => Self::Hard {
                status,
                body: body.to_string(),
            },
        }
    }

    /// The error reported if this signal ends the call.
    pub fn into_error(self) -> CallError {
        match self {
            Self::Success => CallError::Decode("success treated as failure".into()),
            Self::AuthExpired => CallError::AuthExpired,
            Self::RateLimited => CallError::RateLimited,
            Self::Pending => CallError::Pending,
            Self::Network(msg) => CallError::Transport(msg),
            Self::Hard { status, body } => CallError::HardApi { status, body },
        }
    }
}

/// Side effect to perform after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Terminal success: hand the payload to the fetcher
    Accept,
    /// Terminal failure: no further attempts
    Abort,
    /// Sleep, re-acquire a token with the current credential, retry
    RefreshToken { wait: Duration },
    /// Sleep, rotate to the next credential, re-acquire a token, retry
    RotateCredential { wait: Duration },
    /// Sleep, then retry
    Wait(Duration),
    /// Retry immediately
    RetryNow,
}

/// Transition for `signal` observed on attempt number `attempt` (1-based).
///
/// `pending_count` is the number of consecutive pending signals including
/// this one. Recovery actions are only issued while another attempt is
/// allowed, so the last attempt never triggers a refresh or a wait.
pub fn next_action(
    policy: &RetryPolicy,
    auth: AuthMode,
    attempt: u32,
    pending_count: u32,
    signal: &Signal,
) -> Action {
    let can_retry = attempt < policy.max_attempts;
    match signal {
        Signal::Success => Action::Accept,
        Signal::Hard { .. } => Action::Abort,
        _ if !can_retry => Action::Abort,
        Signal::AuthExpired => match auth {
            AuthMode::Bearer => Action::RefreshToken {
                wait: policy.auth_backoff,
            },
            AuthMode::Anonymous => Action::Abort,
        },
        Signal::RateLimited => match auth {
            AuthMode::Bearer => Action::RotateCredential {
                wait: policy.rate_limit_backoff,
            },
            AuthMode::Anonymous => Action::Wait(policy.rate_limit_backoff),
        },
        Signal::Pending => Action::Wait(policy.pending_backoff_for(pending_count)),
        Signal::Network(_) => Action::RetryNow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    fn hard(status: u16) -> Signal {
        Signal::Hard {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn classify_statuses() {
        assert_eq!(Signal::classify(200, "{}", None), Signal::Success);
        assert_eq!(Signal::classify(401, "", None), Signal::AuthExpired);
        assert_eq!(Signal::classify(429, "", None), Signal::RateLimited);
        assert_eq!(Signal::classify(503, "down", None), hard_with(503, "down"));
    }

    fn hard_with(status: u16, body: &str) -> Signal {
        Signal::Hard {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn classify_pending_sentinel() {
        fn is_pending(body: &str) -> bool {
            body.contains("processing")
        }
        assert_eq!(
            Signal::classify(200, r#"{"status":"processing"}"#, Some(is_pending)),
            Signal::Pending
        );
        assert_eq!(
            Signal::classify(200, r#"{"data":{}}"#, Some(is_pending)),
            Signal::Success
        );
    }

    #[test]
    fn success_always_accepted() {
        for attempt in 1..=3 {
            assert_eq!(
                next_action(&policy(), AuthMode::Bearer, attempt, 0, &Signal::Success),
                Action::Accept
            );
        }
    }

    #[test]
    fn hard_status_aborts_on_first_attempt() {
        assert_eq!(
            next_action(&policy(), AuthMode::Bearer, 1, 0, &hard(404)),
            Action::Abort
        );
    }

    #[test]
    fn auth_expired_refreshes_with_backoff() {
        assert_eq!(
            next_action(&policy(), AuthMode::Bearer, 1, 0, &Signal::AuthExpired),
            Action::RefreshToken {
                wait: Duration::from_secs(60)
            }
        );
        assert_eq!(
            next_action(&policy(), AuthMode::Anonymous, 1, 0, &Signal::AuthExpired),
            Action::Abort
        );
    }

    #[test]
    fn rate_limited_rotates_when_authenticated() {
        assert_eq!(
            next_action(&policy(), AuthMode::Bearer, 2, 0, &Signal::RateLimited),
            Action::RotateCredential {
                wait: Duration::from_secs(60)
            }
        );
        assert_eq!(
            next_action(&policy(), AuthMode::Anonymous, 2, 0, &Signal::RateLimited),
            Action::Wait(Duration::from_secs(60))
        );
    }

    #[test]
    fn network_error_retries_without_wait() {
        assert_eq!(
            next_action(
                &policy(),
                AuthMode::Bearer,
                1,
                0,
                &Signal::Network("reset".into())
            ),
            Action::RetryNow
        );
    }

    #[test]
    fn last_attempt_aborts_every_retryable_signal() {
        for signal in [
            Signal::AuthExpired,
            Signal::RateLimited,
            Signal::Pending,
            Signal::Network("x".into()),
        ] {
            assert_eq!(
                next_action(&policy(), AuthMode::Bearer, 3, 3, &signal),
                Action::Abort,
                "{signal:?}"
            );
        }
    }

    #[test]
    fn pending_backoff_doubles() {
        let p = policy();
        assert_eq!(p.pending_backoff_for(1), Duration::from_secs(30));
        assert_eq!(p.pending_backoff_for(2), Duration::from_secs(60));
        assert_eq!(p.pending_backoff_for(3), Duration::from_secs(120));
        assert_eq!(p.pending_backoff_for(4), Duration::from_secs(240));
    }

    #[test]
    fn into_error_maps_signals() {
        assert_eq!(hard(500).into_error(), CallError::HardApi {
            status: 500,
            body: String::new()
        });
        assert_eq!(Signal::Pending.into_error(), CallError::Pending);
        assert_eq!(
            Signal::Network("eof".into()).into_error(),
            CallError::Transport("eof".into())
        );
    }
}
