//! Error taxonomy for calls against the catalog and stream-count APIs

/// Terminal failure of one logical fetch.
///
/// Everything except [`CallError::CredentialExhaustion`] is a per-item failure:
/// the stage logs it and moves on to the next item.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// 401 that could not be recovered (unauthenticated endpoint or attempts used up)
    AuthExpired,
    /// 429 that could not be recovered
    RateLimited,
    /// Connection, timeout or body read failure (no HTTP status)
    Transport(String),
    /// Any other non-200 status
    HardApi { status: u16, body: String },
    /// Token endpoint refused the current credential during a recovery
    AuthFailure { status: Option<u16> },
    /// Token acquisition failed on every attempt at stage start
    CredentialExhaustion { attempts: u32 },
    /// Upstream still reported "processing" when attempts ran out
    Pending,
    /// 200 with a body that is not the expected JSON
    Decode(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthExpired => f.write_str("HTTP 401: access token expired"),
            Self::RateLimited => f.write_str("HTTP 429: rate limit exceeded"),
            Self::Transport(msg) => write!(f, "network error: {msg}"),
            Self::HardApi { status, body } => write!(f, "HTTP {status}: {}", truncate(body, 200)),
            Self::AuthFailure { status: Some(s) } => write!(f, "token request failed: HTTP {s}"),
            Self::AuthFailure { status: None } => f.write_str("token request failed: network error"),
            Self::CredentialExhaustion { attempts } => {
                write!(f, "no access token after {attempts} attempts")
            }
            Self::Pending => f.write_str("upstream still processing"),
            Self::Decode(msg) => write!(f, "invalid response body: {msg}"),
        }
    }
}

impl std::error::Error for CallError {}

impl CallError {
    /// Whether a fresh attempt of the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthExpired | Self::RateLimited | Self::Transport(_) | Self::Pending
        )
    }

    /// Whether the whole stage must stop (no authenticated call is possible).
    pub fn aborts_stage(&self) -> bool {
        matches!(self, Self::CredentialExhaustion { .. })
    }
}

impl From<serde_json::Error> for CallError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Cut long response bodies so a single error line stays readable.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_api_not_retryable() {
        let err = CallError::HardApi {
            status: 404,
            body: "not found".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(!err.aborts_stage());
    }

    #[test]
    fn auth_and_rate_limit_retryable() {
        assert!(CallError::AuthExpired.is_retryable());
        assert!(CallError::RateLimited.is_retryable());
        assert!(CallError::Transport("reset".into()).is_retryable());
        assert!(CallError::Pending.is_retryable());
    }

    #[test]
    fn only_exhaustion_aborts_stage() {
        assert!(CallError::CredentialExhaustion { attempts: 3 }.aborts_stage());
        assert!(!CallError::AuthFailure { status: Some(400) }.aborts_stage());
        assert!(!CallError::Decode("eof".into()).aborts_stage());
    }

    #[test]
    fn display_hard_api_truncates_body() {
        let err = CallError::HardApi {
            status: 500,
            body: "x".repeat(1000),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("HTTP 500: "));
        assert_eq!(msg.len(), "HTTP 500: ".len() + 200);
    }

    #[test]
    fn display_auth_failure_without_status() {
        let err = CallError::AuthFailure { status: None };
        assert_eq!(format!("{err}"), "token request failed: network error");
    }

    #[test]
    fn decode_from_serde() {
        let err: CallError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, CallError::Decode(_)));
    }
}
