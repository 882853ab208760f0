//! Crawl session: credentials, token lifecycle, rate windows and the
//! retrying caller, owned together by a single caller.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::credentials::CredentialPool;
use crate::error::CallError;
use crate::http::{Authorization, HttpRequest, Transport};
use crate::rate_limit::{EndpointClass, RateLimiters};
use crate::retry::{Action, AuthMode, RetryPolicy, Signal, next_action};
use crate::token::{TokenProvider, TokenState};

/// Bounds on stage-start token acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub max_attempts: u32,
    /// Wait before rotating to the next credential after a failed exchange
    pub cooldown: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// One logical API call: the request plus how to authenticate and classify it.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub request: HttpRequest,
    pub class: EndpointClass,
    pub auth: AuthMode,
    /// Detects a "still processing" sentinel in a 200 body
    pub pending: Option<fn(&str) -> bool>,
}

impl ApiCall {
    /// Authenticated catalog call.
    pub fn catalog(request: HttpRequest) -> Self {
        Self {
            request,
            class: EndpointClass::Catalog,
            auth: AuthMode::Bearer,
            pending: None,
        }
    }

    /// Anonymous stream-count call with a pending detector.
    pub fn streams(request: HttpRequest, pending: fn(&str) -> bool) -> Self {
        Self {
            request,
            class: EndpointClass::Streams,
            auth: AuthMode::Anonymous,
            pending: Some(pending),
        }
    }
}

/// Counters for what the session has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub http_attempts: usize,
    pub token_requests: usize,
    pub rotations: usize,
}

/// Everything needed to talk to the APIs, owned by exactly one caller.
///
/// The rotation index and the rate windows are mutated through `&mut self`
/// only, so there is never more than one call sequence in flight.
pub struct Session {
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    credentials: CredentialPool,
    tokens: TokenProvider,
    token: Option<TokenState>,
    limiters: RateLimiters,
    retry: RetryPolicy,
    token_policy: TokenPolicy,
    stats: SessionStats,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &self.credentials)
            .field("token", &self.token)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
        credentials: CredentialPool,
        tokens: TokenProvider,
    ) -> Self {
        Self {
            transport,
            clock,
            credentials,
            tokens,
            token: None,
            limiters: RateLimiters::default(),
            retry: RetryPolicy::default(),
            token_policy: TokenPolicy::default(),
            stats: SessionStats::default(),
        }
    }

    pub fn with_limiters(mut self, limiters: RateLimiters) -> Self {
        self.limiters = limiters;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_token_policy(mut self, token_policy: TokenPolicy) -> Self {
        self.token_policy = token_policy;
        self
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    pub fn token(&self) -> Option<&TokenState> {
        self.token.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Block on the clock (pacing between items).
    pub fn pause(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    /// Fresh token at stage start, rotating credentials on failure.
    ///
    /// Each failed exchange is followed by the cooldown and a rotation, except
    /// the last one. After `max_attempts` failures the stage cannot make any
    /// authenticated call.
    pub fn acquire_token(&mut self) -> Result<(), CallError> {
        let attempts = self.token_policy.max_attempts;
        for attempt in 1..=attempts {
            match self.obtain_with_current() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::error!(
                        "Failed to obtain access token on attempt {attempt}/{attempts}: {e}"
                    );
                    if attempt < attempts {
                        self.clock.sleep(self.token_policy.cooldown);
                        self.rotate();
                    }
                }
            }
        }
        log::error!("Exhausted all attempts to obtain access token");
        self.token = None;
        Err(CallError::CredentialExhaustion { attempts })
    }

    /// Run one logical call through the retry state machine.
    ///
    /// Returns the 200 body, or the error that ended the call. Never makes more
    /// than `max_attempts` HTTP attempts.
    pub fn call(&mut self, call: &ApiCall) -> Result<String, CallError> {
        let max = self.retry.max_attempts;
        let mut pending_count = 0u32;
        let mut attempt = 0u32;

        while attempt < max {
            attempt += 1;
            self.limiters.get_mut(call.class).admit(self.clock.as_ref());

            let mut request = call.request.clone();
            if call.auth == AuthMode::Bearer {
                request.auth = match &self.token {
                    Some(token) => Authorization::Bearer(token.bearer.clone()),
                    None => Authorization::None,
                };
            }
            self.stats.http_attempts += 1;

            let (signal, body) = match self.transport.send(&request) {
                Ok(response) => (
                    Signal::classify(response.status, &response.body, call.pending),
                    response.body,
                ),
                Err(CallError::Transport(msg)) => (Signal::Network(msg), String::new()),
                Err(other) => return Err(other),
            };

            if signal == Signal::Pending {
                pending_count += 1;
            } else {
                pending_count = 0;
            }

            let action = next_action(&self.retry, call.auth, attempt, pending_count, &signal);
            if action != Action::Accept {
                log_attempt(&request.url, attempt, max, &signal, action);
            }
            match action {
                Action::Accept => return Ok(body),
                Action::Abort => return Err(signal.into_error()),
                Action::RetryNow => {}
                Action::Wait(wait) => self.clock.sleep(wait),
                Action::RefreshToken { wait } => {
                    self.clock.sleep(wait);
                    self.obtain_with_current()?;
                }
                Action::RotateCredential { wait } => {
                    self.clock.sleep(wait);
                    self.rotate();
                    self.obtain_with_current()?;
                }
            }
        }

        log::error!("{}: failed after {max} attempts", request_label(&call.request.url));
        Err(CallError::Transport(format!("no response after {max} attempts")))
    }

    fn obtain_with_current(&mut self) -> Result<(), CallError> {
        self.stats.token_requests += 1;
        let pair = self.credentials.current();
        let bearer = self.tokens.obtain_token(self.transport.as_ref(), pair)?;
        self.token = Some(TokenState {
            bearer,
            credential_index: self.credentials.index(),
        });
        Ok(())
    }

    fn rotate(&mut self) {
        self.credentials.rotate();
        self.stats.rotations += 1;
    }
}

fn log_attempt(url: &str, attempt: u32, max: u32, signal: &Signal, action: Action) {
    let label = request_label(url);
    match (signal, action) {
        (_, Action::Abort) => {
            log::error!("{label}: attempt {attempt}/{max} failed permanently: {signal:?}")
        }
        (Signal::AuthExpired, _) => {
            log::warn!("{label}: attempt {attempt}/{max}: access token expired, refreshing")
        }
        (Signal::RateLimited, _) => {
            log::warn!("{label}: attempt {attempt}/{max}: rate limit exceeded, switching credentials")
        }
        (Signal::Pending, Action::Wait(wait)) => log::warn!(
            "{label}: attempt {attempt}/{max}: status is 'processing', retrying in {}s",
            wait.as_secs()
        ),
        (Signal::Network(msg), _) => {
            log::error!("{label}: attempt {attempt}/{max}: network error: {msg}")
        }
        _ => log::debug!("{label}: attempt {attempt}/{max}: {signal:?} -> {action:?}"),
    }
}

/// Path part of a URL, for log lines.
fn request_label(url: &str) -> &str {
    url.split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or(url)
}
