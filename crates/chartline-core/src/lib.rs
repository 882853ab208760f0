//! Chartline Core - crawl engine shared by every pipeline stage
//!
//! Credential rotation, token exchange, sliding-window rate limiting and the
//! bounded retry state machine, plus the record/sink abstractions, logging and
//! progress used by the catalog, store and CLI crates.

pub mod clock;
pub mod credentials;
pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod rate_limit;
pub mod record;
pub mod retry;
pub mod session;
pub mod sink;
pub mod testing;
pub mod token;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialPair, CredentialPool};
pub use error::CallError;
pub use http::{
    Authorization, HttpRequest, HttpResponse, HttpTransport, Method, SHARED_RUNTIME, Transport,
    http_client,
};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_duration, fmt_num};
pub use rate_limit::{EndpointClass, RateLimiter, RateLimiters, RateProfile};
pub use record::{Column, ColumnType, Record, SnapshotMode};
pub use retry::{AuthMode, RetryPolicy};
pub use session::{ApiCall, Session, SessionStats, TokenPolicy};
pub use sink::{MemorySink, Sink};
pub use testing::ScriptedTransport;
pub use token::{TokenProvider, TokenState};
