//! Chartline Catalog - the five crawl stages
//!
//! Playlists, tracks, artists, audio features and daily stream counts, each
//! fetched through a [`chartline_core::Session`] and persisted through a
//! [`chartline_core::Sink`].
//!
//! # Example
//!
//! ```no_run
//! use chartline_catalog::{CrawlConfig, Pipeline};
//! use chartline_core::{CredentialPair, CredentialPool, HttpTransport, MemorySink, Session,
//!     SystemClock, TokenProvider};
//! use std::sync::Arc;
//!
//! let config = CrawlConfig::default();
//! let pool = CredentialPool::new(vec![CredentialPair::new("id", "secret")]).unwrap();
//! let mut session = Session::new(
//!     Box::new(HttpTransport),
//!     Arc::new(SystemClock),
//!     pool,
//!     TokenProvider::new(config.endpoints.token_url.clone()),
//! );
//! let mut sink = MemorySink::new();
//! let today = chrono::Local::now().date_naive();
//!
//! let summary = Pipeline::new(&mut session, &mut sink, &config, today).run_all();
//! summary.print();
//! ```

pub mod config;
pub mod fetch;
pub mod normalize;
pub mod records;
pub mod runner;
pub mod state;
pub mod stats;
pub mod window;

// Re-exports for convenience
pub use config::{BatchConfig, CrawlConfig, Endpoints, Market, SearchConfig, StreamsConfig};
pub use records::{
    ArtistRecord, AudioFeatureRecord, AudioFeatures, PlaylistRecord, StreamRecord, TrackRecord,
};
pub use runner::{Pipeline, StageError, StageOutput};
pub use state::Stage;
pub use stats::{RunSummary, StageStats};
pub use window::StreamWindow;
