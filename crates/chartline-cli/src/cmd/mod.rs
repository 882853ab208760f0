//! Subcommands and the wiring they share

pub mod run;
pub mod stage;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chartline_catalog::{
    ArtistRecord, AudioFeatureRecord, PlaylistRecord, StreamRecord, TrackRecord,
};
use chartline_core::{HttpTransport, Session, SystemClock, TokenProvider};
use chartline_store::StoreSink;
use chrono::NaiveDate;

use crate::config::Config;

/// Live session: real HTTP, wall clock, configured limits.
pub fn open_session(config: &Config) -> Result<Session> {
    let pool = config.credential_pool()?;
    log::info!("Using {} credential pair(s)", pool.len());
    Ok(Session::new(
        Box::new(HttpTransport),
        Arc::new(SystemClock),
        pool,
        TokenProvider::new(config.api.token_url.clone()),
    )
    .with_limiters(config.rate_limiters())
    .with_retry_policy(config.retry_policy())
    .with_token_policy(config.token_policy()))
}

/// Store under `--output` (or `[output] dir`) with every table created.
pub fn open_store(config: &Config, output: Option<&Path>) -> Result<StoreSink> {
    let dir: PathBuf = output.map_or_else(|| config.output.dir.clone(), Path::to_path_buf);
    let sink = StoreSink::open_with(&dir, &config.database_path(&dir))?;
    sink.register::<PlaylistRecord>()?;
    sink.register::<TrackRecord>()?;
    sink.register::<ArtistRecord>()?;
    sink.register::<AudioFeatureRecord>()?;
    sink.register::<StreamRecord>()?;
    Ok(sink)
}

/// `--date` or today's UTC calendar date.
pub fn run_date(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| chrono::Utc::now().date_naive())
}
