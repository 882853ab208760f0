//! Fetchers: request shaping and response parsing per endpoint
//!
//! Each fetcher runs one logical call through the session and turns the 200
//! payload into records. Absent data comes back as `Ok(None)` or an empty
//! vec; errors are per-item failures for the stage to log and skip.

mod artist;
mod audio_feature;
mod playlist;
mod stream_count;
mod track;

pub use artist::fetch_artists;
pub use audio_feature::fetch_audio_features;
pub use playlist::fetch_playlist;
pub use stream_count::{fetch_stream_counts, is_pending};
pub use track::fetch_tracks;

use std::time::Duration;

use serde::{Deserialize, Deserializer};

pub(crate) const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const CATALOG_TIMEOUT: Duration = Duration::from_secs(15);
pub(crate) const STREAMS_TIMEOUT: Duration = Duration::from_secs(30);

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| crate::records::UNKNOWN.to_string())
}

#[cfg(test)]
pub(crate) mod harness {
    use std::sync::Arc;

    use chartline_core::{
        CredentialPair, CredentialPool, ManualClock, ScriptedTransport, Session, TokenProvider,
    };

    pub const TOKEN_URL: &str = "https://accounts.test/api/token";

    pub fn session() -> (Session, Arc<ScriptedTransport>, Arc<ManualClock>) {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new());
        let pool = CredentialPool::new(vec![CredentialPair::new("id", "secret")]).unwrap();
        let session = Session::new(
            Box::new(transport.clone()),
            clock.clone(),
            pool,
            TokenProvider::new(TOKEN_URL),
        );
        (session, transport, clock)
    }
}
