//! Crawl configuration: markets, endpoints, batch sizes, stream window

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A market whose Top 50 playlist is crawled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Country name as it appears in the playlist title
    pub country: String,
    /// ISO 3166-1 alpha-2 market code
    pub code: String,
}

impl Market {
    pub fn new(country: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            code: code.into(),
        }
    }

    /// The six Southeast-Asian markets crawled by default.
    pub fn southeast_asia() -> Vec<Self> {
        [
            ("Indonesia", "ID"),
            ("Malaysia", "MY"),
            ("Philippines", "PH"),
            ("Singapore", "SG"),
            ("Thailand", "TH"),
            ("Vietnam", "VN"),
        ]
        .into_iter()
        .map(|(country, code)| Self::new(country, code))
        .collect()
    }
}

/// API base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token_url: String,
    /// Catalog API root, e.g. `https://api.spotify.com/v1`
    pub base_url: String,
    pub streams_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url: "https://accounts.spotify.com/api/token".into(),
            base_url: "https://api.spotify.com/v1".into(),
            streams_base_url: "https://www.mystreamcount.com".into(),
        }
    }
}

impl Endpoints {
    pub fn search(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }

    pub fn playlist(&self, playlist_id: &str) -> String {
        format!("{}/playlists/{playlist_id}", self.base_url.trim_end_matches('/'))
    }

    pub fn artists(&self) -> String {
        format!("{}/artists", self.base_url.trim_end_matches('/'))
    }

    pub fn audio_features(&self) -> String {
        format!("{}/audio-features", self.base_url.trim_end_matches('/'))
    }

    pub fn track_streams(&self, track_id: &str) -> String {
        format!(
            "{}/api/track/{track_id}/streams",
            self.streams_base_url.trim_end_matches('/')
        )
    }
}

/// Which search hit counts as the official chart playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub owner: String,
    /// `{country}` is replaced with the market's country name
    pub description_template: String,
    /// Pause after each accepted playlist
    pub pause: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            owner: "spotify".into(),
            description_template:
                "Your daily update of the most played tracks right now - {country}.".into(),
            pause: Duration::from_millis(500),
        }
    }
}

impl SearchConfig {
    pub fn query(country: &str) -> String {
        format!("Top 50 - {country}")
    }

    pub fn description(&self, country: &str) -> String {
        self.description_template.replace("{country}", country)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Ids per batch-artists call (API max 50)
    pub artists: usize,
    /// Ids per batch-audio-features call (API max 100)
    pub audio_features: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            artists: 50,
            audio_features: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamsConfig {
    /// Distance from the reference date to the lookback limit
    pub lookback_days: i64,
    /// Days materialized per track, anchor included
    pub window_days: i64,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            window_days: 7,
        }
    }
}

/// Everything the stages need besides the session and sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    pub markets: Vec<Market>,
    pub endpoints: Endpoints,
    pub search: SearchConfig,
    pub batch: BatchConfig,
    pub streams: StreamsConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            markets: Market::southeast_asia(),
            endpoints: Endpoints::default(),
            search: SearchConfig::default(),
            batch: BatchConfig::default(),
            streams: StreamsConfig::default(),
        }
    }
}

impl CrawlConfig {
    /// Reject settings the stages cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=50).contains(&self.batch.artists),
            "batch.artists must be between 1 and 50, got {}",
            self.batch.artists
        );
        anyhow::ensure!(
            (1..=100).contains(&self.batch.audio_features),
            "batch.audio_features must be between 1 and 100, got {}",
            self.batch.audio_features
        );
        anyhow::ensure!(
            self.streams.window_days >= 1,
            "streams.window_days must be at least 1"
        );
        anyhow::ensure!(
            self.streams.lookback_days >= 0,
            "streams.lookback_days must not be negative"
        );
        Ok(())
    }
}
