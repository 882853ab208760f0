//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chartline_catalog::{
    BatchConfig, CrawlConfig, Endpoints, Market, SearchConfig, StreamsConfig,
};
use chartline_core::{
    CredentialPair, CredentialPool, RateLimiters, RateProfile, RetryPolicy, TokenPolicy,
};
use serde::Deserialize;

/// Global configuration for chartline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: Vec<CredentialConfig>,
    pub output: OutputConfig,
    pub api: ApiConfig,
    pub rate: RateConfig,
    pub retry: RetryConfig,
    pub token: TokenConfig,
    pub batch: BatchSection,
    pub streams: StreamsSection,
    pub search: SearchSection,
    pub markets: Vec<Market>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            output: OutputConfig::default(),
            api: ApiConfig::default(),
            rate: RateConfig::default(),
            retry: RetryConfig::default(),
            token: TokenConfig::default(),
            batch: BatchSection::default(),
            streams: StreamsSection::default(),
            search: SearchSection::default(),
            markets: Market::southeast_asia(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    #[serde(default, deserialize_with = "deserialize_env_var")]
    pub client_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_env_var")]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Database file; `{dir}/chartline.duckdb` when unset
    pub database: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            database: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub token_url: String,
    pub base_url: String,
    pub streams_base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let e = Endpoints::default();
        Self {
            token_url: e.token_url,
            base_url: e.base_url,
            streams_base_url: e.streams_base_url,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    pub catalog: RateSection,
    pub streams: RateSection,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            catalog: RateSection::from(RateProfile::CATALOG),
            streams: RateSection::from(RateProfile::STREAMS),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateSection {
    pub window_secs: u64,
    pub max_calls: usize,
}

impl From<RateProfile> for RateSection {
    fn from(p: RateProfile) -> Self {
        Self {
            window_secs: p.window.as_secs(),
            max_calls: p.max_calls,
        }
    }
}

impl RateSection {
    fn profile(self) -> RateProfile {
        RateProfile {
            window: Duration::from_secs(self.window_secs),
            max_calls: self.max_calls,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub auth_backoff_secs: u64,
    pub rate_limit_backoff_secs: u64,
    pub pending_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let p = RetryPolicy::default();
        Self {
            max_attempts: p.max_attempts,
            auth_backoff_secs: p.auth_backoff.as_secs(),
            rate_limit_backoff_secs: p.rate_limit_backoff.as_secs(),
            pending_backoff_secs: p.pending_backoff.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub max_attempts: u32,
    pub cooldown_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        let p = TokenPolicy::default();
        Self {
            max_attempts: p.max_attempts,
            cooldown_secs: p.cooldown.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub artists: usize,
    pub audio_features: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        let b = BatchConfig::default();
        Self {
            artists: b.artists,
            audio_features: b.audio_features,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StreamsSection {
    pub lookback_days: i64,
    pub window_days: i64,
}

impl Default for StreamsSection {
    fn default() -> Self {
        let s = StreamsConfig::default();
        Self {
            lookback_days: s.lookback_days,
            window_days: s.window_days,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub owner: String,
    pub description_template: String,
    pub pause_ms: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        let s = SearchConfig::default();
        Self {
            owner: s.owner,
            description_template: s.description_template,
            pause_ms: s.pause.as_millis() as u64,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./chartline.toml (current directory)
    /// 2. ~/.config/chartline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("chartline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "chartline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values the session or stages cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.rate.catalog.max_calls > 0 && self.rate.streams.max_calls > 0,
            "rate.*.max_calls must be at least 1"
        );
        anyhow::ensure!(self.retry.max_attempts > 0, "retry.max_attempts must be at least 1");
        anyhow::ensure!(self.token.max_attempts > 0, "token.max_attempts must be at least 1");
        anyhow::ensure!(!self.markets.is_empty(), "at least one [[markets]] entry is required");
        self.crawl_config().validate()
    }

    /// Credentials from the file, or `CHARTLINE_CLIENT_ID`/`CHARTLINE_CLIENT_SECRET`
    /// when the file lists none.
    pub fn credential_pool(&self) -> Result<CredentialPool> {
        let pairs = if self.credentials.is_empty() {
            match (
                std::env::var("CHARTLINE_CLIENT_ID"),
                std::env::var("CHARTLINE_CLIENT_SECRET"),
            ) {
                (Ok(id), Ok(secret)) => vec![CredentialPair::new(id, secret)],
                _ => anyhow::bail!(
                    "no credentials: add [[credentials]] to the config or set \
                     CHARTLINE_CLIENT_ID and CHARTLINE_CLIENT_SECRET"
                ),
            }
        } else {
            self.credentials
                .iter()
                .enumerate()
                .map(|(i, c)| match (&c.client_id, &c.client_secret) {
                    (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                        Ok(CredentialPair::new(id.as_str(), secret.as_str()))
                    }
                    _ => anyhow::bail!(
                        "credentials[{i}]: client_id or client_secret is empty or names an unset variable"
                    ),
                })
                .collect::<Result<Vec<_>>>()?
        };
        CredentialPool::new(pairs)
    }

    pub fn rate_limiters(&self) -> RateLimiters {
        RateLimiters::new(self.rate.catalog.profile(), self.rate.streams.profile())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            auth_backoff: Duration::from_secs(self.retry.auth_backoff_secs),
            rate_limit_backoff: Duration::from_secs(self.retry.rate_limit_backoff_secs),
            pending_backoff: Duration::from_secs(self.retry.pending_backoff_secs),
        }
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            max_attempts: self.token.max_attempts,
            cooldown: Duration::from_secs(self.token.cooldown_secs),
        }
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            markets: self.markets.clone(),
            endpoints: Endpoints {
                token_url: self.api.token_url.clone(),
                base_url: self.api.base_url.clone(),
                streams_base_url: self.api.streams_base_url.clone(),
            },
            search: SearchConfig {
                owner: self.search.owner.clone(),
                description_template: self.search.description_template.clone(),
                pause: Duration::from_millis(self.search.pause_ms),
            },
            batch: BatchConfig {
                artists: self.batch.artists,
                audio_features: self.batch.audio_features,
            },
            streams: StreamsConfig {
                lookback_days: self.streams.lookback_days,
                window_days: self.streams.window_days,
            },
        }
    }

    /// Database path for an output directory (`--output` or `[output] dir`).
    pub fn database_path(&self, output: &Path) -> PathBuf {
        self.output
            .database
            .clone()
            .unwrap_or_else(|| output.join(chartline_store::DATABASE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output.dir, PathBuf::from("./data"));
        assert_eq!(config.markets.len(), 6);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.rate.catalog.max_calls, 60);
        assert_eq!(config.rate.streams.window_secs, 60);
        assert_eq!(config.crawl_config(), CrawlConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("CHARTLINE_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${CHARTLINE_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("CHARTLINE_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[[credentials]]
client_id = "id-1"
client_secret = "secret-1"

[[credentials]]
client_id = "id-2"
client_secret = "${NONEXISTENT_VAR_12345}"

[output]
dir = "/tmp/charts"

[rate.streams]
window_secs = 120
max_calls = 10

[retry]
max_attempts = 5

[search]
pause_ms = 0

[[markets]]
country = "Japan"
code = "JP"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("/tmp/charts"));
        assert_eq!(
            config.database_path(&config.output.dir),
            PathBuf::from("/tmp/charts/chartline.duckdb")
        );
        assert_eq!(config.rate.streams.max_calls, 10);
        // untouched sections keep their defaults
        assert_eq!(config.rate.catalog.max_calls, 60);
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().pending_backoff, Duration::from_secs(30));
        assert_eq!(config.markets, vec![Market::new("Japan", "JP")]);
        assert_eq!(config.crawl_config().search.pause, Duration::ZERO);

        assert!(config.credentials[1].client_secret.is_none());
        let err = config.credential_pool().unwrap_err();
        assert!(err.to_string().contains("credentials[1]"));
    }

    #[test]
    fn credential_pool_from_file() {
        let toml = r#"
[[credentials]]
client_id = "a"
client_secret = "b"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let pool = config.credential_pool().unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.current().client_id, "a");
    }

    #[test]
    fn invalid_batch_is_rejected() {
        let mut config = Config::default();
        config.batch.artists = 80;
        assert!(config.validate().is_err());
        config.batch.artists = 50;
        config.rate.catalog.max_calls = 0;
        assert!(config.validate().is_err());
    }
}
