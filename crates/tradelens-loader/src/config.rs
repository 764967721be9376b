use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tradelens_models::config::{CacheConfig, ExecutorConfig, ForecastConfig, MAX_TTL_SECONDS};

use crate::error::LoaderError;
use crate::pipeline::SourceJob;
use crate::planner::YearRange;

/// Top-level configuration for the acquisition side, read from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Fetches run on every refresh, in order.
    #[serde(default)]
    pub jobs: Vec<SourceJob>,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl LoaderConfig {
    pub fn from_toml(text: &str) -> Result<Self, LoaderError> {
        let config: Self = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    fn check(&self) -> Result<(), LoaderError> {
        if self.planner.chunk_size == 0 {
            return Err(LoaderError::Config("planner.chunk_size must be > 0".into()));
        }
        if self.daemon.refresh_interval_seconds == 0 {
            return Err(LoaderError::Config(
                "daemon.refresh_interval_seconds must be > 0".into(),
            ));
        }
        if self.cache.cleanup_interval_seconds == 0 {
            return Err(LoaderError::Config(
                "cache.cleanup_interval_seconds must be > 0".into(),
            ));
        }
        let ttls = [
            ("cache.default_ttl_seconds", Some(self.cache.default_ttl_seconds)),
            ("sources.wits.ttl_seconds", self.sources.wits.ttl_seconds),
            ("sources.world_bank.ttl_seconds", self.sources.world_bank.ttl_seconds),
            ("sources.frankfurter.ttl_seconds", self.sources.frankfurter.ttl_seconds),
            ("sources.comtrade.ttl_seconds", self.sources.comtrade.ttl_seconds),
        ];
        for (field, seconds) in ttls {
            if seconds.is_some_and(|s| s > MAX_TTL_SECONDS) {
                return Err(LoaderError::Config(format!(
                    "{field} must be at most {MAX_TTL_SECONDS} (one hundred years)"
                )));
            }
        }
        Ok(())
    }
}

/// Dimensional limits applied to WITS queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannerConfig {
    #[serde(default = "default_max_wildcards")]
    pub max_wildcards: usize,
    /// Two dimensions that may never both be wildcarded.
    #[serde(default = "default_exclusive_pair")]
    pub exclusive_pair: Option<[String; 2]>,
    #[serde(default = "default_chunk_dimension")]
    pub chunk_dimension: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_wildcards: default_max_wildcards(),
            exclusive_pair: default_exclusive_pair(),
            chunk_dimension: default_chunk_dimension(),
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcesConfig {
    #[serde(default)]
    pub wits: WitsSourceConfig,
    #[serde(default)]
    pub world_bank: WorldBankSourceConfig,
    #[serde(default)]
    pub frankfurter: FrankfurterSourceConfig,
    #[serde(default)]
    pub comtrade: ComtradeSourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WitsSourceConfig {
    #[serde(default = "default_wits_base_url")]
    pub base_url: String,
    #[serde(default = "default_wits_datasource")]
    pub datasource: String,
    /// Years enumerated when a query without its own range must be split.
    #[serde(default = "default_wits_fallback_range")]
    pub fallback_range: YearRange,
    /// Cache TTL in seconds. Store default when absent.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl Default for WitsSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_wits_base_url(),
            datasource: default_wits_datasource(),
            fallback_range: default_wits_fallback_range(),
            ttl_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldBankSourceConfig {
    #[serde(default = "default_world_bank_base_url")]
    pub base_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl Default for WorldBankSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_world_bank_base_url(),
            per_page: default_per_page(),
            ttl_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrankfurterSourceConfig {
    #[serde(default = "default_frankfurter_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl Default for FrankfurterSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_frankfurter_base_url(),
            ttl_seconds: None,
        }
    }
}

/// Comtrade is off unless explicitly enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComtradeSourceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_comtrade_base_url")]
    pub base_url: String,
    /// Passed through as `subscription-key`. Omitted from the URL when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl Default for ComtradeSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_comtrade_base_url(),
            api_key: None,
            ttl_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval(),
        }
    }
}

impl DaemonConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

pub(crate) fn ttl(seconds: Option<u64>) -> Option<Duration> {
    seconds.map(Duration::from_secs)
}

fn default_max_wildcards() -> usize {
    2
}
fn default_exclusive_pair() -> Option<[String; 2]> {
    Some(["reporter".to_string(), "partner".to_string()])
}
fn default_chunk_dimension() -> String {
    "year".to_string()
}
fn default_chunk_size() -> usize {
    5
}
fn default_wits_base_url() -> String {
    "https://wits.worldbank.org/API/V1/SDMX/V21".to_string()
}
fn default_wits_datasource() -> String {
    "tradestats-trade".to_string()
}
fn default_wits_fallback_range() -> YearRange {
    YearRange::new(2000, 2022)
}
fn default_world_bank_base_url() -> String {
    "https://api.worldbank.org/v2".to_string()
}
fn default_per_page() -> u32 {
    1000
}
fn default_frankfurter_base_url() -> String {
    "https://api.frankfurter.dev".to_string()
}
fn default_comtrade_base_url() -> String {
    "https://comtradeapi.un.org".to_string()
}
fn default_refresh_interval() -> u64 {
    6 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = LoaderConfig::from_toml("").unwrap();
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.planner.max_wildcards, 2);
        assert_eq!(config.planner.chunk_size, 5);
        assert_eq!(config.sources.world_bank.per_page, 1000);
        assert!(!config.sources.comtrade.enabled);
        assert!(config.jobs.is_empty());
        assert_eq!(config.daemon.refresh_interval(), Duration::from_secs(21_600));
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[cache]
sqlite_path = "/tmp/tradelens.db"
default_ttl_seconds = 86400

[executor]
max_retries = 5
base_backoff_ms = 500

[planner]
max_wildcards = 3
exclusive_pair = ["reporter", "partner"]

[sources.wits]
fallback_range = { start = 2010, end = 2020 }

[sources.comtrade]
enabled = true
api_key = "secret key"

[[jobs]]
source = "world_bank"
country = "IND"
indicator = "NY.GDP.MKTP.CD"
date = "2000:2024"

[[jobs]]
source = "wits"
reporter = "IND"
partner = "WLD"
indicator = "XPRT-TRD-VL"

[[jobs]]
source = "frankfurter"
base = "USD"
symbols = ["INR", "CNY"]
start = "2024-01-01"
end = "2024-01-31"

[forecast]
season_length = 4
horizon = 8

[daemon]
refresh_interval_seconds = 600
"#;
        let config = LoaderConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.cache.sqlite_path.as_deref(), Some("/tmp/tradelens.db"));
        assert_eq!(config.executor.max_retries, 5);
        assert_eq!(config.executor.max_jitter_ms, 250);
        assert_eq!(config.planner.max_wildcards, 3);
        assert_eq!(config.sources.wits.fallback_range, YearRange::new(2010, 2020));
        assert_eq!(config.sources.comtrade.api_key.as_deref(), Some("secret key"));
        assert_eq!(config.jobs.len(), 3);
        assert_eq!(config.jobs[0].label(), "world_bank:IND/NY.GDP.MKTP.CD/2000:2024");
        assert_eq!(config.forecast.season_length, 4);
        assert_eq!(config.forecast.test_size, 3);
        assert_eq!(config.daemon.refresh_interval_seconds, 600);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = LoaderConfig::from_toml("[planner]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, LoaderError::Config(_)));
    }

    #[test]
    fn absurd_ttls_are_rejected() {
        for text in [
            "[cache]\ndefault_ttl_seconds = 10_000_000_000_000\n",
            "[sources.comtrade]\nttl_seconds = 10_000_000_000_000\n",
        ] {
            match LoaderConfig::from_toml(text).unwrap_err() {
                LoaderError::Config(msg) => assert!(msg.contains("ttl_seconds")),
                other => panic!("expected a config error, got {other:?}"),
            }
        }
        let ceiling = format!("[cache]\ndefault_ttl_seconds = {MAX_TTL_SECONDS}\n");
        assert!(LoaderConfig::from_toml(&ceiling).is_ok());
    }

    #[test]
    fn unknown_job_source_is_a_parse_error() {
        let err = LoaderConfig::from_toml("[[jobs]]\nsource = \"imf\"\n").unwrap_err();
        assert!(matches!(err, LoaderError::ConfigParse(_)));
    }
}
