use serde::{Deserialize, Serialize};

use crate::forecast::SmoothingParams;

/// Ten mebibytes: the payload ceiling for a single response.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Longest lifetime a cache entry may have: one hundred years.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Configuration for the two-tier cache store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries in the in-memory moka tier.
    #[serde(default = "default_memory_max_capacity")]
    pub memory_max_capacity: u64,
    /// TTL used when a request does not carry its own.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Optional SQLite file for the persistent tier. Memory-only when absent.
    #[serde(default)]
    pub sqlite_path: Option<String>,
    /// Interval in seconds between expired-entry cleanup runs.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_max_capacity: default_memory_max_capacity(),
            default_ttl_seconds: default_ttl_seconds(),
            sqlite_path: None,
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// Configuration for the request executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Upper bound of the uniform random jitter added to each backoff.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Timeout for one network attempt, not the whole retry loop.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            max_payload_bytes: default_max_payload_bytes(),
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

/// Configuration for the forecast engine and its worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastConfig {
    #[serde(default = "default_season_length")]
    pub season_length: usize,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_test_size")]
    pub test_size: usize,
    #[serde(default)]
    pub smoothing: SmoothingParams,
    /// Capacity of the worker's input and output channels.
    #[serde(default = "default_worker_buffer")]
    pub worker_buffer: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            season_length: default_season_length(),
            horizon: default_horizon(),
            test_size: default_test_size(),
            smoothing: SmoothingParams::default(),
            worker_buffer: default_worker_buffer(),
        }
    }
}

fn default_memory_max_capacity() -> u64 {
    10_000
}
fn default_ttl_seconds() -> u64 {
    3600
}
fn default_cleanup_interval() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    1000
}
fn default_max_jitter_ms() -> u64 {
    250
}
fn default_attempt_timeout_ms() -> u64 {
    15_000
}
fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}
fn default_event_log_capacity() -> usize {
    500
}
fn default_season_length() -> usize {
    1
}
fn default_horizon() -> usize {
    5
}
fn default_test_size() -> usize {
    3
}
fn default_worker_buffer() -> usize {
    16
}
