use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tradelens_cache::CacheStore;
use tradelens_models::cache_schema::{key_patterns, CacheCategory};
use tradelens_models::config::ExecutorConfig;
use tradelens_models::{ClassifiedError, ErrorKind};

use crate::events::{EventKind, EventLog};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, TransportErrorKind};
use crate::retry::Backoff;

/// How a successful body is decoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Strict JSON. A parse failure is schema drift.
    #[default]
    Json,
    /// JSON when it parses, raw text otherwise.
    Tree,
    Text,
}

/// Whether the cache is consulted and populated for a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Use,
    /// Skip the read, still write the fresh payload.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

/// One logical fetch. Built per call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub url: String,
    pub format: ResponseFormat,
    /// Falls back to the cache store's default TTL.
    pub cache_ttl: Option<Duration>,
    /// Falls back to the executor's configured `max_retries`.
    pub max_retries: Option<u32>,
    /// Extra key material for requests whose identity is not fully in the URL.
    pub params: BTreeMap<String, String>,
    pub cache_mode: CacheMode,
    /// Credential-free form of `url`. Cache keys, events and logs use it
    /// when set; only the network call sees `url`.
    pub identity: Option<String>,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, format: ResponseFormat) -> Self {
        Self {
            url: url.into(),
            format,
            cache_ttl: None,
            max_retries: None,
            params: BTreeMap::new(),
            cache_mode: CacheMode::Use,
            identity: None,
        }
    }

    pub fn json(url: impl Into<String>) -> Self {
        Self::new(url, ResponseFormat::Json)
    }

    pub fn tree(url: impl Into<String>) -> Self {
        Self::new(url, ResponseFormat::Tree)
    }

    pub fn text(url: impl Into<String>) -> Self {
        Self::new(url, ResponseFormat::Text)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// URL safe to key, record and log by.
    pub fn identity(&self) -> &str {
        self.identity.as_deref().unwrap_or(&self.url)
    }

    pub fn cache_key(&self) -> String {
        key_patterns::request(self.identity(), Some(&self.params))
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    fn category(&self) -> CacheCategory {
        match self {
            Self::Json(_) => CacheCategory::Json,
            Self::Text(_) => CacheCategory::Text,
        }
    }
}

/// Shared connectivity flag. Online until the embedding application says otherwise.
#[derive(Debug, Clone)]
pub struct NetworkStatus(Arc<AtomicBool>);

impl Default for NetworkStatus {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl NetworkStatus {
    pub fn online() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::Relaxed);
    }
}

/// Cache-or-fetch with retry, backoff, payload ceiling and error classification.
///
/// Shared behind an `Arc` by every in-flight fetch. Identical concurrent
/// requests are not coalesced; both may hit the network and the later cache
/// write wins.
pub struct RequestExecutor {
    client: Arc<dyn HttpClient>,
    cache: Arc<CacheStore>,
    config: ExecutorConfig,
    backoff: Backoff,
    events: Arc<EventLog>,
    network: NetworkStatus,
}

impl RequestExecutor {
    pub fn new(client: Arc<dyn HttpClient>, cache: Arc<CacheStore>, config: ExecutorConfig) -> Self {
        Self {
            client,
            cache,
            backoff: Backoff::from_config(&config),
            events: Arc::new(EventLog::new(config.event_log_capacity)),
            network: NetworkStatus::default(),
            config,
        }
    }

    pub fn with_network_status(mut self, network: NetworkStatus) -> Self {
        self.network = network;
        self
    }

    pub fn network_status(&self) -> &NetworkStatus {
        &self.network
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one logical fetch.
    ///
    /// A live cache entry returns immediately with no network call and no
    /// retry accounting. Retryable failures are absorbed until
    /// `max_retries + 1` attempts have been made.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Payload, ClassifiedError> {
        let url = descriptor.identity();
        let key = descriptor.cache_key();

        if descriptor.cache_mode == CacheMode::Use {
            if let Some(entry) = self.cache.get(&key).await {
                match decode(descriptor.format, &entry.body) {
                    Ok(payload) => {
                        tracing::debug!(url, "Cache hit");
                        self.events.record(url, EventKind::CacheHit);
                        return Ok(payload);
                    }
                    Err(e) => {
                        tracing::warn!(url, error = %e, "Discarding undecodable cache entry");
                        self.cache.invalidate(&key).await;
                    }
                }
            }
        }

        let max_retries = descriptor.max_retries.unwrap_or(self.config.max_retries);
        let mut attempt: u32 = 0;

        loop {
            self.events.record(url, EventKind::AttemptStarted { attempt });
            let started = Instant::now();
            tracing::debug!(url, attempt, "Request attempt");

            let result = self
                .attempt(&descriptor.url)
                .await
                .and_then(|response| {
                    decode(descriptor.format, &response.body).map(|payload| (response.status, payload))
                });

            match result {
                Ok((status, payload)) => {
                    tracing::debug!(
                        url,
                        attempt,
                        status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Request succeeded"
                    );
                    self.events
                        .record(url, EventKind::Succeeded { attempt, status });
                    if descriptor.cache_mode != CacheMode::Bypass {
                        self.store(&key, &payload, descriptor.cache_ttl).await;
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    // Offline failures are retryable only once connectivity returns.
                    let give_up = !error.retryable()
                        || error.kind == ErrorKind::NetworkError
                        || attempt >= max_retries;
                    if give_up {
                        tracing::warn!(
                            url,
                            attempt,
                            kind = %error.kind,
                            error = %error.message,
                            "Request failed"
                        );
                        self.events.record(
                            url,
                            EventKind::Failed {
                                attempt,
                                error: error.kind,
                            },
                        );
                        return Err(error);
                    }

                    let delay = match (error.kind, error.retry_after_secs) {
                        (ErrorKind::RateLimit, Some(secs)) => Duration::from_secs(secs),
                        _ => self.backoff.delay(attempt),
                    };
                    let delay_ms = delay.as_millis() as u64;
                    tracing::warn!(
                        url,
                        attempt,
                        delay_ms,
                        kind = %error.kind,
                        "Retrying after backoff"
                    );
                    self.events.record(
                        url,
                        EventKind::BackoffScheduled {
                            attempt,
                            delay_ms,
                            reason: error.kind,
                        },
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One network attempt, bounded by the per-attempt timeout.
    async fn attempt(&self, url: &str) -> Result<HttpResponse, ClassifiedError> {
        let timeout = Duration::from_millis(self.config.attempt_timeout_ms);
        let max_bytes = self.config.max_payload_bytes;
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json, text/plain, */*")
            .with_timeout(timeout)
            .with_max_body_bytes(max_bytes);

        let response = match tokio::time::timeout(timeout, self.client.get(request)).await {
            Err(_) => return Err(timed_out()),
            Ok(Err(transport)) if transport.kind == TransportErrorKind::Timeout => {
                return Err(timed_out())
            }
            Ok(Err(transport)) => {
                let kind = if self.network.is_online() {
                    ErrorKind::CorsBlocked
                } else {
                    ErrorKind::NetworkError
                };
                return Err(ClassifiedError::new(kind, transport.message));
            }
            Ok(Ok(response)) => response,
        };

        if let Some(error) =
            ClassifiedError::from_status(response.status, response.retry_after_secs())
        {
            return Err(error);
        }

        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(too_large(declared, max_bytes));
            }
        }
        if let Some(read) = response.body_exceeded {
            return Err(too_large(read, max_bytes));
        }
        let actual = response.body.len() as u64;
        if actual > max_bytes {
            return Err(too_large(actual, max_bytes));
        }

        Ok(response)
    }

    async fn store(&self, key: &str, payload: &Payload, ttl: Option<Duration>) {
        let body = match payload {
            Payload::Json(value) => value.to_string(),
            Payload::Text(text) => text.clone(),
        };
        self.cache
            .put(key.to_string(), body, payload.category(), ttl)
            .await;
    }
}

fn decode(format: ResponseFormat, body: &str) -> Result<Payload, ClassifiedError> {
    match format {
        ResponseFormat::Json => serde_json::from_str(body).map(Payload::Json).map_err(|e| {
            ClassifiedError::new(
                ErrorKind::SchemaDrift,
                format!("response is not valid JSON: {e}"),
            )
        }),
        ResponseFormat::Tree => Ok(serde_json::from_str(body)
            .map(Payload::Json)
            .unwrap_or_else(|_| Payload::Text(body.to_string()))),
        ResponseFormat::Text => Ok(Payload::Text(body.to_string())),
    }
}

fn timed_out() -> ClassifiedError {
    ClassifiedError::new(ErrorKind::ServerError, "request timed out")
}

fn too_large(bytes: u64, max: u64) -> ClassifiedError {
    ClassifiedError::new(
        ErrorKind::PayloadTooLarge,
        format!("response of {bytes} bytes exceeds the {max} byte ceiling"),
    )
}
