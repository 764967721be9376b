use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of failure kinds surfaced by acquisition and modeling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure while the process is offline.
    NetworkError,
    /// Transport failure while the process is online (blocked upstream).
    CorsBlocked,
    /// HTTP 429.
    RateLimit,
    /// HTTP 5xx, or an attempt that timed out.
    ServerError,
    /// HTTP 4xx other than 429.
    ClientError,
    PayloadTooLarge,
    /// Validation rejected at least one record, or a payload could not be parsed.
    SchemaDrift,
    /// The planner could not produce any legal sub-query.
    QueryLimitExceeded,
    /// Regression normal equations are not invertible.
    SingularMatrixError,
}

/// How loudly a UI collaborator should present an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl ErrorKind {
    pub fn recoverable(&self) -> bool {
        !matches!(self, Self::ClientError | Self::SingularMatrixError)
    }

    /// Whether the executor's retry loop may try again.
    ///
    /// `NetworkError` is retryable only once connectivity returns, so the
    /// retry loop still aborts on it.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimit | Self::ServerError
        )
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::RateLimit => Severity::Info,
            Self::NetworkError
            | Self::CorsBlocked
            | Self::ServerError
            | Self::PayloadTooLarge
            | Self::SchemaDrift => Severity::Warn,
            Self::ClientError | Self::QueryLimitExceeded | Self::SingularMatrixError => {
                Severity::Error
            }
        }
    }

    /// User-facing message template. `{source}` is replaced by the source label.
    pub fn message_template(&self) -> &'static str {
        match self {
            Self::NetworkError => "You appear to be offline. Showing the last saved data for {source}.",
            Self::CorsBlocked => "{source} blocked the request from this environment. Showing the last saved data.",
            Self::RateLimit => "{source} is rate limiting requests. Data will refresh shortly.",
            Self::ServerError => "{source} is having trouble right now. Showing the last saved data.",
            Self::ClientError => "{source} rejected the request. Check the query parameters.",
            Self::PayloadTooLarge => "The response from {source} was too large. Narrow the query and try again.",
            Self::SchemaDrift => "Some records from {source} did not match the expected format and were skipped.",
            Self::QueryLimitExceeded => "The query to {source} asks for too many dimensions at once.",
            Self::SingularMatrixError => "The regression could not be computed for this series.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NetworkError => "NetworkError",
            Self::CorsBlocked => "CorsBlocked",
            Self::RateLimit => "RateLimit",
            Self::ServerError => "ServerError",
            Self::ClientError => "ClientError",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::SchemaDrift => "SchemaDrift",
            Self::QueryLimitExceeded => "QueryLimitExceeded",
            Self::SingularMatrixError => "SingularMatrixError",
        };
        f.write_str(name)
    }
}

/// A classified failure with enough structure for retry decisions and UI mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub retry_after_secs: Option<u64>,
    #[serde(default)]
    pub source_label: Option<String>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after_secs: None,
            source_label: None,
        }
    }

    /// Classify an HTTP status. Returns `None` for 2xx/3xx.
    pub fn from_status(status: u16, retry_after_secs: Option<u64>) -> Option<Self> {
        let kind = match status {
            429 => ErrorKind::RateLimit,
            400..=499 => ErrorKind::ClientError,
            500..=599 => ErrorKind::ServerError,
            _ => return None,
        };
        let mut error = Self::new(kind, format!("upstream responded with HTTP {status}"));
        error.status = Some(status);
        error.retry_after_secs = retry_after_secs;
        Some(error)
    }

    pub fn with_source(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    pub fn recoverable(&self) -> bool {
        self.kind.recoverable()
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn user_message(&self) -> String {
        let source = self.source_label.as_deref().unwrap_or("The data source");
        let rendered = self.kind.message_template().replace("{source}", source);
        // Capitalise when the label lands at the start of the sentence.
        let mut chars = rendered.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => rendered,
        }
    }
}
