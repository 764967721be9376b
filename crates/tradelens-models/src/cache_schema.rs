use serde::{Deserialize, Serialize};

/// How a cached body was stored, so a hit can be decoded the same way it was fetched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Json,
    Text,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Table backing the persistent cache tier.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS cache_entries (
///     key         TEXT PRIMARY KEY,
///     category    TEXT NOT NULL,
///     body        TEXT NOT NULL,
///     created_at  TEXT NOT NULL,
///     expires_at  TEXT NOT NULL
/// );
/// ```
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    body        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// Cache key conventions.
///
/// - Requests: `req:{url}` (e.g., `req:https://api.worldbank.org/v2/country/IND/...`)
/// - Requests with explicit params: `req:{url}|{k1}={v1}&{k2}={v2}`, params sorted by key
pub mod key_patterns {
    use std::collections::BTreeMap;

    pub fn request(url: &str, params: Option<&BTreeMap<String, String>>) -> String {
        match params {
            Some(params) if !params.is_empty() => {
                let joined: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("req:{url}|{}", joined.join("&"))
            }
            _ => format!("req:{url}"),
        }
    }
}

/// A raw cache row as stored in SQLite.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub key: String,
    pub category: String,
    pub body: String,
    pub created_at: String,
    pub expires_at: String,
}
