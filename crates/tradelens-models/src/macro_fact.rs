use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation of a macroeconomic or FX indicator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroFact {
    /// Year (or ISO date for FX observations).
    pub date: String,
    pub country: String,
    pub indicator_code: String,
    #[serde(default)]
    pub indicator_name: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    pub source_id: String,
    pub retrieval_timestamp: DateTime<Utc>,
    pub request_fingerprint: String,
}
