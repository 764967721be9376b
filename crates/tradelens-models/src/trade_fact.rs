use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partner code meaning "not applicable" in WITS responses.
pub const PARTNER_NOT_APPLICABLE: &str = "999";
/// Product code meaning "not applicable" in WITS responses.
pub const PRODUCT_NOT_APPLICABLE: &str = "999999";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Annual,
    Monthly,
}

impl Frequency {
    pub const ALL: [&'static str; 2] = ["ANNUAL", "MONTHLY"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "ANNUAL",
            Self::Monthly => "MONTHLY",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flow {
    Import,
    Export,
}

impl Flow {
    pub const ALL: [&'static str; 2] = ["IMPORT", "EXPORT"];

    /// Map the assorted provider spellings ("M", "Import", "MPRT-TRD-VL", ...) to a flow.
    pub fn from_provider_code(code: &str) -> Option<Self> {
        let upper = code.trim().to_ascii_uppercase();
        if upper == "M" || upper.starts_with("IMP") || upper.starts_with("MPRT") {
            Some(Self::Import)
        } else if upper == "X" || upper.starts_with("EXP") || upper.starts_with("XPRT") {
            Some(Self::Export)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "IMPORT",
            Self::Export => "EXPORT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductLevel {
    Total,
    Group,
    Hs2,
    Hs4,
}

impl ProductLevel {
    pub const ALL: [&'static str; 4] = ["TOTAL", "GROUP", "HS2", "HS4"];

    /// Infer the level from a product code: "Total"/"999999" is TOTAL,
    /// two digits HS2, four digits HS4, anything else a named group.
    pub fn infer(code: &str) -> Self {
        let code = code.trim();
        if code.eq_ignore_ascii_case("total") || code == PRODUCT_NOT_APPLICABLE {
            return Self::Total;
        }
        let all_digits = !code.is_empty() && code.chars().all(|c| c.is_ascii_digit());
        match (all_digits, code.len()) {
            (true, 2) => Self::Hs2,
            (true, 4) => Self::Hs4,
            _ => Self::Group,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "TOTAL",
            Self::Group => "GROUP",
            Self::Hs2 => "HS2",
            Self::Hs4 => "HS4",
        }
    }
}

/// One observation of bilateral trade.
///
/// `value_usd` is `None` when the provider reported the cell as missing.
/// It is never coerced to zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeFact {
    pub date: String,
    pub frequency: Frequency,
    pub reporter: String,
    pub partner: String,
    pub flow: Flow,
    pub product_level: ProductLevel,
    pub product_code: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub value_usd: Option<f64>,
    pub source_id: String,
    pub retrieval_timestamp: DateTime<Utc>,
    pub request_fingerprint: String,
}
