use serde::{Deserialize, Serialize};

use crate::macro_fact::MacroFact;
use crate::trade_fact::TradeFact;

/// A normalized but not yet validated record: canonical field names mapped
/// to whatever the provider supplied.
pub type CandidateRecord = serde_json::Map<String, serde_json::Value>;

/// Which canonical schema a candidate is validated against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Trade,
    Macro,
}

impl SchemaKind {
    /// Fields that must be present and non-null.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Trade => &[
                "date",
                "frequency",
                "reporter",
                "partner",
                "flow",
                "product_level",
                "product_code",
                "source_id",
                "retrieval_timestamp",
                "request_fingerprint",
            ],
            Self::Macro => &[
                "date",
                "country",
                "indicator_code",
                "source_id",
                "retrieval_timestamp",
                "request_fingerprint",
            ],
        }
    }

    /// The field whose value may be null (but whose key must still be recognised).
    pub fn value_field(&self) -> &'static str {
        match self {
            Self::Trade => "value_usd",
            Self::Macro => "value",
        }
    }

    /// Fields holding ISO 3166 alpha-3 country codes.
    pub fn country_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Trade => &["reporter", "partner"],
            Self::Macro => &["country"],
        }
    }
}

/// A record that passed validation and was converted to its typed schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum CanonicalRecord {
    Trade(TradeFact),
    Macro(MacroFact),
}

impl CanonicalRecord {
    pub fn as_trade(&self) -> Option<&TradeFact> {
        match self {
            Self::Trade(fact) => Some(fact),
            Self::Macro(_) => None,
        }
    }

    pub fn as_macro(&self) -> Option<&MacroFact> {
        match self {
            Self::Macro(fact) => Some(fact),
            Self::Trade(_) => None,
        }
    }
}

/// A rejected candidate kept for diagnostics, never for aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvalidRecord {
    pub schema: SchemaKind,
    pub fields: CandidateRecord,
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_field_is_not_required() {
        for kind in [SchemaKind::Trade, SchemaKind::Macro] {
            assert!(!kind.required_fields().contains(&kind.value_field()));
            assert!(kind.required_fields().contains(&"source_id"));
        }
    }

    #[test]
    fn country_fields_are_required() {
        for kind in [SchemaKind::Trade, SchemaKind::Macro] {
            for field in kind.country_fields() {
                assert!(kind.required_fields().contains(field));
            }
        }
    }
}
