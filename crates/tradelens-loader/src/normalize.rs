use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tradelens_models::CandidateRecord;

use crate::executor::Payload;
use crate::planner::DimensionQuery;
use crate::sources::comtrade::{self, ComtradeQuery};
use crate::sources::frankfurter::{self, FrankfurterQuery};
use crate::sources::wits;
use crate::sources::world_bank::{self, WorldBankQuery};
use crate::sources::{Provider, ResponseShape};

/// The request a payload answered. Supplies dimensions the payload leaves implicit.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceContext {
    Wits(DimensionQuery),
    WorldBank(WorldBankQuery),
    Frankfurter(FrankfurterQuery),
    Comtrade(ComtradeQuery),
}

/// Provenance stamped onto every candidate produced from one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub context: SourceContext,
    /// Usually the request URL.
    pub request_fingerprint: String,
    pub retrieved_at: DateTime<Utc>,
}

impl SourceDescriptor {
    pub fn new(context: SourceContext, request_fingerprint: impl Into<String>) -> Self {
        Self {
            context,
            request_fingerprint: request_fingerprint.into(),
            retrieved_at: Utc::now(),
        }
    }

    pub fn with_retrieved_at(mut self, at: DateTime<Utc>) -> Self {
        self.retrieved_at = at;
        self
    }

    pub fn provider(&self) -> Provider {
        match self.context {
            SourceContext::Wits(_) => Provider::Wits,
            SourceContext::WorldBank(_) => Provider::WorldBank,
            SourceContext::Frankfurter(_) => Provider::Frankfurter,
            SourceContext::Comtrade(_) => Provider::Comtrade,
        }
    }
}

/// Convert a provider payload into candidate records keyed by canonical field
/// names. Unknown layouts and non-JSON text yield an empty list.
pub fn normalize(payload: &Payload, source: &SourceDescriptor) -> Vec<CandidateRecord> {
    let parsed;
    let value = match payload {
        Payload::Json(value) => value,
        Payload::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(_) => {
                tracing::warn!(
                    fingerprint = %source.request_fingerprint,
                    "Non-JSON payload; nothing to normalize"
                );
                return Vec::new();
            }
        },
    };

    let provider = source.provider();
    let list = provider.detect_shape(value);
    if list.shape == ResponseShape::Unknown {
        tracing::warn!(
            provider = %provider,
            fingerprint = %source.request_fingerprint,
            "Unrecognised response shape"
        );
        return Vec::new();
    }

    let timestamp = source
        .retrieved_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    list.observations
        .iter()
        .filter_map(|observation| match &source.context {
            SourceContext::Wits(query) => Some(wits::candidate(observation, query)),
            SourceContext::WorldBank(query) => world_bank::candidate(observation, query),
            SourceContext::Frankfurter(query) => Some(frankfurter::candidate(observation, query)),
            SourceContext::Comtrade(query) => Some(comtrade::candidate(observation, query)),
        })
        .map(|mut record| {
            record.insert(
                "source_id".to_string(),
                Value::String(provider.source_id().to_string()),
            );
            record.insert(
                "retrieval_timestamp".to_string(),
                Value::String(timestamp.clone()),
            );
            record.insert(
                "request_fingerprint".to_string(),
                Value::String(source.request_fingerprint.clone()),
            );
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamps_provenance() {
        let source = SourceDescriptor::new(
            SourceContext::WorldBank(WorldBankQuery::new("IND", "NY.GDP.MKTP.CD")),
            "https://api.test/wb?page=1",
        );
        let payload = Payload::Json(json!([
            {"page": 1, "pages": 1},
            [
                {"countryiso3code": "IND", "date": "2020", "value": 2.67e12,
                 "indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP"}},
                {"countryiso3code": "IND", "date": "2019", "value": null,
                 "indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP"}}
            ]
        ]));
        let records = normalize(&payload, &source);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["source_id"], "world_bank");
        assert_eq!(records[0]["request_fingerprint"], "https://api.test/wb?page=1");
        assert!(records[0]["retrieval_timestamp"]
            .as_str()
            .unwrap()
            .ends_with('Z'));
    }

    #[test]
    fn text_payload_is_parsed_when_possible() {
        let source = SourceDescriptor::new(
            SourceContext::Frankfurter(FrankfurterQuery::latest("USD", &["INR"])),
            "fx",
        );
        let payload = Payload::Text(r#"{"base":"USD","date":"2024-01-05","rates":{"INR":83.2}}"#.to_string());
        assert_eq!(normalize(&payload, &source).len(), 1);

        let garbage = Payload::Text("<html>rate limited</html>".to_string());
        assert!(normalize(&garbage, &source).is_empty());
    }

    #[test]
    fn unknown_shape_is_empty() {
        let source = SourceDescriptor::new(SourceContext::Wits(DimensionQuery::new()), "w");
        let payload = Payload::Json(json!({"message": "maintenance"}));
        assert!(normalize(&payload, &source).is_empty());
    }

    #[test]
    fn wits_keeps_null_values() {
        let query = DimensionQuery::new()
            .with("reporter", "IND")
            .with("partner", "CHN")
            .with("indicator", "XPRT-TRD-VL");
        let source = SourceDescriptor::new(SourceContext::Wits(query), "w");
        let payload = Payload::Json(json!([
            {"year": "2020", "product": "Total", "value": null},
            {"year": "2021", "product": "Total", "value": 5.0}
        ]));
        let records = normalize(&payload, &source);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["value_usd"], Value::Null);
        assert_eq!(records[1]["flow"], "EXPORT");
    }
}
