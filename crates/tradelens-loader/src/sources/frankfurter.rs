//! Frankfurter FX reference rates. Each (date, quote currency) pair becomes
//! one macro observation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tradelens_models::CandidateRecord;

use super::{
    number_field, object_list, set_number, set_text, text_field, ObservationList, ResponseShape,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrankfurterQuery {
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    /// A single historical date. Ignored when `start` is set.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    /// Open-ended range when absent.
    #[serde(default)]
    pub end: Option<String>,
}

fn default_base() -> String {
    "EUR".to_string()
}

impl FrankfurterQuery {
    pub fn latest(base: impl Into<String>, symbols: &[&str]) -> Self {
        Self {
            base: base.into(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            date: None,
            start: None,
            end: None,
        }
    }

    pub fn on(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn between(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self.end = Some(end.into());
        self
    }

    fn period(&self) -> String {
        match (&self.start, &self.date) {
            (Some(start), _) => format!("{start}..{}", self.end.as_deref().unwrap_or("")),
            (None, Some(date)) => date.clone(),
            (None, None) => "latest".to_string(),
        }
    }

    pub fn label(&self) -> String {
        format!(
            "frankfurter:{}/{}/{}",
            self.base,
            self.symbols.join(","),
            self.period()
        )
    }
}

/// `{base}/v1/latest?base=..&symbols=..`, `{base}/v1/{date}?..`, `{base}/v1/{start}..{end}?..`
pub fn query_url(base_url: &str, query: &FrankfurterQuery) -> String {
    let mut url = format!(
        "{}/v1/{}?base={}",
        base_url.trim_end_matches('/'),
        query.period(),
        query.base
    );
    if !query.symbols.is_empty() {
        url.push_str("&symbols=");
        url.push_str(&query.symbols.join(","));
    }
    url
}

pub fn detect_shape(payload: &Value) -> ObservationList {
    match payload {
        Value::Array(_) => ObservationList::new(
            ResponseShape::FlatList,
            object_list(payload).unwrap_or_default(),
        ),
        Value::Object(map) => {
            let Some(rates) = map.get("rates").and_then(Value::as_object) else {
                return ObservationList::unknown();
            };
            let base = map.get("base").cloned().unwrap_or(Value::Null);

            let by_date = rates.values().all(Value::is_object) && !rates.is_empty();
            if by_date {
                let observations = rates
                    .iter()
                    .filter_map(|(date, quotes)| quotes.as_object().map(|q| (date, q)))
                    .flat_map(|(date, quotes)| {
                        quotes
                            .iter()
                            .map(|(symbol, rate)| observation(date, &base, symbol, rate))
                            .collect::<Vec<_>>()
                    })
                    .collect();
                return ObservationList::new(ResponseShape::NestedTree, observations);
            }

            let date = map
                .get("date")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let observations = rates
                .iter()
                .map(|(symbol, rate)| observation(&date, &base, symbol, rate))
                .collect();
            ObservationList::new(ResponseShape::Wrapped, observations)
        }
        _ => ObservationList::unknown(),
    }
}

fn observation(date: &str, base: &Value, symbol: &str, rate: &Value) -> Map<String, Value> {
    let mut obs = Map::new();
    obs.insert("date".to_string(), Value::String(date.to_string()));
    obs.insert("base".to_string(), base.clone());
    obs.insert("symbol".to_string(), Value::String(symbol.to_string()));
    obs.insert("rate".to_string(), rate.clone());
    obs
}

/// `country` carries the quote currency, `unit` the base currency.
pub fn candidate(observation: &Map<String, Value>, query: &FrankfurterQuery) -> CandidateRecord {
    let base = text_field(observation, &["base"]).unwrap_or_else(|| query.base.clone());
    let symbol = text_field(observation, &["symbol", "quote"]);

    let mut record = CandidateRecord::new();
    set_text(&mut record, "date", text_field(observation, &["date"]));
    set_text(&mut record, "country", symbol.clone());
    set_text(
        &mut record,
        "indicator_code",
        symbol.as_ref().map(|s| format!("FX.{base}.{s}")),
    );
    set_text(
        &mut record,
        "indicator_name",
        symbol.as_ref().map(|s| format!("{base}/{s} reference rate")),
    );
    set_number(&mut record, "value", number_field(observation, &["rate", "value"]));
    set_text(&mut record, "unit", Some(base));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://api.frankfurter.dev";

    #[test]
    fn urls_are_byte_exact() {
        let latest = FrankfurterQuery::latest("USD", &["INR", "CNY"]);
        assert_eq!(
            query_url(BASE, &latest),
            "https://api.frankfurter.dev/v1/latest?base=USD&symbols=INR,CNY"
        );
        assert_eq!(
            query_url(BASE, &latest.clone().on("2024-01-05")),
            "https://api.frankfurter.dev/v1/2024-01-05?base=USD&symbols=INR,CNY"
        );
        assert_eq!(
            query_url(BASE, &latest.between("2024-01-01", "2024-01-31")),
            "https://api.frankfurter.dev/v1/2024-01-01..2024-01-31?base=USD&symbols=INR,CNY"
        );
        assert_eq!(
            query_url(BASE, &FrankfurterQuery::latest("EUR", &[])),
            "https://api.frankfurter.dev/v1/latest?base=EUR"
        );
    }

    #[test]
    fn single_date_is_wrapped() {
        let list = detect_shape(&json!({
            "amount": 1.0, "base": "USD", "date": "2024-01-05",
            "rates": {"CNY": 7.16, "INR": 83.2}
        }));
        assert_eq!(list.shape, ResponseShape::Wrapped);
        assert_eq!(list.len(), 2);
        assert_eq!(list.observations[1]["symbol"], "INR");
        assert_eq!(list.observations[1]["date"], "2024-01-05");
    }

    #[test]
    fn range_is_nested() {
        let list = detect_shape(&json!({
            "amount": 1.0, "base": "USD", "start_date": "2024-01-02", "end_date": "2024-01-03",
            "rates": {
                "2024-01-02": {"INR": 83.3},
                "2024-01-03": {"INR": 83.2, "CNY": 7.15}
            }
        }));
        assert_eq!(list.shape, ResponseShape::NestedTree);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn flat_list_and_unknown() {
        let flat = detect_shape(&json!([{"date": "2024-01-02", "base": "USD", "quote": "INR", "rate": 83.3}]));
        assert_eq!(flat.shape, ResponseShape::FlatList);
        assert_eq!(detect_shape(&json!({"message": "not found"})).shape, ResponseShape::Unknown);
    }

    #[test]
    fn candidate_builds_fx_indicator() {
        let obs = json!({"date": "2024-01-02", "base": "USD", "symbol": "INR", "rate": 83.3})
            .as_object()
            .cloned()
            .unwrap();
        let record = candidate(&obs, &FrankfurterQuery::latest("USD", &["INR"]));
        assert_eq!(record["country"], "INR");
        assert_eq!(record["indicator_code"], "FX.USD.INR");
        assert_eq!(record["unit"], "USD");
        assert_eq!(record["value"], 83.3);
    }
}
