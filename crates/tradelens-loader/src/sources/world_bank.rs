//! World Bank indicators API (v2).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tradelens_models::{CandidateRecord, ClassifiedError};

use super::{
    flatten_nested, number_field, object_list, set_number, set_text, text_field, FetchedPayload,
    ObservationList, ResponseShape,
};
use crate::config::{ttl, WorldBankSourceConfig};
use crate::executor::{CacheMode, RequestDescriptor, RequestExecutor};

/// Runaway guard for a `pages` value that never converges.
const MAX_PAGES: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldBankQuery {
    /// ISO3 code, `;`-joined codes, or `all`.
    pub country: String,
    pub indicator: String,
    /// `YYYY` or `YYYY:YYYY`.
    #[serde(default)]
    pub date: Option<String>,
}

impl WorldBankQuery {
    pub fn new(country: impl Into<String>, indicator: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            indicator: indicator.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn label(&self) -> String {
        match &self.date {
            Some(date) => format!("world_bank:{}/{}/{}", self.country, self.indicator, date),
            None => format!("world_bank:{}/{}", self.country, self.indicator),
        }
    }
}

/// `{base}/country/{code}/indicator/{ind}?format=json&per_page={n}&page={p}[&date={range}]`
pub fn query_url(base: &str, query: &WorldBankQuery, per_page: u32, page: u32) -> String {
    let mut url = format!(
        "{}/country/{}/indicator/{}?format=json&per_page={}&page={}",
        base.trim_end_matches('/'),
        query.country,
        query.indicator,
        per_page,
        page
    );
    if let Some(date) = &query.date {
        url.push_str("&date=");
        url.push_str(date);
    }
    url
}

/// `pages` from the metadata half of a `[metadata, data]` response.
pub fn page_count(payload: &Value) -> Option<u32> {
    let meta = payload.as_array()?.first()?.as_object()?;
    number_field(meta, &["pages"]).map(|pages| pages.max(0.0) as u32)
}

fn is_metadata(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| m.contains_key("pages") || m.contains_key("page"))
}

pub fn detect_shape(payload: &Value) -> ObservationList {
    match payload {
        Value::Array(items) => match items.as_slice() {
            [meta, data] if is_metadata(meta) => ObservationList::new(
                ResponseShape::Wrapped,
                object_list(data).unwrap_or_default(),
            ),
            // Error envelope: `[{"message": [...]}]`.
            [only] if only.get("message").is_some() => ObservationList::unknown(),
            _ => ObservationList::new(
                ResponseShape::FlatList,
                object_list(payload).unwrap_or_default(),
            ),
        },
        Value::Object(map) => {
            if let Some(tree) = ["source", "dataset"].iter().find_map(|key| map.get(*key)) {
                return ObservationList::new(ResponseShape::NestedTree, flatten_nested(tree));
            }
            if let Some(list) = map.get("data").and_then(object_list) {
                return ObservationList::new(ResponseShape::Wrapped, list);
            }
            if map.contains_key("value") && map.contains_key("date") {
                return ObservationList::new(ResponseShape::Wrapped, vec![map.clone()]);
            }
            ObservationList::unknown()
        }
        _ => ObservationList::unknown(),
    }
}

/// Fetch every page of an indicator. Each page is a separate cached request.
pub async fn fetch_world_bank_indicator(
    executor: &RequestExecutor,
    source: &WorldBankSourceConfig,
    query: &WorldBankQuery,
    cache_mode: CacheMode,
) -> Result<Vec<FetchedPayload>, ClassifiedError> {
    let mut pages = Vec::new();
    let mut page = 1;
    loop {
        let url = query_url(&source.base_url, query, source.per_page, page);
        let mut descriptor = RequestDescriptor::json(url.clone()).with_cache_mode(cache_mode);
        descriptor.cache_ttl = ttl(source.ttl_seconds);

        let payload = executor.execute(&descriptor).await?;
        let total = payload
            .as_json()
            .and_then(page_count)
            .unwrap_or(1)
            .min(MAX_PAGES);
        pages.push(FetchedPayload { url, payload });

        if page >= total {
            break;
        }
        page += 1;
    }
    tracing::debug!(label = %query.label(), pages = pages.len(), "World Bank pages fetched");
    Ok(pages)
}

/// Map one row to canonical macro fields. Rows without a value are dropped:
/// the API reports unpublished years as null rows.
pub fn candidate(row: &Map<String, Value>, query: &WorldBankQuery) -> Option<CandidateRecord> {
    let value = number_field(row, &["value"])?;

    let nested = |key: &str, inner: &str| {
        row.get(key)
            .and_then(Value::as_object)
            .and_then(|m| text_field(m, &[inner]))
    };
    let country = text_field(row, &["countryiso3code", "country_code"])
        .or_else(|| (query.country.len() == 3).then(|| query.country.to_ascii_uppercase()));
    let indicator_code = nested("indicator", "id")
        .or_else(|| text_field(row, &["indicator"]))
        .or_else(|| Some(query.indicator.clone()));

    let mut record = CandidateRecord::new();
    set_text(&mut record, "date", text_field(row, &["date"]));
    set_text(&mut record, "country", country);
    set_text(&mut record, "indicator_code", indicator_code);
    set_text(&mut record, "indicator_name", nested("indicator", "value"));
    set_number(&mut record, "value", Some(value));
    set_text(&mut record, "unit", text_field(row, &["unit"]));
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gdp() -> WorldBankQuery {
        WorldBankQuery::new("IND", "NY.GDP.MKTP.CD").with_date("2000:2024")
    }

    #[test]
    fn url_is_byte_exact() {
        assert_eq!(
            query_url("https://api.worldbank.org/v2", &gdp(), 50, 2),
            "https://api.worldbank.org/v2/country/IND/indicator/NY.GDP.MKTP.CD?format=json&per_page=50&page=2&date=2000:2024"
        );
        assert_eq!(
            query_url(
                "https://api.worldbank.org/v2/",
                &WorldBankQuery::new("CHN", "SP.POP.TOTL"),
                1000,
                1
            ),
            "https://api.worldbank.org/v2/country/CHN/indicator/SP.POP.TOTL?format=json&per_page=1000&page=1"
        );
    }

    #[test]
    fn metadata_envelope() {
        let payload = json!([
            {"page": 1, "pages": 2, "per_page": 15, "total": 25},
            [
                {"countryiso3code": "IND", "date": "2024", "value": null,
                 "indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"}},
                {"countryiso3code": "IND", "date": "2023", "value": 3.5e12,
                 "indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"}}
            ]
        ]);
        assert_eq!(page_count(&payload), Some(2));
        let list = detect_shape(&payload);
        assert_eq!(list.shape, ResponseShape::Wrapped);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn empty_data_half_is_empty_not_unknown() {
        let list = detect_shape(&json!([{"page": 0, "pages": 0}, null]));
        assert_eq!(list.shape, ResponseShape::Wrapped);
        assert!(list.is_empty());
    }

    #[test]
    fn error_envelope_is_unknown() {
        let list = detect_shape(&json!([{"message": [{"id": "120", "value": "Invalid value"}]}]));
        assert_eq!(list.shape, ResponseShape::Unknown);
    }

    #[test]
    fn flat_and_nested_shapes() {
        let flat = detect_shape(&json!([{"date": "2020", "value": 1.0}]));
        assert_eq!(flat.shape, ResponseShape::FlatList);

        let nested = detect_shape(&json!({
            "source": [{"id": "2", "data": [{"date": "2020", "value": 1.0}, {"date": "2021", "value": 2.0}]}]
        }));
        assert_eq!(nested.shape, ResponseShape::NestedTree);
        assert_eq!(nested.len(), 2);
        assert_eq!(nested.observations[0]["id"], "2");
    }

    #[test]
    fn candidate_drops_null_rows() {
        let row = json!({"countryiso3code": "IND", "date": "2024", "value": null})
            .as_object()
            .cloned()
            .unwrap();
        assert!(candidate(&row, &gdp()).is_none());
    }

    #[test]
    fn candidate_maps_nested_indicator() {
        let row = json!({
            "countryiso3code": "",
            "country": {"id": "IN", "value": "India"},
            "indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
            "date": "2023", "value": 3.5e12, "unit": ""
        })
        .as_object()
        .cloned()
        .unwrap();
        let record = candidate(&row, &gdp()).unwrap();
        assert_eq!(record["country"], "IND");
        assert_eq!(record["indicator_code"], "NY.GDP.MKTP.CD");
        assert_eq!(record["indicator_name"], "GDP (current US$)");
        assert_eq!(record["value"], 3.5e12);
        assert!(!record.contains_key("unit"));
    }
}
