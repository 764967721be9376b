//! WITS (World Integrated Trade Solution) bilateral trade statistics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tradelens_models::trade_fact::ProductLevel;
use tradelens_models::{CandidateRecord, Flow};

use super::{
    frequency_label, number_field, object_list, set_number, set_text, text_field, ObservationList,
    ResponseShape,
};
use crate::planner::{DimensionQuery, YearRange, WILDCARD};

const REPORTER_KEYS: &[&str] = &["reporter", "ReporterISO3", "reporteriso3", "REPORTER"];
const PARTNER_KEYS: &[&str] = &["partner", "PartnerISO3", "partneriso3", "PARTNER"];
const DATE_KEYS: &[&str] = &["date", "year", "Year", "TIME_PERIOD", "period"];
const PRODUCT_KEYS: &[&str] = &["product", "ProductCode", "productcode", "PRODUCTCODE"];
const PRODUCT_NAME_KEYS: &[&str] = &[
    "product_name",
    "ProductDescription",
    "productdescription",
    "PRODUCTCODE_NAME",
];
const FLOW_KEYS: &[&str] = &["flow", "TradeFlow", "tradeflow"];
const INDICATOR_KEYS: &[&str] = &["indicator", "IndicatorCode", "INDICATOR"];
const FREQUENCY_KEYS: &[&str] = &["frequency", "freq", "FREQ"];
const VALUE_KEYS: &[&str] = &["value_usd", "value", "Value", "TradeValue", "OBS_VALUE"];

/// A WITS query. Every dimension defaults to the wildcard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WitsQuery {
    #[serde(default = "wildcard")]
    pub reporter: String,
    #[serde(default = "wildcard")]
    pub year: String,
    #[serde(default = "wildcard")]
    pub partner: String,
    #[serde(default = "wildcard")]
    pub product: String,
    #[serde(default = "wildcard")]
    pub indicator: String,
    /// Years enumerated if the query has to be split by year.
    #[serde(default)]
    pub year_range: Option<YearRange>,
}

impl Default for WitsQuery {
    fn default() -> Self {
        Self {
            reporter: wildcard(),
            year: wildcard(),
            partner: wildcard(),
            product: wildcard(),
            indicator: wildcard(),
            year_range: None,
        }
    }
}

impl WitsQuery {
    pub fn label(&self) -> String {
        format!(
            "wits:{}/{}/{}/{}/{}",
            self.reporter, self.partner, self.product, self.indicator, self.year
        )
    }

    pub fn dimensions(&self) -> DimensionQuery {
        DimensionQuery::new()
            .with("reporter", self.reporter.as_str())
            .with("year", self.year.as_str())
            .with("partner", self.partner.as_str())
            .with("product", self.product.as_str())
            .with("indicator", self.indicator.as_str())
    }
}

fn wildcard() -> String {
    WILDCARD.to_string()
}

/// `{base}/datasource/{ds}/reporter/{r}/year/{y}/partner/{p}/product/{pr}/indicator/{i}?format=JSON`
pub fn query_url(base: &str, datasource: &str, query: &DimensionQuery) -> String {
    format!(
        "{}/datasource/{}/reporter/{}/year/{}/partner/{}/product/{}/indicator/{}?format=JSON",
        base.trim_end_matches('/'),
        datasource,
        query.get("reporter"),
        query.get("year"),
        query.get("partner"),
        query.get("product"),
        query.get("indicator"),
    )
}

pub fn detect_shape(payload: &Value) -> ObservationList {
    match payload {
        Value::Array(_) => ObservationList::new(
            ResponseShape::FlatList,
            object_list(payload).unwrap_or_default(),
        ),
        Value::Object(map) => {
            let datasets = ["dataSets", "dataset", "datasets"]
                .iter()
                .find_map(|key| map.get(*key));
            if let Some(datasets) = datasets {
                let structure = map.get("structure").or_else(|| {
                    map.get("data").and_then(|data| data.get("structure"))
                });
                return ObservationList::new(
                    ResponseShape::NestedTree,
                    nested_observations(datasets, structure),
                );
            }
            if let Some(list) = ["data", "records", "observations"]
                .iter()
                .find_map(|key| map.get(*key).and_then(object_list))
            {
                return ObservationList::new(ResponseShape::Wrapped, list);
            }
            if VALUE_KEYS.iter().any(|key| map.contains_key(*key)) {
                return ObservationList::new(ResponseShape::Wrapped, vec![map.clone()]);
            }
            ObservationList::unknown()
        }
        _ => ObservationList::unknown(),
    }
}

/// dataset → series → observations, with series-level fields inherited by
/// each observation. SDMX-JSON positional keys (`"0:1:0"`) are decoded
/// through `structure.dimensions` when it is present.
fn nested_observations(datasets: &Value, structure: Option<&Value>) -> Vec<Map<String, Value>> {
    let datasets: Vec<&Value> = match datasets {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let series_dims = structure.and_then(|s| s.pointer("/dimensions/series"));
    let observation_dims = structure.and_then(|s| s.pointer("/dimensions/observation"));

    let mut out = Vec::new();
    for dataset in datasets {
        let series: Vec<(Option<&str>, &Map<String, Value>)> = match dataset.get("series") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|s| s.as_object().map(|m| (None, m)))
                .collect(),
            Some(Value::Object(keyed)) => keyed
                .iter()
                .filter_map(|(k, s)| s.as_object().map(|m| (Some(k.as_str()), m)))
                .collect(),
            _ => Vec::new(),
        };

        for (series_key, series) in series {
            let mut base: Map<String, Value> = series
                .iter()
                .filter(|(k, v)| {
                    k.as_str() != "observations" && k.as_str() != "attributes" && !v.is_object()
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if let (Some(key), Some(dims)) = (series_key, series_dims) {
                decode_positional_key(key, dims, &mut base);
            }

            match series.get("observations") {
                Some(Value::Array(items)) => {
                    for obs in items.iter().filter_map(Value::as_object) {
                        let mut merged = base.clone();
                        merged.extend(obs.iter().map(|(k, v)| (k.clone(), v.clone())));
                        out.push(merged);
                    }
                }
                Some(Value::Object(keyed)) => {
                    for (obs_key, obs) in keyed {
                        let mut merged = base.clone();
                        match obs {
                            Value::Object(fields) => {
                                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())))
                            }
                            Value::Array(values) => {
                                merged.insert(
                                    "OBS_VALUE".to_string(),
                                    values.first().cloned().unwrap_or(Value::Null),
                                );
                            }
                            scalar => {
                                merged.insert("OBS_VALUE".to_string(), scalar.clone());
                            }
                        }
                        if let Some(dims) = observation_dims {
                            decode_positional_key(obs_key, dims, &mut merged);
                        }
                        out.push(merged);
                    }
                }
                _ => {}
            }
        }
    }
    out
}

fn decode_positional_key(key: &str, dimensions: &Value, into: &mut Map<String, Value>) {
    let Some(dimensions) = dimensions.as_array() else {
        return;
    };
    for (position, index) in key.split(':').enumerate() {
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        let Some(dimension) = dimensions.get(position) else {
            continue;
        };
        let Some(id) = dimension.get("id").and_then(Value::as_str) else {
            continue;
        };
        let Some(member) = dimension.pointer(&format!("/values/{index}")) else {
            continue;
        };
        if let Some(member_id) = member.get("id") {
            into.insert(id.to_string(), member_id.clone());
        }
        if let Some(name) = member.get("name") {
            into.insert(format!("{id}_NAME"), name.clone());
        }
    }
}

/// Map one observation to canonical trade fields. `query` fills dimensions
/// the payload leaves implicit.
pub fn candidate(observation: &Map<String, Value>, query: &DimensionQuery) -> CandidateRecord {
    let from_query = |dimension: &str| {
        let value = query.get(dimension);
        (!query.is_wildcard(dimension) && !value.contains(';')).then(|| value.to_string())
    };

    let mut record = CandidateRecord::new();
    set_text(
        &mut record,
        "date",
        text_field(observation, DATE_KEYS).or_else(|| from_query("year")),
    );
    record.insert(
        "frequency".to_string(),
        Value::String(
            text_field(observation, FREQUENCY_KEYS)
                .map(|f| frequency_label(&f))
                .unwrap_or_else(|| "ANNUAL".to_string()),
        ),
    );
    set_text(
        &mut record,
        "reporter",
        text_field(observation, REPORTER_KEYS).or_else(|| from_query("reporter")),
    );
    set_text(
        &mut record,
        "partner",
        text_field(observation, PARTNER_KEYS).or_else(|| from_query("partner")),
    );

    let flow_raw = text_field(observation, FLOW_KEYS)
        .or_else(|| text_field(observation, INDICATOR_KEYS))
        .or_else(|| from_query("indicator"));
    set_text(
        &mut record,
        "flow",
        flow_raw.map(|raw| match Flow::from_provider_code(&raw) {
            Some(flow) => flow.as_str().to_string(),
            None => raw,
        }),
    );

    let product = text_field(observation, PRODUCT_KEYS).or_else(|| from_query("product"));
    set_text(
        &mut record,
        "product_level",
        product
            .as_deref()
            .map(|code| ProductLevel::infer(code).as_str().to_string()),
    );
    set_text(&mut record, "product_code", product);
    set_text(
        &mut record,
        "product_name",
        text_field(observation, PRODUCT_NAME_KEYS),
    );
    set_number(&mut record, "value_usd", number_field(observation, VALUE_KEYS));
    record
}
