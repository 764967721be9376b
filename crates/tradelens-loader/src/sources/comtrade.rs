//! UN Comtrade (optional). Requires a subscription key in practice; the
//! adapter only passes it through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tradelens_models::trade_fact::ProductLevel;
use tradelens_models::{CandidateRecord, Flow};

use super::{
    flatten_nested, frequency_label, number_field, object_list, set_number, set_text, text_field,
    ObservationList, ResponseShape,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComtradeQuery {
    /// M49 reporter code.
    pub reporter_code: String,
    #[serde(default = "default_partner_code")]
    pub partner_code: String,
    pub period: String,
    #[serde(default = "default_cmd_code")]
    pub cmd_code: String,
    #[serde(default = "default_flow_code")]
    pub flow_code: String,
    #[serde(default = "default_include_desc")]
    pub include_desc: bool,
}

fn default_partner_code() -> String {
    "0".to_string()
}
fn default_cmd_code() -> String {
    "TOTAL".to_string()
}
fn default_flow_code() -> String {
    "M,X".to_string()
}
fn default_include_desc() -> bool {
    true
}

impl ComtradeQuery {
    pub fn new(reporter_code: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            reporter_code: reporter_code.into(),
            partner_code: default_partner_code(),
            period: period.into(),
            cmd_code: default_cmd_code(),
            flow_code: default_flow_code(),
            include_desc: default_include_desc(),
        }
    }

    pub fn label(&self) -> String {
        format!(
            "comtrade:{}/{}/{}/{}/{}",
            self.reporter_code, self.partner_code, self.cmd_code, self.flow_code, self.period
        )
    }
}

/// `{base}/data/v1/get/C/A/HS?reporterCode=..&partnerCode=..&period=..&cmdCode=..&flowCode=..&includeDesc=..[&subscription-key=..]`
pub fn query_url(base_url: &str, query: &ComtradeQuery, api_key: Option<&str>) -> String {
    let mut url = format!(
        "{}/data/v1/get/C/A/HS?reporterCode={}&partnerCode={}&period={}&cmdCode={}&flowCode={}&includeDesc={}",
        base_url.trim_end_matches('/'),
        query.reporter_code,
        query.partner_code,
        query.period,
        query.cmd_code,
        query.flow_code,
        query.include_desc
    );
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        url.push_str("&subscription-key=");
        url.push_str(&urlencoding::encode(key));
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
            if let Some(tree) = ["dataset", "datasets"].iter().find_map(|key| map.get(*key)) {
                return ObservationList::new(ResponseShape::NestedTree, flatten_nested(tree));
            }
            match map.get("data").and_then(object_list) {
                Some(rows) => ObservationList::new(ResponseShape::Wrapped, rows),
                None if map.contains_key("primaryValue") => {
                    ObservationList::new(ResponseShape::Wrapped, vec![map.clone()])
                }
                None => ObservationList::unknown(),
            }
        }
        _ => ObservationList::unknown(),
    }
}

pub fn candidate(row: &Map<String, Value>, _query: &ComtradeQuery) -> CandidateRecord {
    let mut record = CandidateRecord::new();
    set_text(&mut record, "date", text_field(row, &["period", "refYear"]));
    record.insert(
        "frequency".to_string(),
        Value::String(
            text_field(row, &["freqCode"])
                .map(|f| frequency_label(&f))
                .unwrap_or_else(|| "ANNUAL".to_string()),
        ),
    );
    set_text(&mut record, "reporter", text_field(row, &["reporterISO"]));
    set_text(&mut record, "partner", text_field(row, &["partnerISO"]));
    set_text(
        &mut record,
        "flow",
        text_field(row, &["flowCode", "flowDesc"]).map(|raw| match Flow::from_provider_code(&raw)
        {
            Some(flow) => flow.as_str().to_string(),
            None => raw,
        }),
    );
    let product = text_field(row, &["cmdCode"]);
    set_text(
        &mut record,
        "product_level",
        product
            .as_deref()
            .map(|code| ProductLevel::infer(code).as_str().to_string()),
    );
    set_text(&mut record, "product_code", product);
    set_text(&mut record, "product_name", text_field(row, &["cmdDesc"]));
    set_number(
        &mut record,
        "value_usd",
        number_field(row, &["primaryValue", "TradeValue"]),
    );
    record
}
