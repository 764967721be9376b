//! Provider adapters: URL construction and response-shape detection.
//!
//! Each provider answers in several layouts. [`Provider::detect_shape`] turns
//! any of them into a flat [`ObservationList`] before field mapping; an
//! unrecognised layout yields an empty list tagged [`ResponseShape::Unknown`].

pub mod comtrade;
pub mod frankfurter;
pub mod wits;
pub mod world_bank;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tradelens_models::SchemaKind;

use crate::executor::Payload;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Wits,
    WorldBank,
    Frankfurter,
    Comtrade,
}

impl Provider {
    /// Value written to `source_id` on every record from this provider.
    pub fn source_id(&self) -> &'static str {
        match self {
            Self::Wits => "wits",
            Self::WorldBank => "world_bank",
            Self::Frankfurter => "frankfurter",
            Self::Comtrade => "comtrade",
        }
    }

    /// Human-facing name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Wits => "WITS",
            Self::WorldBank => "World Bank",
            Self::Frankfurter => "Frankfurter",
            Self::Comtrade => "UN Comtrade",
        }
    }

    pub fn schema(&self) -> SchemaKind {
        match self {
            Self::Wits | Self::Comtrade => SchemaKind::Trade,
            Self::WorldBank | Self::Frankfurter => SchemaKind::Macro,
        }
    }

    pub fn detect_shape(&self, payload: &Value) -> ObservationList {
        match self {
            Self::Wits => wits::detect_shape(payload),
            Self::WorldBank => world_bank::detect_shape(payload),
            Self::Frankfurter => frankfurter::detect_shape(payload),
            Self::Comtrade => comtrade::detect_shape(payload),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.source_id())
    }
}

/// Layout a payload was recognised as.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// A top-level array of observation objects.
    FlatList,
    /// dataset → series → observations.
    NestedTree,
    /// A single envelope object around the observations.
    Wrapped,
    Unknown,
}

/// Uniform observation-like maps extracted from a provider payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationList {
    pub shape: ResponseShape,
    pub observations: Vec<Map<String, Value>>,
}

impl ObservationList {
    pub fn new(shape: ResponseShape, observations: Vec<Map<String, Value>>) -> Self {
        Self {
            shape,
            observations,
        }
    }

    pub fn unknown() -> Self {
        Self::new(ResponseShape::Unknown, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// A payload and the URL that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPayload {
    pub url: String,
    pub payload: Payload,
}

/// Array elements that are objects. `None` if `value` is not an array.
pub(crate) fn object_list(value: &Value) -> Option<Vec<Map<String, Value>>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect()
    })
}

/// Walk a dataset → series → observations tree. Children live under
/// `series`, `data` or `observations`; scalar fields of every ancestor are
/// inherited by the leaves.
pub(crate) fn flatten_nested(root: &Value) -> Vec<Map<String, Value>> {
    let mut out = Vec::new();
    flatten_into(root, &Map::new(), &mut out);
    out
}

fn flatten_into(node: &Value, inherited: &Map<String, Value>, out: &mut Vec<Map<String, Value>>) {
    match node {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, inherited, out);
            }
        }
        Value::Object(map) => {
            let mut scope = inherited.clone();
            scope.extend(
                map.iter()
                    .filter(|(_, v)| !v.is_array() && !v.is_object())
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            let children = ["series", "data", "observations"]
                .iter()
                .find_map(|key| map.get(*key).filter(|v| v.is_array() || v.is_object()));
            match children {
                Some(children) => flatten_into(children, &scope, out),
                None => out.push(scope),
            }
        }
        _ => {}
    }
}

/// First present, non-empty field among `keys`, rendered as a string.
pub(crate) fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First present field among `keys` that holds a number or a numeric string.
pub(crate) fn number_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Canonical frequency label for the provider spellings seen in the wild.
pub(crate) fn frequency_label(raw: &str) -> String {
    match raw.trim().to_ascii_uppercase().as_str() {
        "A" | "ANNUAL" | "YEARLY" => "ANNUAL".to_string(),
        "M" | "MONTHLY" => "MONTHLY".to_string(),
        other => other.to_string(),
    }
}

/// Insert `value` under `field` when present. Absent stays absent.
pub(crate) fn set_text(record: &mut Map<String, Value>, field: &str, value: Option<String>) {
    if let Some(value) = value {
        record.insert(field.to_string(), Value::String(value));
    }
}

/// Insert a nullable number. Missing or unparseable values become null, never zero.
pub(crate) fn set_number(record: &mut Map<String, Value>, field: &str, value: Option<f64>) {
    let value = value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null);
    record.insert(field.to_string(), value);
}
