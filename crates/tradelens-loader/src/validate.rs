use serde::Serialize;
use serde_json::Value;
use tradelens_models::{
    CandidateRecord, CanonicalRecord, ClassifiedError, ErrorKind, Flow, Frequency, InvalidRecord,
    MacroFact, ProductLevel, SchemaKind, TradeFact,
};

/// Candidates partitioned by validity. Invalid ones are kept with reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: Vec<CanonicalRecord>,
    pub invalid: Vec<InvalidRecord>,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    /// `SchemaDrift` when anything was rejected. Ingestion itself carries on.
    pub fn drift_error(&self) -> Option<ClassifiedError> {
        if self.invalid.is_empty() {
            return None;
        }
        let first = self
            .invalid
            .first()
            .and_then(|r| r.reasons.first())
            .map(String::as_str)
            .unwrap_or("unknown reason");
        Some(ClassifiedError::new(
            ErrorKind::SchemaDrift,
            format!(
                "{} of {} records failed validation (first: {first})",
                self.invalid.len(),
                self.total()
            ),
        ))
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.valid.extend(other.valid);
        self.invalid.extend(other.invalid);
    }
}

pub fn validate(candidates: Vec<CandidateRecord>, kind: SchemaKind) -> ValidationReport {
    let mut report = ValidationReport::default();
    for fields in candidates {
        let mut reasons = check(&fields, kind);
        if reasons.is_empty() {
            match typed(&fields, kind) {
                Ok(record) => {
                    report.valid.push(record);
                    continue;
                }
                Err(e) => reasons.push(format!("does not match schema: {e}")),
            }
        }
        report.invalid.push(InvalidRecord {
            schema: kind,
            fields,
            reasons,
        });
    }
    if !report.invalid.is_empty() {
        tracing::debug!(
            valid = report.valid.len(),
            invalid = report.invalid.len(),
            "Validation rejected records"
        );
    }
    report
}

fn typed(fields: &CandidateRecord, kind: SchemaKind) -> Result<CanonicalRecord, serde_json::Error> {
    let value = Value::Object(fields.clone());
    Ok(match kind {
        SchemaKind::Trade => CanonicalRecord::Trade(serde_json::from_value::<TradeFact>(value)?),
        SchemaKind::Macro => CanonicalRecord::Macro(serde_json::from_value::<MacroFact>(value)?),
    })
}

fn check(fields: &CandidateRecord, kind: SchemaKind) -> Vec<String> {
    let mut reasons = Vec::new();

    for field in kind.required_fields() {
        match fields.get(*field) {
            None => reasons.push(format!("missing required field '{field}'")),
            Some(Value::Null) => reasons.push(format!("required field '{field}' is null")),
            Some(Value::String(s)) if s.trim().is_empty() => {
                reasons.push(format!("required field '{field}' is empty"))
            }
            Some(_) => {}
        }
    }

    let value_field = kind.value_field();
    if let Some(v) = fields.get(value_field) {
        if !(v.is_null() || v.is_number()) {
            reasons.push(format!("'{value_field}' must be a number or null"));
        }
    }

    for field in kind.country_fields() {
        if let Some(code) = fields.get(*field).and_then(Value::as_str) {
            if code.chars().count() != 3 {
                reasons.push(format!("'{field}' must be a 3-character code, got '{code}'"));
            }
        }
    }

    if kind == SchemaKind::Trade {
        enumerated(fields, "flow", &Flow::ALL, &mut reasons);
        enumerated(fields, "frequency", &Frequency::ALL, &mut reasons);
        enumerated(fields, "product_level", &ProductLevel::ALL, &mut reasons);
    }

    if let Some(ts) = fields.get("retrieval_timestamp").and_then(Value::as_str) {
        if chrono::DateTime::parse_from_rfc3339(ts).is_err() {
            reasons.push(format!("'retrieval_timestamp' is not RFC 3339: '{ts}'"));
        }
    }

    reasons
}

fn enumerated(fields: &CandidateRecord, field: &str, allowed: &[&str], reasons: &mut Vec<String>) {
    if let Some(value) = fields.get(field).and_then(Value::as_str) {
        if !allowed.contains(&value) {
            reasons.push(format!(
                "'{field}' value '{value}' is not one of {}",
                allowed.join(", ")
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trade() -> CandidateRecord {
        json!({
            "date": "2021",
            "frequency": "ANNUAL",
            "reporter": "IND",
            "partner": "CHN",
            "flow": "IMPORT",
            "product_level": "TOTAL",
            "product_code": "Total",
            "value_usd": 9.4e10,
            "source_id": "wits",
            "retrieval_timestamp": "2026-01-01T00:00:00.000Z",
            "request_fingerprint": "req"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn macro_row() -> CandidateRecord {
        json!({
            "date": "2021",
            "country": "IND",
            "indicator_code": "NY.GDP.MKTP.CD",
            "value": 3.1e12,
            "source_id": "world_bank",
            "retrieval_timestamp": "2026-01-01T00:00:00Z",
            "request_fingerprint": "req"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn complete_record_is_valid() {
        let report = validate(vec![trade(), macro_row()], SchemaKind::Trade);
        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.invalid.len(), 1);
        let fact = report.valid[0].as_trade().unwrap();
        assert_eq!(fact.flow, Flow::Import);
        assert_eq!(fact.value_usd, Some(9.4e10));
    }

    #[test]
    fn missing_value_is_valid() {
        let mut record = trade();
        record.remove("value_usd");
        let mut macro_record = macro_row();
        macro_record.remove("value");

        let trade_report = validate(vec![record], SchemaKind::Trade);
        assert_eq!(trade_report.valid.len(), 1);
        assert_eq!(trade_report.valid[0].as_trade().unwrap().value_usd, None);

        let macro_report = validate(vec![macro_record], SchemaKind::Macro);
        assert_eq!(macro_report.valid.len(), 1);
        assert!(macro_report.drift_error().is_none());
    }

    #[test]
    fn missing_source_id_names_the_field() {
        let mut record = macro_row();
        record.remove("source_id");
        let report = validate(vec![record], SchemaKind::Macro);
        assert!(report.valid.is_empty());
        assert!(report.invalid[0]
            .reasons
            .iter()
            .any(|r| r.contains("source_id")));

        let drift = report.drift_error().unwrap();
        assert_eq!(drift.kind, ErrorKind::SchemaDrift);
        assert!(drift.recoverable());
        assert!(!drift.retryable());
    }

    #[test]
    fn enumerations_and_country_length() {
        let mut record = trade();
        record.insert("flow".to_string(), json!("RE-EXPORT"));
        record.insert("partner".to_string(), json!("CN"));
        let report = validate(vec![record], SchemaKind::Trade);
        let reasons = &report.invalid[0].reasons;
        assert!(reasons.iter().any(|r| r.contains("'flow'")));
        assert!(reasons.iter().any(|r| r.contains("'partner'")));
    }

    #[test]
    fn special_partner_code_is_three_characters() {
        let mut record = trade();
        record.insert(
            "partner".to_string(),
            json!(tradelens_models::trade_fact::PARTNER_NOT_APPLICABLE),
        );
        assert_eq!(validate(vec![record], SchemaKind::Trade).valid.len(), 1);
    }

    #[test]
    fn non_numeric_value_is_invalid() {
        let mut record = macro_row();
        record.insert("value".to_string(), json!("n/a"));
        let report = validate(vec![record], SchemaKind::Macro);
        assert_eq!(report.invalid.len(), 1);
        assert!(report.invalid[0].reasons[0].contains("'value'"));
    }

    #[test]
    fn every_reported_fact_has_valid_codes() {
        let report = validate(vec![trade(), trade()], SchemaKind::Trade);
        for record in &report.valid {
            let fact = record.as_trade().unwrap();
            assert_eq!(fact.reporter.len(), 3);
            assert_eq!(fact.partner.len(), 3);
        }
    }
}
