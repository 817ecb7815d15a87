//! Normalized alert representation and intake validation

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_SOURCE: &str = "unknown";
pub const DEFAULT_EVENT_TYPE: &str = "security_alert";

/// Fields an inbound alert must carry, checked in this order
const REQUIRED_FIELDS: [&str; 2] = ["severity", "message"];

/// A normalized security alert
///
/// Serializes as a single flat JSON object: the named fields plus every
/// extra field the sender supplied, which is also what webhooks receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    severity: String,
    message: String,
    source: String,
    event_type: String,
    /// RFC 3339 timestamp, either supplied or stamped at ingestion
    timestamp: String,
    /// Fields not interpreted by the pipeline, kept for templates
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl AlertRecord {
    pub fn severity(&self) -> &str {
        &self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Key identifying "similar" alerts for rate limiting
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            event_type: self.event_type.clone(),
            source: self.source.clone(),
            severity: self.severity.clone(),
        }
    }
}

/// Rate-limiting key: event type, source and severity
///
/// Kept as separate parts so that values containing the display separator
/// can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    event_type: String,
    source: String,
    severity: String,
}

impl Fingerprint {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            severity: severity.into(),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.event_type, self.source, self.severity)
    }
}

/// Build an [`AlertRecord`] from a raw JSON object.
///
/// `now` stamps alerts that arrive without a timestamp.
pub fn normalize(mut raw: Map<String, Value>, now: DateTime<Utc>) -> Result<AlertRecord, ValidationError> {
    for field in REQUIRED_FIELDS {
        match raw.get(field).map(|v| scalar_text(field, v)).transpose()? {
            Some(Some(text)) if !text.trim().is_empty() => {}
            _ => return Err(ValidationError::MissingField(field.to_string())),
        }
    }

    let severity = take_text(&mut raw, "severity")?.unwrap_or_default();
    let message = take_text(&mut raw, "message")?.unwrap_or_default();
    let source = take_text(&mut raw, "source")?.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    let event_type =
        take_text(&mut raw, "event_type")?.unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());
    let timestamp = take_text(&mut raw, "timestamp")?
        .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Micros, true));

    Ok(AlertRecord {
        severity,
        message,
        source,
        event_type,
        timestamp,
        extra: raw,
    })
}

fn take_text(raw: &mut Map<String, Value>, field: &str) -> Result<Option<String>, ValidationError> {
    match raw.remove(field) {
        Some(value) => scalar_text(field, &value),
        None => Ok(None),
    }
}

/// Render a scalar JSON value as text; `null` counts as absent
fn scalar_text(field: &str, value: &Value) -> Result<Option<String>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "expected a string".to_string(),
        }),
    }
}

/// Inbound alert validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_filled() {
        let alert = normalize(raw(json!({"severity": "high", "message": "x"})), fixed_now()).unwrap();

        assert_eq!(alert.source(), DEFAULT_SOURCE);
        assert_eq!(alert.event_type(), DEFAULT_EVENT_TYPE);
        assert_eq!(alert.timestamp(), "2024-05-01T12:00:00.000000Z");
        assert!(alert.extra().is_empty());
    }

    #[test]
    fn test_missing_severity_reported_first() {
        let err = normalize(raw(json!({"source": "ids1"})), fixed_now()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("severity".to_string()));

        let err = normalize(raw(json!({"severity": "low"})), fixed_now()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("message".to_string()));
    }

    #[test]
    fn test_empty_and_null_required_fields_rejected() {
        let err = normalize(raw(json!({"severity": "  ", "message": "x"})), fixed_now()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("severity".to_string()));

        let err = normalize(raw(json!({"severity": "high", "message": null})), fixed_now()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("message".to_string()));
    }

    #[test]
    fn test_structured_required_field_is_invalid() {
        let err = normalize(raw(json!({"severity": ["high"], "message": "x"})), fixed_now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "severity"));
    }

    #[test]
    fn test_extra_fields_preserved() {
        let alert = normalize(
            raw(json!({
                "severity": "high",
                "message": "port scan",
                "timestamp": "2024-01-01T00:00:00Z",
                "rule_id": 4012,
                "details": {"host": "db-01"}
            })),
            fixed_now(),
        )
        .unwrap();

        assert_eq!(alert.timestamp(), "2024-01-01T00:00:00Z");
        assert_eq!(alert.extra().get("rule_id"), Some(&json!(4012)));
        assert_eq!(alert.extra().get("details"), Some(&json!({"host": "db-01"})));
        assert_eq!(alert.extra().get("severity"), None);
    }

    #[test]
    fn test_serializes_flat() {
        let alert = normalize(
            raw(json!({"severity": "high", "message": "x", "rule_id": 7})),
            fixed_now(),
        )
        .unwrap();

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["severity"], "high");
        assert_eq!(value["source"], "unknown");
        assert_eq!(value["rule_id"], 7);
    }

    #[test]
    fn test_fingerprint() {
        let alert = normalize(
            raw(json!({
                "severity": "high",
                "message": "x",
                "source": "ids1",
                "event_type": "intrusion"
            })),
            fixed_now(),
        )
        .unwrap();

        assert_eq!(alert.fingerprint().to_string(), "intrusion-ids1-high");
        assert_eq!(alert.fingerprint(), Fingerprint::new("intrusion", "ids1", "high"));
        assert_ne!(
            Fingerprint::new("a-b", "c", "high"),
            Fingerprint::new("a", "b-c", "high")
        );
    }
}
