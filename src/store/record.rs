use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// An SOS alert as held in memory. `resolved_at` is `Some` exactly when the
/// alert is no longer active; normalization enforces this regardless of what
/// the wire document claims.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub alert_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub coordinates: Coordinates,
    pub raised_at: DateTime<Utc>,
    pub is_active: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub record_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub coordinates: Option<Coordinates>,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub subject_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub contact_number: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub document_number: Option<String>,
}

/// Builds an alert from a wire document. Returns `None` only when the
/// document has no usable id; every other defect is repaired with defaults.
pub fn normalize_alert(doc: &JsonValue) -> Option<AlertRecord> {
    let Some(alert_id) = string_field(doc, "id") else {
        tracing::warn!("dropping alert document without id");
        return None;
    };
    let subject_id = string_field(doc, "subjectId").unwrap_or_default();
    let subject_name = string_field(doc, "userName").unwrap_or_default();
    let coordinates = match (number_field(doc, "latitude"), number_field(doc, "longitude")) {
        (Some(latitude), Some(longitude)) => Coordinates {
            latitude,
            longitude,
        },
        _ => {
            tracing::debug!(alert_id = %alert_id, "alert missing coordinates, defaulting to origin");
            Coordinates {
                latitude: 0.0,
                longitude: 0.0,
            }
        }
    };
    let raised_at = timestamp_field(doc, "timestamp").unwrap_or_else(Utc::now);
    let is_active = bool_field(doc, "isActive").unwrap_or(true);
    let resolved_at = if is_active {
        None
    } else {
        Some(timestamp_field(doc, "resolvedAt").unwrap_or_else(Utc::now))
    };
    Some(AlertRecord {
        alert_id,
        subject_id,
        subject_name,
        coordinates,
        raised_at,
        is_active,
        resolved_at,
    })
}

/// Builds a telemetry record from a wire document. A record without
/// coordinates is kept (the roster shows it with the sentinel address);
/// a record without any id is dropped.
pub fn normalize_telemetry(doc: &JsonValue) -> Option<TelemetryRecord> {
    let Some(record_id) = string_field(doc, "id") else {
        tracing::warn!("dropping telemetry document without id");
        return None;
    };
    let subject_id = string_field(doc, "userId").unwrap_or_else(|| {
        tracing::debug!(record_id = %record_id, "telemetry missing userId, keying by record id");
        record_id.clone()
    });
    let subject_name = string_field(doc, "userName").unwrap_or_default();
    let coordinates = match (number_field(doc, "latitude"), number_field(doc, "longitude")) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };
    let reported_at = timestamp_field(doc, "timestamp").unwrap_or_else(Utc::now);
    Some(TelemetryRecord {
        record_id,
        subject_id,
        subject_name,
        coordinates,
        reported_at,
    })
}

pub fn normalize_profile(subject_id: &str, doc: &JsonValue) -> ProfileRecord {
    ProfileRecord {
        subject_id: subject_id.to_string(),
        display_name: string_field(doc, "name"),
        email: string_field(doc, "email"),
        contact_number: string_field(doc, "contactNumber"),
        age: number_field(doc, "age")
            .filter(|value| *value >= 0.0 && *value < 200.0)
            .map(|value| value as u32),
        gender: string_field(doc, "gender"),
        document_number: string_field(doc, "documentNumber"),
    }
}

fn string_field(doc: &JsonValue, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn number_field(doc: &JsonValue, key: &str) -> Option<f64> {
    let value = match doc.get(key)? {
        JsonValue::Number(num) => num.as_f64(),
        JsonValue::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

fn bool_field(doc: &JsonValue, key: &str) -> Option<bool> {
    match doc.get(key)? {
        JsonValue::Bool(value) => Some(*value),
        JsonValue::String(raw) => match raw.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn timestamp_field(doc: &JsonValue, key: &str) -> Option<DateTime<Utc>> {
    doc.get(key).and_then(coerce_timestamp)
}

/// Accepts the timestamp shapes the store has been observed to emit: RFC 3339
/// strings, epoch seconds, and epoch milliseconds (including stringified
/// numbers). Anything else is `None` and the caller substitutes process time.
pub fn coerce_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                return Some(parsed.with_timezone(&Utc));
            }
            trimmed.parse::<i64>().ok().and_then(epoch_to_datetime)
        }
        JsonValue::Number(num) => num
            .as_i64()
            .or_else(|| num.as_f64().map(|v| v as i64))
            .and_then(epoch_to_datetime),
        _ => None,
    }
}

fn epoch_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    // Epoch seconds stay below 1e11 until the year 5138; larger magnitudes
    // are millisecond precision.
    const MILLIS_CUTOVER: i64 = 100_000_000_000;
    if raw.abs() >= MILLIS_CUTOVER {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_rfc3339_and_epoch_shapes() {
        let rfc = coerce_timestamp(&json!("2026-03-01T10:00:00Z")).unwrap();
        assert_eq!(rfc.timestamp(), 1_772_359_200);

        let seconds = coerce_timestamp(&json!(1_772_359_200)).unwrap();
        let millis = coerce_timestamp(&json!(1_772_359_200_000i64)).unwrap();
        assert_eq!(seconds, millis);

        let stringified = coerce_timestamp(&json!("1772359200")).unwrap();
        assert_eq!(stringified, seconds);

        assert!(coerce_timestamp(&json!(null)).is_none());
        assert!(coerce_timestamp(&json!("not a time")).is_none());
    }

    #[test]
    fn alert_without_timestamp_defaults_to_now() {
        let before = Utc::now();
        let record = normalize_alert(&json!({
            "id": "a1",
            "subjectId": "s1",
            "userName": "Asha",
            "latitude": 26.1,
            "longitude": 91.7,
            "isActive": true,
        }))
        .unwrap();
        assert!(record.raised_at >= before);
        assert!(record.raised_at <= Utc::now());
    }

    #[test]
    fn inactive_alert_always_carries_resolved_at() {
        let record = normalize_alert(&json!({
            "id": "a1",
            "isActive": false,
            "timestamp": "2026-03-01T10:00:00Z",
        }))
        .unwrap();
        assert!(!record.is_active);
        assert!(record.resolved_at.is_some());
    }

    #[test]
    fn active_alert_never_carries_resolved_at() {
        let record = normalize_alert(&json!({
            "id": "a1",
            "isActive": true,
            "timestamp": "2026-03-01T10:00:00Z",
            "resolvedAt": "2026-03-01T11:00:00Z",
        }))
        .unwrap();
        assert!(record.is_active);
        assert!(record.resolved_at.is_none());
    }

    #[test]
    fn alert_missing_coordinates_defaults_to_origin() {
        let record = normalize_alert(&json!({"id": "a1", "latitude": 26.1})).unwrap();
        assert_eq!(record.coordinates.latitude, 0.0);
        assert_eq!(record.coordinates.longitude, 0.0);
    }

    #[test]
    fn alert_without_id_is_dropped() {
        assert!(normalize_alert(&json!({"subjectId": "s1"})).is_none());
        assert!(normalize_alert(&json!({"id": "   "})).is_none());
    }

    #[test]
    fn telemetry_keeps_entries_without_coordinates() {
        let record = normalize_telemetry(&json!({
            "id": "t1",
            "userId": "s1",
            "userName": "Asha",
            "timestamp": 1_772_359_200,
        }))
        .unwrap();
        assert!(record.coordinates.is_none());
        assert_eq!(record.subject_id, "s1");
    }

    #[test]
    fn telemetry_coerces_stringified_coordinates() {
        let record = normalize_telemetry(&json!({
            "id": "t1",
            "userId": "s1",
            "latitude": "26.14",
            "longitude": "91.73",
        }))
        .unwrap();
        let coords = record.coordinates.unwrap();
        assert_eq!(coords.latitude, 26.14);
        assert_eq!(coords.longitude, 91.73);
    }

    #[test]
    fn telemetry_without_user_id_keys_by_record_id() {
        let record = normalize_telemetry(&json!({"id": "t9"})).unwrap();
        assert_eq!(record.subject_id, "t9");
    }

    #[test]
    fn profile_fields_are_optional_and_trimmed() {
        let profile = normalize_profile(
            "s1",
            &json!({
                "name": "  Asha Verma ",
                "email": "",
                "age": "29",
                "gender": "female",
            }),
        );
        assert_eq!(profile.subject_id, "s1");
        assert_eq!(profile.display_name.as_deref(), Some("Asha Verma"));
        assert_eq!(profile.email, None);
        assert_eq!(profile.age, Some(29));
        assert_eq!(profile.document_number, None);
    }
}
