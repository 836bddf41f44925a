use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::errors::{Error, Result};
use crate::model::{NewReading, Registration};

/// Default display name for a device that announced itself without one.
pub fn default_device_name(device_id: &str) -> String {
    format!("Perangkat {device_id}")
}

pub const DEFAULT_DEVICE_TYPE: &str = "unknown";

/// Devices send either a bare JSON object or a single-element array wrapping
/// one. Anything else is malformed.
fn unwrap_object(payload: &[u8]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| Error::MalformedPayload(format!("invalid JSON: {e}")))?;

    let value = match value {
        Value::Array(mut items) => {
            if items.len() != 1 {
                return Err(Error::MalformedPayload(format!(
                    "expected a single-element array, got {} elements",
                    items.len()
                )));
            }
            items.remove(0)
        }
        other => other,
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::MalformedPayload(
            "body is not a JSON object".to_string(),
        )),
    }
}

/// Normalize a `data` payload into a canonical reading.
///
/// Firmware revisions disagree on the gas field name: `gas_ppm` is the
/// primary name and wins when both are present, `amonia` is accepted as a
/// fallback. Temperature and a gas value must both be numeric; a non-numeric
/// value counts as absent. Humidity is optional.
pub fn normalize_reading(device_id: &str, payload: &[u8]) -> Result<NewReading> {
    let body = unwrap_object(payload)?;

    let temperature = body.get("temperature").and_then(Value::as_f64);
    let gas_ppm = body
        .get("gas_ppm")
        .and_then(Value::as_f64)
        .or_else(|| body.get("amonia").and_then(Value::as_f64));

    let (Some(temperature), Some(gas_ppm)) = (temperature, gas_ppm) else {
        return Err(Error::IncompleteReading);
    };

    let timestamp = body
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(NewReading {
        device_id: device_id.to_string(),
        temperature,
        humidity: body.get("humidity").and_then(Value::as_f64),
        gas_ppm,
        timestamp,
    })
}

/// Normalize a `register` payload. Registration is best-effort presence
/// signaling, so missing fields fall back to deterministic defaults instead
/// of failing; only an unparseable body is rejected.
pub fn normalize_registration(device_id: &str, payload: &[u8]) -> Result<Registration> {
    let body = unwrap_object(payload)?;

    let device_name = body
        .get("device_name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default_device_name(device_id));

    let device_type = body
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_DEVICE_TYPE)
        .to_string();

    Ok(Registration {
        device_id: device_id.to_string(),
        device_name,
        device_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_from_object() {
        let r = normalize_reading("dev-1", br#"{"temperature": 31.5, "humidity": 70, "gas_ppm": 12}"#)
            .unwrap();
        assert_eq!(r.device_id, "dev-1");
        assert_eq!(r.temperature, 31.5);
        assert_eq!(r.humidity, Some(70.0));
        assert_eq!(r.gas_ppm, 12.0);
    }

    #[test]
    fn reading_from_single_element_array() {
        let obj = normalize_reading("dev-1", br#"{"temperature": 31, "gas_ppm": 10}"#).unwrap();
        let arr = normalize_reading("dev-1", br#"[{"temperature": 31, "gas_ppm": 10}]"#).unwrap();
        assert_eq!(arr.temperature, obj.temperature);
        assert_eq!(arr.gas_ppm, obj.gas_ppm);
        assert_eq!(arr.humidity, obj.humidity);
    }

    #[test]
    fn reading_multi_element_array_is_malformed() {
        let err = normalize_reading(
            "dev-1",
            br#"[{"temperature": 31, "gas_ppm": 10}, {"temperature": 32, "gas_ppm": 11}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn reading_empty_array_is_malformed() {
        let err = normalize_reading("dev-1", b"[]").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn reading_non_object_is_malformed() {
        assert!(matches!(
            normalize_reading("dev-1", b"42").unwrap_err(),
            Error::MalformedPayload(_)
        ));
        assert!(matches!(
            normalize_reading("dev-1", b"not json").unwrap_err(),
            Error::MalformedPayload(_)
        ));
    }

    #[test]
    fn reading_accepts_amonia_field_name() {
        let r = normalize_reading("dev-1", br#"{"temperature": 28, "amonia": 44}"#).unwrap();
        assert_eq!(r.gas_ppm, 44.0);
    }

    #[test]
    fn reading_prefers_gas_ppm_over_amonia() {
        let r = normalize_reading("dev-1", br#"{"temperature": 28, "gas_ppm": 5, "amonia": 44}"#)
            .unwrap();
        assert_eq!(r.gas_ppm, 5.0);
    }

    #[test]
    fn reading_missing_temperature_and_gas_is_incomplete() {
        let err = normalize_reading("dev-1", br#"{"humidity": 55}"#).unwrap_err();
        assert!(matches!(err, Error::IncompleteReading));
    }

    #[test]
    fn reading_missing_gas_is_incomplete() {
        let err = normalize_reading("dev-1", br#"{"temperature": 31}"#).unwrap_err();
        assert!(matches!(err, Error::IncompleteReading));
    }

    #[test]
    fn reading_non_numeric_temperature_is_incomplete() {
        let err =
            normalize_reading("dev-1", br#"{"temperature": "hot", "gas_ppm": 10}"#).unwrap_err();
        assert!(matches!(err, Error::IncompleteReading));
    }

    #[test]
    fn reading_humidity_is_optional() {
        let r = normalize_reading("dev-1", br#"{"temperature": 31, "gas_ppm": 10}"#).unwrap();
        assert_eq!(r.humidity, None);
    }

    #[test]
    fn reading_negative_and_zero_values_are_valid() {
        let r = normalize_reading("dev-1", br#"{"temperature": -3.5, "gas_ppm": 0}"#).unwrap();
        assert_eq!(r.temperature, -3.5);
        assert_eq!(r.gas_ppm, 0.0);
    }

    #[test]
    fn reading_honors_payload_timestamp() {
        let r = normalize_reading(
            "dev-1",
            br#"{"temperature": 31, "gas_ppm": 10, "timestamp": "2026-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(r.timestamp.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn registration_with_all_fields() {
        let reg = normalize_registration(
            "dev-7",
            br#"{"device_name": "Kandang Utara", "type": "kandang-ayam"}"#,
        )
        .unwrap();
        assert_eq!(reg.device_name, "Kandang Utara");
        assert_eq!(reg.device_type, "kandang-ayam");
    }

    #[test]
    fn registration_defaults_missing_fields() {
        let reg = normalize_registration("dev-7", b"{}").unwrap();
        assert_eq!(reg.device_name, "Perangkat dev-7");
        assert_eq!(reg.device_type, "unknown");
    }

    #[test]
    fn registration_from_single_element_array() {
        let reg = normalize_registration("dev-7", br#"[{"device_name": "Kandang A"}]"#).unwrap();
        assert_eq!(reg.device_name, "Kandang A");
        assert_eq!(reg.device_type, "unknown");
    }

    #[test]
    fn registration_rejects_unparseable_body() {
        assert!(matches!(
            normalize_registration("dev-7", b"{{{").unwrap_err(),
            Error::MalformedPayload(_)
        ));
    }
}
