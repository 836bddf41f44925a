use serde::Serialize;

/// Presence announcement published once per device at startup.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterPayload {
    pub device_name: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

/// Telemetry body. Real firmware fleets disagree on the gas field name, so
/// exactly one of `gas_ppm`/`amonia` is set per message.
#[derive(Debug, Clone, Serialize)]
pub struct DataPayload {
    pub temperature: f64,
    pub humidity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_ppm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amonia: Option<f64>,
}

impl DataPayload {
    pub fn new(temperature: f64, humidity: f64, gas: f64, legacy_field: bool) -> Self {
        Self {
            temperature,
            humidity,
            gas_ppm: (!legacy_field).then_some(gas),
            amonia: legacy_field.then_some(gas),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_payload_uses_primary_field_name() {
        let json = serde_json::to_string(&DataPayload::new(31.0, 60.0, 12.0, false)).unwrap();
        assert!(json.contains("\"gas_ppm\""));
        assert!(!json.contains("\"amonia\""));
    }

    #[test]
    fn data_payload_uses_legacy_field_name() {
        let json = serde_json::to_string(&DataPayload::new(31.0, 60.0, 12.0, true)).unwrap();
        assert!(json.contains("\"amonia\""));
        assert!(!json.contains("\"gas_ppm\""));
    }
}
