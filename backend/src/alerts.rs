use crate::model::{Alert, Device, MetricKind, NewReading};

/// Compare a reading against the owning device's thresholds.
///
/// At most one alert per reading: temperature is checked first and outranks
/// gas when both limits are exceeded. Breach means strictly greater than the
/// threshold; a reading exactly at the limit is not a breach. Pure decision
/// logic — whether the alert is deliverable is the pipeline's concern.
pub fn evaluate(reading: &NewReading, device: &Device) -> Option<Alert> {
    if reading.temperature > device.threshold_temp {
        return Some(Alert {
            device_id: device.device_id.clone(),
            metric: MetricKind::Temperature,
            observed: reading.temperature,
            threshold: device.threshold_temp,
            message: format!(
                "⚠️ PERINGATAN! Suhu di {} tinggi: {}°C.",
                device.device_name, reading.temperature
            ),
        });
    }

    if reading.gas_ppm > device.threshold_gas {
        return Some(Alert {
            device_id: device.device_id.clone(),
            metric: MetricKind::Gas,
            observed: reading.gas_ppm,
            threshold: device.threshold_gas,
            message: format!(
                "⚠️ PERINGATAN! Gas di {} tinggi: {} PPM.",
                device.device_name, reading.gas_ppm
            ),
        });
    }

    None
}
