use crate::alerts;
use crate::db;
use crate::errors::Result;
use crate::metrics::{
    ALERTS_TOTAL, DISPATCH_FAILURES_TOTAL, DROPPED_TOTAL, INGEST_LATENCY_SECONDS, READINGS_TOTAL,
    REGISTRATIONS_TOTAL,
};
use crate::model::Device;
use crate::mqtt::{Action, Inbound};
use crate::normalize;
use crate::notify::Notifier;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Drain the inbound channel one message at a time, in delivery order.
///
/// Total order means a device's register and first data message can never
/// race each other inside this process. Every failure is terminal for that
/// single message: log, count, move on. Nothing is re-queued and the loop
/// never stops over a bad payload.
pub async fn run_pipeline(mut rx: mpsc::Receiver<Inbound>, pool: PgPool, notifier: Notifier) {
    info!("Pipeline started");

    while let Some(inbound) = rx.recv().await {
        let start = Instant::now();

        if let Err(e) = handle_message(&pool, &notifier, &inbound).await {
            DROPPED_TOTAL.inc();
            warn!(
                "dropped {:?} message for {}: {}",
                inbound.action, inbound.device_id, e
            );
        }

        INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
    }

    info!("Pipeline stopped: channel closed");
}

async fn handle_message(pool: &PgPool, notifier: &Notifier, inbound: &Inbound) -> Result<()> {
    match inbound.action {
        Action::Register => handle_register(pool, inbound).await,
        Action::Data => handle_data(pool, notifier, inbound).await,
    }
}

async fn handle_register(pool: &PgPool, inbound: &Inbound) -> Result<()> {
    let registration = normalize::normalize_registration(&inbound.device_id, &inbound.payload)?;
    db::upsert_registration(pool, &registration).await?;
    REGISTRATIONS_TOTAL.inc();

    info!(
        "device {} announced itself ({})",
        registration.device_id, registration.device_name
    );
    Ok(())
}

async fn handle_data(pool: &PgPool, notifier: &Notifier, inbound: &Inbound) -> Result<()> {
    let reading = normalize::normalize_reading(&inbound.device_id, &inbound.payload)?;

    // First contact through a data message provisions a placeholder profile;
    // for a known device this is a read of the existing row.
    let device = db::ensure_device(
        pool,
        &reading.device_id,
        &normalize::default_device_name(&reading.device_id),
        normalize::DEFAULT_DEVICE_TYPE,
    )
    .await?;

    db::insert_reading(pool, &reading).await?;
    READINGS_TOTAL.inc();

    debug!(
        "stored reading for {}: temp={} gas={} humidity={:?}",
        reading.device_id, reading.temperature, reading.gas_ppm, reading.humidity
    );

    let Some(alert) = alerts::evaluate(&reading, &device) else {
        return Ok(());
    };
    ALERTS_TOTAL.inc();

    let Some(target) = dispatch_target(&device) else {
        debug!(
            "alert for {} suppressed: device has no notification target",
            device.device_id
        );
        return Ok(());
    };

    if !notifier.is_enabled() {
        debug!("alert for {} suppressed: dispatch disabled", device.device_id);
        return Ok(());
    }

    // Alerting is a side channel: a dispatch failure never fails the message.
    if let Err(e) = notifier.send(target, &alert.message).await {
        DISPATCH_FAILURES_TOTAL.inc();
        warn!("alert dispatch for {} failed: {}", device.device_id, e);
    }

    Ok(())
}

/// An alert is deliverable only when a claim has set a notification target.
/// Unclaimed devices always have an empty target, so their breaches are
/// evaluated but never dispatched.
fn dispatch_target(device: &Device) -> Option<&str> {
    if device.whatsapp_number.is_empty() {
        None
    } else {
        Some(&device.whatsapp_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewReading;
    use chrono::Utc;

    fn device(whatsapp_number: &str, owned_by: Option<i64>) -> Device {
        Device {
            device_id: "dev-1".to_string(),
            device_name: "Kandang A".to_string(),
            device_type: "kandang-ayam".to_string(),
            threshold_temp: 35.0,
            threshold_gas: 300.0,
            whatsapp_number: whatsapp_number.to_string(),
            owned_by,
        }
    }

    #[test]
    fn unclaimed_device_has_no_dispatch_target() {
        assert_eq!(dispatch_target(&device("", None)), None);
    }

    #[test]
    fn claimed_device_dispatches_to_its_target() {
        assert_eq!(
            dispatch_target(&device("628123456789", Some(1))),
            Some("628123456789")
        );
    }

    #[test]
    fn breach_on_unclaimed_device_is_evaluated_but_not_dispatched() {
        let unclaimed = device("", None);
        let reading = NewReading {
            device_id: "dev-1".to_string(),
            temperature: 40.0,
            humidity: Some(60.0),
            gas_ppm: 500.0,
            timestamp: Utc::now(),
        };

        // The breach is detected...
        assert!(alerts::evaluate(&reading, &unclaimed).is_some());
        // ...but there is nowhere to deliver it.
        assert_eq!(dispatch_target(&unclaimed), None);
    }
}
