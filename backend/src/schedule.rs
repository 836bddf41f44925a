use crate::db;
use crate::errors::Result;
use crate::metrics::SCHEDULE_PUBLISH_FAILURES_TOTAL;
use rumqttc::{AsyncClient, QoS};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

/// Persist an operator-submitted schedule, then re-broadcast it as a
/// retained command so a device that is offline right now still receives
/// the latest schedule when it reconnects.
///
/// Store and publish are sequenced, not transactional. A publish failure
/// after a successful store is accepted: reads stay correct, the previous
/// retained message stays in place (stale, not corrupt), and the next
/// write or device reconnect re-synchronizes.
pub async fn set_schedule(
    pool: &PgPool,
    mqtt: &AsyncClient,
    device_id: &str,
    times: &[String],
) -> Result<()> {
    db::upsert_schedule(pool, device_id, times).await?;

    let topic = format!("devices/{device_id}/commands/set_schedule");
    let payload = serde_json::to_vec(&json!({ "times": times }))?;

    match mqtt.publish(&topic, QoS::AtLeastOnce, true, payload).await {
        Ok(()) => {
            info!(
                "schedule for {} stored and republished ({} entries)",
                device_id,
                times.len()
            );
        }
        Err(e) => {
            SCHEDULE_PUBLISH_FAILURES_TOTAL.inc();
            warn!(
                "schedule for {} stored but retained publish failed: {}",
                device_id, e
            );
        }
    }

    Ok(())
}
