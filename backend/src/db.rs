use crate::errors::{Error, Result};
use crate::metrics::DB_FAILURES_TOTAL;
use crate::model::{Device, NewReading, Reading, Registration};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info, warn};

const DEVICE_COLUMNS: &str = "device_id, device_name, device_type, threshold_temp, \
                              threshold_gas, whatsapp_number, owned_by";

pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Insert-if-absent that always returns the live row.
///
/// The no-op DO UPDATE makes Postgres return the existing row to a losing
/// concurrent writer instead of zero rows, so two simultaneous first-contact
/// messages for a new device id produce exactly one profile and neither
/// caller observes an error. Owner, thresholds, and notification target of
/// an existing row are never touched.
pub async fn ensure_device(
    pool: &PgPool,
    device_id: &str,
    device_name: &str,
    device_type: &str,
) -> Result<Device> {
    let device = sqlx::query_as::<_, Device>(&format!(
        "INSERT INTO devices (device_id, device_name, device_type)
         VALUES ($1, $2, $3)
         ON CONFLICT (device_id) DO UPDATE SET device_id = excluded.device_id
         RETURNING {DEVICE_COLUMNS}"
    ))
    .bind(device_id)
    .bind(device_name)
    .bind(device_type)
    .fetch_one(pool)
    .await?;

    Ok(device)
}

/// Idempotent registration upsert. A re-announcing device never clobbers an
/// existing profile, claimed or not.
pub async fn upsert_registration(pool: &PgPool, registration: &Registration) -> Result<()> {
    sqlx::query(
        "INSERT INTO devices (device_id, device_name, device_type)
         VALUES ($1, $2, $3)
         ON CONFLICT (device_id) DO NOTHING",
    )
    .bind(&registration.device_id)
    .bind(&registration.device_name)
    .bind(&registration.device_type)
    .execute(pool)
    .await?;

    Ok(())
}

/// Associate a device with an owner and a notification target.
///
/// Fails with `DeviceNotFound` if the device has never contacted the system
/// and `DeviceAlreadyOwned` if another user holds it. Re-claiming by the
/// current owner succeeds and updates the notification target. The UPDATE
/// predicate re-checks ownership so a racing claim cannot slip between the
/// read and the write.
pub async fn claim(
    pool: &PgPool,
    device_id: &str,
    user_id: i64,
    whatsapp_number: &str,
) -> Result<Device> {
    let current = get_device(pool, device_id)
        .await?
        .ok_or(Error::DeviceNotFound)?;

    if current.owned_by.is_some_and(|owner| owner != user_id) {
        return Err(Error::DeviceAlreadyOwned);
    }

    let device = sqlx::query_as::<_, Device>(&format!(
        "UPDATE devices
         SET owned_by = $2, whatsapp_number = $3
         WHERE device_id = $1 AND (owned_by IS NULL OR owned_by = $2)
         RETURNING {DEVICE_COLUMNS}"
    ))
    .bind(device_id)
    .bind(user_id)
    .bind(whatsapp_number)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::DeviceAlreadyOwned)?;

    Ok(device)
}

/// Clear owner and notification target. Zero rows matched means the caller
/// is not the current owner; "not owned at all" is reported the same way so
/// callers cannot probe ownership state.
pub async fn release(pool: &PgPool, device_id: &str, user_id: i64) -> Result<()> {
    let result = sqlx::query(
        "UPDATE devices
         SET owned_by = NULL, whatsapp_number = ''
         WHERE device_id = $1 AND owned_by = $2",
    )
    .bind(device_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotOwner);
    }

    Ok(())
}

pub async fn get_device(pool: &PgPool, device_id: &str) -> Result<Option<Device>> {
    let device = sqlx::query_as::<_, Device>(&format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = $1"
    ))
    .bind(device_id)
    .fetch_optional(pool)
    .await?;

    Ok(device)
}

/// Append one reading, retrying transient failures with backoff.
pub async fn insert_reading(pool: &PgPool, reading: &NewReading) -> Result<()> {
    let mut attempts = 0;
    let max_attempts = 5;

    loop {
        attempts += 1;
        match insert_reading_inner(pool, reading).await {
            Ok(()) => return Ok(()),
            Err(e) => match &e {
                Error::Database(db_err) => {
                    if attempts >= max_attempts || !is_transient_error(db_err) {
                        error!(
                            "reading insert failed permanently after {} attempts: {}",
                            attempts, e
                        );
                        return Err(e);
                    }

                    let wait_ms = 100 * 2_u64.pow(attempts - 1).min(32);
                    warn!(
                        "reading insert failed (attempt {}/{}), retrying in {}ms: {}",
                        attempts, max_attempts, wait_ms, db_err
                    );
                    DB_FAILURES_TOTAL.inc();
                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                }
                _ => {
                    error!("reading insert failed with non-database error: {}", e);
                    return Err(e);
                }
            },
        }
    }
}

async fn insert_reading_inner(pool: &PgPool, reading: &NewReading) -> Result<()> {
    sqlx::query(
        "INSERT INTO sensor_data (device_id, temperature, humidity, gas_ppm, ts)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&reading.device_id)
    .bind(reading.temperature)
    .bind(reading.humidity)
    .bind(reading.gas_ppm)
    .bind(reading.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn recent_readings(pool: &PgPool, device_id: &str, limit: i64) -> Result<Vec<Reading>> {
    let readings = sqlx::query_as::<_, Reading>(
        "SELECT device_id, temperature, humidity, gas_ppm, ts AS timestamp
         FROM sensor_data
         WHERE device_id = $1
         ORDER BY ts DESC
         LIMIT $2",
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(readings)
}

/// Upsert the schedule row; at most one row per device, last write wins.
pub async fn upsert_schedule(pool: &PgPool, device_id: &str, times: &[String]) -> Result<()> {
    sqlx::query(
        "INSERT INTO schedules (device_id, times)
         VALUES ($1, $2)
         ON CONFLICT (device_id) DO UPDATE SET times = excluded.times, updated_at = NOW()",
    )
    .bind(device_id)
    .bind(times)
    .execute(pool)
    .await?;

    Ok(())
}

/// A device with no schedule row reads as an empty schedule.
pub async fn get_schedule(pool: &PgPool, device_id: &str) -> Result<Vec<String>> {
    let row: Option<(Vec<String>,)> =
        sqlx::query_as("SELECT times FROM schedules WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(times,)| times).unwrap_or_default())
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Connection-related SQLSTATEs
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}
