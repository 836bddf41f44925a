use chrono::{DateTime, Utc};
use serde::Serialize;

/// Device profile. Created as a placeholder on first contact, enriched by a
/// claim, reset by a release. An unclaimed device (no `owned_by`) always has
/// an empty `whatsapp_number`, so alerts for it are never deliverable.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Device {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub threshold_temp: f64,
    pub threshold_gas: f64,
    pub whatsapp_number: String,
    pub owned_by: Option<i64>,
}

/// A normalized telemetry reading, ready for insert. The timestamp is
/// server-assigned when the payload carries none.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub gas_ppm: f64,
    pub timestamp: DateTime<Utc>,
}

/// A stored reading as served by the HTTP API.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reading {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub gas_ppm: f64,
    pub timestamp: DateTime<Utc>,
}

/// A normalized presence announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Temperature,
    Gas,
}

/// A threshold breach. Derived per reading, dispatched once, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub device_id: String,
    pub metric: MetricKind,
    pub observed: f64,
    pub threshold: f64,
    pub message: String,
}
