use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("reading is missing a numeric temperature or gas value")]
    IncompleteReading,

    #[error("device not found")]
    DeviceNotFound,

    #[error("device is already claimed by another user")]
    DeviceAlreadyOwned,

    #[error("caller does not own this device")]
    NotOwner,

    #[error("notification dispatch failed: {0}")]
    Dispatch(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel send error")]
    ChannelSend,
}

pub type Result<T> = std::result::Result<T, Error>;
