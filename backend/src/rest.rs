use crate::db;
use crate::errors::Error;
use crate::model::{Device, Reading};
use crate::notify;
use crate::schedule;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rumqttc::AsyncClient;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::error;

#[derive(Clone)]
struct AppState {
    pool: PgPool,
    mqtt: AsyncClient,
}

pub fn create_router(pool: PgPool, mqtt: AsyncClient) -> Router {
    let state = AppState { pool, mqtt };

    Router::new()
        .route("/api/devices/:id", get(get_device))
        .route("/api/devices/:id/readings", get(get_readings))
        .route(
            "/api/devices/:id/schedule",
            get(get_schedule).put(put_schedule),
        )
        .route("/api/devices/:id/claim", post(claim_device))
        .route("/api/devices/:id/release", post(release_device))
        .with_state(state)
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Device>, ApiError> {
    let device = db::get_device(&state.pool, &id)
        .await?
        .ok_or(Error::DeviceNotFound)?;

    Ok(Json(device))
}

#[derive(Debug, Deserialize)]
struct ReadingsQuery {
    limit: Option<i64>,
}

async fn get_readings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 1000);
    let readings = db::recent_readings(&state.pool, &id, limit).await?;

    Ok(Json(readings))
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let times = db::get_schedule(&state.pool, &id).await?;

    Ok(Json(json!({ "times": times })))
}

#[derive(Debug, Deserialize)]
struct ScheduleBody {
    times: Vec<String>,
}

async fn put_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ScheduleBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    db::get_device(&state.pool, &id)
        .await?
        .ok_or(Error::DeviceNotFound)?;

    schedule::set_schedule(&state.pool, &state.mqtt, &id, &body.times).await?;

    Ok(Json(json!({ "status": "success" })))
}

#[derive(Debug, Deserialize)]
struct ClaimBody {
    user_id: i64,
    whatsapp_number: String,
}

async fn claim_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ClaimBody>,
) -> Result<Json<Device>, ApiError> {
    let target = notify::format_phone(&body.whatsapp_number);
    if target.is_empty() {
        return Err(Error::MalformedPayload("whatsapp_number is required".to_string()).into());
    }

    let device = db::claim(&state.pool, &id, body.user_id, &target).await?;

    Ok(Json(device))
}

#[derive(Debug, Deserialize)]
struct ReleaseBody {
    user_id: i64,
}

async fn release_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReleaseBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    db::release(&state.pool, &id, body.user_id).await?;

    Ok(Json(json!({ "status": "success" })))
}

/// Maps the error taxonomy onto HTTP statuses. Store failures surface as
/// 500 so the caller knows to retry; precondition failures are explicit
/// rejections.
struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::DeviceNotFound => StatusCode::NOT_FOUND,
            Error::DeviceAlreadyOwned => StatusCode::CONFLICT,
            Error::NotOwner => StatusCode::FORBIDDEN,
            Error::MalformedPayload(_) | Error::IncompleteReading => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("API error: {}", self.0);
        }

        let body = Json(json!({ "status": "error", "message": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}
