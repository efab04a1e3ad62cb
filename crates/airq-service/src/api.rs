//! REST API endpoints for airq.
//!
//! Handlers are thin: they parse path segments, call into [`crate::query`]
//! while holding the store lock, and map [`QueryError`] onto status codes.
//!
//! # Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]:
//! validation failures are 400, unknown or inactive devices and empty
//! stores are 404, store failures are 500.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use time::OffsetDateTime;

use airq_store::{StoredMeasurement, format_db_timestamp};
use airq_types::DeviceDescriptor;

use crate::collector::ensure_started;
use crate::query::{self, QueryError};
use crate::state::AppState;

/// Rows returned by `/debug`.
const DEBUG_ROWS: u32 = 5;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/debug", get(debug_timestamps))
        .route("/api/devices", get(list_devices))
        .route("/api/current", get(current_any))
        .route("/api/current/{device_id}", get(current_for_device))
        .route("/api/history/{hours}", get(history_all))
        .route("/api/history/{hours}/{device_id}", get(history_for_device))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint. Also makes sure the poller is running.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    if state.config.collector.enabled {
        ensure_started(&state);
    }
    Json(HealthResponse {
        status: "healthy",
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// One row of the `/debug` listing, with the timestamp exactly as stored.
#[derive(Debug, Serialize)]
pub struct DebugRecord {
    pub timestamp: String,
    pub pm2: Option<f64>,
    pub co2: Option<i64>,
    pub device_name: String,
}

/// Server clock and the newest stored rows, for timezone troubleshooting.
#[derive(Debug, Serialize)]
pub struct DebugResponse {
    pub current_utc_time: String,
    pub recent_records: Vec<DebugRecord>,
}

async fn debug_timestamps(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DebugResponse>, AppError> {
    let rows = {
        let store = state.store.lock().await;
        query::recent(&store, DEBUG_ROWS)?
    };

    let recent_records = rows
        .into_iter()
        .map(|row| -> airq_store::Result<DebugRecord> {
            Ok(DebugRecord {
                timestamp: format_db_timestamp(row.timestamp)?,
                pm2: row.pm2,
                co2: row.co2,
                device_name: row.device_name,
            })
        })
        .collect::<airq_store::Result<Vec<_>>>()?;

    Ok(Json(DebugResponse {
        current_utc_time: format_db_timestamp(OffsetDateTime::now_utc())?,
        recent_records,
    }))
}

async fn list_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeviceDescriptor>>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(query::list_devices(&store)?))
}

async fn current_any(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StoredMeasurement>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(query::current(&store, None)?))
}

async fn current_for_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<StoredMeasurement>, AppError> {
    let device_id = query::parse_device_id(&device_id)?;
    let store = state.store.lock().await;
    Ok(Json(query::current(&store, Some(device_id))?))
}

async fn history_all(
    State(state): State<Arc<AppState>>,
    Path(hours): Path<String>,
) -> Result<Json<Vec<StoredMeasurement>>, AppError> {
    let hours = query::parse_hours(&hours)?;
    let store = state.store.lock().await;
    Ok(Json(query::history(&store, hours, None)?))
}

async fn history_for_device(
    State(state): State<Arc<AppState>>,
    Path((hours, device_id)): Path<(String, String)>,
) -> Result<Json<Vec<StoredMeasurement>>, AppError> {
    let hours = query::parse_hours(&hours)?;
    let device_id = query::parse_device_id(&device_id)?;
    let store = state.store.lock().await;
    Ok(Json(query::history(&store, hours, Some(device_id))?))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Store(airq_store::Error),
}

impl From<airq_store::Error> for AppError {
    fn from(e: airq_store::Error) -> Self {
        if e.is_not_found() {
            AppError::NotFound(e.to_string())
        } else {
            AppError::Store(e)
        }
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Validation(msg) => AppError::BadRequest(msg),
            QueryError::NotFound(msg) => AppError::NotFound(msg),
            QueryError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => {
                tracing::error!("Store error while serving request: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
