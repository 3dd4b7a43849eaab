//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::config::{APP_NAME, APP_VERSION};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub database: bool,
}

/// `GET /api/health`: liveness plus a database round trip.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let database = ctx
        .core
        .open_db()
        .map(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).is_ok())
        .unwrap_or(false);

    Ok(Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        name: APP_NAME,
        version: APP_VERSION,
        database,
    }))
}
