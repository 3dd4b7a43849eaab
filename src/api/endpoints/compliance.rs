//! Audit trail queries and retention.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::compliance::{self, PatientAccessReport, PruneRequest, PruneSummary};
use crate::models::{AccessFilter, AccessLogEntry, AuditFilter, AuditLogEntry};
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/compliance/audit", get(audit))
        .route("/compliance/access", get(access))
        .route("/compliance/patients/:id/report", get(patient_report))
        .route("/compliance/prune", post(prune))
}

#[derive(Deserialize)]
pub struct ReportQuery {
    pub limit: Option<u32>,
}

pub async fn audit(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<AuditFilter>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(compliance::query_audit(&conn, &filter)?))
}

/// `GET /api/compliance/access`: flushes the buffer first so the
/// answer includes requests up to now.
pub async fn access(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<AccessFilter>,
) -> Result<Json<Vec<AccessLogEntry>>, ApiError> {
    ctx.core.flush_access_log()?;
    let conn = ctx.core.open_db()?;
    Ok(Json(compliance::query_access(&conn, &filter)?))
}

pub async fn patient_report(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Json<PatientAccessReport>, ApiError> {
    ctx.core.flush_access_log()?;
    let conn = ctx.core.open_db()?;
    Ok(Json(compliance::patient_report(&conn, &id, query.limit)?))
}

pub async fn prune(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(request): ApiJson<PruneRequest>,
) -> Result<Json<PruneSummary>, ApiError> {
    ctx.core.flush_access_log()?;
    let mut conn = ctx.core.open_db()?;
    Ok(Json(compliance::prune(&mut conn, &staff.actor(), request.retention_days)?))
}
