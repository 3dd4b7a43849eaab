//! Lab order endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::lab::{self, LabStatusChange};
use crate::models::{LabOrder, LabOrderFilter, LabResultEntry, NewLabOrder};
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/lab-orders", get(list).post(create))
        .route("/lab-orders/:id", get(detail))
        .route("/lab-orders/:id/status", post(status))
        .route("/lab-orders/:id/result", post(result))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<LabOrderFilter>,
) -> Result<Json<Vec<LabOrder>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(lab::list_lab_orders(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewLabOrder>,
) -> Result<(StatusCode, Json<LabOrder>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let order = lab::create_lab_order(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<LabOrder>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(lab::get_lab_order(&conn, &id)?))
}

pub async fn status(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<LabStatusChange>,
) -> Result<Json<LabOrder>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(lab::change_status(&mut conn, &staff.actor(), &id, change.status)?))
}

pub async fn result(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(entry): ApiJson<LabResultEntry>,
) -> Result<Json<LabOrder>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(lab::record_result(&mut conn, &staff.actor(), &id, entry)?))
}
