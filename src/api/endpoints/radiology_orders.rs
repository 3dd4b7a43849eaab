//! Radiology order endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::models::{NewRadiologyOrder, RadiologyOrder, RadiologyOrderFilter, RadiologyReport};
use crate::radiology::{self, RadiologyStatusChange};
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/radiology-orders", get(list).post(create))
        .route("/radiology-orders/:id", get(detail))
        .route("/radiology-orders/:id/status", post(status))
        .route("/radiology-orders/:id/report", post(report))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<RadiologyOrderFilter>,
) -> Result<Json<Vec<RadiologyOrder>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(radiology::list_radiology_orders(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewRadiologyOrder>,
) -> Result<(StatusCode, Json<RadiologyOrder>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let order = radiology::create_radiology_order(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<RadiologyOrder>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(radiology::get_radiology_order(&conn, &id)?))
}

pub async fn status(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<RadiologyStatusChange>,
) -> Result<Json<RadiologyOrder>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(radiology::change_status(&mut conn, &staff.actor(), &id, change.status)?))
}

pub async fn report(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(report): ApiJson<RadiologyReport>,
) -> Result<Json<RadiologyOrder>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(radiology::report(&mut conn, &staff.actor(), &id, report)?))
}
