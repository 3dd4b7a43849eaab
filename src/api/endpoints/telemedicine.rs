//! Telemedicine session endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::models::{NewTelemedicineSession, SessionFilter};
use crate::staff::StaffContext;
use crate::telemedicine::{self, SessionView};

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/telemedicine/sessions", get(list).post(create))
        .route("/telemedicine/sessions/:id", get(detail))
        .route("/telemedicine/sessions/:id/start", post(start))
        .route("/telemedicine/sessions/:id/end", post(end))
        .route("/telemedicine/sessions/:id/cancel", post(cancel))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<SessionFilter>,
) -> Result<Json<Vec<SessionView>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(telemedicine::list_sessions(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewTelemedicineSession>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let session = telemedicine::create_session(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(telemedicine::get_session(&conn, &id)?))
}

pub async fn start(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(telemedicine::start_session(&mut conn, &staff.actor(), &id)?))
}

pub async fn end(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(telemedicine::end_session(&mut conn, &staff.actor(), &id)?))
}

pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(telemedicine::cancel_session(&mut conn, &staff.actor(), &id)?))
}
