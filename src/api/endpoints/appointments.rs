//! Scheduling endpoints.
//!
//! Overlapping slots for one provider come back as 409 `CONFLICT`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::appointments;
use crate::models::{
    Appointment, AppointmentFilter, AppointmentStatusChange, AppointmentUpdate, NewAppointment,
};
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/appointments", get(list).post(create))
        .route("/appointments/:id", get(detail).patch(update))
        .route("/appointments/:id/status", post(status))
}

/// `GET /api/appointments?patient_id=&provider_id=&date=&status=`
pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<AppointmentFilter>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(appointments::list_appointments(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewAppointment>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let appointment = appointments::create_appointment(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(appointments::get_appointment(&conn, &id)?))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<AppointmentUpdate>,
) -> Result<Json<Appointment>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(appointments::update_appointment(&mut conn, &staff.actor(), &id, update)?))
}

pub async fn status(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<AppointmentStatusChange>,
) -> Result<Json<Appointment>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(appointments::change_status(&mut conn, &staff.actor(), &id, change)?))
}
