//! Patient registry endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::models::{NewPatient, Patient, PatientFilter, PatientUpdate};
use crate::patients;
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/patients", get(list).post(create))
        .route("/patients/:id", get(detail).patch(update).delete(remove))
        .route("/patients/mrn/:mrn", get(by_mrn))
}

/// `GET /api/patients?search=&limit=&offset=`
pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<PatientFilter>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::list_patients(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let patient = patients::create_patient(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Patient>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::get_patient(&conn, &id)?))
}

pub async fn by_mrn(
    State(ctx): State<ApiContext>,
    ApiPath(mrn): ApiPath<String>,
) -> Result<Json<Patient>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(patients::get_patient_by_mrn(&conn, &mrn)?))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<PatientUpdate>,
) -> Result<Json<Patient>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(patients::update_patient(&mut conn, &staff.actor(), &id, update)?))
}

pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = ctx.core.open_db()?;
    patients::delete_patient(&mut conn, &staff.actor(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}
