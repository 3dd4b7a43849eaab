//! Employee records.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::hr;
use crate::models::{Employee, EmployeeFilter, EmployeeUpdate, NewEmployee};
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/employees", get(list).post(create))
        .route("/employees/:id", get(detail).patch(update).delete(remove))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<EmployeeFilter>,
) -> Result<Json<Vec<Employee>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(hr::list_employees(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewEmployee>,
) -> Result<(StatusCode, Json<Employee>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let employee = hr::create_employee(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Employee>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(hr::get_employee(&conn, &id)?))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<EmployeeUpdate>,
) -> Result<Json<Employee>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(hr::update_employee(&mut conn, &staff.actor(), &id, update)?))
}

pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = ctx.core.open_db()?;
    hr::delete_employee(&mut conn, &staff.actor(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}
