//! Staff account administration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath};
use crate::models::enums::{Action, Resource};
use crate::models::{NewPermissionGrant, NewStaffUser, PermissionGrant, StaffUser};
use crate::staff::{self, StaffContext};

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/users", get(list).post(create))
        .route("/users/:id", delete(deactivate))
        .route("/users/:id/grants", get(grants).post(grant))
        .route("/users/:id/grants/:resource/:action", delete(revoke))
}

pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<StaffUser>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(staff::list_users(&conn)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewStaffUser>,
) -> Result<(StatusCode, Json<StaffUser>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let user = staff::create_user(&mut conn, &me.actor(), new)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `DELETE /api/users/:id`: deactivate; the row is kept for the audit trail.
pub async fn deactivate(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<StaffUser>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(staff::deactivate_user(&mut conn, &me.actor(), &id)?))
}

pub async fn grants(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<PermissionGrant>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(staff::list_grants(&conn, &id)?))
}

pub async fn grant(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(new): ApiJson<NewPermissionGrant>,
) -> Result<(StatusCode, Json<PermissionGrant>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let grant = staff::grant_permission(&mut conn, &me.actor(), &id, new)?;
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn revoke(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<StaffContext>,
    ApiPath((id, resource, action)): ApiPath<(Uuid, Resource, Action)>,
) -> Result<StatusCode, ApiError> {
    let mut conn = ctx.core.open_db()?;
    staff::revoke_permission(&mut conn, &me.actor(), &id, resource, action)?;
    Ok(StatusCode::NO_CONTENT)
}
