//! Per-resource RBAC gate.
//!
//! Mounted with `from_fn_with_state(Resource::X, enforce)` as a route
//! layer on each resource router, so the resource is fixed per router and
//! the action comes from the HTTP method.

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::enums::Resource;
use crate::rbac;
use crate::staff::StaffContext;

pub async fn enforce(
    State(resource): State<Resource>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match enforce_inner(resource, req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn enforce_inner(
    resource: Resource,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;
    let staff = req
        .extensions()
        .get::<StaffContext>()
        .cloned()
        .ok_or(ApiError::Unauthorized)?;

    let action = rbac::action_for_method(req.method());
    let decision = {
        let conn = ctx.core.open_db()?;
        rbac::check_access(&conn, &staff, resource, action)?
    };
    tracing::debug!(
        user = %staff.username,
        %resource,
        %action,
        reason = ?decision.reason,
        "Access decision"
    );
    if !decision.allowed {
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(req).await)
}
