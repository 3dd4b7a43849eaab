//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to a staff
//! account and injects `StaffContext` into request extensions for
//! downstream handlers.

use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::middleware::rate;
use crate::api::types::ApiContext;
use crate::staff;

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid bearer token.
///
/// On success: injects `StaffContext` and marks the response `no-store`.
/// Failures count against the caller's address bucket and turn into 429
/// once it is full.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
        rate::charge(&ctx, &rate::peer_key(&req))?;
        return Err(ApiError::Unauthorized);
    };

    // Connection is dropped before the handler runs
    let authenticated = {
        let conn = ctx.core.open_db()?;
        staff::authenticate(&conn, &token)
    };
    let staff = match authenticated {
        Ok(staff) => staff,
        Err(e) => {
            tracing::warn!(error = %e, path = %req.uri().path(), "Bearer token rejected");
            rate::charge(&ctx, &rate::peer_key(&req))?;
            return Err(e.into());
        }
    };

    req.extensions_mut().insert(staff);

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}
