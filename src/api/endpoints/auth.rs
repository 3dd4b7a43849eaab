//! Login, logout and current-account endpoints.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::middleware::auth::bearer_token;
use crate::api::types::{ApiContext, ApiJson};
use crate::models::StaffUser;
use crate::staff::{self, AuthError, LoginSession, StaffContext};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /api/auth/login`: exchange credentials for a bearer token.
pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginSession>, ApiError> {
    let username = req.username.trim().to_lowercase();

    // MutexGuard is !Send, keep it out of scope of any .await
    {
        let mut lockout = ctx
            .login_lockout
            .lock()
            .map_err(|_| ApiError::Internal("lockout lock".into()))?;
        lockout.check(&username).map_err(|retry_after| {
            tracing::warn!(username, retry_after, "Login attempt while locked out");
            ApiError::RateLimited { retry_after }
        })?;
    }

    let conn = ctx.core.open_db()?;
    let ttl = chrono::Duration::minutes(i64::from(ctx.core.config.token_ttl_minutes));
    let result = staff::login(&conn, &username, &req.password, ttl);

    let mut lockout = ctx
        .login_lockout
        .lock()
        .map_err(|_| ApiError::Internal("lockout lock".into()))?;
    match result {
        Ok(session) => {
            lockout.clear(&username);
            Ok(Json(session))
        }
        Err(AuthError::InvalidCredentials) => {
            lockout.record_failure(&username);
            tracing::warn!(username, "Failed login");
            Err(ApiError::AuthFailed)
        }
        Err(e) => Err(e.into()),
    }
}

/// `POST /api/auth/logout`: revoke the presented token.
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let conn = ctx.core.open_db()?;
    staff::logout(&conn, token)?;
    tracing::info!(user = %staff.username, "Staff logout");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`: the account behind the token.
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
) -> Result<Json<StaffUser>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(staff::get_user(&conn, &staff.user_id)?))
}
