//! Request throttling.
//!
//! A request is charged to exactly one bucket:
//! - `user:<id>` once its bearer token resolves to a staff account, so staff
//!   sharing an address do not share a budget;
//! - `peer:<ip>` for public routes and for requests whose token does not
//!   authenticate, so made-up tokens still drain the caller's bucket.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::staff::StaffContext;

/// Bucket for the connecting address. Requests served without connect
/// info (in-process routers) share one bucket.
pub(crate) fn peer_key(req: &Request<Body>) -> String {
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("peer:{}", addr.ip()),
        None => "peer:local".to_string(),
    }
}

/// Count one request against `key`.
pub(crate) fn charge(ctx: &ApiContext, key: &str) -> Result<(), ApiError> {
    let mut limiter = ctx
        .rate_limiter
        .lock()
        .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;
    limiter.check(key).map_err(|retry_after| {
        tracing::warn!(key, retry_after, "Rate limit exceeded");
        ApiError::RateLimited { retry_after }
    })
}

fn context(req: &Request<Body>) -> Result<ApiContext, ApiError> {
    req.extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))
}

/// Public routes: throttle by connecting address.
pub async fn limit_peer(req: Request<Body>, next: Next) -> Response {
    let admitted = context(&req).and_then(|ctx| charge(&ctx, &peer_key(&req)));
    match admitted {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Authenticated routes: throttle by staff account. Mounted inside the
/// auth layer, which charges failed attempts to the peer instead.
pub async fn limit_user(req: Request<Body>, next: Next) -> Response {
    let admitted = context(&req).and_then(|ctx| {
        let staff = req
            .extensions()
            .get::<StaffContext>()
            .ok_or(ApiError::Unauthorized)?;
        charge(&ctx, &format!("user:{}", staff.user_id))
    });
    match admitted {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}
