//! Access logging middleware.
//!
//! Logs every authenticated API request with username, method, path and
//! response status. Runs inside auth so `StaffContext` is present.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::api::types::ApiContext;
use crate::db::AccessInsert;
use crate::staff::StaffContext;

/// Buffer an access-log entry for the request.
/// Accesses `ApiContext` from request extensions.
pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let ctx = req.extensions().get::<ApiContext>().cloned();
    let actor = req
        .extensions()
        .get::<StaffContext>()
        .map(|s| s.username.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        ctx.core.log_access(AccessInsert {
            timestamp: Utc::now(),
            actor,
            method,
            path,
            status: response.status().as_u16(),
        });
    }

    response
}
