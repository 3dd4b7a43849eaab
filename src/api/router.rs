//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Auth validator → 2. Access logger → 3. Per-user rate limit → 4. RBAC gate
//!
//! Public routes sit behind a per-address rate limit.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::models::enums::Resource;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Put a resource router behind the RBAC gate for `resource`.
fn gated(resource: Resource, routes: Router<ApiContext>) -> Router<ApiContext> {
    routes.route_layer(from_fn_with_state(resource, middleware::rbac::enforce))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Auth → Access log → User rate limit → RBAC → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/me", get(endpoints::auth::me))
        .merge(gated(Resource::Users, endpoints::users::routes()))
        .merge(gated(Resource::Patients, endpoints::patients::routes()))
        .merge(gated(Resource::Appointments, endpoints::appointments::routes()))
        .merge(gated(Resource::Employees, endpoints::employees::routes()))
        .merge(gated(Resource::LabOrders, endpoints::lab_orders::routes()))
        .merge(gated(Resource::RadiologyOrders, endpoints::radiology_orders::routes()))
        .merge(gated(Resource::Pharmacy, endpoints::pharmacy::routes()))
        .merge(gated(Resource::Telemedicine, endpoints::telemedicine::routes()))
        .merge(gated(Resource::Billing, endpoints::billing::routes()))
        .merge(gated(Resource::Compliance, endpoints::compliance::routes()))
        .with_state(ctx.clone())
        .layer(from_fn(middleware::rate::limit_user))
        .layer(from_fn(middleware::audit::log_access))
        .layer(from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Public routes, throttled per peer address
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone())
        .layer(from_fn(middleware::rate::limit_peer))
        .layer(axum::Extension(ctx));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(cors)
}
