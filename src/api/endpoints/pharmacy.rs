//! Pharmacy inventory and prescriptions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::models::{
    DispenseResult, InventoryItem, InventoryRestock, NewPrescription, Prescription,
    PrescriptionFilter,
};
use crate::pharmacy;
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/pharmacy/inventory", get(inventory).post(restock))
        .route("/pharmacy/prescriptions", get(list).post(create))
        .route("/pharmacy/prescriptions/:id", get(detail))
        .route("/pharmacy/prescriptions/:id/dispense", post(dispense))
        .route("/pharmacy/prescriptions/:id/cancel", post(cancel))
}

pub async fn inventory(State(ctx): State<ApiContext>) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(pharmacy::list_inventory(&conn)?))
}

/// `POST /api/pharmacy/inventory`: add stock, creating the item if new.
pub async fn restock(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(input): ApiJson<InventoryRestock>,
) -> Result<Json<InventoryItem>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(pharmacy::restock(&mut conn, &staff.actor(), input)?))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<PrescriptionFilter>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(pharmacy::list_prescriptions(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewPrescription>,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let rx = pharmacy::create_prescription(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(rx)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Prescription>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(pharmacy::get_prescription(&conn, &id)?))
}

pub async fn dispense(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DispenseResult>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(pharmacy::dispense(&mut conn, &staff.actor(), &id)?))
}

pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Prescription>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(pharmacy::cancel_prescription(&mut conn, &staff.actor(), &id)?))
}
