//! Charges, bills, payments and the stateless quote calculator.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery};
use crate::billing::calculator::BillTotals;
use crate::billing::{self, NewBill, QuoteRequest};
use crate::models::{Bill, BillDetail, BillFilter, Charge, ChargeFilter, NewCharge, NewPayment};
use crate::staff::StaffContext;

pub fn routes() -> Router<ApiContext> {
    Router::new()
        .route("/billing/charges", get(charges).post(add_charge))
        .route("/billing/bills", get(list).post(create))
        .route("/billing/bills/:id", get(detail))
        .route("/billing/bills/:id/issue", post(issue))
        .route("/billing/bills/:id/void", post(void))
        .route("/billing/bills/:id/payments", post(pay))
        .route("/billing/quote", post(quote))
}

/// `GET /api/billing/charges?patient_id=&unbilled=true`
pub async fn charges(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<ChargeFilter>,
) -> Result<Json<Vec<Charge>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(billing::list_charges(&conn, &filter)?))
}

/// `POST /api/billing/charges`: manual charge entry.
pub async fn add_charge(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewCharge>,
) -> Result<(StatusCode, Json<Charge>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let charge = billing::record_charge(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(charge)))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(filter): ApiQuery<BillFilter>,
) -> Result<Json<Vec<Bill>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(billing::list_bills(&conn, &filter)?))
}

/// `POST /api/billing/bills`: draft a bill from the patient's unbilled charges.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiJson(new): ApiJson<NewBill>,
) -> Result<(StatusCode, Json<BillDetail>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let bill = billing::create_bill(&mut conn, &staff.actor(), new)?;
    Ok((StatusCode::CREATED, Json(bill)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<BillDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(billing::get_bill(&conn, &id)?))
}

pub async fn issue(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<BillDetail>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(billing::issue_bill(&mut conn, &staff.actor(), &id)?))
}

pub async fn void(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<BillDetail>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    Ok(Json(billing::void_bill(&mut conn, &staff.actor(), &id)?))
}

pub async fn pay(
    State(ctx): State<ApiContext>,
    Extension(staff): Extension<StaffContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payment): ApiJson<NewPayment>,
) -> Result<(StatusCode, Json<BillDetail>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let bill = billing::record_payment(&mut conn, &staff.actor(), &id, payment)?;
    Ok((StatusCode::CREATED, Json(bill)))
}

/// `POST /api/billing/quote`: totals only, nothing is written.
pub async fn quote(ApiJson(request): ApiJson<QuoteRequest>) -> Result<Json<BillTotals>, ApiError> {
    Ok(Json(billing::quote(&request)?))
}
