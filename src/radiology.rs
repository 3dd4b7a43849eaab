//! Imaging orders. Same shape as lab orders with a radiologist report as
//! the terminal step.

use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::billing::calculator::format_sequence;
use crate::billing::{capture_charge, release_source_charges};
use crate::db::repository;
use crate::error::{optional, required, DomainError, DomainResult};
use crate::hr::require_employee;
use crate::models::enums::{ChargeSource, RadiologyOrderStatus};
use crate::models::{
    NewCharge, NewRadiologyOrder, RadiologyOrder, RadiologyOrderFilter, RadiologyReport,
};
use crate::patients::require_patient;

pub const RADIOLOGY_ORDER_PREFIX: &str = "RAD";

#[derive(Debug, Clone, Deserialize)]
pub struct RadiologyStatusChange {
    pub status: RadiologyOrderStatus,
}

pub fn can_transition(from: RadiologyOrderStatus, to: RadiologyOrderStatus) -> bool {
    use RadiologyOrderStatus::*;
    matches!(
        (from, to),
        (Ordered, Scheduled | Cancelled) | (Scheduled, InProgress | Cancelled)
    )
}

pub fn create_radiology_order(
    conn: &mut Connection,
    actor: &Actor,
    new: NewRadiologyOrder,
) -> DomainResult<RadiologyOrder> {
    let body_part = required("body_part", &new.body_part)?;
    if new.price_cents < 0 {
        return Err(DomainError::validation("price must not be negative"));
    }

    let tx = conn.transaction()?;
    require_patient(&tx, &new.patient_id)?;
    require_employee(&tx, &new.ordering_provider_id)?;
    let seq = repository::next_sequence_value(&tx, repository::SEQ_RADIOLOGY_ORDER)?;
    let now = Utc::now();
    let order = RadiologyOrder {
        id: Uuid::new_v4(),
        order_number: format_sequence(RADIOLOGY_ORDER_PREFIX, seq, 6),
        patient_id: new.patient_id,
        ordering_provider_id: new.ordering_provider_id,
        modality: new.modality,
        body_part,
        priority: new.priority,
        status: RadiologyOrderStatus::Ordered,
        price_cents: new.price_cents,
        clinical_indication: optional(new.clinical_indication),
        findings: None,
        impression: None,
        reported_by: None,
        reported_at: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_radiology_order(&tx, &order)?;
    audit::log(&tx, actor, "radiology_order", order.id, Change::created(&order)?)?;
    capture_charge(
        &tx,
        actor,
        NewCharge {
            patient_id: order.patient_id,
            code: format!("RAD-{}", order.modality.as_str().to_uppercase()),
            description: format!("Imaging: {} {}", order.modality, order.body_part),
            quantity: 1,
            unit_price_cents: order.price_cents,
            service_date: Some(now.date_naive()),
        },
        ChargeSource::RadiologyOrder,
        Some(order.id),
    )?;
    tx.commit()?;

    tracing::info!(order = %order.order_number, modality = %order.modality, "Radiology order placed");
    Ok(order)
}

pub fn get_radiology_order(conn: &Connection, id: &Uuid) -> DomainResult<RadiologyOrder> {
    repository::get_radiology_order(conn, id)?
        .ok_or_else(|| DomainError::not_found("RadiologyOrder", id))
}

pub fn list_radiology_orders(
    conn: &Connection,
    filter: &RadiologyOrderFilter,
) -> DomainResult<Vec<RadiologyOrder>> {
    Ok(repository::list_radiology_orders(conn, filter)?)
}

pub fn change_status(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    status: RadiologyOrderStatus,
) -> DomainResult<RadiologyOrder> {
    let tx = conn.transaction()?;
    let before = get_radiology_order(&tx, id)?;
    if !can_transition(before.status, status) {
        return Err(DomainError::conflict(format!(
            "cannot move radiology order from {} to {}",
            before.status, status
        )));
    }
    let mut order = before.clone();
    order.status = status;
    order.updated_at = Utc::now();
    repository::update_radiology_order(&tx, &order)?;
    audit::log(
        &tx,
        actor,
        "radiology_order",
        order.id,
        Change::updated(&before, &order)?.as_action("status_change"),
    )?;
    if status == RadiologyOrderStatus::Cancelled {
        release_source_charges(&tx, actor, ChargeSource::RadiologyOrder, order.id)?;
    }
    tx.commit()?;
    Ok(order)
}

/// in_progress → reported.
pub fn report(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    report: RadiologyReport,
) -> DomainResult<RadiologyOrder> {
    let findings = required("findings", &report.findings)?;
    let impression = required("impression", &report.impression)?;

    let tx = conn.transaction()?;
    let before = get_radiology_order(&tx, id)?;
    if before.status != RadiologyOrderStatus::InProgress {
        return Err(DomainError::conflict(format!(
            "cannot report a radiology order in status {}",
            before.status
        )));
    }
    require_employee(&tx, &report.reported_by)?;

    let now = Utc::now();
    let mut order = before.clone();
    order.status = RadiologyOrderStatus::Reported;
    order.findings = Some(findings);
    order.impression = Some(impression);
    order.reported_by = Some(report.reported_by);
    order.reported_at = Some(now);
    order.updated_at = now;
    repository::update_radiology_order(&tx, &order)?;
    audit::log(
        &tx,
        actor,
        "radiology_order",
        order.id,
        Change::updated(&before, &order)?.as_action("report"),
    )?;
    tx.commit()?;
    Ok(order)
}
