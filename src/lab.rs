//! Lab orders.
//!
//! ordered → collected | cancelled
//! collected → in_progress | cancelled | resulted (via result entry)
//! in_progress → resulted (via result entry)

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::billing::calculator::format_sequence;
use crate::billing::{capture_charge, release_source_charges};
use crate::db::repository;
use crate::error::{optional, required, DomainError, DomainResult};
use crate::hr::require_employee;
use crate::models::enums::{ChargeSource, LabOrderStatus};
use crate::models::{LabOrder, LabOrderFilter, LabResultEntry, NewCharge, NewLabOrder};
use crate::patients::require_patient;

pub const LAB_ORDER_PREFIX: &str = "LAB";

static TEST_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9-]{2,16}$").expect("valid test code pattern"));

#[derive(Debug, Clone, Deserialize)]
pub struct LabStatusChange {
    pub status: LabOrderStatus,
}

pub fn can_transition(from: LabOrderStatus, to: LabOrderStatus) -> bool {
    use LabOrderStatus::*;
    matches!(
        (from, to),
        (Ordered, Collected | Cancelled) | (Collected, InProgress | Cancelled)
    )
}

pub fn validate_test_code(code: &str) -> DomainResult<()> {
    if TEST_CODE.is_match(code) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "test code must be 2-16 of A-Z, 0-9, '-': {code}"
        )))
    }
}

pub fn create_lab_order(conn: &mut Connection, actor: &Actor, new: NewLabOrder) -> DomainResult<LabOrder> {
    let test_code = new.test_code.trim().to_string();
    validate_test_code(&test_code)?;
    let test_name = required("test_name", &new.test_name)?;
    if new.price_cents < 0 {
        return Err(DomainError::validation("price must not be negative"));
    }

    let tx = conn.transaction()?;
    require_patient(&tx, &new.patient_id)?;
    require_employee(&tx, &new.ordering_provider_id)?;
    let seq = repository::next_sequence_value(&tx, repository::SEQ_LAB_ORDER)?;
    let now = Utc::now();
    let order = LabOrder {
        id: Uuid::new_v4(),
        order_number: format_sequence(LAB_ORDER_PREFIX, seq, 6),
        patient_id: new.patient_id,
        ordering_provider_id: new.ordering_provider_id,
        test_code,
        test_name,
        priority: new.priority,
        status: LabOrderStatus::Ordered,
        price_cents: new.price_cents,
        result_value: None,
        result_unit: None,
        reference_range: None,
        abnormal_flag: None,
        resulted_at: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_lab_order(&tx, &order)?;
    audit::log(&tx, actor, "lab_order", order.id, Change::created(&order)?)?;
    capture_charge(
        &tx,
        actor,
        NewCharge {
            patient_id: order.patient_id,
            code: order.test_code.clone(),
            description: format!("Lab: {}", order.test_name),
            quantity: 1,
            unit_price_cents: order.price_cents,
            service_date: Some(now.date_naive()),
        },
        ChargeSource::LabOrder,
        Some(order.id),
    )?;
    tx.commit()?;

    tracing::info!(order = %order.order_number, priority = %order.priority, "Lab order placed");
    Ok(order)
}

pub fn get_lab_order(conn: &Connection, id: &Uuid) -> DomainResult<LabOrder> {
    repository::get_lab_order(conn, id)?.ok_or_else(|| DomainError::not_found("LabOrder", id))
}

pub fn list_lab_orders(conn: &Connection, filter: &LabOrderFilter) -> DomainResult<Vec<LabOrder>> {
    Ok(repository::list_lab_orders(conn, filter)?)
}

pub fn change_status(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    status: LabOrderStatus,
) -> DomainResult<LabOrder> {
    let tx = conn.transaction()?;
    let before = get_lab_order(&tx, id)?;
    if !can_transition(before.status, status) {
        return Err(DomainError::conflict(format!(
            "cannot move lab order from {} to {}",
            before.status, status
        )));
    }
    let mut order = before.clone();
    order.status = status;
    order.updated_at = Utc::now();
    repository::update_lab_order(&tx, &order)?;
    audit::log(
        &tx,
        actor,
        "lab_order",
        order.id,
        Change::updated(&before, &order)?.as_action("status_change"),
    )?;
    if status == LabOrderStatus::Cancelled {
        release_source_charges(&tx, actor, ChargeSource::LabOrder, order.id)?;
    }
    tx.commit()?;
    Ok(order)
}

pub fn record_result(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    entry: LabResultEntry,
) -> DomainResult<LabOrder> {
    let result_value = required("result_value", &entry.result_value)?;

    let tx = conn.transaction()?;
    let before = get_lab_order(&tx, id)?;
    if !matches!(before.status, LabOrderStatus::Collected | LabOrderStatus::InProgress) {
        return Err(DomainError::conflict(format!(
            "cannot record a result for a lab order in status {}",
            before.status
        )));
    }
    let now = Utc::now();
    let mut order = before.clone();
    order.status = LabOrderStatus::Resulted;
    order.result_value = Some(result_value);
    order.result_unit = optional(entry.result_unit);
    order.reference_range = optional(entry.reference_range);
    order.abnormal_flag = entry.abnormal_flag;
    order.resulted_at = Some(now);
    order.updated_at = now;
    repository::update_lab_order(&tx, &order)?;
    audit::log(&tx, actor, "lab_order", order.id, Change::updated(&before, &order)?.as_action("result"))?;
    tx.commit()?;

    if let Some(flag) = order.abnormal_flag {
        tracing::info!(order = %order.order_number, %flag, "Lab result recorded");
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::tests::{admin, patient};
    use crate::db::sqlite::open_memory_database;
    use crate::hr::tests::provider;
    use crate::models::enums::{AbnormalFlag, OrderPriority};
    use crate::models::ChargeFilter;

    fn order(conn: &mut Connection, code: &str) -> DomainResult<LabOrder> {
        let pid = patient(conn);
        let doc = provider(conn);
        create_lab_order(
            conn,
            &admin(),
            NewLabOrder {
                patient_id: pid,
                ordering_provider_id: doc,
                test_code: code.into(),
                test_name: "Complete blood count".into(),
                priority: OrderPriority::Stat,
                price_cents: 4_200,
            },
        )
    }

    fn unbilled(conn: &Connection, patient_id: Uuid) -> usize {
        repository::list_charges(conn, &ChargeFilter { patient_id: Some(patient_id), unbilled: true })
            .unwrap()
            .len()
    }

    fn result(value: &str) -> LabResultEntry {
        LabResultEntry {
            result_value: value.into(),
            result_unit: Some("g/dL".into()),
            reference_range: Some("12-16".into()),
            abnormal_flag: Some(AbnormalFlag::Low),
        }
    }

    #[test]
    fn test_code_format() {
        assert!(validate_test_code("CBC").is_ok());
        assert!(validate_test_code("HBA1C-2").is_ok());
        assert!(validate_test_code("C").is_err());
        assert!(validate_test_code("cbc").is_err());
        assert!(validate_test_code("ABCDEFGHIJKLMNOPQ").is_err());
        let mut conn = open_memory_database().unwrap();
        assert!(matches!(order(&mut conn, "bad code"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn create_numbers_and_captures_charge() {
        let mut conn = open_memory_database().unwrap();
        let o = order(&mut conn, "CBC").unwrap();
        assert_eq!(o.order_number, "LAB-000001");
        assert_eq!(o.status, LabOrderStatus::Ordered);
        assert_eq!(unbilled(&conn, o.patient_id), 1);
    }

    #[test]
    fn illegal_transitions_conflict() {
        use LabOrderStatus::*;
        assert!(can_transition(Ordered, Collected));
        assert!(can_transition(Collected, InProgress));
        assert!(!can_transition(Ordered, InProgress));
        assert!(!can_transition(InProgress, Cancelled));
        assert!(!can_transition(InProgress, Resulted));
        assert!(!can_transition(Resulted, Cancelled));

        let mut conn = open_memory_database().unwrap();
        let o = order(&mut conn, "CBC").unwrap();
        assert!(matches!(
            change_status(&mut conn, &admin(), &o.id, Resulted),
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            record_result(&mut conn, &admin(), &o.id, result("11.2")),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn result_flow() {
        let mut conn = open_memory_database().unwrap();
        let o = order(&mut conn, "CBC").unwrap();
        change_status(&mut conn, &admin(), &o.id, LabOrderStatus::Collected).unwrap();
        change_status(&mut conn, &admin(), &o.id, LabOrderStatus::InProgress).unwrap();
        assert!(matches!(
            record_result(&mut conn, &admin(), &o.id, result("  ")),
            Err(DomainError::Validation(_))
        ));
        let done = record_result(&mut conn, &admin(), &o.id, result("11.2")).unwrap();
        assert_eq!(done.status, LabOrderStatus::Resulted);
        assert_eq!(done.abnormal_flag, Some(AbnormalFlag::Low));
        assert!(done.resulted_at.is_some());
        // Resulted orders keep their charge
        assert_eq!(unbilled(&conn, o.patient_id), 1);
    }

    #[test]
    fn cancel_releases_unbilled_charge() {
        let mut conn = open_memory_database().unwrap();
        let o = order(&mut conn, "CBC").unwrap();
        change_status(&mut conn, &admin(), &o.id, LabOrderStatus::Cancelled).unwrap();
        assert_eq!(unbilled(&conn, o.patient_id), 0);
    }
}
