//! Pharmacy: drug inventory and prescriptions.
//!
//! A prescription allows `refills + 1` fills. Each dispense draws the full
//! quantity from stock and captures a pharmacy charge.

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::billing::calculator::format_sequence;
use crate::billing::{capture_charge, validate_charge_code};
use crate::db::repository;
use crate::error::{required, DomainError, DomainResult};
use crate::hr::require_employee;
use crate::models::enums::{ChargeSource, PrescriptionStatus};
use crate::models::{
    DispenseResult, InventoryItem, InventoryRestock, NewCharge, NewPrescription, Prescription,
    PrescriptionFilter,
};
use crate::patients::require_patient;

pub const RX_PREFIX: &str = "RX";
pub const MAX_REFILLS: u32 = 12;

// ═══════════════════════════════════════════════════════════
// Inventory
// ═══════════════════════════════════════════════════════════

pub fn list_inventory(conn: &Connection) -> DomainResult<Vec<InventoryItem>> {
    Ok(repository::list_inventory(conn)?)
}

/// Create or restock an inventory line. Name and price are overwritten,
/// `add_stock` is added to the current level.
pub fn restock(conn: &mut Connection, actor: &Actor, input: InventoryRestock) -> DomainResult<InventoryItem> {
    let drug_code = input.drug_code.trim().to_string();
    validate_charge_code(&drug_code)?;
    let drug_name = required("drug_name", &input.drug_name)?;
    if input.unit_price_cents < 0 {
        return Err(DomainError::validation("unit price must not be negative"));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = repository::get_inventory_item(&tx, &drug_code)?;
    let current = before.as_ref().map_or(0, |item| item.stock);
    let stock = current
        .checked_add(input.add_stock)
        .ok_or_else(|| DomainError::validation("stock level overflows"))?;
    let item = InventoryItem {
        drug_code,
        drug_name,
        stock,
        unit_price_cents: input.unit_price_cents,
        updated_at: Utc::now(),
    };
    repository::upsert_inventory_item(&tx, &item)?;
    let change = match &before {
        Some(before) => Change::updated(before, &item)?.as_action("restock"),
        None => Change::created(&item)?,
    };
    audit::log(&tx, actor, "inventory", &item.drug_code, change)?;
    tx.commit()?;
    Ok(item)
}

// ═══════════════════════════════════════════════════════════
// Prescriptions
// ═══════════════════════════════════════════════════════════

pub fn create_prescription(
    conn: &mut Connection,
    actor: &Actor,
    new: NewPrescription,
) -> DomainResult<Prescription> {
    let drug_code = new.drug_code.trim().to_string();
    validate_charge_code(&drug_code)?;
    let drug_name = required("drug_name", &new.drug_name)?;
    let dose = required("dose", &new.dose)?;
    let frequency = required("frequency", &new.frequency)?;
    if new.quantity == 0 {
        return Err(DomainError::validation("quantity must be greater than 0"));
    }
    if new.refills > MAX_REFILLS {
        return Err(DomainError::validation(format!(
            "refills must be 0..={MAX_REFILLS}, got {}",
            new.refills
        )));
    }

    let tx = conn.transaction()?;
    require_patient(&tx, &new.patient_id)?;
    require_employee(&tx, &new.prescriber_id)?;
    let seq = repository::next_sequence_value(&tx, repository::SEQ_PRESCRIPTION)?;
    let now = Utc::now();
    let rx = Prescription {
        id: Uuid::new_v4(),
        rx_number: format_sequence(RX_PREFIX, seq, 6),
        patient_id: new.patient_id,
        prescriber_id: new.prescriber_id,
        drug_code,
        drug_name,
        dose,
        frequency,
        quantity: new.quantity,
        refills: new.refills,
        fills_dispensed: 0,
        status: PrescriptionStatus::Active,
        created_at: now,
        updated_at: now,
    };
    repository::insert_prescription(&tx, &rx)?;
    audit::log(&tx, actor, "prescription", rx.id, Change::created(&rx)?)?;
    tx.commit()?;
    Ok(rx)
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> DomainResult<Prescription> {
    repository::get_prescription(conn, id)?.ok_or_else(|| DomainError::not_found("Prescription", id))
}

pub fn list_prescriptions(conn: &Connection, filter: &PrescriptionFilter) -> DomainResult<Vec<Prescription>> {
    Ok(repository::list_prescriptions(conn, filter)?)
}

pub fn cancel_prescription(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<Prescription> {
    let tx = conn.transaction()?;
    let before = get_prescription(&tx, id)?;
    if before.status != PrescriptionStatus::Active {
        return Err(DomainError::conflict(format!(
            "cannot cancel a prescription in status {}",
            before.status
        )));
    }
    let mut rx = before.clone();
    rx.status = PrescriptionStatus::Cancelled;
    rx.updated_at = Utc::now();
    repository::update_prescription(&tx, &rx)?;
    audit::log(&tx, actor, "prescription", rx.id, Change::updated(&before, &rx)?.as_action("cancel"))?;
    tx.commit()?;
    Ok(rx)
}

/// Fill an active prescription from stock.
pub fn dispense(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<DispenseResult> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = get_prescription(&tx, id)?;
    if before.status != PrescriptionStatus::Active {
        return Err(DomainError::conflict(format!(
            "cannot dispense a prescription in status {}",
            before.status
        )));
    }
    let item = repository::get_inventory_item(&tx, &before.drug_code)?
        .ok_or_else(|| DomainError::not_found("InventoryItem", &before.drug_code))?;
    if item.stock < before.quantity {
        return Err(DomainError::conflict(format!(
            "insufficient stock for {}: {} on hand, {} required",
            item.drug_code, item.stock, before.quantity
        )));
    }

    let now = Utc::now();
    if !repository::decrement_stock(&tx, &item.drug_code, before.quantity, now)? {
        return Err(DomainError::conflict(format!("insufficient stock for {}", item.drug_code)));
    }

    let mut rx = before.clone();
    rx.fills_dispensed += 1;
    if rx.fills_dispensed >= rx.fills_allowed() {
        rx.status = PrescriptionStatus::Completed;
    }
    rx.updated_at = now;
    repository::update_prescription(&tx, &rx)?;
    audit::log(&tx, actor, "prescription", rx.id, Change::updated(&before, &rx)?.as_action("dispense"))?;

    let charge = capture_charge(
        &tx,
        actor,
        NewCharge {
            patient_id: rx.patient_id,
            code: rx.drug_code.clone(),
            description: format!("{} {}", rx.rx_number, rx.drug_name),
            quantity: rx.quantity,
            unit_price_cents: item.unit_price_cents,
            service_date: Some(now.date_naive()),
        },
        ChargeSource::Pharmacy,
        Some(rx.id),
    )?;
    tx.commit()?;

    let remaining_stock = item.stock - rx.quantity;
    tracing::info!(
        rx = %rx.rx_number,
        fill = rx.fills_dispensed,
        remaining_stock,
        "Prescription dispensed"
    );
    Ok(DispenseResult {
        prescription: rx,
        remaining_stock,
        charge_id: charge.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::tests::{admin, patient};
    use crate::db::sqlite::open_memory_database;
    use crate::hr::tests::provider;

    fn stock(conn: &mut Connection, code: &str, add: u32) -> InventoryItem {
        restock(
            conn,
            &admin(),
            InventoryRestock {
                drug_code: code.into(),
                drug_name: "Amoxicillin 500mg".into(),
                add_stock: add,
                unit_price_cents: 35,
            },
        )
        .unwrap()
    }

    fn prescribe(conn: &mut Connection, quantity: u32, refills: u32) -> DomainResult<Prescription> {
        let pid = patient(conn);
        let doc = provider(conn);
        create_prescription(
            conn,
            &admin(),
            NewPrescription {
                patient_id: pid,
                prescriber_id: doc,
                drug_code: "AMOX500".into(),
                drug_name: "Amoxicillin".into(),
                dose: "500 mg".into(),
                frequency: "TID".into(),
                quantity,
                refills,
            },
        )
    }

    #[test]
    fn restock_adds_to_existing_level() {
        let mut conn = open_memory_database().unwrap();
        assert_eq!(stock(&mut conn, "AMOX500", 10).stock, 10);
        assert_eq!(stock(&mut conn, "AMOX500", 5).stock, 15);
        assert_eq!(list_inventory(&conn).unwrap().len(), 1);
    }

    #[test]
    fn prescription_validation() {
        let mut conn = open_memory_database().unwrap();
        assert!(matches!(prescribe(&mut conn, 0, 0), Err(DomainError::Validation(_))));
        assert!(matches!(prescribe(&mut conn, 10, 13), Err(DomainError::Validation(_))));
        let rx = prescribe(&mut conn, 10, 12).unwrap();
        assert_eq!(rx.rx_number, "RX-000001");
    }

    #[test]
    fn dispense_until_refills_exhausted() {
        let mut conn = open_memory_database().unwrap();
        stock(&mut conn, "AMOX500", 25);
        let rx = prescribe(&mut conn, 10, 1).unwrap();

        let first = dispense(&mut conn, &admin(), &rx.id).unwrap();
        assert_eq!(first.remaining_stock, 15);
        assert_eq!(first.prescription.refills_used(), 0);
        assert_eq!(first.prescription.status, PrescriptionStatus::Active);

        let second = dispense(&mut conn, &admin(), &rx.id).unwrap();
        assert_eq!(second.remaining_stock, 5);
        assert_eq!(second.prescription.refills_used(), 1);
        assert_eq!(second.prescription.status, PrescriptionStatus::Completed);

        assert!(matches!(
            dispense(&mut conn, &admin(), &rx.id),
            Err(DomainError::Conflict(_))
        ));

        let charge = repository::list_charges(&conn, &Default::default())
            .unwrap()
            .into_iter()
            .find(|c| c.id == second.charge_id)
            .unwrap();
        assert_eq!(charge.quantity, 10);
        assert_eq!(charge.unit_price_cents, 35);
        assert_eq!(charge.source, ChargeSource::Pharmacy);
    }

    #[test]
    fn dispense_needs_inventory_and_stock() {
        let mut conn = open_memory_database().unwrap();
        let rx = prescribe(&mut conn, 10, 0).unwrap();
        assert!(matches!(
            dispense(&mut conn, &admin(), &rx.id),
            Err(DomainError::NotFound { .. })
        ));
        stock(&mut conn, "AMOX500", 9);
        assert!(matches!(
            dispense(&mut conn, &admin(), &rx.id),
            Err(DomainError::Conflict(_))
        ));
        // Nothing was taken from stock
        assert_eq!(repository::get_inventory_item(&conn, "AMOX500").unwrap().unwrap().stock, 9);
    }

    #[test]
    fn cancel_only_active() {
        let mut conn = open_memory_database().unwrap();
        let rx = prescribe(&mut conn, 10, 0).unwrap();
        cancel_prescription(&mut conn, &admin(), &rx.id).unwrap();
        assert!(matches!(
            cancel_prescription(&mut conn, &admin(), &rx.id),
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            dispense(&mut conn, &admin(), &rx.id),
            Err(DomainError::Conflict(_))
        ));
    }
}
