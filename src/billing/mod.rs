//! Charge capture and bills.
//!
//! Clinical operations capture charges as they happen. A bill sweeps up
//! the patient's unbilled charges, then moves draft → issued → paid, or
//! to void while no payment has been taken.

pub mod calculator;
mod charges;

pub use charges::*;

use chrono::{Datelike, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::db::repository;
use crate::error::{optional, DomainError, DomainResult};
use crate::models::enums::BillStatus;
use crate::models::{Bill, BillDetail, BillFilter, Charge, ChargeFilter, NewPayment, Payment};
use calculator::{calculate, format_document_number, BillTotals, Discount, LineItem};

pub const BILL_NUMBER_PREFIX: &str = "INV";

#[derive(Debug, Clone, Deserialize)]
pub struct NewBill {
    pub patient_id: Uuid,
    #[serde(default)]
    pub discount: Discount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub lines: Vec<LineItem>,
    #[serde(default)]
    pub discount: Discount,
}

/// Totals for ad-hoc lines. Writes nothing.
pub fn quote(request: &QuoteRequest) -> DomainResult<BillTotals> {
    calculate(&request.lines, request.discount)
}

pub fn create_bill(conn: &mut Connection, actor: &Actor, new: NewBill) -> DomainResult<BillDetail> {
    new.discount.validate()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !repository::patient_exists(&tx, &new.patient_id)? {
        return Err(DomainError::not_found("Patient", new.patient_id));
    }

    let filter = ChargeFilter {
        patient_id: Some(new.patient_id),
        unbilled: true,
    };
    let charges = repository::list_charges(&tx, &filter)?;
    if charges.is_empty() {
        return Err(DomainError::validation("patient has no unbilled charges"));
    }
    let lines: Vec<LineItem> = charges.iter().map(LineItem::from).collect();
    let totals = calculate(&lines, new.discount)?;

    let now = Utc::now();
    let bill = Bill {
        id: Uuid::new_v4(),
        bill_number: None,
        patient_id: new.patient_id,
        status: BillStatus::Draft,
        discount_kind: new.discount.kind(),
        discount_value: new.discount.value(),
        subtotal_cents: totals.subtotal_cents,
        discount_cents: totals.discount_cents,
        total_cents: totals.total_cents,
        amount_paid_cents: 0,
        issued_at: None,
        paid_at: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_bill(&tx, &bill)?;
    let attached = repository::attach_unbilled_charges(&tx, &new.patient_id, &bill.id)?;
    if attached != charges.len() {
        return Err(DomainError::conflict("unbilled charges changed while billing"));
    }
    audit::log(&tx, actor, "bill", bill.id, Change::created(&bill)?)?;
    tx.commit()?;

    tracing::info!(bill_id = %bill.id, total_cents = bill.total_cents, "Draft bill created");
    get_bill(conn, &bill.id)
}

fn detail(bill: Bill, lines: Vec<Charge>, payments: Vec<Payment>) -> BillDetail {
    BillDetail {
        balance_cents: bill.balance_cents(),
        bill,
        lines,
        payments,
    }
}

fn load_bill(conn: &Connection, id: &Uuid) -> DomainResult<Bill> {
    repository::get_bill(conn, id)?.ok_or_else(|| DomainError::not_found("Bill", id))
}

pub fn get_bill(conn: &Connection, id: &Uuid) -> DomainResult<BillDetail> {
    let bill = load_bill(conn, id)?;
    let lines = repository::charges_for_bill(conn, id)?;
    let payments = repository::payments_for_bill(conn, id)?;
    Ok(detail(bill, lines, payments))
}

pub fn list_bills(conn: &Connection, filter: &BillFilter) -> DomainResult<Vec<Bill>> {
    Ok(repository::list_bills(conn, filter)?)
}

/// Draft → issued. Assigns the next `INV-{year}-{seq}` number. A zero-total
/// bill has nothing to collect and is settled on issue.
pub fn issue_bill(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<BillDetail> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = load_bill(&tx, id)?;
    if before.status != BillStatus::Draft {
        return Err(DomainError::conflict(format!(
            "cannot issue a bill in status {}",
            before.status
        )));
    }

    let now = Utc::now();
    let year = now.year();
    let seq = repository::next_sequence_value(&tx, &repository::bill_sequence_name(year))?;
    let mut bill = before.clone();
    bill.bill_number = Some(format_document_number(BILL_NUMBER_PREFIX, year, seq));
    bill.status = BillStatus::Issued;
    bill.issued_at = Some(now);
    bill.updated_at = now;
    if bill.total_cents == 0 {
        bill.status = BillStatus::Paid;
        bill.paid_at = Some(now);
    }
    repository::update_bill(&tx, &bill)?;
    audit::log(&tx, actor, "bill", bill.id, Change::updated(&before, &bill)?.as_action("issue"))?;
    tx.commit()?;

    tracing::info!(bill_id = %bill.id, bill_number = ?bill.bill_number, "Bill issued");
    get_bill(conn, id)
}

pub fn record_payment(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    new: NewPayment,
) -> DomainResult<BillDetail> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = load_bill(&tx, id)?;
    if before.status != BillStatus::Issued {
        return Err(DomainError::conflict(format!(
            "payments are accepted on issued bills only, bill is {}",
            before.status
        )));
    }
    if new.amount_cents <= 0 {
        return Err(DomainError::validation("payment amount must be greater than 0"));
    }
    if new.amount_cents > before.balance_cents() {
        return Err(DomainError::validation(format!(
            "payment of {} exceeds balance of {}",
            new.amount_cents,
            before.balance_cents()
        )));
    }

    let now = Utc::now();
    let payment = Payment {
        id: Uuid::new_v4(),
        bill_id: before.id,
        amount_cents: new.amount_cents,
        method: new.method,
        reference: optional(new.reference),
        received_at: now,
    };
    repository::insert_payment(&tx, &payment)?;

    let mut bill = before.clone();
    bill.amount_paid_cents += payment.amount_cents;
    bill.updated_at = now;
    if bill.balance_cents() == 0 {
        bill.status = BillStatus::Paid;
        bill.paid_at = Some(now);
    }
    repository::update_bill(&tx, &bill)?;
    audit::log(&tx, actor, "bill", bill.id, Change::updated(&before, &bill)?.as_action("payment"))?;
    tx.commit()?;

    get_bill(conn, id)
}

/// Draft or issued bills with no payments can be voided. Their charges
/// become unbilled again.
pub fn void_bill(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<BillDetail> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = load_bill(&tx, id)?;
    if !matches!(before.status, BillStatus::Draft | BillStatus::Issued) {
        return Err(DomainError::conflict(format!(
            "cannot void a bill in status {}",
            before.status
        )));
    }
    if !repository::payments_for_bill(&tx, id)?.is_empty() {
        return Err(DomainError::conflict("cannot void a bill with payments"));
    }

    let released = repository::release_bill_charges(&tx, id)?;
    let mut bill = before.clone();
    bill.status = BillStatus::Void;
    bill.updated_at = Utc::now();
    repository::update_bill(&tx, &bill)?;
    audit::log(&tx, actor, "bill", bill.id, Change::updated(&before, &bill)?.as_action("void"))?;
    tx.commit()?;

    tracing::info!(bill_id = %bill.id, released, "Bill voided");
    get_bill(conn, id)
}
