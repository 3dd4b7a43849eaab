use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{opt_uuid_at, uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::enums::ChargeSource;
use crate::models::{Bill, BillFilter, Charge, ChargeFilter, Payment};

// ═══════════════════════════════════════════════════════════
// Charges
// ═══════════════════════════════════════════════════════════

const CHARGE_COLUMNS: &str = "id, patient_id, code, description, quantity, unit_price_cents,
     service_date, source, source_id, bill_id, created_at";

fn charge_from_row(row: &Row<'_>) -> rusqlite::Result<Charge> {
    Ok(Charge {
        id: uuid_at(row, 0)?,
        patient_id: uuid_at(row, 1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        quantity: row.get(4)?,
        unit_price_cents: row.get(5)?,
        service_date: row.get(6)?,
        source: row.get(7)?,
        source_id: opt_uuid_at(row, 8)?,
        bill_id: opt_uuid_at(row, 9)?,
        created_at: row.get(10)?,
    })
}

pub fn insert_charge(conn: &Connection, c: &Charge) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO charges ({CHARGE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            c.id.to_string(),
            c.patient_id.to_string(),
            c.code,
            c.description,
            c.quantity,
            c.unit_price_cents,
            c.service_date,
            c.source,
            c.source_id.map(|id| id.to_string()),
            c.bill_id.map(|id| id.to_string()),
            c.created_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn list_charges(conn: &Connection, filter: &ChargeFilter) -> Result<Vec<Charge>, DatabaseError> {
    let mut q = FilterQuery::new(&format!("SELECT {CHARGE_COLUMNS} FROM charges WHERE 1=1"));
    q.and_opt("patient_id = ?", filter.patient_id.map(|id| id.to_string()));
    if filter.unbilled {
        q.raw("bill_id IS NULL");
    }
    q.tail("ORDER BY service_date, created_at");

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), charge_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn charges_for_bill(conn: &Connection, bill_id: &Uuid) -> Result<Vec<Charge>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHARGE_COLUMNS} FROM charges WHERE bill_id = ?1 ORDER BY service_date, created_at"
    ))?;
    let rows = stmt.query_map(params![bill_id.to_string()], charge_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Attach every unbilled charge of the patient to `bill_id`. Returns the count.
pub fn attach_unbilled_charges(
    conn: &Connection,
    patient_id: &Uuid,
    bill_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let attached = conn.execute(
        "UPDATE charges SET bill_id = ?2 WHERE patient_id = ?1 AND bill_id IS NULL",
        params![patient_id.to_string(), bill_id.to_string()],
    )?;
    Ok(attached)
}

/// Detach all charges from a bill so they can be billed again.
pub fn release_bill_charges(conn: &Connection, bill_id: &Uuid) -> Result<usize, DatabaseError> {
    let released = conn.execute(
        "UPDATE charges SET bill_id = NULL WHERE bill_id = ?1",
        params![bill_id.to_string()],
    )?;
    Ok(released)
}

/// Remove the not-yet-billed charge captured for a clinical source
/// (e.g. a cancelled order). Billed charges are left alone.
pub fn delete_unbilled_source_charges(
    conn: &Connection,
    source: ChargeSource,
    source_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM charges WHERE source = ?1 AND source_id = ?2 AND bill_id IS NULL",
        params![source, source_id.to_string()],
    )?;
    Ok(deleted)
}

// ═══════════════════════════════════════════════════════════
// Bills
// ═══════════════════════════════════════════════════════════

const BILL_COLUMNS: &str = "id, bill_number, patient_id, status, discount_kind, discount_value,
     subtotal_cents, discount_cents, total_cents, amount_paid_cents, issued_at, paid_at,
     created_at, updated_at";

fn bill_from_row(row: &Row<'_>) -> rusqlite::Result<Bill> {
    Ok(Bill {
        id: uuid_at(row, 0)?,
        bill_number: row.get(1)?,
        patient_id: uuid_at(row, 2)?,
        status: row.get(3)?,
        discount_kind: row.get(4)?,
        discount_value: row.get(5)?,
        subtotal_cents: row.get(6)?,
        discount_cents: row.get(7)?,
        total_cents: row.get(8)?,
        amount_paid_cents: row.get(9)?,
        issued_at: row.get(10)?,
        paid_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub fn insert_bill(conn: &Connection, b: &Bill) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO bills ({BILL_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            b.id.to_string(),
            b.bill_number,
            b.patient_id.to_string(),
            b.status,
            b.discount_kind,
            b.discount_value,
            b.subtotal_cents,
            b.discount_cents,
            b.total_cents,
            b.amount_paid_cents,
            b.issued_at,
            b.paid_at,
            b.created_at,
            b.updated_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_bill(conn: &Connection, id: &Uuid) -> Result<Option<Bill>, DatabaseError> {
    let bill = conn
        .query_row(
            &format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = ?1"),
            params![id.to_string()],
            bill_from_row,
        )
        .optional()?;
    Ok(bill)
}

pub fn list_bills(conn: &Connection, filter: &BillFilter) -> Result<Vec<Bill>, DatabaseError> {
    let mut q = FilterQuery::new(&format!("SELECT {BILL_COLUMNS} FROM bills WHERE 1=1"));
    q.and_opt("patient_id = ?", filter.patient_id.map(|id| id.to_string()))
        .and_opt("status = ?", filter.status)
        .tail("ORDER BY created_at DESC");

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), bill_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_bill(conn: &Connection, b: &Bill) -> Result<(), DatabaseError> {
    let updated = conn
        .execute(
            "UPDATE bills SET bill_number = ?2, status = ?3, amount_paid_cents = ?4,
             issued_at = ?5, paid_at = ?6, updated_at = ?7 WHERE id = ?1",
            params![
                b.id.to_string(),
                b.bill_number,
                b.status,
                b.amount_paid_cents,
                b.issued_at,
                b.paid_at,
                b.updated_at,
            ],
        )
        .map_err(DatabaseError::from_write)?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Bill", b.id));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Payments
// ═══════════════════════════════════════════════════════════

pub fn insert_payment(conn: &Connection, p: &Payment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO payments (id, bill_id, amount_cents, method, reference, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            p.id.to_string(),
            p.bill_id.to_string(),
            p.amount_cents,
            p.method,
            p.reference,
            p.received_at,
        ],
    )?;
    Ok(())
}

pub fn payments_for_bill(conn: &Connection, bill_id: &Uuid) -> Result<Vec<Payment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, bill_id, amount_cents, method, reference, received_at
         FROM payments WHERE bill_id = ?1 ORDER BY received_at",
    )?;
    let rows = stmt.query_map(params![bill_id.to_string()], |row| {
        Ok(Payment {
            id: uuid_at(row, 0)?,
            bill_id: uuid_at(row, 1)?,
            amount_cents: row.get(2)?,
            method: row.get(3)?,
            reference: row.get(4)?,
            received_at: row.get(5)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
