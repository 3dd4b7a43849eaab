use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{InventoryItem, Prescription, PrescriptionFilter};

// ═══════════════════════════════════════════════════════════
// Inventory
// ═══════════════════════════════════════════════════════════

fn inventory_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    Ok(InventoryItem {
        drug_code: row.get(0)?,
        drug_name: row.get(1)?,
        stock: row.get(2)?,
        unit_price_cents: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn get_inventory_item(
    conn: &Connection,
    drug_code: &str,
) -> Result<Option<InventoryItem>, DatabaseError> {
    let item = conn
        .query_row(
            "SELECT drug_code, drug_name, stock, unit_price_cents, updated_at
             FROM inventory WHERE drug_code = ?1",
            params![drug_code],
            inventory_from_row,
        )
        .optional()?;
    Ok(item)
}

pub fn list_inventory(conn: &Connection) -> Result<Vec<InventoryItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT drug_code, drug_name, stock, unit_price_cents, updated_at
         FROM inventory ORDER BY drug_name",
    )?;
    let rows = stmt.query_map([], inventory_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Insert or fully overwrite an inventory line.
pub fn upsert_inventory_item(conn: &Connection, item: &InventoryItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO inventory (drug_code, drug_name, stock, unit_price_cents, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(drug_code) DO UPDATE SET drug_name = excluded.drug_name,
             stock = excluded.stock, unit_price_cents = excluded.unit_price_cents,
             updated_at = excluded.updated_at",
        params![
            item.drug_code,
            item.drug_name,
            item.stock,
            item.unit_price_cents,
            item.updated_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

/// Take `quantity` units off the shelf. Returns `false` (and changes
/// nothing) when stock is insufficient.
pub fn decrement_stock(
    conn: &Connection,
    drug_code: &str,
    quantity: u32,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE inventory SET stock = stock - ?2, updated_at = ?3
         WHERE drug_code = ?1 AND stock >= ?2",
        params![drug_code, quantity, at],
    )?;
    Ok(updated > 0)
}

// ═══════════════════════════════════════════════════════════
// Prescriptions
// ═══════════════════════════════════════════════════════════

const PRESCRIPTION_COLUMNS: &str = "id, rx_number, patient_id, prescriber_id, drug_code, drug_name,
     dose, frequency, quantity, refills, fills_dispensed, status, created_at, updated_at";

fn prescription_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: uuid_at(row, 0)?,
        rx_number: row.get(1)?,
        patient_id: uuid_at(row, 2)?,
        prescriber_id: uuid_at(row, 3)?,
        drug_code: row.get(4)?,
        drug_name: row.get(5)?,
        dose: row.get(6)?,
        frequency: row.get(7)?,
        quantity: row.get(8)?,
        refills: row.get(9)?,
        fills_dispensed: row.get(10)?,
        status: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO prescriptions ({PRESCRIPTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            rx.id.to_string(),
            rx.rx_number,
            rx.patient_id.to_string(),
            rx.prescriber_id.to_string(),
            rx.drug_code,
            rx.drug_name,
            rx.dose,
            rx.frequency,
            rx.quantity,
            rx.refills,
            rx.fills_dispensed,
            rx.status,
            rx.created_at,
            rx.updated_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    let rx = conn
        .query_row(
            &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1"),
            params![id.to_string()],
            prescription_from_row,
        )
        .optional()?;
    Ok(rx)
}

pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut q = FilterQuery::new(&format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE 1=1"
    ));
    q.and_opt("patient_id = ?", filter.patient_id.map(|id| id.to_string()))
        .and_opt("status = ?", filter.status)
        .tail("ORDER BY created_at DESC");

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), prescription_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE prescriptions SET fills_dispensed = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
        params![rx.id.to_string(), rx.fills_dispensed, rx.status, rx.updated_at],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Prescription", rx.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::Utc;

    #[test]
    fn decrement_stock_refuses_to_go_negative() {
        let conn = open_memory_database().unwrap();
        upsert_inventory_item(
            &conn,
            &InventoryItem {
                drug_code: "AMOX500".into(),
                drug_name: "Amoxicillin 500mg".into(),
                stock: 10,
                unit_price_cents: 45,
                updated_at: Utc::now(),
            },
        )
        .unwrap();

        assert!(decrement_stock(&conn, "AMOX500", 7, Utc::now()).unwrap());
        assert!(!decrement_stock(&conn, "AMOX500", 7, Utc::now()).unwrap());
        let item = get_inventory_item(&conn, "AMOX500").unwrap().unwrap();
        assert_eq!(item.stock, 3);
        assert!(!decrement_stock(&conn, "UNKNOWN", 1, Utc::now()).unwrap());
    }

    #[test]
    fn upsert_overwrites_existing_line() {
        let conn = open_memory_database().unwrap();
        let mut item = InventoryItem {
            drug_code: "IBU200".into(),
            drug_name: "Ibuprofen".into(),
            stock: 5,
            unit_price_cents: 10,
            updated_at: Utc::now(),
        };
        upsert_inventory_item(&conn, &item).unwrap();
        item.stock = 50;
        item.unit_price_cents = 12;
        upsert_inventory_item(&conn, &item).unwrap();
        let all = list_inventory(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].stock, 50);
        assert_eq!(all[0].unit_price_cents, 12);
    }
}
