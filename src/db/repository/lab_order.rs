use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{LabOrder, LabOrderFilter};

const LAB_ORDER_COLUMNS: &str = "id, order_number, patient_id, ordering_provider_id, test_code,
     test_name, priority, status, price_cents, result_value, result_unit, reference_range,
     abnormal_flag, resulted_at, created_at, updated_at";

fn lab_order_from_row(row: &Row<'_>) -> rusqlite::Result<LabOrder> {
    Ok(LabOrder {
        id: uuid_at(row, 0)?,
        order_number: row.get(1)?,
        patient_id: uuid_at(row, 2)?,
        ordering_provider_id: uuid_at(row, 3)?,
        test_code: row.get(4)?,
        test_name: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        price_cents: row.get(8)?,
        result_value: row.get(9)?,
        result_unit: row.get(10)?,
        reference_range: row.get(11)?,
        abnormal_flag: row.get(12)?,
        resulted_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub fn insert_lab_order(conn: &Connection, o: &LabOrder) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO lab_orders ({LAB_ORDER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            o.id.to_string(),
            o.order_number,
            o.patient_id.to_string(),
            o.ordering_provider_id.to_string(),
            o.test_code,
            o.test_name,
            o.priority,
            o.status,
            o.price_cents,
            o.result_value,
            o.result_unit,
            o.reference_range,
            o.abnormal_flag,
            o.resulted_at,
            o.created_at,
            o.updated_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_lab_order(conn: &Connection, id: &Uuid) -> Result<Option<LabOrder>, DatabaseError> {
    let order = conn
        .query_row(
            &format!("SELECT {LAB_ORDER_COLUMNS} FROM lab_orders WHERE id = ?1"),
            params![id.to_string()],
            lab_order_from_row,
        )
        .optional()?;
    Ok(order)
}

/// Newest first; STAT and urgent orders are not reordered here.
pub fn list_lab_orders(
    conn: &Connection,
    filter: &LabOrderFilter,
) -> Result<Vec<LabOrder>, DatabaseError> {
    let mut q = FilterQuery::new(&format!("SELECT {LAB_ORDER_COLUMNS} FROM lab_orders WHERE 1=1"));
    q.and_opt("patient_id = ?", filter.patient_id.map(|id| id.to_string()))
        .and_opt("status = ?", filter.status)
        .and_opt("priority = ?", filter.priority)
        .tail("ORDER BY created_at DESC");

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), lab_order_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Persist status and result columns.
pub fn update_lab_order(conn: &Connection, o: &LabOrder) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE lab_orders SET status = ?2, result_value = ?3, result_unit = ?4,
         reference_range = ?5, abnormal_flag = ?6, resulted_at = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            o.id.to_string(),
            o.status,
            o.result_value,
            o.result_unit,
            o.reference_range,
            o.abnormal_flag,
            o.resulted_at,
            o.updated_at,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("LabOrder", o.id));
    }
    Ok(())
}
