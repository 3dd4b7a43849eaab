use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{opt_uuid_at, uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{RadiologyOrder, RadiologyOrderFilter};

const RADIOLOGY_COLUMNS: &str = "id, order_number, patient_id, ordering_provider_id, modality,
     body_part, priority, status, price_cents, clinical_indication, findings, impression,
     reported_by, reported_at, created_at, updated_at";

fn radiology_order_from_row(row: &Row<'_>) -> rusqlite::Result<RadiologyOrder> {
    Ok(RadiologyOrder {
        id: uuid_at(row, 0)?,
        order_number: row.get(1)?,
        patient_id: uuid_at(row, 2)?,
        ordering_provider_id: uuid_at(row, 3)?,
        modality: row.get(4)?,
        body_part: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        price_cents: row.get(8)?,
        clinical_indication: row.get(9)?,
        findings: row.get(10)?,
        impression: row.get(11)?,
        reported_by: opt_uuid_at(row, 12)?,
        reported_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub fn insert_radiology_order(conn: &Connection, o: &RadiologyOrder) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO radiology_orders ({RADIOLOGY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            o.id.to_string(),
            o.order_number,
            o.patient_id.to_string(),
            o.ordering_provider_id.to_string(),
            o.modality,
            o.body_part,
            o.priority,
            o.status,
            o.price_cents,
            o.clinical_indication,
            o.findings,
            o.impression,
            o.reported_by.map(|id| id.to_string()),
            o.reported_at,
            o.created_at,
            o.updated_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_radiology_order(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<RadiologyOrder>, DatabaseError> {
    let order = conn
        .query_row(
            &format!("SELECT {RADIOLOGY_COLUMNS} FROM radiology_orders WHERE id = ?1"),
            params![id.to_string()],
            radiology_order_from_row,
        )
        .optional()?;
    Ok(order)
}

pub fn list_radiology_orders(
    conn: &Connection,
    filter: &RadiologyOrderFilter,
) -> Result<Vec<RadiologyOrder>, DatabaseError> {
    let mut q = FilterQuery::new(&format!(
        "SELECT {RADIOLOGY_COLUMNS} FROM radiology_orders WHERE 1=1"
    ));
    q.and_opt("patient_id = ?", filter.patient_id.map(|id| id.to_string()))
        .and_opt("status = ?", filter.status)
        .and_opt("modality = ?", filter.modality)
        .tail("ORDER BY created_at DESC");

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), radiology_order_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_radiology_order(conn: &Connection, o: &RadiologyOrder) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE radiology_orders SET status = ?2, findings = ?3, impression = ?4,
         reported_by = ?5, reported_at = ?6, updated_at = ?7 WHERE id = ?1",
        params![
            o.id.to_string(),
            o.status,
            o.findings,
            o.impression,
            o.reported_by.map(|id| id.to_string()),
            o.reported_at,
            o.updated_at,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("RadiologyOrder", o.id));
    }
    Ok(())
}
