use chrono::{Duration, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{Appointment, AppointmentFilter};

/// Longest appointment the scheduler accepts; bounds the overlap scan window.
pub const MAX_APPOINTMENT_MINUTES: u32 = 480;

const APPOINTMENT_COLUMNS: &str = "id, patient_id, provider_id, scheduled_at, duration_minutes,
     kind, status, reason, notes, created_at, updated_at";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: uuid_at(row, 0)?,
        patient_id: uuid_at(row, 1)?,
        provider_id: uuid_at(row, 2)?,
        scheduled_at: row.get(3)?,
        duration_minutes: row.get(4)?,
        kind: row.get(5)?,
        status: row.get(6)?,
        reason: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn insert_appointment(conn: &Connection, a: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            a.id.to_string(),
            a.patient_id.to_string(),
            a.provider_id.to_string(),
            a.scheduled_at,
            a.duration_minutes,
            a.kind,
            a.status,
            a.reason,
            a.notes,
            a.created_at,
            a.updated_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let appointment = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id.to_string()],
            appointment_from_row,
        )
        .optional()?;
    Ok(appointment)
}

pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut q = FilterQuery::new(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE 1=1"
    ));
    q.and_opt("patient_id = ?", filter.patient_id.map(|id| id.to_string()))
        .and_opt("provider_id = ?", filter.provider_id.map(|id| id.to_string()))
        .and_opt("status = ?", filter.status);
    if let Some(day) = filter.date {
        q.and("scheduled_at >= ?", day.and_time(NaiveTime::MIN));
        if let Some(next) = day.succ_opt() {
            q.and("scheduled_at < ?", next.and_time(NaiveTime::MIN));
        }
    }
    q.tail("ORDER BY scheduled_at");

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), appointment_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Provider appointments that still occupy their slot and intersect
/// `[start, end)`. `exclude` skips the appointment being rescheduled.
pub fn find_overlapping_appointments(
    conn: &Connection,
    provider_id: &Uuid,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude: Option<&Uuid>,
) -> Result<Vec<Appointment>, DatabaseError> {
    let window_start = start
        .checked_sub_signed(Duration::minutes(i64::from(MAX_APPOINTMENT_MINUTES)))
        .unwrap_or(NaiveDateTime::MIN);
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE provider_id = ?1 AND scheduled_at < ?2 AND scheduled_at >= ?3
           AND status NOT IN ('cancelled', 'no_show') AND id != ?4"
    ))?;
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
    let rows = stmt.query_map(
        params![provider_id.to_string(), end, window_start, exclude],
        appointment_from_row,
    )?;

    let mut overlapping = Vec::new();
    for row in rows {
        let appt = row?;
        if appt.occupies_slot() && appt.ends_at().map_or(true, |end| end > start) {
            overlapping.push(appt);
        }
    }
    Ok(overlapping)
}

pub fn update_appointment(conn: &Connection, a: &Appointment) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE appointments SET scheduled_at = ?2, duration_minutes = ?3, status = ?4,
         reason = ?5, notes = ?6, updated_at = ?7 WHERE id = ?1",
        params![
            a.id.to_string(),
            a.scheduled_at,
            a.duration_minutes,
            a.status,
            a.reason,
            a.notes,
            a.updated_at,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Appointment", a.id));
    }
    Ok(())
}
