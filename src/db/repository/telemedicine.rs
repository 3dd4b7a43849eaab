use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{SessionFilter, TelemedicineSession};

const SESSION_COLUMNS: &str = "id, appointment_id, patient_id, provider_id, room_id, status,
     started_at, ended_at, created_at, updated_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<TelemedicineSession> {
    Ok(TelemedicineSession {
        id: uuid_at(row, 0)?,
        appointment_id: uuid_at(row, 1)?,
        patient_id: uuid_at(row, 2)?,
        provider_id: uuid_at(row, 3)?,
        room_id: row.get(4)?,
        status: row.get(5)?,
        started_at: row.get(6)?,
        ended_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn insert_session(conn: &Connection, s: &TelemedicineSession) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO telemedicine_sessions ({SESSION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            s.id.to_string(),
            s.appointment_id.to_string(),
            s.patient_id.to_string(),
            s.provider_id.to_string(),
            s.room_id,
            s.status,
            s.started_at,
            s.ended_at,
            s.created_at,
            s.updated_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_session(conn: &Connection, id: &Uuid) -> Result<Option<TelemedicineSession>, DatabaseError> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM telemedicine_sessions WHERE id = ?1"),
            params![id.to_string()],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

pub fn get_session_for_appointment(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<TelemedicineSession>, DatabaseError> {
    let session = conn
        .query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM telemedicine_sessions WHERE appointment_id = ?1"
            ),
            params![appointment_id.to_string()],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

pub fn list_sessions(
    conn: &Connection,
    filter: &SessionFilter,
) -> Result<Vec<TelemedicineSession>, DatabaseError> {
    let mut q = FilterQuery::new(&format!(
        "SELECT {SESSION_COLUMNS} FROM telemedicine_sessions WHERE 1=1"
    ));
    q.and_opt("patient_id = ?", filter.patient_id.map(|id| id.to_string()))
        .and_opt("provider_id = ?", filter.provider_id.map(|id| id.to_string()))
        .and_opt("status = ?", filter.status)
        .tail("ORDER BY created_at DESC");

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), session_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_session(conn: &Connection, s: &TelemedicineSession) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE telemedicine_sessions SET status = ?2, started_at = ?3, ended_at = ?4,
         updated_at = ?5 WHERE id = ?1",
        params![s.id.to_string(), s.status, s.started_at, s.ended_at, s.updated_at],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("TelemedicineSession", s.id));
    }
    Ok(())
}
