//! Video visit sessions attached to telemedicine appointments.
//!
//! scheduled → active (start) | cancelled
//! active → ended (end)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::db::repository;
use crate::error::{DomainError, DomainResult};
use crate::models::enums::{AppointmentKind, AppointmentStatus, SessionStatus};
use crate::models::{NewTelemedicineSession, SessionFilter, TelemedicineSession};

/// Session as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: TelemedicineSession,
    pub duration_minutes: Option<i64>,
}

impl From<TelemedicineSession> for SessionView {
    fn from(session: TelemedicineSession) -> Self {
        Self {
            duration_minutes: session.duration_minutes(),
            session,
        }
    }
}

/// Random URL-safe room identifier (128 bits).
fn new_room_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn create_session(
    conn: &mut Connection,
    actor: &Actor,
    new: NewTelemedicineSession,
) -> DomainResult<SessionView> {
    let tx = conn.transaction()?;
    let appointment = repository::get_appointment(&tx, &new.appointment_id)?
        .ok_or_else(|| DomainError::not_found("Appointment", new.appointment_id))?;
    if appointment.kind != AppointmentKind::Telemedicine {
        return Err(DomainError::conflict(format!(
            "appointment {} is a {} visit, not telemedicine",
            appointment.id, appointment.kind
        )));
    }
    if !matches!(
        appointment.status,
        AppointmentStatus::Scheduled | AppointmentStatus::CheckedIn
    ) {
        return Err(DomainError::conflict(format!(
            "appointment {} is {}",
            appointment.id, appointment.status
        )));
    }
    if repository::get_session_for_appointment(&tx, &appointment.id)?.is_some() {
        return Err(DomainError::conflict(format!(
            "appointment {} already has a session",
            appointment.id
        )));
    }

    let now = Utc::now();
    let session = TelemedicineSession {
        id: Uuid::new_v4(),
        appointment_id: appointment.id,
        patient_id: appointment.patient_id,
        provider_id: appointment.provider_id,
        room_id: new_room_id(),
        status: SessionStatus::Scheduled,
        started_at: None,
        ended_at: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_session(&tx, &session)?;
    audit::log(&tx, actor, "telemedicine_session", session.id, Change::created(&session)?)?;
    tx.commit()?;
    Ok(session.into())
}

fn load(conn: &Connection, id: &Uuid) -> DomainResult<TelemedicineSession> {
    repository::get_session(conn, id)?.ok_or_else(|| DomainError::not_found("TelemedicineSession", id))
}

pub fn get_session(conn: &Connection, id: &Uuid) -> DomainResult<SessionView> {
    load(conn, id).map(SessionView::from)
}

pub fn list_sessions(conn: &Connection, filter: &SessionFilter) -> DomainResult<Vec<SessionView>> {
    Ok(repository::list_sessions(conn, filter)?
        .into_iter()
        .map(SessionView::from)
        .collect())
}

fn transition(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    from: SessionStatus,
    to: SessionStatus,
    action: &'static str,
) -> DomainResult<SessionView> {
    let tx = conn.transaction()?;
    let before = load(&tx, id)?;
    if before.status != from {
        return Err(DomainError::conflict(format!(
            "cannot {action} a session in status {}",
            before.status
        )));
    }
    let now = Utc::now();
    let mut session = before.clone();
    session.status = to;
    match to {
        SessionStatus::Active => session.started_at = Some(now),
        SessionStatus::Ended => session.ended_at = Some(now),
        _ => {}
    }
    session.updated_at = now;
    repository::update_session(&tx, &session)?;
    audit::log(
        &tx,
        actor,
        "telemedicine_session",
        session.id,
        Change::updated(&before, &session)?.as_action(action),
    )?;
    tx.commit()?;
    Ok(session.into())
}

pub fn start_session(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<SessionView> {
    transition(conn, actor, id, SessionStatus::Scheduled, SessionStatus::Active, "start")
}

pub fn end_session(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<SessionView> {
    transition(conn, actor, id, SessionStatus::Active, SessionStatus::Ended, "end")
}

pub fn cancel_session(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<SessionView> {
    transition(conn, actor, id, SessionStatus::Scheduled, SessionStatus::Cancelled, "cancel")
}
