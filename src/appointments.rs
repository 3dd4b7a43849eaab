//! Appointment scheduling with per-provider overlap checks.
//!
//! scheduled → checked_in | cancelled | no_show
//! checked_in → completed | cancelled

use chrono::{Datelike, Duration, NaiveDateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::billing::capture_charge;
use crate::db::repository::{self, MAX_APPOINTMENT_MINUTES};
use crate::error::{optional, DomainError, DomainResult};
use crate::hr::require_active_provider;
use crate::models::enums::{AppointmentStatus, ChargeSource};
use crate::models::{
    Appointment, AppointmentFilter, AppointmentStatusChange, AppointmentUpdate, NewAppointment,
    NewCharge,
};
use crate::patients::require_patient;

pub const MIN_APPOINTMENT_MINUTES: u32 = 5;
/// Bookable years. Stored datetimes must stay four-digit so text order
/// matches time order in SQLite.
const BOOKABLE_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use AppointmentStatus::*;
    matches!(
        (from, to),
        (Scheduled, CheckedIn | Cancelled | NoShow) | (CheckedIn, Completed | Cancelled)
    )
}

fn check_duration(minutes: u32) -> DomainResult<()> {
    if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        return Err(DomainError::validation(format!(
            "duration must be {MIN_APPOINTMENT_MINUTES}..={MAX_APPOINTMENT_MINUTES} minutes, got {minutes}"
        )));
    }
    Ok(())
}

fn check_schedule(at: NaiveDateTime) -> DomainResult<()> {
    if !BOOKABLE_YEARS.contains(&at.year()) {
        return Err(DomainError::validation(format!(
            "scheduled_at must fall in years {}..={}, got {at}",
            BOOKABLE_YEARS.start(),
            BOOKABLE_YEARS.end()
        )));
    }
    Ok(())
}

fn check_slot_free(
    conn: &Connection,
    provider_id: &Uuid,
    start: NaiveDateTime,
    minutes: u32,
    exclude: Option<&Uuid>,
) -> DomainResult<()> {
    let end = start
        .checked_add_signed(Duration::minutes(i64::from(minutes)))
        .filter(|end| BOOKABLE_YEARS.contains(&end.year()))
        .ok_or_else(|| DomainError::validation(format!("appointment starting {start} ends out of range")))?;
    let clashes = repository::find_overlapping_appointments(conn, provider_id, start, end, exclude)?;
    if let Some(clash) = clashes.first() {
        return Err(DomainError::conflict(format!(
            "provider is already booked at {} (appointment {})",
            clash.scheduled_at, clash.id
        )));
    }
    Ok(())
}

pub fn create_appointment(
    conn: &mut Connection,
    actor: &Actor,
    new: NewAppointment,
) -> DomainResult<Appointment> {
    check_duration(new.duration_minutes)?;
    check_schedule(new.scheduled_at)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    require_patient(&tx, &new.patient_id)?;
    require_active_provider(&tx, &new.provider_id)?;
    check_slot_free(&tx, &new.provider_id, new.scheduled_at, new.duration_minutes, None)?;

    let now = Utc::now();
    let appointment = Appointment {
        id: Uuid::new_v4(),
        patient_id: new.patient_id,
        provider_id: new.provider_id,
        scheduled_at: new.scheduled_at,
        duration_minutes: new.duration_minutes,
        kind: new.kind,
        status: AppointmentStatus::Scheduled,
        reason: optional(new.reason),
        notes: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_appointment(&tx, &appointment)?;
    audit::log(&tx, actor, "appointment", appointment.id, Change::created(&appointment)?)?;
    tx.commit()?;
    Ok(appointment)
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> DomainResult<Appointment> {
    repository::get_appointment(conn, id)?.ok_or_else(|| DomainError::not_found("Appointment", id))
}

pub fn list_appointments(conn: &Connection, filter: &AppointmentFilter) -> DomainResult<Vec<Appointment>> {
    if filter.date.is_some_and(|day| !BOOKABLE_YEARS.contains(&day.year())) {
        return Ok(Vec::new());
    }
    Ok(repository::list_appointments(conn, filter)?)
}

/// Reschedule or annotate. Only scheduled appointments can move.
pub fn update_appointment(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    update: AppointmentUpdate,
) -> DomainResult<Appointment> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = get_appointment(&tx, id)?;
    if before.status != AppointmentStatus::Scheduled {
        return Err(DomainError::conflict(format!(
            "cannot modify an appointment in status {}",
            before.status
        )));
    }

    let mut appointment = before.clone();
    if let Some(at) = update.scheduled_at {
        check_schedule(at)?;
        appointment.scheduled_at = at;
    }
    if let Some(minutes) = update.duration_minutes {
        check_duration(minutes)?;
        appointment.duration_minutes = minutes;
    }
    if update.reason.is_some() {
        appointment.reason = optional(update.reason);
    }
    if update.notes.is_some() {
        appointment.notes = optional(update.notes);
    }
    if appointment.scheduled_at != before.scheduled_at
        || appointment.duration_minutes != before.duration_minutes
    {
        check_slot_free(
            &tx,
            &appointment.provider_id,
            appointment.scheduled_at,
            appointment.duration_minutes,
            Some(id),
        )?;
    }
    appointment.updated_at = Utc::now();

    repository::update_appointment(&tx, &appointment)?;
    audit::log(&tx, actor, "appointment", appointment.id, Change::updated(&before, &appointment)?)?;
    tx.commit()?;
    Ok(appointment)
}

pub fn change_status(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    change: AppointmentStatusChange,
) -> DomainResult<Appointment> {
    let tx = conn.transaction()?;
    let before = get_appointment(&tx, id)?;
    if !can_transition(before.status, change.status) {
        return Err(DomainError::conflict(format!(
            "cannot move appointment from {} to {}",
            before.status, change.status
        )));
    }
    if change.fee_cents.is_some() && change.status != AppointmentStatus::Completed {
        return Err(DomainError::validation("a fee can only be charged on completion"));
    }

    let mut appointment = before.clone();
    appointment.status = change.status;
    appointment.updated_at = Utc::now();
    repository::update_appointment(&tx, &appointment)?;
    audit::log(
        &tx,
        actor,
        "appointment",
        appointment.id,
        Change::updated(&before, &appointment)?.as_action("status_change"),
    )?;

    if let Some(fee) = change.fee_cents {
        capture_charge(
            &tx,
            actor,
            NewCharge {
                patient_id: appointment.patient_id,
                code: format!("VISIT-{}", appointment.kind.as_str().to_uppercase()),
                description: format!("Visit: {}", appointment.kind.as_str().replace('_', " ")),
                quantity: 1,
                unit_price_cents: fee,
                service_date: Some(appointment.scheduled_at.date()),
            },
            ChargeSource::Appointment,
            Some(appointment.id),
        )?;
    }
    tx.commit()?;
    Ok(appointment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::tests::{admin, patient};
    use crate::db::sqlite::open_memory_database;
    use crate::hr::tests::provider;
    use crate::models::enums::AppointmentKind;
    use crate::models::ChargeFilter;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn book(conn: &mut Connection, pid: Uuid, doc: Uuid, start: NaiveDateTime, minutes: u32) -> DomainResult<Appointment> {
        create_appointment(
            conn,
            &admin(),
            NewAppointment {
                patient_id: pid,
                provider_id: doc,
                scheduled_at: start,
                duration_minutes: minutes,
                kind: AppointmentKind::Consultation,
                reason: Some("Checkup".into()),
            },
        )
    }

    #[test]
    fn transition_table() {
        use AppointmentStatus::*;
        assert!(can_transition(Scheduled, CheckedIn));
        assert!(can_transition(Scheduled, NoShow));
        assert!(can_transition(CheckedIn, Completed));
        assert!(!can_transition(Scheduled, Completed));
        assert!(!can_transition(Completed, Cancelled));
        assert!(!can_transition(Cancelled, Scheduled));
        assert!(!can_transition(NoShow, CheckedIn));
    }

    #[test]
    fn duration_bounds() {
        let mut conn = open_memory_database().unwrap();
        let pid = patient(&mut conn);
        let doc = provider(&mut conn);
        assert!(matches!(book(&mut conn, pid, doc, at(9, 0), 4), Err(DomainError::Validation(_))));
        assert!(matches!(book(&mut conn, pid, doc, at(9, 0), 481), Err(DomainError::Validation(_))));
        assert!(book(&mut conn, pid, doc, at(9, 0), 480).is_ok());
    }

    #[test]
    fn out_of_range_datetimes_are_rejected() {
        let mut conn = open_memory_database().unwrap();
        let pid = patient(&mut conn);
        let doc = provider(&mut conn);
        let last_minute = NaiveDateTime::MAX - Duration::minutes(10);
        assert!(matches!(book(&mut conn, pid, doc, last_minute, 30), Err(DomainError::Validation(_))));
        assert!(matches!(book(&mut conn, pid, doc, NaiveDateTime::MIN, 30), Err(DomainError::Validation(_))));

        // Starts inside the bookable range but would end outside it
        let new_year_eve = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap().and_hms_opt(23, 50, 0).unwrap();
        assert!(matches!(book(&mut conn, pid, doc, new_year_eve, 30), Err(DomainError::Validation(_))));
        assert!(book(&mut conn, pid, doc, new_year_eve, 5).is_ok());

        let a = book(&mut conn, pid, doc, at(9, 0), 30).unwrap();
        let far = AppointmentUpdate { scheduled_at: Some(last_minute), ..Default::default() };
        assert!(matches!(
            update_appointment(&mut conn, &admin(), &a.id, far),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn list_by_extreme_dates() {
        let mut conn = open_memory_database().unwrap();
        let pid = patient(&mut conn);
        let doc = provider(&mut conn);
        book(&mut conn, pid, doc, at(9, 0), 30).unwrap();
        for date in [NaiveDate::MAX, NaiveDate::MIN] {
            let filter = AppointmentFilter { date: Some(date), ..Default::default() };
            assert!(list_appointments(&conn, &filter).unwrap().is_empty());
        }
        let filter = AppointmentFilter { date: Some(at(0, 0).date()), ..Default::default() };
        assert_eq!(list_appointments(&conn, &filter).unwrap().len(), 1);
    }

    #[test]
    fn unknown_patient_or_provider() {
        let mut conn = open_memory_database().unwrap();
        let pid = patient(&mut conn);
        let doc = provider(&mut conn);
        assert!(matches!(
            book(&mut conn, Uuid::new_v4(), doc, at(9, 0), 30),
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            book(&mut conn, pid, Uuid::new_v4(), at(9, 0), 30),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn overlap_is_a_conflict_until_cancelled() {
        let mut conn = open_memory_database().unwrap();
        let pid = patient(&mut conn);
        let doc = provider(&mut conn);
        let first = book(&mut conn, pid, doc, at(9, 0), 30).unwrap();
        assert!(matches!(book(&mut conn, pid, doc, at(9, 15), 30), Err(DomainError::Conflict(_))));
        assert!(matches!(book(&mut conn, pid, doc, at(8, 45), 30), Err(DomainError::Conflict(_))));
        // Back-to-back is fine
        book(&mut conn, pid, doc, at(9, 30), 30).unwrap();
        book(&mut conn, pid, doc, at(8, 30), 30).unwrap();
        // Other providers are independent
        let other = provider(&mut conn);
        book(&mut conn, pid, other, at(9, 0), 30).unwrap();

        change_status(
            &mut conn,
            &admin(),
            &first.id,
            AppointmentStatusChange { status: AppointmentStatus::Cancelled, fee_cents: None },
        )
        .unwrap();
        book(&mut conn, pid, doc, at(9, 0), 30).unwrap();
    }

    #[test]
    fn reschedule_rechecks_overlap() {
        let mut conn = open_memory_database().unwrap();
        let pid = patient(&mut conn);
        let doc = provider(&mut conn);
        let a = book(&mut conn, pid, doc, at(9, 0), 30).unwrap();
        book(&mut conn, pid, doc, at(10, 0), 30).unwrap();

        let clash = AppointmentUpdate { scheduled_at: Some(at(10, 15)), ..Default::default() };
        assert!(matches!(
            update_appointment(&mut conn, &admin(), &a.id, clash),
            Err(DomainError::Conflict(_))
        ));
        // Extending its own slot does not clash with itself
        let longer = AppointmentUpdate { duration_minutes: Some(60), ..Default::default() };
        let moved = update_appointment(&mut conn, &admin(), &a.id, longer).unwrap();
        assert_eq!(moved.duration_minutes, 60);
    }

    #[test]
    fn completing_with_fee_captures_charge() {
        let mut conn = open_memory_database().unwrap();
        let pid = patient(&mut conn);
        let doc = provider(&mut conn);
        let a = book(&mut conn, pid, doc, at(9, 0), 30).unwrap();

        assert!(matches!(
            change_status(
                &mut conn,
                &admin(),
                &a.id,
                AppointmentStatusChange { status: AppointmentStatus::Completed, fee_cents: None },
            ),
            Err(DomainError::Conflict(_))
        ));
        change_status(
            &mut conn,
            &admin(),
            &a.id,
            AppointmentStatusChange { status: AppointmentStatus::CheckedIn, fee_cents: None },
        )
        .unwrap();
        let done = change_status(
            &mut conn,
            &admin(),
            &a.id,
            AppointmentStatusChange { status: AppointmentStatus::Completed, fee_cents: Some(7_500) },
        )
        .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);

        let charges = repository::list_charges(
            &conn,
            &ChargeFilter { patient_id: Some(pid), unbilled: true },
        )
        .unwrap();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].code, "VISIT-CONSULTATION");
        assert_eq!(charges[0].source_id, Some(a.id));
        assert_eq!(charges[0].unit_price_cents, 7_500);

        // Modifying a completed appointment is a conflict
        assert!(matches!(
            update_appointment(&mut conn, &admin(), &a.id, AppointmentUpdate::default()),
            Err(DomainError::Conflict(_))
        ));
    }
}
