//! Patient registry: registration, lookup, partial update, soft delete.

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::billing::calculator::format_sequence;
use crate::db::repository;
use crate::error::{check_email, optional, required, DomainError, DomainResult};
use crate::models::{NewPatient, Patient, PatientFilter, PatientUpdate};

pub const MRN_PREFIX: &str = "MRN";
const MRN_WIDTH: usize = 6;

fn earliest_birth_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn check_birth_date(dob: NaiveDate) -> DomainResult<()> {
    let today = Utc::now().date_naive();
    if dob > today {
        return Err(DomainError::validation("date of birth is in the future"));
    }
    if dob < earliest_birth_date() {
        return Err(DomainError::validation("date of birth is before 1900-01-01"));
    }
    Ok(())
}

fn check_email_free(conn: &Connection, email: Option<&str>, exclude: Option<&Uuid>) -> DomainResult<()> {
    let Some(email) = email else {
        return Ok(());
    };
    check_email(email)?;
    if repository::find_patient_id_by_email(conn, email, exclude)?.is_some() {
        return Err(DomainError::conflict(format!(
            "another patient already uses {email}"
        )));
    }
    Ok(())
}

pub fn create_patient(conn: &mut Connection, actor: &Actor, new: NewPatient) -> DomainResult<Patient> {
    let first_name = required("first_name", &new.first_name)?;
    let last_name = required("last_name", &new.last_name)?;
    check_birth_date(new.date_of_birth)?;
    let email = optional(new.email);

    let tx = conn.transaction()?;
    check_email_free(&tx, email.as_deref(), None)?;
    let seq = repository::next_sequence_value(&tx, repository::SEQ_MRN)?;
    let now = Utc::now();
    let patient = Patient {
        id: Uuid::new_v4(),
        mrn: format_sequence(MRN_PREFIX, seq, MRN_WIDTH),
        first_name,
        last_name,
        date_of_birth: new.date_of_birth,
        sex: new.sex,
        phone: optional(new.phone),
        email,
        address: optional(new.address),
        blood_type: optional(new.blood_type),
        emergency_contact: optional(new.emergency_contact),
        notes: optional(new.notes),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    repository::insert_patient(&tx, &patient)?;
    audit::log(&tx, actor, "patient", patient.id, Change::created(&patient)?)?;
    tx.commit()?;

    tracing::info!(patient_id = %patient.id, mrn = %patient.mrn, "Patient registered");
    Ok(patient)
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> DomainResult<Patient> {
    repository::get_patient(conn, id)?.ok_or_else(|| DomainError::not_found("Patient", id))
}

pub fn get_patient_by_mrn(conn: &Connection, mrn: &str) -> DomainResult<Patient> {
    repository::get_patient_by_mrn(conn, mrn)?.ok_or_else(|| DomainError::not_found("Patient", mrn))
}

pub fn list_patients(conn: &Connection, filter: &PatientFilter) -> DomainResult<Vec<Patient>> {
    Ok(repository::list_patients(conn, filter)?)
}

pub fn update_patient(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    update: PatientUpdate,
) -> DomainResult<Patient> {
    let tx = conn.transaction()?;
    let before = get_patient(&tx, id)?;
    let mut patient = before.clone();

    if let Some(first) = update.first_name {
        patient.first_name = required("first_name", &first)?;
    }
    if let Some(last) = update.last_name {
        patient.last_name = required("last_name", &last)?;
    }
    if let Some(dob) = update.date_of_birth {
        check_birth_date(dob)?;
        patient.date_of_birth = dob;
    }
    if let Some(sex) = update.sex {
        patient.sex = sex;
    }
    if update.email.is_some() {
        patient.email = optional(update.email);
        check_email_free(&tx, patient.email.as_deref(), Some(id))?;
    }
    if update.phone.is_some() {
        patient.phone = optional(update.phone);
    }
    if update.address.is_some() {
        patient.address = optional(update.address);
    }
    if update.blood_type.is_some() {
        patient.blood_type = optional(update.blood_type);
    }
    if update.emergency_contact.is_some() {
        patient.emergency_contact = optional(update.emergency_contact);
    }
    if update.notes.is_some() {
        patient.notes = optional(update.notes);
    }
    patient.updated_at = Utc::now();

    repository::update_patient(&tx, &patient)?;
    audit::log(&tx, actor, "patient", patient.id, Change::updated(&before, &patient)?)?;
    tx.commit()?;
    Ok(patient)
}

pub fn delete_patient(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<()> {
    let tx = conn.transaction()?;
    let before = get_patient(&tx, id)?;
    repository::soft_delete_patient(&tx, id, Utc::now())?;
    audit::log(&tx, actor, "patient", id, Change::deleted(&before)?)?;
    tx.commit()?;
    tracing::info!(patient_id = %id, "Patient soft-deleted");
    Ok(())
}

/// Fails with `NotFound` unless the patient is live.
pub(crate) fn require_patient(conn: &Connection, id: &Uuid) -> DomainResult<()> {
    if repository::patient_exists(conn, id)? {
        Ok(())
    } else {
        Err(DomainError::not_found("Patient", id))
    }
}
