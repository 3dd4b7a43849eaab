use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::Connection;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::db::repository;
use crate::error::{required, DomainError, DomainResult};
use crate::models::enums::ChargeSource;
use crate::models::{Charge, ChargeFilter, NewCharge};

static CHARGE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9._-]{0,31}$").expect("valid charge code pattern"));

pub fn validate_charge_code(code: &str) -> DomainResult<()> {
    if CHARGE_CODE.is_match(code) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "charge code must be 1-32 of A-Z, 0-9, '.', '_', '-': {code}"
        )))
    }
}

/// Insert a charge inside the caller's transaction.
pub(crate) fn capture_charge(
    conn: &Connection,
    actor: &Actor,
    new: NewCharge,
    source: ChargeSource,
    source_id: Option<Uuid>,
) -> DomainResult<Charge> {
    if !repository::patient_exists(conn, &new.patient_id)? {
        return Err(DomainError::not_found("Patient", new.patient_id));
    }
    let code = new.code.trim().to_string();
    validate_charge_code(&code)?;
    if new.quantity == 0 {
        return Err(DomainError::validation("quantity must be greater than 0"));
    }
    if new.unit_price_cents < 0 {
        return Err(DomainError::validation("unit price must not be negative"));
    }

    let now = Utc::now();
    let charge = Charge {
        id: Uuid::new_v4(),
        patient_id: new.patient_id,
        code,
        description: required("description", &new.description)?,
        quantity: new.quantity,
        unit_price_cents: new.unit_price_cents,
        service_date: new.service_date.unwrap_or_else(|| now.date_naive()),
        source,
        source_id,
        bill_id: None,
        created_at: now,
    };
    repository::insert_charge(conn, &charge)?;
    audit::log(conn, actor, "charge", charge.id, Change::created(&charge)?)?;
    Ok(charge)
}

/// Drop the unbilled charge captured for a cancelled clinical source.
pub(crate) fn release_source_charges(
    conn: &Connection,
    actor: &Actor,
    source: ChargeSource,
    source_id: Uuid,
) -> DomainResult<usize> {
    let released = repository::delete_unbilled_source_charges(conn, source, &source_id)?;
    if released > 0 {
        let before = serde_json::json!({ "source": source, "source_id": source_id });
        audit::log(conn, actor, "charge", source_id, Change::deleted(&before)?.as_action("release"))?;
    }
    Ok(released)
}

/// Record a manually entered charge.
pub fn record_charge(conn: &mut Connection, actor: &Actor, new: NewCharge) -> DomainResult<Charge> {
    let tx = conn.transaction()?;
    let charge = capture_charge(&tx, actor, new, ChargeSource::Manual, None)?;
    tx.commit()?;
    Ok(charge)
}

pub fn list_charges(conn: &Connection, filter: &ChargeFilter) -> DomainResult<Vec<Charge>> {
    Ok(repository::list_charges(conn, filter)?)
}
