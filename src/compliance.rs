//! Audit and access-log queries, per-patient access reports, retention.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::db::repository;
use crate::error::{DomainError, DomainResult};
use crate::models::{AccessFilter, AccessLogEntry, AuditFilter, AuditLogEntry};

pub const MIN_RETENTION_DAYS: u32 = 30;
/// One hundred years.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Serialize)]
pub struct PatientAccessReport {
    pub patient_id: Uuid,
    pub changes: Vec<AuditLogEntry>,
    pub requests: Vec<AccessLogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PruneRequest {
    pub retention_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
    pub cutoff: DateTime<Utc>,
    pub audit_deleted: usize,
    pub access_deleted: usize,
    pub tokens_deleted: usize,
}

pub fn query_audit(conn: &Connection, filter: &AuditFilter) -> DomainResult<Vec<AuditLogEntry>> {
    Ok(repository::query_audit(conn, filter)?)
}

pub fn query_access(conn: &Connection, filter: &AccessFilter) -> DomainResult<Vec<AccessLogEntry>> {
    Ok(repository::query_access(conn, filter)?)
}

/// Everything the logs know about one patient. Works for deleted patients
/// too, so existence is judged by the log rows, not the patients table.
pub fn patient_report(conn: &Connection, patient_id: &Uuid, limit: Option<u32>) -> DomainResult<PatientAccessReport> {
    let changes = repository::query_patient_audit(conn, patient_id, limit)?;
    let requests = repository::query_access(
        conn,
        &AccessFilter {
            path_prefix: Some(format!("/api/patients/{patient_id}")),
            limit,
            ..AccessFilter::default()
        },
    )?;
    if changes.is_empty() && requests.is_empty() {
        return Err(DomainError::not_found("Patient", patient_id));
    }
    Ok(PatientAccessReport {
        patient_id: *patient_id,
        changes,
        requests,
    })
}

/// Delete audit, access and expired-token rows older than the retention
/// window. The prune itself is audited after the delete.
pub fn prune(conn: &mut Connection, actor: &Actor, retention_days: u32) -> DomainResult<PruneSummary> {
    let out_of_range = || {
        DomainError::validation(format!(
            "retention_days must be {MIN_RETENTION_DAYS}..={MAX_RETENTION_DAYS}, got {retention_days}"
        ))
    };
    if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&retention_days) {
        return Err(out_of_range());
    }
    let cutoff = Duration::try_days(i64::from(retention_days))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(out_of_range)?;

    let tx = conn.transaction()?;
    let summary = PruneSummary {
        cutoff,
        audit_deleted: repository::prune_audit_log(&tx, cutoff)?,
        access_deleted: repository::prune_access_log(&tx, cutoff)?,
        tokens_deleted: repository::prune_expired_tokens(&tx, cutoff)?,
    };
    audit::log(&tx, actor, "audit_log", "retention", Change::created(&summary)?.as_action("prune"))?;
    tx.commit()?;

    tracing::info!(
        retention_days,
        audit = summary.audit_deleted,
        access = summary.access_deleted,
        tokens = summary.tokens_deleted,
        "Audit retention applied"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::tests::{admin, patient};
    use crate::db::repository::{insert_access_entries, AccessInsert};
    use crate::db::sqlite::open_memory_database;

    fn access(path: &str, at: DateTime<Utc>) -> AccessInsert {
        AccessInsert {
            timestamp: at,
            actor: "nurse.joy".into(),
            method: "GET".into(),
            path: path.into(),
            status: 200,
        }
    }

    #[test]
    fn retention_outside_bounds_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        for days in [0, 7, MAX_RETENTION_DAYS + 1, u32::MAX] {
            assert!(
                matches!(prune(&mut conn, &admin(), days), Err(DomainError::Validation(_))),
                "{days} days should be rejected"
            );
        }
        let summary = prune(&mut conn, &admin(), MAX_RETENTION_DAYS).unwrap();
        assert!(summary.cutoff < Utc::now() - Duration::days(36_000));
    }

    #[test]
    fn prune_removes_old_rows_and_audits_itself() {
        let mut conn = open_memory_database().unwrap();
        let old = Utc::now() - Duration::days(400);
        insert_access_entries(&conn, &[access("/api/patients", old), access("/api/patients", Utc::now())]).unwrap();
        conn.execute(
            "INSERT INTO audit_log (timestamp, actor, action, resource_type, resource_id)
             VALUES (?1, 'system', 'create', 'patient', 'x')",
            [old],
        )
        .unwrap();

        let summary = prune(&mut conn, &admin(), 365).unwrap();
        assert_eq!(summary.audit_deleted, 1);
        assert_eq!(summary.access_deleted, 1);

        let rows = query_audit(&conn, &AuditFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "prune");
        assert_eq!(query_access(&conn, &AccessFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn patient_report_collects_changes_and_requests() {
        let mut conn = open_memory_database().unwrap();
        let p = patient(&mut conn);
        insert_access_entries(
            &conn,
            &[
                access(&format!("/api/patients/{p}"), Utc::now()),
                access("/api/patients", Utc::now()),
            ],
        )
        .unwrap();

        let report = patient_report(&conn, &p, None).unwrap();
        assert!(!report.changes.is_empty());
        assert_eq!(report.requests.len(), 1);

        assert!(matches!(
            patient_report(&conn, &Uuid::new_v4(), None),
            Err(DomainError::NotFound { .. })
        ));
    }
}
