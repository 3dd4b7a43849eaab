use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{opt_uuid_at, page_size, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{AccessFilter, AccessLogEntry, AuditFilter, AuditLogEntry};

pub const DEFAULT_AUDIT_PAGE: u32 = 100;
pub const MAX_AUDIT_PAGE: u32 = 1000;

/// Fields of a change-audit row before it gets an id.
pub struct AuditInsert<'a> {
    pub timestamp: DateTime<Utc>,
    pub actor: &'a str,
    pub actor_id: Option<Uuid>,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: &'a str,
    pub before: Option<&'a serde_json::Value>,
    pub after: Option<&'a serde_json::Value>,
}

/// A buffered request event waiting to be written to `access_log`.
#[derive(Debug, Clone)]
pub struct AccessInsert {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub method: String,
    pub path: String,
    pub status: u16,
}

const AUDIT_COLUMNS: &str =
    "id, timestamp, actor, actor_id, action, resource_type, resource_id, before_json, after_json";

fn json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        actor: row.get(2)?,
        actor_id: opt_uuid_at(row, 3)?,
        action: row.get(4)?,
        resource_type: row.get(5)?,
        resource_id: row.get(6)?,
        before: json_at(row, 7)?,
        after: json_at(row, 8)?,
    })
}

/// Insert one change-audit row. Returns the new row id.
pub fn insert_audit_entry(conn: &Connection, entry: &AuditInsert<'_>) -> Result<i64, DatabaseError> {
    let before = entry.before.map(serde_json::to_string).transpose()?;
    let after = entry.after.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO audit_log (timestamp, actor, actor_id, action, resource_type, resource_id,
             before_json, after_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.timestamp,
            entry.actor,
            entry.actor_id.map(|id| id.to_string()),
            entry.action,
            entry.resource_type,
            entry.resource_id,
            before,
            after,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a batch of access events.
pub fn insert_access_entries(conn: &Connection, entries: &[AccessInsert]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO access_log (timestamp, actor, method, path, status) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for e in entries {
        stmt.execute(params![e.timestamp, e.actor, e.method, e.path, e.status])?;
    }
    Ok(())
}

pub fn query_audit(conn: &Connection, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, DatabaseError> {
    let limit = page_size(filter.limit, DEFAULT_AUDIT_PAGE, MAX_AUDIT_PAGE);
    let mut q = FilterQuery::new(&format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE 1=1"));
    q.and_opt("actor = ?", filter.actor.clone())
        .and_opt("resource_type = ?", filter.resource_type.clone())
        .and_opt("resource_id = ?", filter.resource_id.clone())
        .and_opt("timestamp >= ?", filter.since)
        .tail("ORDER BY id DESC LIMIT ?")
        .push_param(limit);

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), audit_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Audit rows about one patient: the patient record itself plus any
/// resource whose snapshot carries `"patient_id":"<id>"`.
pub fn query_patient_audit(
    conn: &Connection,
    patient_id: &Uuid,
    limit: Option<u32>,
) -> Result<Vec<AuditLogEntry>, DatabaseError> {
    let limit = page_size(limit, DEFAULT_AUDIT_PAGE, MAX_AUDIT_PAGE);
    let id = patient_id.to_string();
    let needle = format!("%\"patient_id\":\"{id}\"%");
    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_log
         WHERE (resource_type = 'patient' AND resource_id = ?1)
            OR before_json LIKE ?2 OR after_json LIKE ?2
         ORDER BY id DESC LIMIT ?3"
    ))?;
    let rows = stmt.query_map(params![id, needle, limit], audit_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn query_access(
    conn: &Connection,
    filter: &AccessFilter,
) -> Result<Vec<AccessLogEntry>, DatabaseError> {
    let limit = page_size(filter.limit, DEFAULT_AUDIT_PAGE, MAX_AUDIT_PAGE);
    let mut q = FilterQuery::new(
        "SELECT id, timestamp, actor, method, path, status FROM access_log WHERE 1=1",
    );
    q.and_opt("actor = ?", filter.actor.clone())
        .and_opt("path LIKE ?", filter.path_prefix.as_ref().map(|p| format!("{p}%")))
        .and_opt("timestamp >= ?", filter.since)
        .tail("ORDER BY id DESC LIMIT ?")
        .push_param(limit);

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), |row| {
        Ok(AccessLogEntry {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor: row.get(2)?,
            method: row.get(3)?,
            path: row.get(4)?,
            status: row.get(5)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Delete change-audit rows older than `cutoff`.
pub fn prune_audit_log(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
    let deleted = conn.execute("DELETE FROM audit_log WHERE timestamp < ?1", params![cutoff])?;
    Ok(deleted)
}

/// Delete access rows older than `cutoff`.
pub fn prune_access_log(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
    let deleted = conn.execute("DELETE FROM access_log WHERE timestamp < ?1", params![cutoff])?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::Duration;
    use serde_json::json;

    fn insert(conn: &Connection, at: DateTime<Utc>, resource_type: &str, after: serde_json::Value) {
        insert_audit_entry(
            conn,
            &AuditInsert {
                timestamp: at,
                actor: "admin",
                actor_id: None,
                action: "create",
                resource_type,
                resource_id: "r1",
                before: None,
                after: Some(&after),
            },
        )
        .unwrap();
    }

    #[test]
    fn snapshots_survive_storage() {
        let conn = open_memory_database().unwrap();
        insert(&conn, Utc::now(), "patient", json!({"first_name": "Ada"}));
        let rows = query_audit(&conn, &AuditFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].after, Some(json!({"first_name": "Ada"})));
        assert!(rows[0].before.is_none());
    }

    #[test]
    fn query_filters_and_orders_newest_first() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        insert(&conn, now - Duration::days(3), "patient", json!({}));
        insert(&conn, now - Duration::days(1), "lab_order", json!({}));
        insert(&conn, now, "patient", json!({}));

        let filter = AuditFilter {
            resource_type: Some("patient".into()),
            ..Default::default()
        };
        let rows = query_audit(&conn, &filter).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].id > rows[1].id);

        let filter = AuditFilter {
            since: Some(now - Duration::days(2)),
            ..Default::default()
        };
        assert_eq!(query_audit(&conn, &filter).unwrap().len(), 2);

        let filter = AuditFilter {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(query_audit(&conn, &filter).unwrap().len(), 1);
    }

    #[test]
    fn patient_audit_matches_referencing_resources() {
        let conn = open_memory_database().unwrap();
        let pid = Uuid::new_v4();
        insert(&conn, Utc::now(), "lab_order", json!({"patient_id": pid}));
        insert(&conn, Utc::now(), "lab_order", json!({"patient_id": Uuid::new_v4()}));
        let rows = query_patient_audit(&conn, &pid, None).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn prune_removes_only_old_rows() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        insert(&conn, now - Duration::days(40), "patient", json!({}));
        insert(&conn, now, "patient", json!({}));
        insert_access_entries(
            &conn,
            &[
                AccessInsert {
                    timestamp: now - Duration::days(40),
                    actor: "admin".into(),
                    method: "GET".into(),
                    path: "/api/patients".into(),
                    status: 200,
                },
                AccessInsert {
                    timestamp: now,
                    actor: "admin".into(),
                    method: "GET".into(),
                    path: "/api/billing/bills".into(),
                    status: 200,
                },
            ],
        )
        .unwrap();

        let filter = AccessFilter {
            path_prefix: Some("/api/patients".into()),
            ..Default::default()
        };
        assert_eq!(query_access(&conn, &filter).unwrap().len(), 1);

        let cutoff = now - Duration::days(30);
        assert_eq!(prune_audit_log(&conn, cutoff).unwrap(), 1);
        assert_eq!(prune_access_log(&conn, cutoff).unwrap(), 1);
        assert_eq!(query_access(&conn, &AccessFilter::default()).unwrap().len(), 1);
    }
}
