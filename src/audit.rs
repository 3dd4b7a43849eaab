//! Change audit: one row per create/update/delete/transition, written in
//! the caller's transaction with JSON snapshots of the record.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository::{insert_audit_entry, AuditInsert};
use crate::error::DomainResult;

/// Who performed a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: String,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            id: None,
            name: "system".into(),
        }
    }
}

/// Action plus before/after snapshots.
#[derive(Debug, Clone)]
pub struct Change {
    pub action: &'static str,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl Change {
    pub fn created(after: &impl Serialize) -> DomainResult<Self> {
        Ok(Self {
            action: "create",
            before: None,
            after: Some(serde_json::to_value(after)?),
        })
    }

    pub fn updated(before: &impl Serialize, after: &impl Serialize) -> DomainResult<Self> {
        Ok(Self {
            action: "update",
            before: Some(serde_json::to_value(before)?),
            after: Some(serde_json::to_value(after)?),
        })
    }

    pub fn deleted(before: &impl Serialize) -> DomainResult<Self> {
        Ok(Self {
            action: "delete",
            before: Some(serde_json::to_value(before)?),
            after: None,
        })
    }

    /// Relabel the change, e.g. `status_change`, `dispense`, `payment`.
    pub fn as_action(mut self, action: &'static str) -> Self {
        self.action = action;
        self
    }
}

pub struct AuditRecord<'a> {
    pub actor: &'a Actor,
    pub resource_type: &'a str,
    pub resource_id: String,
    pub change: Change,
}

pub fn record_change(conn: &Connection, record: &AuditRecord<'_>) -> DomainResult<i64> {
    let id = insert_audit_entry(
        conn,
        &AuditInsert {
            timestamp: Utc::now(),
            actor: &record.actor.name,
            actor_id: record.actor.id,
            action: record.change.action,
            resource_type: record.resource_type,
            resource_id: &record.resource_id,
            before: record.change.before.as_ref(),
            after: record.change.after.as_ref(),
        },
    )?;
    tracing::debug!(
        actor = %record.actor.name,
        action = record.change.action,
        resource_type = record.resource_type,
        resource_id = %record.resource_id,
        "Change audited"
    );
    Ok(id)
}

/// Shorthand for [`record_change`].
pub fn log(
    conn: &Connection,
    actor: &Actor,
    resource_type: &str,
    resource_id: impl ToString,
    change: Change,
) -> DomainResult<()> {
    record_change(
        conn,
        &AuditRecord {
            actor,
            resource_type,
            resource_id: resource_id.to_string(),
            change,
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::query_audit;
    use crate::db::sqlite::open_memory_database;
    use crate::models::AuditFilter;
    use serde_json::json;

    #[derive(Serialize)]
    struct Thing {
        name: &'static str,
        count: u32,
    }

    #[test]
    fn created_updated_deleted_snapshots_persist() {
        let conn = open_memory_database().unwrap();
        let actor = Actor {
            id: Some(Uuid::new_v4()),
            name: "dr.house".into(),
        };
        let v1 = Thing { name: "a", count: 1 };
        let v2 = Thing { name: "a", count: 2 };

        log(&conn, &actor, "thing", "t1", Change::created(&v1).unwrap()).unwrap();
        log(&conn, &actor, "thing", "t1", Change::updated(&v1, &v2).unwrap()).unwrap();
        log(&conn, &actor, "thing", "t1", Change::deleted(&v2).unwrap()).unwrap();

        let rows = query_audit(&conn, &AuditFilter::default()).unwrap();
        assert_eq!(rows.len(), 3);
        // Newest first
        assert_eq!(rows[0].action, "delete");
        assert_eq!(rows[0].before, Some(json!({"name": "a", "count": 2})));
        assert!(rows[0].after.is_none());
        assert_eq!(rows[1].action, "update");
        assert_eq!(rows[1].before, Some(json!({"name": "a", "count": 1})));
        assert_eq!(rows[2].action, "create");
        assert_eq!(rows[2].actor, "dr.house");
        assert_eq!(rows[2].actor_id, actor.id);
    }

    #[test]
    fn relabelled_action_is_stored() {
        let conn = open_memory_database().unwrap();
        let change = Change::updated(&json!({"status": "ordered"}), &json!({"status": "collected"}))
            .unwrap()
            .as_action("status_change");
        log(&conn, &Actor::system(), "lab_order", "o1", change).unwrap();
        let rows = query_audit(&conn, &AuditFilter::default()).unwrap();
        assert_eq!(rows[0].action, "status_change");
        assert_eq!(rows[0].actor, "system");
    }
}
