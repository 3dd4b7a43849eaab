//! Staff accounts, bearer tokens and explicit permission grants.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{opt_uuid_at, uuid_at};
use crate::db::DatabaseError;
use crate::models::enums::{Action, Resource};
use crate::models::{ApiTokenRow, PermissionGrant, StaffUser};

// ═══════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════

const USER_COLUMNS: &str = "id, username, password_hash, role, employee_id, active, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<StaffUser> {
    Ok(StaffUser {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        employee_id: opt_uuid_at(row, 4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn insert_user(conn: &Connection, u: &StaffUser) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO staff_users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            u.id.to_string(),
            u.username,
            u.password_hash,
            u.role,
            u.employee_id.map(|id| id.to_string()),
            u.active,
            u.created_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<StaffUser>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM staff_users WHERE id = ?1"),
            params![id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<StaffUser>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM staff_users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(conn: &Connection) -> Result<Vec<StaffUser>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM staff_users ORDER BY username"
    ))?;
    let rows = stmt.query_map([], user_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM staff_users", [], |row| row.get(0))?;
    Ok(count)
}

pub fn set_user_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE staff_users SET active = ?2 WHERE id = ?1",
        params![id.to_string(), active],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("StaffUser", id));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Tokens
// ═══════════════════════════════════════════════════════════

pub fn insert_token(
    conn: &Connection,
    token: &ApiTokenRow,
    created_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO api_tokens (token_hash, user_id, expires_at, revoked_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            token.token_hash,
            token.user_id.to_string(),
            token.expires_at,
            token.revoked_at,
            created_at,
        ],
    )?;
    Ok(())
}

pub fn get_token(conn: &Connection, token_hash: &str) -> Result<Option<ApiTokenRow>, DatabaseError> {
    let token = conn
        .query_row(
            "SELECT token_hash, user_id, expires_at, revoked_at FROM api_tokens WHERE token_hash = ?1",
            params![token_hash],
            |row| {
                Ok(ApiTokenRow {
                    token_hash: row.get(0)?,
                    user_id: uuid_at(row, 1)?,
                    expires_at: row.get(2)?,
                    revoked_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(token)
}

pub fn revoke_token(
    conn: &Connection,
    token_hash: &str,
    at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE api_tokens SET revoked_at = ?2 WHERE token_hash = ?1 AND revoked_at IS NULL",
        params![token_hash, at],
    )?;
    Ok(updated > 0)
}

pub fn revoke_user_tokens(
    conn: &Connection,
    user_id: &Uuid,
    at: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE api_tokens SET revoked_at = ?2 WHERE user_id = ?1 AND revoked_at IS NULL",
        params![user_id.to_string(), at],
    )?;
    Ok(updated)
}

/// Drop tokens that expired before `cutoff`.
pub fn prune_expired_tokens(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
    let deleted = conn.execute("DELETE FROM api_tokens WHERE expires_at < ?1", params![cutoff])?;
    Ok(deleted)
}

// ═══════════════════════════════════════════════════════════
// Permission grants
// ═══════════════════════════════════════════════════════════

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<PermissionGrant> {
    Ok(PermissionGrant {
        user_id: uuid_at(row, 0)?,
        resource: row.get(1)?,
        action: row.get(2)?,
        granted_by: opt_uuid_at(row, 3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Insert or replace the grant for `(user, resource, action)`.
pub fn upsert_grant(conn: &Connection, g: &PermissionGrant) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO permission_grants (user_id, resource, action, granted_by, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, resource, action) DO UPDATE SET granted_by = excluded.granted_by,
             expires_at = excluded.expires_at, created_at = excluded.created_at",
        params![
            g.user_id.to_string(),
            g.resource,
            g.action,
            g.granted_by.map(|id| id.to_string()),
            g.expires_at,
            g.created_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn delete_grant(
    conn: &Connection,
    user_id: &Uuid,
    resource: Resource,
    action: Action,
) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM permission_grants WHERE user_id = ?1 AND resource = ?2 AND action = ?3",
        params![user_id.to_string(), resource, action],
    )?;
    Ok(deleted > 0)
}

/// Grant for `(user, resource, action)` that has not expired at `now`.
pub fn find_active_grant(
    conn: &Connection,
    user_id: &Uuid,
    resource: Resource,
    action: Action,
    now: DateTime<Utc>,
) -> Result<Option<PermissionGrant>, DatabaseError> {
    let grant = conn
        .query_row(
            "SELECT user_id, resource, action, granted_by, expires_at, created_at
             FROM permission_grants
             WHERE user_id = ?1 AND resource = ?2 AND action = ?3
               AND (expires_at IS NULL OR expires_at > ?4)",
            params![user_id.to_string(), resource, action, now],
            grant_from_row,
        )
        .optional()?;
    Ok(grant)
}

pub fn list_grants(conn: &Connection, user_id: &Uuid) -> Result<Vec<PermissionGrant>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, resource, action, granted_by, expires_at, created_at
         FROM permission_grants WHERE user_id = ?1 ORDER BY resource, action",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], grant_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::Role;
    use chrono::Duration;

    fn user(conn: &Connection, username: &str) -> StaffUser {
        let u = StaffUser {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: "x".into(),
            role: Role::Nurse,
            employee_id: None,
            active: true,
            created_at: Utc::now(),
        };
        insert_user(conn, &u).unwrap();
        u
    }

    #[test]
    fn duplicate_username_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        user(&conn, "nurse.joy");
        let err = insert_user(
            &conn,
            &StaffUser {
                id: Uuid::new_v4(),
                username: "nurse.joy".into(),
                password_hash: "y".into(),
                role: Role::Admin,
                employee_id: None,
                active: true,
                created_at: Utc::now(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn expired_grant_is_not_active() {
        let conn = open_memory_database().unwrap();
        let u = user(&conn, "nurse.joy");
        let now = Utc::now();
        upsert_grant(
            &conn,
            &PermissionGrant {
                user_id: u.id,
                resource: Resource::Billing,
                action: Action::Read,
                granted_by: None,
                expires_at: Some(now - Duration::minutes(1)),
                created_at: now,
            },
        )
        .unwrap();
        assert!(find_active_grant(&conn, &u.id, Resource::Billing, Action::Read, now)
            .unwrap()
            .is_none());

        // Re-granting without expiry replaces the row
        upsert_grant(
            &conn,
            &PermissionGrant {
                user_id: u.id,
                resource: Resource::Billing,
                action: Action::Read,
                granted_by: None,
                expires_at: None,
                created_at: now,
            },
        )
        .unwrap();
        assert!(find_active_grant(&conn, &u.id, Resource::Billing, Action::Read, now)
            .unwrap()
            .is_some());
        assert_eq!(list_grants(&conn, &u.id).unwrap().len(), 1);
        assert!(delete_grant(&conn, &u.id, Resource::Billing, Action::Read).unwrap());
        assert!(list_grants(&conn, &u.id).unwrap().is_empty());
    }

    #[test]
    fn revoke_user_tokens_marks_all() {
        let conn = open_memory_database().unwrap();
        let u = user(&conn, "nurse.joy");
        let now = Utc::now();
        for hash in ["h1", "h2"] {
            insert_token(
                &conn,
                &ApiTokenRow {
                    token_hash: hash.into(),
                    user_id: u.id,
                    expires_at: now + Duration::hours(1),
                    revoked_at: None,
                },
                now,
            )
            .unwrap();
        }
        assert_eq!(revoke_user_tokens(&conn, &u.id, now).unwrap(), 2);
        assert!(get_token(&conn, "h1").unwrap().unwrap().revoked_at.is_some());
        assert!(!revoke_token(&conn, "h2", now).unwrap());
    }
}
