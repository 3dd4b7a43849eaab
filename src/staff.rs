//! Staff accounts, login, bearer-token sessions and permission grants.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::crypto::{generate_token, hash_password, hash_token, verify_password};
use crate::db::repository;
use crate::db::DatabaseError;
use crate::error::{DomainError, DomainResult};
use crate::models::enums::{Action, Resource, Role};
use crate::models::{ApiTokenRow, NewPermissionGrant, NewStaffUser, PermissionGrant, StaffUser};
use crate::rbac;

pub const MIN_PASSWORD_LENGTH: usize = 12;
pub const BOOTSTRAP_USERNAME: &str = "admin";
/// Thirty days.
pub const MAX_TOKEN_TTL_MINUTES: u32 = 43_200;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._-]{3,32}$").expect("valid username pattern"));

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Authenticated staff member, injected into request extensions by the
/// auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl StaffContext {
    pub fn actor(&self) -> Actor {
        Actor {
            id: Some(self.user_id),
            name: self.username.clone(),
        }
    }
}

impl From<&StaffUser> for StaffContext {
    fn from(user: &StaffUser) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Returned once at login. The token is never stored in clear.
#[derive(Debug, Clone, Serialize)]
pub struct LoginSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: StaffUser,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid or revoked token")]
    InvalidToken,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        Self::Domain(err.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    AlreadyProvisioned,
    Created,
    /// No password was configured; this one must be shown to the operator.
    CreatedWithGeneratedPassword(String),
}

// ═══════════════════════════════════════════════════════════
// Login / tokens
// ═══════════════════════════════════════════════════════════

/// Check credentials. Unknown users still pay for one hash so timing does
/// not reveal which usernames exist.
pub fn verify_credentials(conn: &Connection, username: &str, password: &str) -> Result<StaffUser, AuthError> {
    let Some(user) = repository::get_user_by_username(conn, username)? else {
        let _ = hash_password(password);
        return Err(AuthError::InvalidCredentials);
    };
    let valid = verify_password(password, &user.password_hash).unwrap_or_else(|e| {
        tracing::error!(user_id = %user.id, error = %e, "Stored password hash unreadable");
        false
    });
    if !valid || !user.active {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user)
}

pub fn issue_token(conn: &Connection, user: &StaffUser, ttl: Duration) -> Result<LoginSession, AuthError> {
    let token = generate_token();
    if ttl > Duration::minutes(i64::from(MAX_TOKEN_TTL_MINUTES)) {
        return Err(DomainError::validation(format!(
            "token lifetime cannot exceed {MAX_TOKEN_TTL_MINUTES} minutes"
        ))
        .into());
    }
    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| DomainError::validation("token lifetime out of range"))?;
    repository::insert_token(
        conn,
        &ApiTokenRow {
            token_hash: hash_token(&token),
            user_id: user.id,
            expires_at,
            revoked_at: None,
        },
        now,
    )?;
    Ok(LoginSession {
        token,
        expires_at,
        user: user.clone(),
    })
}

pub fn login(conn: &Connection, username: &str, password: &str, ttl: Duration) -> Result<LoginSession, AuthError> {
    let user = verify_credentials(conn, username, password)?;
    let session = issue_token(conn, &user, ttl)?;
    tracing::info!(user = %user.username, role = %user.role, "Staff login");
    Ok(session)
}

/// Resolve a presented bearer token to its staff member.
pub fn authenticate(conn: &Connection, token: &str) -> Result<StaffContext, AuthError> {
    let row = repository::get_token(conn, &hash_token(token))?.ok_or(AuthError::InvalidToken)?;
    if row.revoked_at.is_some() {
        return Err(AuthError::InvalidToken);
    }
    if row.expires_at <= Utc::now() {
        return Err(AuthError::TokenExpired);
    }
    let user = repository::get_user(conn, &row.user_id)?.ok_or(AuthError::InvalidToken)?;
    if !user.active {
        return Err(AuthError::InvalidToken);
    }
    Ok(StaffContext::from(&user))
}

pub fn logout(conn: &Connection, token: &str) -> DomainResult<()> {
    repository::revoke_token(conn, &hash_token(token), Utc::now())?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Accounts
// ═══════════════════════════════════════════════════════════

pub fn validate_username(username: &str) -> DomainResult<()> {
    if USERNAME.is_match(username) {
        Ok(())
    } else {
        Err(DomainError::validation(
            "username must be 3-32 of a-z, 0-9, '.', '_', '-'",
        ))
    }
}

fn validate_password(password: &str) -> DomainResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn create_user(conn: &mut Connection, actor: &Actor, new: NewStaffUser) -> DomainResult<StaffUser> {
    let username = new.username.trim().to_string();
    validate_username(&username)?;
    validate_password(&new.password)?;

    let tx = conn.transaction()?;
    if let Some(employee_id) = new.employee_id {
        crate::hr::require_employee(&tx, &employee_id)?;
    }
    if repository::get_user_by_username(&tx, &username)?.is_some() {
        return Err(DomainError::conflict(format!("username {username} is taken")));
    }
    let user = StaffUser {
        id: Uuid::new_v4(),
        username,
        password_hash: hash_password(&new.password),
        role: new.role,
        employee_id: new.employee_id,
        active: true,
        created_at: Utc::now(),
    };
    repository::insert_user(&tx, &user)?;
    audit::log(&tx, actor, "staff_user", user.id, Change::created(&user)?)?;
    tx.commit()?;

    tracing::info!(user = %user.username, role = %user.role, "Staff account created");
    Ok(user)
}

pub fn get_user(conn: &Connection, id: &Uuid) -> DomainResult<StaffUser> {
    repository::get_user(conn, id)?.ok_or_else(|| DomainError::not_found("StaffUser", id))
}

pub fn list_users(conn: &Connection) -> DomainResult<Vec<StaffUser>> {
    Ok(repository::list_users(conn)?)
}

/// Disable an account and revoke every token it holds.
pub fn deactivate_user(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<StaffUser> {
    if actor.id == Some(*id) {
        return Err(DomainError::conflict("cannot deactivate your own account"));
    }
    let tx = conn.transaction()?;
    let before = get_user(&tx, id)?;
    if !before.active {
        return Err(DomainError::conflict(format!("{} is already inactive", before.username)));
    }
    let now = Utc::now();
    repository::set_user_active(&tx, id, false)?;
    let revoked = repository::revoke_user_tokens(&tx, id, now)?;
    let user = StaffUser {
        active: false,
        ..before.clone()
    };
    audit::log(&tx, actor, "staff_user", id, Change::updated(&before, &user)?.as_action("deactivate"))?;
    tx.commit()?;

    tracing::info!(user = %user.username, revoked, "Staff account deactivated");
    Ok(user)
}

// ═══════════════════════════════════════════════════════════
// Grants
// ═══════════════════════════════════════════════════════════

pub fn grant_permission(
    conn: &mut Connection,
    actor: &Actor,
    user_id: &Uuid,
    new: NewPermissionGrant,
) -> DomainResult<PermissionGrant> {
    if !rbac::grantable(new.resource) {
        return Err(DomainError::validation(format!(
            "{} access comes from the role only and cannot be granted",
            new.resource
        )));
    }
    let now = Utc::now();
    if new.expires_at.is_some_and(|at| at <= now) {
        return Err(DomainError::validation("grant expiry must be in the future"));
    }
    let tx = conn.transaction()?;
    get_user(&tx, user_id)?;
    let grant = PermissionGrant {
        user_id: *user_id,
        resource: new.resource,
        action: new.action,
        granted_by: actor.id,
        expires_at: new.expires_at,
        created_at: now,
    };
    repository::upsert_grant(&tx, &grant)?;
    audit::log(
        &tx,
        actor,
        "permission_grant",
        format!("{user_id}:{}:{}", grant.resource, grant.action),
        Change::created(&grant)?,
    )?;
    tx.commit()?;
    Ok(grant)
}

pub fn revoke_permission(
    conn: &mut Connection,
    actor: &Actor,
    user_id: &Uuid,
    resource: Resource,
    action: Action,
) -> DomainResult<()> {
    let tx = conn.transaction()?;
    let key = format!("{user_id}:{resource}:{action}");
    if !repository::delete_grant(&tx, user_id, resource, action)? {
        return Err(DomainError::not_found("PermissionGrant", key));
    }
    let before = serde_json::json!({ "user_id": user_id, "resource": resource, "action": action });
    audit::log(&tx, actor, "permission_grant", key, Change::deleted(&before)?)?;
    tx.commit()?;
    Ok(())
}

pub fn list_grants(conn: &Connection, user_id: &Uuid) -> DomainResult<Vec<PermissionGrant>> {
    get_user(conn, user_id)?;
    Ok(repository::list_grants(conn, user_id)?)
}

// ═══════════════════════════════════════════════════════════
// Bootstrap
// ═══════════════════════════════════════════════════════════

/// Create the first admin account when the store has no users.
pub fn bootstrap_admin(conn: &mut Connection, configured_password: Option<&str>) -> DomainResult<BootstrapOutcome> {
    if repository::count_users(conn)? > 0 {
        return Ok(BootstrapOutcome::AlreadyProvisioned);
    }
    let (password, generated) = match configured_password {
        Some(p) => (p.to_string(), false),
        None => (generate_token(), true),
    };
    create_user(
        conn,
        &Actor::system(),
        NewStaffUser {
            username: BOOTSTRAP_USERNAME.into(),
            password: password.clone(),
            role: Role::Admin,
            employee_id: None,
        },
    )?;
    Ok(if generated {
        BootstrapOutcome::CreatedWithGeneratedPassword(password)
    } else {
        BootstrapOutcome::Created
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    pub(crate) const PASSWORD: &str = "correct-horse-battery";

    pub(crate) fn user(conn: &mut Connection, username: &str, role: Role) -> StaffUser {
        create_user(
            conn,
            &Actor::system(),
            NewStaffUser {
                username: username.into(),
                password: PASSWORD.into(),
                role,
                employee_id: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn username_and_password_rules() {
        let mut conn = open_memory_database().unwrap();
        assert!(validate_username("dr.house").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("Dr.House").is_err());
        let short = NewStaffUser {
            username: "nurse.joy".into(),
            password: "short".into(),
            role: Role::Nurse,
            employee_id: None,
        };
        assert!(matches!(
            create_user(&mut conn, &Actor::system(), short),
            Err(DomainError::Validation(_))
        ));
        user(&mut conn, "nurse.joy", Role::Nurse);
        let dup = NewStaffUser {
            username: "nurse.joy".into(),
            password: PASSWORD.into(),
            role: Role::Nurse,
            employee_id: None,
        };
        assert!(matches!(
            create_user(&mut conn, &Actor::system(), dup),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn login_and_authenticate() {
        let mut conn = open_memory_database().unwrap();
        let u = user(&mut conn, "nurse.joy", Role::Nurse);
        assert!(matches!(
            login(&conn, "nurse.joy", "wrong-password!", Duration::hours(1)),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&conn, "nobody", PASSWORD, Duration::hours(1)),
            Err(AuthError::InvalidCredentials)
        ));

        let session = login(&conn, "nurse.joy", PASSWORD, Duration::hours(1)).unwrap();
        let ctx = authenticate(&conn, &session.token).unwrap();
        assert_eq!(ctx.user_id, u.id);
        assert_eq!(ctx.role, Role::Nurse);
        assert!(matches!(authenticate(&conn, "bogus"), Err(AuthError::InvalidToken)));

        logout(&conn, &session.token).unwrap();
        assert!(matches!(authenticate(&conn, &session.token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_reported() {
        let mut conn = open_memory_database().unwrap();
        let u = user(&mut conn, "nurse.joy", Role::Nurse);
        let session = issue_token(&conn, &u, Duration::seconds(-1)).unwrap();
        assert!(matches!(authenticate(&conn, &session.token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn token_lifetime_is_bounded() {
        let mut conn = open_memory_database().unwrap();
        let u = user(&mut conn, "nurse.joy", Role::Nurse);
        for ttl in [
            Duration::minutes(i64::from(u32::MAX)),
            Duration::minutes(i64::from(MAX_TOKEN_TTL_MINUTES) + 1),
            Duration::days(10_000_000),
        ] {
            assert!(matches!(
                issue_token(&conn, &u, ttl),
                Err(AuthError::Domain(DomainError::Validation(_)))
            ));
        }
        let longest = Duration::minutes(i64::from(MAX_TOKEN_TTL_MINUTES));
        let session = issue_token(&conn, &u, longest).unwrap();
        assert_eq!(authenticate(&conn, &session.token).unwrap().username, "nurse.joy");
    }

    #[test]
    fn deactivation_revokes_tokens_and_blocks_login() {
        let mut conn = open_memory_database().unwrap();
        let admin = user(&mut conn, "root.admin", Role::Admin);
        let u = user(&mut conn, "nurse.joy", Role::Nurse);
        let session = login(&conn, "nurse.joy", PASSWORD, Duration::hours(1)).unwrap();

        let admin_actor = StaffContext::from(&admin).actor();
        assert!(matches!(
            deactivate_user(&mut conn, &admin_actor, &admin.id),
            Err(DomainError::Conflict(_))
        ));
        let off = deactivate_user(&mut conn, &admin_actor, &u.id).unwrap();
        assert!(!off.active);
        assert!(authenticate(&conn, &session.token).is_err());
        assert!(matches!(
            login(&conn, "nurse.joy", PASSWORD, Duration::hours(1)),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn grants_round_trip() {
        let mut conn = open_memory_database().unwrap();
        let u = user(&mut conn, "nurse.joy", Role::Nurse);
        let grant = NewPermissionGrant {
            resource: Resource::Billing,
            action: Action::Read,
            expires_at: None,
        };
        grant_permission(&mut conn, &Actor::system(), &u.id, grant).unwrap();
        assert_eq!(list_grants(&conn, &u.id).unwrap().len(), 1);
        revoke_permission(&mut conn, &Actor::system(), &u.id, Resource::Billing, Action::Read).unwrap();
        assert!(matches!(
            revoke_permission(&mut conn, &Actor::system(), &u.id, Resource::Billing, Action::Read),
            Err(DomainError::NotFound { .. })
        ));
        let past = NewPermissionGrant {
            resource: Resource::Billing,
            action: Action::Read,
            expires_at: Some(Utc::now() - Duration::minutes(1)),
        };
        assert!(matches!(
            grant_permission(&mut conn, &Actor::system(), &u.id, past),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn compliance_cannot_be_granted() {
        let mut conn = open_memory_database().unwrap();
        let u = user(&mut conn, "nurse.joy", Role::Nurse);
        let grant = NewPermissionGrant {
            resource: Resource::Compliance,
            action: Action::Read,
            expires_at: None,
        };
        assert!(matches!(
            grant_permission(&mut conn, &Actor::system(), &u.id, grant),
            Err(DomainError::Validation(_))
        ));
        assert!(list_grants(&conn, &u.id).unwrap().is_empty());
    }

    #[test]
    fn bootstrap_runs_once() {
        let mut conn = open_memory_database().unwrap();
        let outcome = bootstrap_admin(&mut conn, None).unwrap();
        let BootstrapOutcome::CreatedWithGeneratedPassword(password) = outcome else {
            panic!("expected generated password, got {outcome:?}");
        };
        assert!(login(&conn, BOOTSTRAP_USERNAME, &password, Duration::hours(1)).is_ok());
        assert_eq!(
            bootstrap_admin(&mut conn, Some("another-password")).unwrap(),
            BootstrapOutcome::AlreadyProvisioned
        );
    }
}
