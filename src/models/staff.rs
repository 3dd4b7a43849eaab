use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Action, Resource, Role};

/// A staff login account. The password hash never leaves the repository
/// layer in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffUser {
    pub id: Uuid,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub employee_id: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaffUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub employee_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub user_id: Uuid,
    pub resource: Resource,
    pub action: Action,
    pub granted_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPermissionGrant {
    pub resource: Resource,
    pub action: Action,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Stored bearer token. Only the SHA-256 of the token is kept.
#[derive(Debug, Clone)]
pub struct ApiTokenRow {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}
