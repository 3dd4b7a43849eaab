//! Role-based access control.
//!
//! Cascade, default-deny, checked in order:
//! 1. Admin role → allow
//! 2. Role allow-list → allow
//! 3. Explicit unexpired grant for the user → allow (never for compliance)
//! 4. Otherwise → deny

use axum::http::Method;
use chrono::Utc;
use rusqlite::Connection;

use crate::db::repository::find_active_grant;
use crate::db::DatabaseError;
use crate::models::enums::{Action, Resource, Role};
use crate::staff::StaffContext;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Why access was granted (or denied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    AdminRole,
    RolePermission,
    ExplicitGrant,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::Denied,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Allow-list
// ═══════════════════════════════════════════════════════════

/// Map an HTTP method to the action it performs. Anything that is not a
/// read or a delete needs write access.
pub fn action_for_method(method: &Method) -> Action {
    match *method {
        Method::GET | Method::HEAD => Action::Read,
        Method::DELETE => Action::Delete,
        _ => Action::Write,
    }
}

/// Static role permissions. Admin is handled by the cascade, not here.
pub fn role_allows(role: Role, resource: Resource, action: Action) -> bool {
    use Action::{Delete, Read, Write};
    use Resource as R;

    let rw = matches!(action, Read | Write);
    let read = action == Read;

    match role {
        Role::Admin => true,
        Role::Physician => match resource {
            R::Patients
            | R::Appointments
            | R::LabOrders
            | R::RadiologyOrders
            | R::Pharmacy
            | R::Telemedicine => rw,
            R::Employees | R::Billing => read,
            _ => false,
        },
        Role::Nurse => match resource {
            R::Patients | R::Appointments | R::LabOrders => rw,
            R::RadiologyOrders | R::Pharmacy | R::Telemedicine | R::Employees => read,
            _ => false,
        },
        Role::Receptionist => match resource {
            R::Patients | R::Appointments | R::Telemedicine => rw,
            R::Employees | R::Billing => read,
            _ => false,
        },
        Role::BillingClerk => match resource {
            R::Billing => rw,
            R::Patients | R::Appointments => read,
            _ => false,
        },
        Role::LabTechnician => match resource {
            R::LabOrders => rw,
            R::Patients => read,
            _ => false,
        },
        Role::Radiologist => match resource {
            R::RadiologyOrders => rw,
            R::Patients => read,
            _ => false,
        },
        Role::Pharmacist => match resource {
            R::Pharmacy => rw,
            R::Patients => read,
            _ => false,
        },
        Role::HrManager => match resource {
            R::Employees => matches!(action, Read | Write | Delete),
            _ => false,
        },
        Role::ComplianceOfficer => match resource {
            R::Compliance => rw,
            _ => false,
        },
    }
}

/// Compliance stays with admins and compliance officers; grants cannot
/// extend it to other roles.
pub fn grantable(resource: Resource) -> bool {
    resource != Resource::Compliance
}

// ═══════════════════════════════════════════════════════════
// Cascade
// ═══════════════════════════════════════════════════════════

pub fn check_access(
    conn: &Connection,
    staff: &StaffContext,
    resource: Resource,
    action: Action,
) -> Result<AccessDecision, DatabaseError> {
    if staff.role == Role::Admin {
        return Ok(AccessDecision::allow(AccessReason::AdminRole));
    }
    if role_allows(staff.role, resource, action) {
        return Ok(AccessDecision::allow(AccessReason::RolePermission));
    }
    if grantable(resource)
        && find_active_grant(conn, &staff.user_id, resource, action, Utc::now())?.is_some()
    {
        return Ok(AccessDecision::allow(AccessReason::ExplicitGrant));
    }
    Ok(AccessDecision::deny())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_user, upsert_grant};
    use crate::db::sqlite::open_memory_database;
    use crate::models::{PermissionGrant, StaffUser};
    use chrono::Duration;
    use uuid::Uuid;

    fn staff(conn: &Connection, role: Role) -> StaffContext {
        let user = StaffUser {
            id: Uuid::new_v4(),
            username: format!("{}.user", role.as_str().replace('_', "")),
            password_hash: "x".into(),
            role,
            employee_id: None,
            active: true,
            created_at: Utc::now(),
        };
        insert_user(conn, &user).unwrap();
        StaffContext::from(&user)
    }

    #[test]
    fn method_maps_to_action() {
        assert_eq!(action_for_method(&Method::GET), Action::Read);
        assert_eq!(action_for_method(&Method::HEAD), Action::Read);
        assert_eq!(action_for_method(&Method::POST), Action::Write);
        assert_eq!(action_for_method(&Method::PATCH), Action::Write);
        assert_eq!(action_for_method(&Method::PUT), Action::Write);
        assert_eq!(action_for_method(&Method::DELETE), Action::Delete);
        assert_eq!(action_for_method(&Method::OPTIONS), Action::Write);
        assert_eq!(action_for_method(&Method::TRACE), Action::Write);
    }

    #[test]
    fn role_matrix_spot_checks() {
        assert!(role_allows(Role::Physician, Resource::LabOrders, Action::Write));
        assert!(!role_allows(Role::Physician, Resource::Patients, Action::Delete));
        assert!(role_allows(Role::BillingClerk, Resource::Billing, Action::Write));
        assert!(!role_allows(Role::BillingClerk, Resource::LabOrders, Action::Read));
        assert!(role_allows(Role::HrManager, Resource::Employees, Action::Delete));
        assert!(!role_allows(Role::HrManager, Resource::Patients, Action::Read));
        assert!(role_allows(Role::ComplianceOfficer, Resource::Compliance, Action::Write));
        assert!(!role_allows(Role::Nurse, Resource::Compliance, Action::Read));
        assert!(!role_allows(Role::Receptionist, Resource::Users, Action::Read));
        assert!(role_allows(Role::Admin, Resource::Users, Action::Delete));
    }

    #[test]
    fn cascade_order() {
        let conn = open_memory_database().unwrap();

        let admin = staff(&conn, Role::Admin);
        let d = check_access(&conn, &admin, Resource::Users, Action::Delete).unwrap();
        assert_eq!(d.reason, AccessReason::AdminRole);

        let nurse = staff(&conn, Role::Nurse);
        let d = check_access(&conn, &nurse, Resource::Patients, Action::Read).unwrap();
        assert_eq!(d.reason, AccessReason::RolePermission);

        let d = check_access(&conn, &nurse, Resource::Billing, Action::Read).unwrap();
        assert!(!d.allowed);
        assert_eq!(d.reason, AccessReason::Denied);

        let now = Utc::now();
        upsert_grant(
            &conn,
            &PermissionGrant {
                user_id: nurse.user_id,
                resource: Resource::Billing,
                action: Action::Read,
                granted_by: Some(admin.user_id),
                expires_at: None,
                created_at: now,
            },
        )
        .unwrap();
        let d = check_access(&conn, &nurse, Resource::Billing, Action::Read).unwrap();
        assert!(d.allowed);
        assert_eq!(d.reason, AccessReason::ExplicitGrant);
        // Grant is per action
        let d = check_access(&conn, &nurse, Resource::Billing, Action::Write).unwrap();
        assert!(!d.allowed);
    }

    #[test]
    fn expired_grant_is_ignored() {
        let conn = open_memory_database().unwrap();
        let clerk = staff(&conn, Role::BillingClerk);
        upsert_grant(
            &conn,
            &PermissionGrant {
                user_id: clerk.user_id,
                resource: Resource::LabOrders,
                action: Action::Read,
                granted_by: None,
                expires_at: Some(Utc::now() - Duration::seconds(1)),
                created_at: Utc::now() - Duration::days(1),
            },
        )
        .unwrap();
        let d = check_access(&conn, &clerk, Resource::LabOrders, Action::Read).unwrap();
        assert!(!d.allowed);
    }

    #[test]
    fn stored_compliance_grant_is_ignored() {
        let conn = open_memory_database().unwrap();
        let nurse = staff(&conn, Role::Nurse);
        upsert_grant(
            &conn,
            &PermissionGrant {
                user_id: nurse.user_id,
                resource: Resource::Compliance,
                action: Action::Read,
                granted_by: None,
                expires_at: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();
        let d = check_access(&conn, &nurse, Resource::Compliance, Action::Read).unwrap();
        assert_eq!(d, AccessDecision::deny());

        let officer = staff(&conn, Role::ComplianceOfficer);
        let d = check_access(&conn, &officer, Resource::Compliance, Action::Read).unwrap();
        assert_eq!(d.reason, AccessReason::RolePermission);
    }
}
