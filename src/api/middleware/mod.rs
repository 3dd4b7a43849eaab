//! API middleware stack.
//!
//! Execution order (outermost → innermost) on authenticated routes:
//! 1. Auth validator: bearer token to `StaffContext`; failed attempts are
//!    throttled per peer address
//! 2. Access logger: logs after auth, has the username
//! 3. Rate limiter: per staff account
//! 4. RBAC gate: per resource router
//!
//! Public routes are throttled per peer address only.

pub mod audit;
pub mod auth;
pub mod rate;
pub mod rbac;
