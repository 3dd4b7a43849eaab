//! API endpoint handlers.
//!
//! One module per resource. Each resource module exposes `routes()` so the
//! router can gate the whole group with a single RBAC layer.

pub mod appointments;
pub mod auth;
pub mod billing;
pub mod compliance;
pub mod employees;
pub mod health;
pub mod lab_orders;
pub mod patients;
pub mod pharmacy;
pub mod radiology_orders;
pub mod telemedicine;
pub mod users;
