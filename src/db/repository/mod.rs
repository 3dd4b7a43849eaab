//! Repository layer: entity-scoped database operations.
//!
//! Plain functions over `&Connection`. Callers that need several writes to
//! land together pass a `Transaction` (it derefs to `Connection`).

mod appointment;
mod audit;
mod billing;
mod employee;
mod lab_order;
mod patient;
mod pharmacy;
mod radiology_order;
mod sequence;
mod staff;
mod telemedicine;

use rusqlite::types::{ToSql, Type};
use rusqlite::Row;
use uuid::Uuid;

// Re-export all public items from sub-modules
pub use appointment::*;
pub use audit::*;
pub use billing::*;
pub use employee::*;
pub use lab_order::*;
pub use patient::*;
pub use pharmacy::*;
pub use radiology_order::*;
pub use sequence::*;
pub use staff::*;
pub use telemedicine::*;

/// Read a TEXT column holding a UUID.
pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable TEXT column holding a UUID.
pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Clamp a requested page size to `[1, max]`, using `default` when absent.
pub(crate) fn page_size(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max)
}

/// Incremental `WHERE` builder for filtered list queries. Clauses use
/// anonymous `?` placeholders, bound in push order.
pub(crate) struct FilterQuery {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl FilterQuery {
    /// `base` must end in a `WHERE` condition (e.g. `... WHERE 1=1`).
    pub(crate) fn new(base: &str) -> Self {
        Self {
            sql: base.to_string(),
            params: Vec::new(),
        }
    }

    pub(crate) fn and(&mut self, clause: &str, value: impl ToSql + 'static) -> &mut Self {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
        self.params.push(Box::new(value));
        self
    }

    pub(crate) fn and_opt<T: ToSql + 'static>(
        &mut self,
        clause: &str,
        value: Option<T>,
    ) -> &mut Self {
        if let Some(v) = value {
            self.and(clause, v);
        }
        self
    }

    pub(crate) fn raw(&mut self, clause: &str) -> &mut Self {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
        self
    }

    pub(crate) fn tail(&mut self, tail: &str) -> &mut Self {
        self.sql.push(' ');
        self.sql.push_str(tail);
        self
    }

    pub(crate) fn push_param(&mut self, value: impl ToSql + 'static) -> &mut Self {
        self.params.push(Box::new(value));
        self
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}
