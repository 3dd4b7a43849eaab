use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Sequence names for human-facing document numbers.
pub const SEQ_MRN: &str = "mrn";
pub const SEQ_EMPLOYEE: &str = "employee";
pub const SEQ_LAB_ORDER: &str = "lab_order";
pub const SEQ_RADIOLOGY_ORDER: &str = "radiology_order";
pub const SEQ_PRESCRIPTION: &str = "prescription";

/// Bills are numbered per issue year: `bill:2026`.
pub fn bill_sequence_name(year: i32) -> String {
    format!("bill:{year}")
}

/// Increment and return the named counter (first call returns 1).
///
/// Must run inside the same transaction as the insert that consumes the
/// value, otherwise a failed insert leaves a gap.
pub fn next_sequence_value(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO sequences (name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1",
        params![name],
    )?;
    let value = conn.query_row(
        "SELECT value FROM sequences WHERE name = ?1",
        params![name],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(value)
}

/// Current value without incrementing (0 if never used).
pub fn current_sequence_value(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    use rusqlite::OptionalExtension;
    let value = conn
        .query_row(
            "SELECT value FROM sequences WHERE name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn sequence_starts_at_one_and_increments() {
        let conn = open_memory_database().unwrap();
        assert_eq!(current_sequence_value(&conn, SEQ_MRN).unwrap(), 0);
        assert_eq!(next_sequence_value(&conn, SEQ_MRN).unwrap(), 1);
        assert_eq!(next_sequence_value(&conn, SEQ_MRN).unwrap(), 2);
        assert_eq!(current_sequence_value(&conn, SEQ_MRN).unwrap(), 2);
    }

    #[test]
    fn sequences_are_independent() {
        let conn = open_memory_database().unwrap();
        next_sequence_value(&conn, SEQ_MRN).unwrap();
        next_sequence_value(&conn, SEQ_MRN).unwrap();
        assert_eq!(next_sequence_value(&conn, SEQ_LAB_ORDER).unwrap(), 1);
        assert_eq!(next_sequence_value(&conn, &bill_sequence_name(2026)).unwrap(), 1);
        assert_eq!(next_sequence_value(&conn, &bill_sequence_name(2027)).unwrap(), 1);
    }

    #[test]
    fn rolled_back_increment_is_not_consumed() {
        let mut conn = open_memory_database().unwrap();
        next_sequence_value(&conn, SEQ_MRN).unwrap();
        {
            let tx = conn.transaction().unwrap();
            next_sequence_value(&tx, SEQ_MRN).unwrap();
            // dropped without commit
        }
        assert_eq!(next_sequence_value(&conn, SEQ_MRN).unwrap(), 2);
    }
}
