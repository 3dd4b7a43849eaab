use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{opt_uuid_at, page_size, uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{Patient, PatientFilter};

const PATIENT_COLUMNS: &str = "id, mrn, first_name, last_name, date_of_birth, sex, phone, email,
     address, blood_type, emergency_contact, notes, created_at, updated_at, deleted_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: uuid_at(row, 0)?,
        mrn: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        date_of_birth: row.get(4)?,
        sex: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        address: row.get(8)?,
        blood_type: row.get(9)?,
        emergency_contact: row.get(10)?,
        notes: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        deleted_at: row.get(14)?,
    })
}

pub fn insert_patient(conn: &Connection, p: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO patients ({PATIENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            p.id.to_string(),
            p.mrn,
            p.first_name,
            p.last_name,
            p.date_of_birth,
            p.sex,
            p.phone,
            p.email,
            p.address,
            p.blood_type,
            p.emergency_contact,
            p.notes,
            p.created_at,
            p.updated_at,
            p.deleted_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

/// Live (not soft-deleted) patient by id.
pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1 AND deleted_at IS NULL"),
            params![id.to_string()],
            patient_from_row,
        )
        .optional()?;
    Ok(patient)
}

pub fn get_patient_by_mrn(conn: &Connection, mrn: &str) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE mrn = ?1 AND deleted_at IS NULL"),
            params![mrn],
            patient_from_row,
        )
        .optional()?;
    Ok(patient)
}

pub fn patient_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM patients WHERE id = ?1 AND deleted_at IS NULL",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

/// Id of another live patient already using `email`, if any.
pub fn find_patient_id_by_email(
    conn: &Connection,
    email: &str,
    exclude: Option<&Uuid>,
) -> Result<Option<Uuid>, DatabaseError> {
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
    let id = conn
        .query_row(
            "SELECT id FROM patients WHERE email = ?1 AND deleted_at IS NULL AND id != ?2",
            params![email, exclude],
            |row| opt_uuid_at(row, 0),
        )
        .optional()?
        .flatten();
    Ok(id)
}

/// Live patients ordered by last/first name. `search` matches name or MRN.
pub fn list_patients(conn: &Connection, filter: &PatientFilter) -> Result<Vec<Patient>, DatabaseError> {
    let mut q = FilterQuery::new(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE deleted_at IS NULL"
    ));
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", term.to_lowercase());
        q.and(
            "(LOWER(first_name || ' ' || last_name) LIKE ? OR LOWER(mrn) LIKE ?)",
            pattern.clone(),
        )
        .push_param(pattern);
    }
    q.tail("ORDER BY last_name, first_name, mrn LIMIT ? OFFSET ?")
        .push_param(i64::from(page_size(filter.limit, 50, 200)))
        .push_param(i64::from(filter.offset.unwrap_or(0)));

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), patient_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Overwrite all mutable columns of a live patient.
pub fn update_patient(conn: &Connection, p: &Patient) -> Result<(), DatabaseError> {
    let updated = conn
        .execute(
            "UPDATE patients SET first_name = ?2, last_name = ?3, date_of_birth = ?4, sex = ?5,
             phone = ?6, email = ?7, address = ?8, blood_type = ?9, emergency_contact = ?10,
             notes = ?11, updated_at = ?12
             WHERE id = ?1 AND deleted_at IS NULL",
            params![
                p.id.to_string(),
                p.first_name,
                p.last_name,
                p.date_of_birth,
                p.sex,
                p.phone,
                p.email,
                p.address,
                p.blood_type,
                p.emergency_contact,
                p.notes,
                p.updated_at,
            ],
        )
        .map_err(DatabaseError::from_write)?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Patient", p.id));
    }
    Ok(())
}

pub fn soft_delete_patient(
    conn: &Connection,
    id: &Uuid,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE patients SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![id.to_string(), at],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Patient", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::Sex;
    use chrono::NaiveDate;

    fn sample(mrn: &str, first: &str, last: &str, email: Option<&str>) -> Patient {
        let now = Utc::now();
        Patient {
            id: Uuid::new_v4(),
            mrn: mrn.into(),
            first_name: first.into(),
            last_name: last.into(),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 17).unwrap(),
            sex: Sex::Female,
            phone: None,
            email: email.map(String::from),
            address: None,
            blood_type: Some("O+".into()),
            emergency_contact: None,
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let p = sample("MRN-000001", "Ada", "Lovelace", Some("ada@example.org"));
        insert_patient(&conn, &p).unwrap();
        let loaded = get_patient(&conn, &p.id).unwrap().unwrap();
        assert_eq!(loaded.mrn, "MRN-000001");
        assert_eq!(loaded.sex, Sex::Female);
        assert_eq!(loaded.date_of_birth, p.date_of_birth);
        let by_mrn = get_patient_by_mrn(&conn, "MRN-000001").unwrap().unwrap();
        assert_eq!(by_mrn.id, p.id);
    }

    #[test]
    fn soft_deleted_patient_is_hidden() {
        let conn = open_memory_database().unwrap();
        let p = sample("MRN-000001", "Ada", "Lovelace", None);
        insert_patient(&conn, &p).unwrap();
        soft_delete_patient(&conn, &p.id, Utc::now()).unwrap();
        assert!(get_patient(&conn, &p.id).unwrap().is_none());
        assert!(!patient_exists(&conn, &p.id).unwrap());
        assert!(list_patients(&conn, &PatientFilter::default()).unwrap().is_empty());
        // Second delete reports not found
        assert!(matches!(
            soft_delete_patient(&conn, &p.id, Utc::now()),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn live_email_is_unique_but_deleted_frees_it() {
        let conn = open_memory_database().unwrap();
        let a = sample("MRN-000001", "Ada", "Lovelace", Some("shared@example.org"));
        insert_patient(&conn, &a).unwrap();
        let b = sample("MRN-000002", "Bea", "Smith", Some("shared@example.org"));
        let err = insert_patient(&conn, &b).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));

        soft_delete_patient(&conn, &a.id, Utc::now()).unwrap();
        insert_patient(&conn, &b).unwrap();
        assert_eq!(
            find_patient_id_by_email(&conn, "shared@example.org", None).unwrap(),
            Some(b.id)
        );
        assert_eq!(
            find_patient_id_by_email(&conn, "shared@example.org", Some(&b.id)).unwrap(),
            None
        );
    }

    #[test]
    fn list_searches_name_and_mrn() {
        let conn = open_memory_database().unwrap();
        insert_patient(&conn, &sample("MRN-000001", "Ada", "Lovelace", None)).unwrap();
        insert_patient(&conn, &sample("MRN-000002", "Alan", "Turing", None)).unwrap();
        insert_patient(&conn, &sample("MRN-000003", "Grace", "Hopper", None)).unwrap();

        let filter = PatientFilter { search: Some("turing".into()), ..Default::default() };
        let found = list_patients(&conn, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first_name, "Alan");

        let filter = PatientFilter { search: Some("mrn-00000".into()), ..Default::default() };
        assert_eq!(list_patients(&conn, &filter).unwrap().len(), 3);

        let filter = PatientFilter { limit: Some(2), offset: Some(2), ..Default::default() };
        let page = list_patients(&conn, &filter).unwrap();
        assert_eq!(page.len(), 1);
        // Ordered by last name: Hopper, Lovelace, Turing
        assert_eq!(page[0].last_name, "Turing");
    }
}
