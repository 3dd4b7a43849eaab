use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{page_size, uuid_at, FilterQuery};
use crate::db::DatabaseError;
use crate::models::{Employee, EmployeeFilter};

const EMPLOYEE_COLUMNS: &str = "id, employee_number, first_name, last_name, email, department,
     position, hire_date, salary_cents, status, created_at, updated_at, deleted_at";

fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: uuid_at(row, 0)?,
        employee_number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        department: row.get(5)?,
        position: row.get(6)?,
        hire_date: row.get(7)?,
        salary_cents: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        deleted_at: row.get(12)?,
    })
}

pub fn insert_employee(conn: &Connection, e: &Employee) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO employees ({EMPLOYEE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            e.id.to_string(),
            e.employee_number,
            e.first_name,
            e.last_name,
            e.email,
            e.department,
            e.position,
            e.hire_date,
            e.salary_cents,
            e.status,
            e.created_at,
            e.updated_at,
            e.deleted_at,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

/// Live (not soft-deleted) employee by id.
pub fn get_employee(conn: &Connection, id: &Uuid) -> Result<Option<Employee>, DatabaseError> {
    let employee = conn
        .query_row(
            &format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?1 AND deleted_at IS NULL"),
            params![id.to_string()],
            employee_from_row,
        )
        .optional()?;
    Ok(employee)
}

pub fn find_employee_id_by_email(
    conn: &Connection,
    email: &str,
    exclude: Option<&Uuid>,
) -> Result<Option<Uuid>, DatabaseError> {
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
    let id = conn
        .query_row(
            "SELECT id FROM employees WHERE email = ?1 AND deleted_at IS NULL AND id != ?2",
            params![email, exclude],
            |row| uuid_at(row, 0),
        )
        .optional()?;
    Ok(id)
}

pub fn list_employees(
    conn: &Connection,
    filter: &EmployeeFilter,
) -> Result<Vec<Employee>, DatabaseError> {
    let mut q = FilterQuery::new(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE deleted_at IS NULL"
    ));
    q.and_opt("department = ?", filter.department.clone())
        .and_opt("status = ?", filter.status)
        .tail("ORDER BY last_name, first_name LIMIT ? OFFSET ?")
        .push_param(i64::from(page_size(filter.limit, 50, 200)))
        .push_param(i64::from(filter.offset.unwrap_or(0)));

    let mut stmt = conn.prepare(q.sql())?;
    let rows = stmt.query_map(q.params().as_slice(), employee_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn update_employee(conn: &Connection, e: &Employee) -> Result<(), DatabaseError> {
    let updated = conn
        .execute(
            "UPDATE employees SET first_name = ?2, last_name = ?3, email = ?4, department = ?5,
             position = ?6, salary_cents = ?7, status = ?8, updated_at = ?9
             WHERE id = ?1 AND deleted_at IS NULL",
            params![
                e.id.to_string(),
                e.first_name,
                e.last_name,
                e.email,
                e.department,
                e.position,
                e.salary_cents,
                e.status,
                e.updated_at,
            ],
        )
        .map_err(DatabaseError::from_write)?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Employee", e.id));
    }
    Ok(())
}

pub fn soft_delete_employee(
    conn: &Connection,
    id: &Uuid,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE employees SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![id.to_string(), at],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Employee", id));
    }
    Ok(())
}
