//! Employee records.

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::audit::{self, Actor, Change};
use crate::billing::calculator::format_sequence;
use crate::db::repository;
use crate::error::{check_email, required, DomainError, DomainResult};
use crate::models::enums::EmployeeStatus;
use crate::models::{Employee, EmployeeFilter, EmployeeUpdate, NewEmployee};

pub const EMPLOYEE_NUMBER_PREFIX: &str = "EMP";
const EMPLOYEE_NUMBER_WIDTH: usize = 5;

fn check_salary(salary_cents: i64) -> DomainResult<()> {
    if salary_cents < 0 {
        return Err(DomainError::validation("salary must not be negative"));
    }
    Ok(())
}

fn check_email_free(conn: &Connection, email: &str, exclude: Option<&Uuid>) -> DomainResult<()> {
    check_email(email)?;
    if repository::find_employee_id_by_email(conn, email, exclude)?.is_some() {
        return Err(DomainError::conflict(format!(
            "another employee already uses {email}"
        )));
    }
    Ok(())
}

pub fn create_employee(conn: &mut Connection, actor: &Actor, new: NewEmployee) -> DomainResult<Employee> {
    let first_name = required("first_name", &new.first_name)?;
    let last_name = required("last_name", &new.last_name)?;
    let email = required("email", &new.email)?;
    let department = required("department", &new.department)?;
    let position = required("position", &new.position)?;
    check_salary(new.salary_cents)?;

    let tx = conn.transaction()?;
    check_email_free(&tx, &email, None)?;
    let seq = repository::next_sequence_value(&tx, repository::SEQ_EMPLOYEE)?;
    let now = Utc::now();
    let employee = Employee {
        id: Uuid::new_v4(),
        employee_number: format_sequence(EMPLOYEE_NUMBER_PREFIX, seq, EMPLOYEE_NUMBER_WIDTH),
        first_name,
        last_name,
        email,
        department,
        position,
        hire_date: new.hire_date,
        salary_cents: new.salary_cents,
        status: EmployeeStatus::Active,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    repository::insert_employee(&tx, &employee)?;
    audit::log(&tx, actor, "employee", employee.id, Change::created(&employee)?)?;
    tx.commit()?;

    tracing::info!(employee_id = %employee.id, number = %employee.employee_number, "Employee created");
    Ok(employee)
}

pub fn get_employee(conn: &Connection, id: &Uuid) -> DomainResult<Employee> {
    repository::get_employee(conn, id)?.ok_or_else(|| DomainError::not_found("Employee", id))
}

pub fn list_employees(conn: &Connection, filter: &EmployeeFilter) -> DomainResult<Vec<Employee>> {
    Ok(repository::list_employees(conn, filter)?)
}

pub fn update_employee(
    conn: &mut Connection,
    actor: &Actor,
    id: &Uuid,
    update: EmployeeUpdate,
) -> DomainResult<Employee> {
    let tx = conn.transaction()?;
    let before = get_employee(&tx, id)?;
    let mut employee = before.clone();

    if let Some(status) = update.status {
        if before.status == EmployeeStatus::Terminated && status != EmployeeStatus::Terminated {
            return Err(DomainError::conflict("a terminated employee cannot be reinstated"));
        }
        employee.status = status;
    }
    if let Some(first) = update.first_name {
        employee.first_name = required("first_name", &first)?;
    }
    if let Some(last) = update.last_name {
        employee.last_name = required("last_name", &last)?;
    }
    if let Some(email) = update.email {
        employee.email = required("email", &email)?;
        check_email_free(&tx, &employee.email, Some(id))?;
    }
    if let Some(department) = update.department {
        employee.department = required("department", &department)?;
    }
    if let Some(position) = update.position {
        employee.position = required("position", &position)?;
    }
    if let Some(salary) = update.salary_cents {
        check_salary(salary)?;
        employee.salary_cents = salary;
    }
    employee.updated_at = Utc::now();

    repository::update_employee(&tx, &employee)?;
    audit::log(&tx, actor, "employee", employee.id, Change::updated(&before, &employee)?)?;
    tx.commit()?;
    Ok(employee)
}

pub fn delete_employee(conn: &mut Connection, actor: &Actor, id: &Uuid) -> DomainResult<()> {
    let tx = conn.transaction()?;
    let before = get_employee(&tx, id)?;
    repository::soft_delete_employee(&tx, id, Utc::now())?;
    audit::log(&tx, actor, "employee", id, Change::deleted(&before)?)?;
    tx.commit()?;
    Ok(())
}

/// A live employee, or `NotFound`.
pub(crate) fn require_employee(conn: &Connection, id: &Uuid) -> DomainResult<Employee> {
    get_employee(conn, id)
}

/// A live employee who can take on clinical work. Inactive staff → `Conflict`.
pub(crate) fn require_active_provider(conn: &Connection, id: &Uuid) -> DomainResult<Employee> {
    let employee = get_employee(conn, id)?;
    if employee.status != EmployeeStatus::Active {
        return Err(DomainError::conflict(format!(
            "employee {} is {}",
            employee.employee_number, employee.status
        )));
    }
    Ok(employee)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::billing::tests::admin;
    use crate::db::sqlite::open_memory_database;
    use chrono::NaiveDate;

    pub(crate) fn new_employee(email: &str) -> NewEmployee {
        NewEmployee {
            first_name: "Greg".into(),
            last_name: "House".into(),
            email: email.into(),
            department: "Diagnostics".into(),
            position: "Physician".into(),
            hire_date: NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(),
            salary_cents: 25_000_000,
        }
    }

    pub(crate) fn provider(conn: &mut Connection) -> Uuid {
        let email = format!("{}@example.org", Uuid::new_v4().simple());
        create_employee(conn, &admin(), new_employee(&email)).unwrap().id
    }

    #[test]
    fn employee_number_and_defaults() {
        let mut conn = open_memory_database().unwrap();
        let e = create_employee(&mut conn, &admin(), new_employee("house@example.org")).unwrap();
        assert_eq!(e.employee_number, "EMP-00001");
        assert_eq!(e.status, EmployeeStatus::Active);
    }

    #[test]
    fn validation_and_conflicts() {
        let mut conn = open_memory_database().unwrap();
        let mut bad = new_employee("house@example.org");
        bad.salary_cents = -1;
        assert!(matches!(
            create_employee(&mut conn, &admin(), bad),
            Err(DomainError::Validation(_))
        ));
        create_employee(&mut conn, &admin(), new_employee("house@example.org")).unwrap();
        assert!(matches!(
            create_employee(&mut conn, &admin(), new_employee("house@example.org")),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn terminated_is_final() {
        let mut conn = open_memory_database().unwrap();
        let e = create_employee(&mut conn, &admin(), new_employee("house@example.org")).unwrap();
        let on_leave = EmployeeUpdate {
            status: Some(EmployeeStatus::OnLeave),
            ..Default::default()
        };
        update_employee(&mut conn, &admin(), &e.id, on_leave.clone()).unwrap();
        assert!(matches!(
            require_active_provider(&conn, &e.id),
            Err(DomainError::Conflict(_))
        ));
        let terminate = EmployeeUpdate {
            status: Some(EmployeeStatus::Terminated),
            ..Default::default()
        };
        update_employee(&mut conn, &admin(), &e.id, terminate).unwrap();
        assert!(matches!(
            update_employee(&mut conn, &admin(), &e.id, on_leave),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn delete_hides_employee() {
        let mut conn = open_memory_database().unwrap();
        let e = create_employee(&mut conn, &admin(), new_employee("house@example.org")).unwrap();
        delete_employee(&mut conn, &admin(), &e.id).unwrap();
        assert!(matches!(get_employee(&conn, &e.id), Err(DomainError::NotFound { .. })));
        assert!(list_employees(&conn, &EmployeeFilter::default()).unwrap().is_empty());
    }
}
