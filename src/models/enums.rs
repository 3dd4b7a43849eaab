use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern,
/// plus SQLite TEXT conversions so rows can carry the enum directly.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: DatabaseError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

str_enum!(Sex {
    Male => "male",
    Female => "female",
    Other => "other",
    Unknown => "unknown",
});

str_enum!(EmployeeStatus {
    Active => "active",
    OnLeave => "on_leave",
    Terminated => "terminated",
});

str_enum!(AppointmentKind {
    Consultation => "consultation",
    FollowUp => "follow_up",
    Procedure => "procedure",
    Telemedicine => "telemedicine",
});

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    CheckedIn => "checked_in",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

str_enum!(OrderPriority {
    Routine => "routine",
    Urgent => "urgent",
    Stat => "stat",
});

str_enum!(LabOrderStatus {
    Ordered => "ordered",
    Collected => "collected",
    InProgress => "in_progress",
    Resulted => "resulted",
    Cancelled => "cancelled",
});

str_enum!(AbnormalFlag {
    Normal => "normal",
    Low => "low",
    High => "high",
    CriticalLow => "critical_low",
    CriticalHigh => "critical_high",
});

str_enum!(Modality {
    Xray => "xray",
    Ct => "ct",
    Mri => "mri",
    Ultrasound => "ultrasound",
    Mammography => "mammography",
    Nuclear => "nuclear",
});

str_enum!(RadiologyOrderStatus {
    Ordered => "ordered",
    Scheduled => "scheduled",
    InProgress => "in_progress",
    Reported => "reported",
    Cancelled => "cancelled",
});

str_enum!(PrescriptionStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(SessionStatus {
    Scheduled => "scheduled",
    Active => "active",
    Ended => "ended",
    Cancelled => "cancelled",
});

str_enum!(ChargeSource {
    Manual => "manual",
    LabOrder => "lab_order",
    RadiologyOrder => "radiology_order",
    Pharmacy => "pharmacy",
    Appointment => "appointment",
});

str_enum!(BillStatus {
    Draft => "draft",
    Issued => "issued",
    Paid => "paid",
    Void => "void",
});

str_enum!(DiscountKind {
    None => "none",
    Percent => "percent",
    Amount => "amount",
});

str_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    Insurance => "insurance",
    Transfer => "transfer",
});

str_enum!(Role {
    Admin => "admin",
    Physician => "physician",
    Nurse => "nurse",
    Receptionist => "receptionist",
    BillingClerk => "billing_clerk",
    LabTechnician => "lab_technician",
    Radiologist => "radiologist",
    Pharmacist => "pharmacist",
    HrManager => "hr_manager",
    ComplianceOfficer => "compliance_officer",
});

str_enum!(Resource {
    Patients => "patients",
    Appointments => "appointments",
    Billing => "billing",
    Employees => "employees",
    LabOrders => "lab_orders",
    RadiologyOrders => "radiology_orders",
    Pharmacy => "pharmacy",
    Telemedicine => "telemedicine",
    Compliance => "compliance",
    Users => "users",
});

str_enum!(Action {
    Read => "read",
    Write => "write",
    Delete => "delete",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn as_str_matches_serde_name() {
        let json = serde_json::to_string(&AppointmentStatus::CheckedIn).unwrap();
        assert_eq!(json, format!("\"{}\"", AppointmentStatus::CheckedIn.as_str()));
        let json = serde_json::to_string(&Role::ComplianceOfficer).unwrap();
        assert_eq!(json, "\"compliance_officer\"");
        let json = serde_json::to_string(&Modality::Xray).unwrap();
        assert_eq!(json, "\"xray\"");
    }

    #[test]
    fn from_str_rejects_unknown() {
        let err = BillStatus::from_str("refunded").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn sqlite_round_trips_enum_column() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT NOT NULL);").unwrap();
        conn.execute("INSERT INTO t (v) VALUES (?1)", [LabOrderStatus::InProgress])
            .unwrap();
        let v: LabOrderStatus = conn
            .query_row("SELECT v FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(v, LabOrderStatus::InProgress);
    }

    #[test]
    fn sqlite_rejects_corrupt_enum_column() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT NOT NULL); INSERT INTO t VALUES ('bogus');")
            .unwrap();
        let result: rusqlite::Result<Role> = conn.query_row("SELECT v FROM t", [], |row| row.get(0));
        assert!(result.is_err());
    }
}
