use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AppointmentKind, AppointmentStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub duration_minutes: u32,
    pub kind: AppointmentKind,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// `None` when the end falls past the last representable instant.
    pub fn ends_at(&self) -> Option<NaiveDateTime> {
        self.scheduled_at
            .checked_add_signed(Duration::minutes(i64::from(self.duration_minutes)))
    }

    /// Whether the slot still blocks the provider's calendar.
    pub fn occupies_slot(&self) -> bool {
        !matches!(
            self.status,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub duration_minutes: u32,
    pub kind: AppointmentKind,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentUpdate {
    pub scheduled_at: Option<NaiveDateTime>,
    pub duration_minutes: Option<u32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentStatusChange {
    pub status: AppointmentStatus,
    /// Visit fee captured as a charge when the appointment completes.
    pub fee_cents: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
}
