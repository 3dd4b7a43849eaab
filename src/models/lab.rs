use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AbnormalFlag, LabOrderStatus, OrderPriority};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabOrder {
    pub id: Uuid,
    pub order_number: String,
    pub patient_id: Uuid,
    pub ordering_provider_id: Uuid,
    pub test_code: String,
    pub test_name: String,
    pub priority: OrderPriority,
    pub status: LabOrderStatus,
    pub price_cents: i64,
    pub result_value: Option<String>,
    pub result_unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal_flag: Option<AbnormalFlag>,
    pub resulted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLabOrder {
    pub patient_id: Uuid,
    pub ordering_provider_id: Uuid,
    pub test_code: String,
    pub test_name: String,
    #[serde(default = "routine")]
    pub priority: OrderPriority,
    #[serde(default)]
    pub price_cents: i64,
}

pub(crate) fn routine() -> OrderPriority {
    OrderPriority::Routine
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabResultEntry {
    pub result_value: String,
    pub result_unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal_flag: Option<AbnormalFlag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabOrderFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<LabOrderStatus>,
    pub priority: Option<OrderPriority>,
}
