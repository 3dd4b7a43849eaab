use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Modality, OrderPriority, RadiologyOrderStatus};
use super::lab::routine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiologyOrder {
    pub id: Uuid,
    pub order_number: String,
    pub patient_id: Uuid,
    pub ordering_provider_id: Uuid,
    pub modality: Modality,
    pub body_part: String,
    pub priority: OrderPriority,
    pub status: RadiologyOrderStatus,
    pub price_cents: i64,
    pub clinical_indication: Option<String>,
    pub findings: Option<String>,
    pub impression: Option<String>,
    pub reported_by: Option<Uuid>,
    pub reported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRadiologyOrder {
    pub patient_id: Uuid,
    pub ordering_provider_id: Uuid,
    pub modality: Modality,
    pub body_part: String,
    #[serde(default = "routine")]
    pub priority: OrderPriority,
    #[serde(default)]
    pub price_cents: i64,
    pub clinical_indication: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RadiologyReport {
    pub findings: String,
    pub impression: String,
    pub reported_by: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RadiologyOrderFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<RadiologyOrderStatus>,
    pub modality: Option<Modality>,
}
