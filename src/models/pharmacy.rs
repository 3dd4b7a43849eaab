use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PrescriptionStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub rx_number: String,
    pub patient_id: Uuid,
    pub prescriber_id: Uuid,
    pub drug_code: String,
    pub drug_name: String,
    pub dose: String,
    pub frequency: String,
    pub quantity: u32,
    pub refills: u32,
    /// Number of fills dispensed so far (first fill included).
    pub fills_dispensed: u32,
    pub status: PrescriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prescription {
    pub fn fills_allowed(&self) -> u32 {
        self.refills + 1
    }

    pub fn refills_used(&self) -> u32 {
        self.fills_dispensed.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescription {
    pub patient_id: Uuid,
    pub prescriber_id: Uuid,
    pub drug_code: String,
    pub drug_name: String,
    pub dose: String,
    pub frequency: String,
    pub quantity: u32,
    #[serde(default)]
    pub refills: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<PrescriptionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub drug_code: String,
    pub drug_name: String,
    pub stock: u32,
    pub unit_price_cents: i64,
    pub updated_at: DateTime<Utc>,
}

/// Upsert body for an inventory line. `add_stock` is added to the current
/// level; a new line starts from zero.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryRestock {
    pub drug_code: String,
    pub drug_name: String,
    #[serde(default)]
    pub add_stock: u32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispenseResult {
    pub prescription: Prescription,
    pub remaining_stock: u32,
    pub charge_id: Uuid,
}
