use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{BillStatus, ChargeSource, DiscountKind, PaymentMethod};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub code: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub service_date: NaiveDate,
    pub source: ChargeSource,
    pub source_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCharge {
    pub patient_id: Uuid,
    pub code: String,
    pub description: String,
    #[serde(default = "one")]
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub service_date: Option<NaiveDate>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargeFilter {
    pub patient_id: Option<Uuid>,
    /// Only charges not yet attached to a bill.
    #[serde(default)]
    pub unbilled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub bill_number: Option<String>,
    pub patient_id: Uuid,
    pub status: BillStatus,
    pub discount_kind: DiscountKind,
    pub discount_value: i64,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn balance_cents(&self) -> i64 {
        self.total_cents - self.amount_paid_cents
    }
}

/// A bill with its line items and payments, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct BillDetail {
    #[serde(flatten)]
    pub bill: Bill,
    pub balance_cents: i64,
    pub lines: Vec<Charge>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<BillStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}
