//! Pure money arithmetic for bills. All amounts are integer cents.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::models::enums::DiscountKind;
use crate::models::Charge;

/// 100 % in basis points.
pub const FULL_BASIS_POINTS: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<&Charge> for LineItem {
    fn from(charge: &Charge) -> Self {
        Self {
            quantity: charge.quantity,
            unit_price_cents: charge.unit_price_cents,
        }
    }
}

/// Bill-level discount. Percent is expressed in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    Percent(i64),
    Amount(i64),
}

impl Discount {
    /// Rebuild from the stored `(discount_kind, discount_value)` pair.
    pub fn from_parts(kind: DiscountKind, value: i64) -> Self {
        match kind {
            DiscountKind::None => Self::None,
            DiscountKind::Percent => Self::Percent(value),
            DiscountKind::Amount => Self::Amount(value),
        }
    }

    pub fn kind(&self) -> DiscountKind {
        match self {
            Self::None => DiscountKind::None,
            Self::Percent(_) => DiscountKind::Percent,
            Self::Amount(_) => DiscountKind::Amount,
        }
    }

    pub fn value(&self) -> i64 {
        match *self {
            Self::None => 0,
            Self::Percent(v) | Self::Amount(v) => v,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match *self {
            Self::None => Ok(()),
            Self::Percent(bp) if (0..=FULL_BASIS_POINTS).contains(&bp) => Ok(()),
            Self::Percent(bp) => Err(DomainError::validation(format!(
                "percent discount must be 0..={FULL_BASIS_POINTS} basis points, got {bp}"
            ))),
            Self::Amount(c) if c >= 0 => Ok(()),
            Self::Amount(c) => Err(DomainError::validation(format!(
                "amount discount must not be negative, got {c}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillTotals {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
}

pub fn calculate(lines: &[LineItem], discount: Discount) -> DomainResult<BillTotals> {
    discount.validate()?;

    let mut subtotal: i64 = 0;
    for line in lines {
        if line.unit_price_cents < 0 {
            return Err(DomainError::validation("unit price must not be negative"));
        }
        let amount = line
            .unit_price_cents
            .checked_mul(i64::from(line.quantity))
            .and_then(|amount| subtotal.checked_add(amount))
            .ok_or_else(|| DomainError::validation("bill amount overflows"))?;
        subtotal = amount;
    }

    let discount_cents = match discount {
        Discount::None => 0,
        Discount::Percent(bp) => percent_of(subtotal, bp),
        Discount::Amount(c) => c.min(subtotal),
    };

    Ok(BillTotals {
        subtotal_cents: subtotal,
        discount_cents,
        total_cents: (subtotal - discount_cents).max(0),
    })
}

/// `round_half_up(amount × bp / 10000)` for non-negative inputs. Widened to
/// i128 so the product cannot overflow.
fn percent_of(amount: i64, bp: i64) -> i64 {
    let scaled = i128::from(amount) * i128::from(bp);
    let half = i128::from(FULL_BASIS_POINTS / 2);
    // amount ≤ i64::MAX and bp ≤ 10000, so the quotient fits in i64
    ((scaled + half) / i128::from(FULL_BASIS_POINTS)) as i64
}

/// `INV-2026-000001`
pub fn format_document_number(prefix: &str, year: i32, seq: i64) -> String {
    format!("{prefix}-{year}-{seq:06}")
}

/// `MRN-000001`, `EMP-00001`
pub fn format_sequence(prefix: &str, seq: i64, width: usize) -> String {
    format!("{prefix}-{seq:0width$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: u32, unit_price_cents: i64) -> LineItem {
        LineItem {
            quantity,
            unit_price_cents,
        }
    }

    #[test]
    fn subtotal_sums_quantity_times_price() {
        let totals = calculate(&[line(2, 1_250), line(1, 999)], Discount::None).unwrap();
        assert_eq!(totals.subtotal_cents, 3_499);
        assert_eq!(totals.discount_cents, 0);
        assert_eq!(totals.total_cents, 3_499);
    }

    #[test]
    fn empty_bill_is_zero() {
        let totals = calculate(&[], Discount::Percent(5_000)).unwrap();
        assert_eq!(totals, BillTotals { subtotal_cents: 0, discount_cents: 0, total_cents: 0 });
    }

    #[test]
    fn percent_discount_rounds_half_up() {
        // 10 % of 1005 = 100.5 → 101
        let totals = calculate(&[line(1, 1_005)], Discount::Percent(1_000)).unwrap();
        assert_eq!(totals.discount_cents, 101);
        assert_eq!(totals.total_cents, 904);
        // 10 % of 1004 = 100.4 → 100
        let totals = calculate(&[line(1, 1_004)], Discount::Percent(1_000)).unwrap();
        assert_eq!(totals.discount_cents, 100);
        // 12.5 % of 333 = 41.625 → 42
        let totals = calculate(&[line(1, 333)], Discount::Percent(1_250)).unwrap();
        assert_eq!(totals.discount_cents, 42);
    }

    #[test]
    fn full_percent_discount_zeroes_total() {
        let totals = calculate(&[line(3, 700)], Discount::Percent(10_000)).unwrap();
        assert_eq!(totals.total_cents, 0);
    }

    #[test]
    fn amount_discount_clamps_to_subtotal() {
        let totals = calculate(&[line(1, 500)], Discount::Amount(2_000)).unwrap();
        assert_eq!(totals.discount_cents, 500);
        assert_eq!(totals.total_cents, 0);
        let totals = calculate(&[line(1, 500)], Discount::Amount(120)).unwrap();
        assert_eq!(totals.total_cents, 380);
    }

    #[test]
    fn invalid_discounts_rejected() {
        assert!(matches!(
            calculate(&[line(1, 100)], Discount::Percent(10_001)),
            Err(DomainError::Validation(_))
        ));
        assert!(calculate(&[line(1, 100)], Discount::Percent(-1)).is_err());
        assert!(calculate(&[line(1, 100)], Discount::Amount(-1)).is_err());
    }

    #[test]
    fn overflow_is_rejected() {
        let err = calculate(&[line(u32::MAX, i64::MAX / 2)], Discount::None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let err = calculate(&[line(1, i64::MAX), line(1, 1)], Discount::None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn discount_serde_shape() {
        let d: Discount = serde_json::from_str(r#"{"kind":"percent","value":1500}"#).unwrap();
        assert_eq!(d, Discount::Percent(1_500));
        let d: Discount = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(d, Discount::None);
        assert_eq!(Discount::from_parts(d.kind(), d.value()), Discount::None);
        assert_eq!(
            Discount::from_parts(DiscountKind::Amount, 250),
            Discount::Amount(250)
        );
    }

    #[test]
    fn document_numbers() {
        assert_eq!(format_document_number("INV", 2026, 1), "INV-2026-000001");
        assert_eq!(format_document_number("INV", 2026, 1_234_567), "INV-2026-1234567");
        assert_eq!(format_sequence("MRN", 42, 6), "MRN-000042");
        assert_eq!(format_sequence("EMP", 7, 5), "EMP-00007");
    }
}
