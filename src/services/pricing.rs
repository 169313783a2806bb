//! Money math shared by checkout, settlement and reporting.
//!
//! All arithmetic is `Decimal`. Rounding happens only at the monetary
//! boundary (gateway amounts, stored commission, displayed percentages) and
//! always to 2 places with half-even rounding.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

const MONEY_DP: u32 = 2;

/// Rounds to 2 places, half-even.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointNearestEven)
}

/// Converts a major-unit amount into integer minor units.
///
/// The amount is quantized to 2 places first, then scaled by 100, so the
/// result is exact: `19.99 -> 1999`, `100.00 -> 10000`, `19.999 -> 2000`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "amount must not be negative: {}",
            amount
        )));
    }

    round_money(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.to_i64())
        .ok_or_else(|| ServiceError::ValidationError(format!("amount out of range: {}", amount)))
}

/// Platform cut of `total`, rounded for storage.
pub fn commission_amount(total: Decimal, percentage: Decimal) -> Decimal {
    round_money(total * percentage / Decimal::ONE_HUNDRED)
}

/// Splits a line total into `(commission, influencer_earnings)` without rounding.
/// The two parts always add back up to `line_total`.
pub fn split_line(line_total: Decimal, percentage: Decimal) -> (Decimal, Decimal) {
    let commission = line_total * percentage / Decimal::ONE_HUNDRED;
    (commission, line_total - commission)
}

/// `min(100, current / previous * 100)`, truncated to a whole percent; 0 when
/// there is no previous figure.
pub fn capped_change(current: Decimal, previous: Decimal) -> Decimal {
    if previous <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (current / previous * Decimal::ONE_HUNDRED)
        .min(Decimal::ONE_HUNDRED)
        .trunc()
}

/// Figures presented at checkout and sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub service_fee: Decimal,
    pub grand_total: Decimal,
    /// `grand_total` in minor currency units
    pub amount_minor_units: i64,
}

impl CheckoutTotals {
    pub fn compute(
        subtotal: Decimal,
        tax_rate: Decimal,
        service_fee: Decimal,
    ) -> Result<Self, ServiceError> {
        let tax = round_money(subtotal * tax_rate);
        let grand_total = subtotal + tax + service_fee;
        let amount_minor_units = to_minor_units(grand_total)?;

        Ok(Self {
            subtotal,
            tax,
            service_fee,
            grand_total,
            amount_minor_units,
        })
    }
}
