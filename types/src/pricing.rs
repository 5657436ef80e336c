//! Bonding-curve pricing and resource-budget estimation.
//!
//! This module is the single place the cost curve is written down. Every
//! call site (client-side quoting and submission sizing) must go through
//! [`quote`]; the ledger applies the same convention, so an inline
//! re-derivation risks overpaying or a rejected underpayment.
//!
//! Convention: layer positions are 1-indexed — the `(n+1)`-th layer on a
//! cell costs `(n+1) * base_value`. Buying `L` layers at once pays the
//! arithmetic series of positions `n+1 ..= n+L` minus a quantity-discount
//! refund of `base_value * L * (L-1) / 2`.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingError {
    #[error("invalid quantity: layer count must be positive")]
    InvalidQuantity,
    #[error("quote overflows the pricing unit")]
    Overflow,
}

/// Total cost of appending `layers_to_add` layers to a cell that already
/// carries `existing_layers` layers, in the ledger's smallest pricing unit.
///
/// All arithmetic is checked `u128`; intermediate floating point is
/// forbidden because the result funds a transaction.
pub fn quote(
    existing_layers: u64,
    layers_to_add: u64,
    base_value: u128,
) -> Result<u128, PricingError> {
    if layers_to_add == 0 {
        return Err(PricingError::InvalidQuantity);
    }
    let n = existing_layers as u128;
    let l = layers_to_add as u128;

    // l * (2n + l + 1) is always even: l and (2n + l + 1) differ in parity.
    let series = n
        .checked_mul(2)
        .and_then(|m| m.checked_add(l))
        .and_then(|m| m.checked_add(1))
        .and_then(|m| m.checked_mul(l))
        .ok_or(PricingError::Overflow)?
        / 2;
    let refund = base_value
        .checked_mul(l)
        .and_then(|m| m.checked_mul(l - 1))
        .ok_or(PricingError::Overflow)?
        / 2;
    base_value
        .checked_mul(series)
        .and_then(|cost| cost.checked_sub(refund))
        .ok_or(PricingError::Overflow)
}

/// Deterministic linear fallback for the execution-resource budget of a
/// write, used when remote simulation fails or is unsupported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BudgetModel {
    pub base: u64,
    pub per_existing: u64,
    pub per_new: u64,
}

/// Safety multiplier 1.20, kept as an exact ratio to avoid float rounding.
const SAFETY_NUM: u128 = 6;
const SAFETY_DEN: u128 = 5;

impl Default for BudgetModel {
    fn default() -> Self {
        Self {
            base: 500_000,
            per_existing: 20_000,
            per_new: 15_000,
        }
    }
}

impl BudgetModel {
    /// `ceil((base + per_existing*n + per_new*L) * 1.20)`. Never fails;
    /// saturates at `u64::MAX` rather than aborting a purchase.
    pub fn estimate(&self, existing_layers: u64, layers_to_add: u64) -> u64 {
        let raw = self.base as u128
            + self.per_existing as u128 * existing_layers as u128
            + self.per_new as u128 * layers_to_add as u128;
        let padded = (raw * SAFETY_NUM + (SAFETY_DEN - 1)) / SAFETY_DEN;
        padded.try_into().unwrap_or(u64::MAX)
    }
}
