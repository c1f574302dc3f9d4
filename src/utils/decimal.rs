//! Decimal arithmetic utilities for price and strike calculations.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Round to the nearest multiple of `step` (midpoints go to the even multiple).
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step == Decimal::ZERO {
        return value;
    }
    (value / step).round() * step
}

/// At-the-money strike: spot rounded to the nearest whole strike on a `step` grid.
pub fn atm_strike(spot: Decimal, step: u32) -> Option<u32> {
    round_to_step(spot, Decimal::from(step)).to_u32()
}

/// Absolute distance between two prices.
pub fn abs_diff(a: Decimal, b: Decimal) -> Decimal {
    (a - b).abs()
}
