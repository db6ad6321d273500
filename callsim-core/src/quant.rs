//! Fixed-precision rounding helpers.
//!
//! Fees and slippage are rounded at the point of application (not only at
//! final output) so that sweep replay is bit-stable across machines.
//! Nothing in the engine depends on map iteration order.

/// Number of decimal places used for all cash-flow arithmetic.
pub const CASH_DECIMALS: u32 = 12;

/// Round half away from zero at `decimals` decimal places.
pub fn round_dp(x: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (x * scale).round() / scale
}

/// Round a cash amount at the standard precision.
pub fn round_cash(x: f64) -> f64 {
    round_dp(x, CASH_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_dp(0.125, 2), 0.13);
        assert_eq!(round_dp(-0.125, 2), -0.13);
    }

    #[test]
    fn round_is_idempotent() {
        let x = round_cash(1.000_000_000_000_4);
        assert_eq!(round_cash(x), x);
    }

    #[test]
    fn round_cash_keeps_twelve_places() {
        let x = round_cash(0.123_456_789_012_999);
        assert_eq!(x, 0.123_456_789_013);
    }
}
