//! Ichimoku conversion/base lines: midpoint of the high/low range.
//!
//! Both lines are the same midpoint computation at different periods
//! (conventionally 9 for conversion, 26 for base), so one function serves
//! both enum variants.

use super::NotEnoughData;
use crate::domain::Candle;

pub(super) fn midpoint(candles: &[Candle], i: usize, period: usize) -> Result<f64, NotEnoughData> {
    if period == 0 || i + 1 < period {
        return Err(NotEnoughData);
    }
    let window = &candles[i + 1 - period..=i];
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    Ok((highest + lowest) / 2.0)
}
