//! Exponential moving average over closes.
//!
//! Seeded with the SMA of the first `period` closes, then recursive with
//! alpha = 2 / (period + 1). Anchoring at the series start keeps the value
//! at a given index independent of where the scan happens to be.

use super::NotEnoughData;
use crate::domain::Candle;

pub(super) fn ema(candles: &[Candle], i: usize, period: usize) -> Result<f64, NotEnoughData> {
    if period == 0 || i + 1 < period {
        return Err(NotEnoughData);
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed: f64 = candles[..period].iter().map(|c| c.close).sum::<f64>() / period as f64;
    let mut value = seed;
    for candle in &candles[period..=i] {
        value = alpha * candle.close + (1.0 - alpha) * value;
    }
    Ok(value)
}
