//! MACD line and signal line.
//!
//! Line: EMA(fast) - EMA(slow). Signal: EMA of the line over `signal`
//! periods, seeded with the SMA of the first `signal` line values.

use super::{ema::ema, NotEnoughData};
use crate::domain::Candle;

pub(super) fn macd_line(
    candles: &[Candle],
    i: usize,
    fast: usize,
    slow: usize,
) -> Result<f64, NotEnoughData> {
    if fast == 0 || slow == 0 || fast >= slow {
        return Err(NotEnoughData);
    }
    Ok(ema(candles, i, fast)? - ema(candles, i, slow)?)
}

pub(super) fn macd_signal(
    candles: &[Candle],
    i: usize,
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<f64, NotEnoughData> {
    if signal == 0 || i + 2 < slow + signal {
        return Err(NotEnoughData);
    }
    // The MACD line first exists at index slow-1.
    let first = slow - 1;
    let seed: f64 = (first..first + signal)
        .map(|j| macd_line(candles, j, fast, slow))
        .sum::<Result<f64, _>>()?
        / signal as f64;

    let alpha = 2.0 / (signal as f64 + 1.0);
    let mut value = seed;
    for j in (first + signal)..=i {
        value = alpha * macd_line(candles, j, fast, slow)? + (1.0 - alpha) * value;
    }
    Ok(value)
}
