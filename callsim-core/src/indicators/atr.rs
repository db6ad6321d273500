//! Average True Range with Wilder smoothing.
//!
//! TR = max(high - low, |high - prev_close|, |low - prev_close|).
//! Seeded with the mean of the first `period` TRs, then recursive.

use super::NotEnoughData;
use crate::domain::Candle;

fn true_range(curr: &Candle, prev: &Candle) -> f64 {
    let hl = curr.high - curr.low;
    let hc = (curr.high - prev.close).abs();
    let lc = (curr.low - prev.close).abs();
    hl.max(hc).max(lc)
}

pub(super) fn atr(candles: &[Candle], i: usize, period: usize) -> Result<f64, NotEnoughData> {
    if period == 0 || i < period {
        return Err(NotEnoughData);
    }

    let mut value = (1..=period)
        .map(|j| true_range(&candles[j], &candles[j - 1]))
        .sum::<f64>()
        / period as f64;

    let alpha = 1.0 / period as f64;
    for j in (period + 1)..=i {
        let tr = true_range(&candles[j], &candles[j - 1]);
        value = alpha * tr + (1.0 - alpha) * value;
    }
    Ok(value)
}
