//! Relative Strength Index with Wilder smoothing.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss).
//! Edge cases: no losses → 100; no gains → 0; no movement → 50.

use super::NotEnoughData;
use crate::domain::Candle;

pub(super) fn rsi(candles: &[Candle], i: usize, period: usize) -> Result<f64, NotEnoughData> {
    if period == 0 || i < period {
        return Err(NotEnoughData);
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for j in 1..=period {
        let change = candles[j].close - candles[j - 1].close;
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let alpha = 1.0 / period as f64;
    for j in (period + 1)..=i {
        let change = candles[j].close - candles[j - 1].close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
    }

    Ok(if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    })
}
