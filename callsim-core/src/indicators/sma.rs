//! Simple moving average over closes.

use super::NotEnoughData;
use crate::domain::Candle;

pub(super) fn sma(candles: &[Candle], i: usize, period: usize) -> Result<f64, NotEnoughData> {
    if period == 0 || i + 1 < period {
        return Err(NotEnoughData);
    }
    let window = &candles[i + 1 - period..=i];
    Ok(window.iter().map(|c| c.close).sum::<f64>() / period as f64)
}
