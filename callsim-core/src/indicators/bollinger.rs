//! Bollinger bands: SMA ± k standard deviations over closes.
//!
//! Population standard deviation over the window. The lower band is the
//! same function called with a negated `k`.

use super::{sma::sma, NotEnoughData};
use crate::domain::Candle;

pub(super) fn bollinger_band(
    candles: &[Candle],
    i: usize,
    period: usize,
    k: f64,
) -> Result<f64, NotEnoughData> {
    if period == 0 || i + 1 < period {
        return Err(NotEnoughData);
    }
    let mean = sma(candles, i, period)?;
    let variance = candles[i + 1 - period..=i]
        .iter()
        .map(|c| {
            let d = c.close - mean;
            d * d
        })
        .sum::<f64>()
        / period as f64;
    Ok(mean + k * variance.sqrt())
}
