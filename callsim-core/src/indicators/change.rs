//! Percent change of price or volume over a trailing bar count.

use super::NotEnoughData;
use crate::domain::Candle;

pub(super) fn price_change(
    candles: &[Candle],
    i: usize,
    bars: usize,
) -> Result<f64, NotEnoughData> {
    if bars == 0 || i < bars {
        return Err(NotEnoughData);
    }
    let base = candles[i - bars].close;
    if base <= 0.0 {
        // A zero base makes the ratio undefined; treat as unusable history.
        return Err(NotEnoughData);
    }
    Ok((candles[i].close - base) / base)
}

pub(super) fn volume_change(
    candles: &[Candle],
    i: usize,
    bars: usize,
) -> Result<f64, NotEnoughData> {
    if bars == 0 || i < bars {
        return Err(NotEnoughData);
    }
    let base = candles[i - bars].volume;
    if base <= 0.0 {
        return Err(NotEnoughData);
    }
    Ok((candles[i].volume - base) / base)
}
