//! Named indicators evaluated over a candle window.
//!
//! Every indicator is a closed enum variant dispatched exhaustively — adding
//! one is a compile-time-checked change. Evaluation at index `i` uses the
//! window `candles[..=i]`; too little history returns `NotEnoughData`,
//! never a default value, so thin history cannot fabricate signals.

pub mod atr;
pub mod bollinger;
pub mod change;
pub mod ema;
pub mod ichimoku;
pub mod macd;
pub mod rsi;
pub mod sma;

use crate::domain::Candle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The window ends before the indicator's required lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not enough data for indicator lookback")]
pub struct NotEnoughData;

/// Closed set of indicator ids usable in signal expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum Indicator {
    Sma { period: usize },
    Ema { period: usize },
    Rsi { period: usize },
    MacdLine { fast: usize, slow: usize },
    MacdSignal { fast: usize, slow: usize, signal: usize },
    BollingerUpper { period: usize, k: f64 },
    BollingerLower { period: usize, k: f64 },
    Atr { period: usize },
    IchimokuConversion { period: usize },
    IchimokuBase { period: usize },
    PriceChange { bars: usize },
    VolumeChange { bars: usize },
    Price,
    Volume,
}

impl Indicator {
    /// Minimum number of candles required in the window.
    pub fn lookback(&self) -> usize {
        match *self {
            Indicator::Sma { period } | Indicator::Ema { period } => period,
            Indicator::Rsi { period } => period + 1,
            Indicator::MacdLine { slow, .. } => slow,
            Indicator::MacdSignal { slow, signal, .. } => slow + signal - 1,
            Indicator::BollingerUpper { period, .. } | Indicator::BollingerLower { period, .. } => {
                period
            }
            Indicator::Atr { period } => period + 1,
            Indicator::IchimokuConversion { period } | Indicator::IchimokuBase { period } => period,
            Indicator::PriceChange { bars } | Indicator::VolumeChange { bars } => bars + 1,
            Indicator::Price | Indicator::Volume => 1,
        }
    }

    /// Stable cache key, unique per indicator id and parameter set.
    pub fn key(&self) -> String {
        match *self {
            Indicator::Sma { period } => format!("sma_{period}"),
            Indicator::Ema { period } => format!("ema_{period}"),
            Indicator::Rsi { period } => format!("rsi_{period}"),
            Indicator::MacdLine { fast, slow } => format!("macd_{fast}_{slow}"),
            Indicator::MacdSignal { fast, slow, signal } => {
                format!("macd_sig_{fast}_{slow}_{signal}")
            }
            Indicator::BollingerUpper { period, k } => format!("bb_up_{period}_{k}"),
            Indicator::BollingerLower { period, k } => format!("bb_lo_{period}_{k}"),
            Indicator::Atr { period } => format!("atr_{period}"),
            Indicator::IchimokuConversion { period } => format!("ichimoku_conv_{period}"),
            Indicator::IchimokuBase { period } => format!("ichimoku_base_{period}"),
            Indicator::PriceChange { bars } => format!("price_chg_{bars}"),
            Indicator::VolumeChange { bars } => format!("vol_chg_{bars}"),
            Indicator::Price => "price".into(),
            Indicator::Volume => "volume".into(),
        }
    }

    /// Evaluate at window index `i`.
    pub fn evaluate(&self, candles: &[Candle], i: usize) -> Result<f64, NotEnoughData> {
        if i >= candles.len() || i + 1 < self.lookback() {
            return Err(NotEnoughData);
        }
        match *self {
            Indicator::Sma { period } => sma::sma(candles, i, period),
            Indicator::Ema { period } => ema::ema(candles, i, period),
            Indicator::Rsi { period } => rsi::rsi(candles, i, period),
            Indicator::MacdLine { fast, slow } => macd::macd_line(candles, i, fast, slow),
            Indicator::MacdSignal { fast, slow, signal } => {
                macd::macd_signal(candles, i, fast, slow, signal)
            }
            Indicator::BollingerUpper { period, k } => {
                bollinger::bollinger_band(candles, i, period, k)
            }
            Indicator::BollingerLower { period, k } => {
                bollinger::bollinger_band(candles, i, period, -k)
            }
            Indicator::Atr { period } => atr::atr(candles, i, period),
            Indicator::IchimokuConversion { period } | Indicator::IchimokuBase { period } => {
                ichimoku::midpoint(candles, i, period)
            }
            Indicator::PriceChange { bars } => change::price_change(candles, i, bars),
            Indicator::VolumeChange { bars } => change::volume_change(candles, i, bars),
            Indicator::Price => Ok(candles[i].close),
            Indicator::Volume => Ok(candles[i].volume),
        }
    }
}

/// Per-run indicator memoization. Scoped to one simulation, never shared
/// across runs, so determinism and testability are preserved.
#[derive(Debug, Default)]
pub struct IndicatorCache {
    values: BTreeMap<(String, usize), Result<f64, NotEnoughData>>,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        indicator: &Indicator,
        candles: &[Candle],
        i: usize,
    ) -> Result<f64, NotEnoughData> {
        let key = (indicator.key(), i);
        if let Some(v) = self.values.get(&key) {
            return *v;
        }
        let v = indicator.evaluate(candles, i);
        self.values.insert(key, v);
        v
    }
}

/// Create synthetic candles from close prices for testing.
///
/// Plausible OHLCV: open = prev close, high/low bracket the move by 1%,
/// volume = 1000, timestamps one minute apart.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                ts: 1_700_000_000 + 60 * i as i64,
                open,
                high: open.max(close) * 1.01,
                low: open.min(close) * 0.99,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}
