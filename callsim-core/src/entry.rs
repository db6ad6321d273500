//! Entry evaluator — scans forward from the reference candle to find the
//! first candle where a position may open.
//!
//! State machine: WAITING → ENTERED, or WAITING → EXPIRED once
//! `max_wait_bars` is exceeded (or the series runs out). EXPIRED is an
//! expected terminal outcome, not an error.

use crate::domain::{Candle, EntryRule};
use crate::indicators::IndicatorCache;
use crate::signal::eval_expr;

/// Outcome of the entry scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryOutcome {
    Entered {
        index: usize,
        price: f64,
    },
    /// No candle satisfied the rule within the wait window.
    /// `bars_scanned` counts candles examined from the reference inclusive.
    Expired {
        bars_scanned: usize,
    },
}

/// Scan for the entry candle starting at `start` (the reference candle).
pub fn find_entry(
    rule: &EntryRule,
    candles: &[Candle],
    start: usize,
    cache: &mut IndicatorCache,
) -> EntryOutcome {
    match rule {
        EntryRule::Immediate => EntryOutcome::Entered {
            index: start,
            price: candles[start].close,
        },
        EntryRule::PriceDrop {
            drop_percent,
            max_wait_bars,
        } => {
            let reference = candles[start].close;
            let threshold = reference * (1.0 + drop_percent);
            let last = (start + max_wait_bars).min(candles.len() - 1);
            for (i, candle) in candles.iter().enumerate().take(last + 1).skip(start + 1) {
                if candle.low <= threshold {
                    // A candle gapping entirely below the threshold fills at
                    // its open; otherwise at the threshold itself (no gap
                    // credit, mirroring the exact-target exit fill).
                    let price = if candle.high < threshold {
                        candle.open
                    } else {
                        threshold
                    };
                    return EntryOutcome::Entered { index: i, price };
                }
            }
            EntryOutcome::Expired {
                bars_scanned: last - start + 1,
            }
        }
        EntryRule::TrailingRebound {
            rebound_percent,
            max_wait_bars,
        } => {
            let mut running_min = candles[start].low;
            let last = (start + max_wait_bars).min(candles.len() - 1);
            for (i, candle) in candles.iter().enumerate().take(last + 1).skip(start + 1) {
                // Trigger against the minimum seen on *prior* candles: an
                // intra-candle new-low-then-rebound is unobservable in OHLC.
                let trigger = running_min * (1.0 + rebound_percent);
                if candle.high >= trigger {
                    // A gap open above the trigger fills at the open (worse
                    // for the buyer).
                    let price = if candle.open > trigger {
                        candle.open
                    } else {
                        trigger
                    };
                    return EntryOutcome::Entered { index: i, price };
                }
                if candle.low < running_min {
                    running_min = candle.low;
                }
            }
            EntryOutcome::Expired {
                bars_scanned: last - start + 1,
            }
        }
        EntryRule::Signal {
            expression,
            max_wait_bars,
        } => {
            let last = (start + max_wait_bars).min(candles.len() - 1);
            for i in start..=last {
                if eval_expr(expression, candles, i, cache) {
                    return EntryOutcome::Entered {
                        index: i,
                        price: candles[i].close,
                    };
                }
            }
            EntryOutcome::Expired {
                bars_scanned: last - start + 1,
            }
        }
    }
}
