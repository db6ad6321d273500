//! Re-entry evaluator: adding back position after a partial exit.
//!
//! Re-entry is only armed once a partial exit has happened, and each fill
//! disarms it again until the next partial exit. Static stops and targets
//! stay anchored to the original entry price; only the trailing high-water
//! mark is re-anchored by the engine when a re-entry fills.

use crate::domain::{Candle, Position, ReEntryRule};
use crate::indicators::IndicatorCache;
use crate::signal::eval_expr;

/// A re-entry fill demanded on one candle. `fraction` is the rule's size
/// fraction; the engine clamps it so the position never exceeds the
/// original unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReEntryFire {
    pub price: f64,
    pub fraction: f64,
}

/// Tracks arming state and the running maximum for trailing retrace.
#[derive(Debug)]
pub struct ReEntryState {
    rule: Option<ReEntryRule>,
    armed: bool,
    running_max: f64,
}

impl ReEntryState {
    pub fn new(rule: Option<&ReEntryRule>) -> Self {
        Self {
            rule: rule.cloned(),
            armed: false,
            running_max: f64::NEG_INFINITY,
        }
    }

    /// A partial exit just happened: arm, and seed the running maximum from
    /// the exit candle's high.
    pub fn note_partial_exit(&mut self, exit_candle_high: f64) {
        if self.rule.is_none() {
            return;
        }
        self.armed = true;
        self.running_max = exit_candle_high;
    }

    /// A re-entry filled: disarm until the next partial exit.
    pub fn note_fill(&mut self) {
        self.armed = false;
    }

    pub fn evaluate(
        &mut self,
        candles: &[Candle],
        i: usize,
        position: &Position,
        cache: &mut IndicatorCache,
    ) -> Option<ReEntryFire> {
        let rule = self.rule.as_ref()?;
        if !self.armed {
            return None;
        }
        match rule {
            ReEntryRule::TrailingRetrace {
                retrace_percent,
                max_re_entries,
                size_fraction,
            } => {
                if position.re_entry_count >= *max_re_entries {
                    return None;
                }
                let candle = &candles[i];
                // Trigger against the maximum seen on *prior* candles, then
                // fold this candle's high in for the next one.
                let trigger = self.running_max * (1.0 - retrace_percent);
                let fire = if candle.low <= trigger {
                    let price = if candle.open < trigger {
                        candle.open
                    } else {
                        trigger
                    };
                    Some(ReEntryFire {
                        price,
                        fraction: *size_fraction,
                    })
                } else {
                    None
                };
                if candle.high > self.running_max {
                    self.running_max = candle.high;
                }
                fire
            }
            ReEntryRule::Signal {
                expression,
                max_re_entries,
                size_fraction,
            } => {
                if position.re_entry_count >= *max_re_entries {
                    return None;
                }
                let expression = expression.clone();
                let size_fraction = *size_fraction;
                if eval_expr(&expression, candles, i, cache) {
                    Some(ReEntryFire {
                        price: candles[i].close,
                        fraction: size_fraction,
                    })
                } else {
                    None
                }
            }
        }
    }
}
