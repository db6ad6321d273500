//! Exit evaluator — finds every candle where some fraction of the open
//! position must close.
//!
//! Same-candle tie-break policy is fixed: the stop-loss is evaluated before
//! any profit taking, and among profit-taking legs the lower multiple fires
//! first. This models the conservative assumption that adverse moves are
//! realized before favorable ones when both fit inside one candle's range.
//! Profit targets fill at the exact target price, never the candle high, so
//! a gap through the target is not over-credited.

use crate::domain::{Candle, ExitRule, Position};
use crate::indicators::IndicatorCache;
use crate::signal::{eval_expr, Expr};

/// One armed profit-taking leg (a standalone target or a ladder leg).
#[derive(Debug, Clone)]
struct TargetLeg {
    multiple: f64,
    fraction: f64,
    expression: Option<Expr>,
    /// Ladder membership: (group id, rank within group).
    ladder: Option<(usize, usize)>,
    fired: bool,
    reason: String,
}

#[derive(Debug, Clone, Copy)]
struct StopRule {
    loss_percent: f64,
    trailing_activation_multiple: Option<f64>,
    trailing_percent: Option<f64>,
}

/// A fill demanded by the exit rules on one candle, in tie-break order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitFire {
    /// Closes everything remaining at `price`.
    Stop { price: f64 },
    /// Closes `fraction` of the original unit (clamped to remaining by the
    /// engine) at the exact target price.
    Target {
        price: f64,
        fraction: f64,
        reason: String,
    },
    /// Signal exit: closes everything remaining at the candle close.
    Signal { price: f64 },
    /// Time expiry: closes everything remaining at the candle close.
    Expiry { price: f64 },
}

/// Armed exit rules plus the ratcheting stop state for one run.
#[derive(Debug)]
pub struct ExitState {
    targets: Vec<TargetLeg>,
    /// Which ladder groups gate their legs sequentially.
    sequential_groups: Vec<bool>,
    stop: Option<StopRule>,
    /// Current effective stop price. Monotonically non-decreasing within an
    /// arm; re-entries re-anchor it (see `begin_arm`).
    effective_stop: f64,
    hold_bars: Option<usize>,
    signal_exits: Vec<Expr>,
    entry_price: f64,
    min_exit_price: Option<f64>,
}

impl ExitState {
    /// Compile the rule list against a known entry price.
    pub fn compile(rules: &[ExitRule], entry_price: f64, min_exit_price: Option<f64>) -> Self {
        let mut targets = Vec::new();
        let mut sequential_groups = Vec::new();
        let mut stop = None;
        let mut hold_bars = None;
        let mut signal_exits = Vec::new();

        for rule in rules {
            match rule {
                ExitRule::ProfitTarget {
                    multiple,
                    fraction_to_exit,
                } => targets.push(TargetLeg {
                    multiple: *multiple,
                    fraction: *fraction_to_exit,
                    expression: None,
                    ladder: None,
                    fired: false,
                    reason: format!("profit_target_{multiple}x"),
                }),
                ExitRule::StopLoss {
                    loss_percent,
                    trailing_activation_multiple,
                    trailing_percent,
                } => {
                    stop = Some(StopRule {
                        loss_percent: *loss_percent,
                        trailing_activation_multiple: *trailing_activation_multiple,
                        trailing_percent: *trailing_percent,
                    });
                }
                ExitRule::TimeExpiry { hold_bars: bars } => hold_bars = Some(*bars),
                ExitRule::Signal { expression } => signal_exits.push(expression.clone()),
                ExitRule::Ladder { legs, sequential } => {
                    let group = sequential_groups.len();
                    sequential_groups.push(*sequential);
                    for (rank, leg) in legs.iter().enumerate() {
                        targets.push(TargetLeg {
                            multiple: leg.multiple,
                            fraction: leg.fraction_of_position,
                            expression: leg.expression.clone(),
                            ladder: Some((group, rank)),
                            fired: false,
                            reason: format!("ladder_leg_{}_{}x", rank + 1, leg.multiple),
                        });
                    }
                }
            }
        }

        // Lower multiples fire first; stable sort keeps declared ladder
        // order for equal multiples.
        targets.sort_by(|a, b| a.multiple.total_cmp(&b.multiple));

        let static_stop = stop.map(|s| entry_price * (1.0 + s.loss_percent));
        Self {
            targets,
            sequential_groups,
            stop,
            effective_stop: static_stop.unwrap_or(f64::NEG_INFINITY),
            hold_bars,
            signal_exits,
            entry_price,
            min_exit_price,
        }
    }

    /// Fractional distance to the static stop, for risk-based sizing.
    /// 1.0 when no stop is configured (the full unit is at risk).
    pub fn stop_distance(&self) -> f64 {
        self.stop.map(|s| -s.loss_percent).unwrap_or(1.0)
    }

    /// Re-anchor the stop after an entry or re-entry. Trailing logic
    /// rebuilds from the position's (reset) high-water mark; the static
    /// component stays anchored to the original entry price.
    pub fn begin_arm(&mut self) {
        if let Some(s) = self.stop {
            self.effective_stop = self.entry_price * (1.0 + s.loss_percent);
        }
    }

    /// Current effective stop, ratcheted against the position's trailing
    /// mark. Uses the mark as of *prior* candles: a new high inside the
    /// current candle cannot raise the stop and then trigger it with the
    /// same candle's low.
    fn update_stop(&mut self, position: &Position) -> Option<f64> {
        let stop = self.stop?;
        if let (Some(activation), Some(trail)) =
            (stop.trailing_activation_multiple, stop.trailing_percent)
        {
            if position.peak_multiple >= activation {
                let candidate = position.trailing_high_water_mark * (1.0 - trail);
                if candidate > self.effective_stop {
                    self.effective_stop = candidate;
                }
            }
        }
        Some(self.effective_stop)
    }

    /// True if every leg of a sequential group before `rank` has fired.
    fn sequential_gate_open(&self, group: usize, rank: usize) -> bool {
        if !self.sequential_groups[group] {
            return true;
        }
        self.targets
            .iter()
            .filter(|t| matches!(t.ladder, Some((g, r)) if g == group && r < rank))
            .all(|t| t.fired)
    }

    /// Evaluate all armed rules on candle `i`. Returns the fills demanded,
    /// already in tie-break order; the engine applies them until the
    /// position is flat.
    pub fn evaluate(
        &mut self,
        candles: &[Candle],
        i: usize,
        entry_index: usize,
        position: &Position,
        cache: &mut IndicatorCache,
    ) -> Vec<ExitFire> {
        let candle = &candles[i];

        // 1. Stop-loss, before any profit taking.
        if let Some(stop_price) = self.update_stop(position) {
            if candle.low <= stop_price {
                // A candle opening below the stop gaps through: fill at the
                // open, which is worse than the stop level.
                let price = if candle.open < stop_price {
                    candle.open
                } else {
                    stop_price
                };
                return vec![ExitFire::Stop { price }];
            }
        }

        let mut fires = Vec::new();

        // 2. Price targets, ascending multiple.
        for idx in 0..self.targets.len() {
            let (fired, multiple, fraction) = {
                let t = &self.targets[idx];
                (t.fired, t.multiple, t.fraction)
            };
            if fired {
                continue;
            }
            let target_price = self.entry_price * multiple;
            if candle.high < target_price {
                continue;
            }
            if let Some((group, rank)) = self.targets[idx].ladder {
                if !self.sequential_gate_open(group, rank) {
                    continue;
                }
            }
            if let Some(expr) = self.targets[idx].expression.clone() {
                if !eval_expr(&expr, candles, i, cache) {
                    continue;
                }
            }
            if let Some(floor) = self.min_exit_price {
                // Suppressed, not disarmed: the leg may fire later at a
                // price above the floor. Stops and expiry ignore the floor.
                if target_price < floor {
                    continue;
                }
            }
            self.targets[idx].fired = true;
            let reason = self.targets[idx].reason.clone();
            fires.push(ExitFire::Target {
                price: target_price,
                fraction,
                reason,
            });
        }

        // 3. Signal exits close at the candle's close.
        let signal_fired = self
            .signal_exits
            .iter()
            .any(|expr| eval_expr(expr, candles, i, cache));
        if signal_fired {
            let floor_ok = self
                .min_exit_price
                .map(|floor| candle.close >= floor)
                .unwrap_or(true);
            if floor_ok {
                fires.push(ExitFire::Signal {
                    price: candle.close,
                });
            }
        }

        // 4. Time expiry closes whatever is left at the close.
        if let Some(hold) = self.hold_bars {
            if i - entry_index >= hold {
                fires.push(ExitFire::Expiry {
                    price: candle.close,
                });
            }
        }

        fires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LadderLeg;

    fn candle(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            ts,
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn path(spec: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        spec.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| candle(60 * i as i64, o, h, l, c))
            .collect()
    }

    fn target(multiple: f64, fraction: f64) -> ExitRule {
        ExitRule::ProfitTarget {
            multiple,
            fraction_to_exit: fraction,
        }
    }

    fn stop(loss_percent: f64) -> ExitRule {
        ExitRule::StopLoss {
            loss_percent,
            trailing_activation_multiple: None,
            trailing_percent: None,
        }
    }

    #[test]
    fn stop_beats_target_on_same_candle() {
        // One wide candle crosses both the 0.8 stop and the 2.0 target
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.0, 2.5, 0.7, 1.5)]);
        let mut state = ExitState::compile(&[target(2.0, 1.0), stop(-0.2)], 1.0, None);
        let pos = Position::open(0, 1.0);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        assert_eq!(fires, vec![ExitFire::Stop { price: 0.8 }]);
    }

    #[test]
    fn target_fills_at_exact_target_not_high() {
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.0, 3.0, 1.0, 2.8)]);
        let mut state = ExitState::compile(&[target(2.0, 1.0)], 1.0, None);
        let pos = Position::open(0, 1.0);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        match &fires[0] {
            ExitFire::Target { price, .. } => assert_eq!(*price, 2.0),
            other => panic!("unexpected fire: {other:?}"),
        }
    }

    #[test]
    fn lower_multiple_fires_first() {
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.0, 3.5, 1.0, 3.0)]);
        let mut state =
            ExitState::compile(&[target(3.0, 0.3), target(1.5, 0.3), target(2.0, 0.3)], 1.0, None);
        let pos = Position::open(0, 1.0);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        let prices: Vec<f64> = fires
            .iter()
            .map(|f| match f {
                ExitFire::Target { price, .. } => *price,
                other => panic!("unexpected fire: {other:?}"),
            })
            .collect();
        assert_eq!(prices, vec![1.5, 2.0, 3.0]);
    }

    #[test]
    fn fired_leg_stays_disarmed() {
        let candles = path(&[
            (1.0, 1.0, 1.0, 1.0),
            (1.0, 1.6, 1.0, 1.5),
            (1.5, 1.7, 1.4, 1.6),
        ]);
        let mut state = ExitState::compile(&[target(1.5, 0.5)], 1.0, None);
        let pos = Position::open(0, 1.0);
        let mut cache = IndicatorCache::new();
        assert_eq!(state.evaluate(&candles, 1, 0, &pos, &mut cache).len(), 1);
        assert!(state.evaluate(&candles, 2, 0, &pos, &mut cache).is_empty());
    }

    #[test]
    fn sequential_ladder_gates_later_legs() {
        let ladder = ExitRule::Ladder {
            legs: vec![
                LadderLeg {
                    fraction_of_position: 0.5,
                    multiple: 2.0,
                    expression: None,
                },
                LadderLeg {
                    fraction_of_position: 0.5,
                    multiple: 3.0,
                    expression: None,
                },
            ],
            sequential: true,
        };
        // High reaches 3.2 without ever pausing at 2.0: both legs still
        // fire, in order, on the same candle.
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.0, 3.2, 1.0, 3.0)]);
        let mut state = ExitState::compile(&[ladder], 1.0, None);
        let pos = Position::open(0, 1.0);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        assert_eq!(fires.len(), 2);
    }

    #[test]
    fn sequential_ladder_blocks_skipped_leg() {
        let ladder = ExitRule::Ladder {
            legs: vec![
                LadderLeg {
                    fraction_of_position: 0.5,
                    multiple: 2.0,
                    expression: None,
                },
                LadderLeg {
                    fraction_of_position: 0.5,
                    multiple: 3.0,
                    expression: None,
                },
            ],
            sequential: true,
        };
        // A candle that reaches 3.1 but never 2.0 cannot exist (high >= 3.1
        // implies high >= 2.0), so block the first leg with a min exit
        // floor instead: leg 1 is suppressed, so leg 2 must not fire.
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.0, 3.2, 1.0, 3.0)]);
        let mut state = ExitState::compile(&[ladder], 1.0, Some(2.5));
        let pos = Position::open(0, 1.0);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        assert!(fires.is_empty(), "leg 2 gated on suppressed leg 1: {fires:?}");
    }

    #[test]
    fn trailing_stop_ratchets_up() {
        let rule = ExitRule::StopLoss {
            loss_percent: -0.5,
            trailing_activation_multiple: Some(1.5),
            trailing_percent: Some(0.2),
        };
        let mut state = ExitState::compile(&[rule], 1.0, None);
        let mut pos = Position::open(0, 1.0);

        // Before activation the stop sits at the static level
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.0, 1.2, 0.9, 1.1)]);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        assert!(fires.is_empty());

        // Peak reaches 2.0 → stop ratchets to 2.0 * 0.8 = 1.6
        pos.observe_high(2.0);
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.9, 1.9, 1.55, 1.7)]);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        assert_eq!(fires, vec![ExitFire::Stop { price: 1.6 }]);
    }

    #[test]
    fn trailing_stop_never_loosens() {
        let rule = ExitRule::StopLoss {
            loss_percent: -0.5,
            trailing_activation_multiple: Some(1.2),
            trailing_percent: Some(0.1),
        };
        let mut state = ExitState::compile(&[rule], 1.0, None);
        let mut pos = Position::open(0, 1.0);
        pos.observe_high(2.0); // stop → 1.8

        let calm = path(&[(1.0, 1.0, 1.0, 1.0), (1.9, 1.95, 1.85, 1.9)]);
        assert!(state
            .evaluate(&calm, 1, 0, &pos, &mut IndicatorCache::new())
            .is_empty());

        // The mark cannot go down, and neither can the stop
        pos.observe_high(1.5);
        let probe = path(&[(1.0, 1.0, 1.0, 1.0), (1.85, 1.9, 1.79, 1.85)]);
        let fires = state.evaluate(&probe, 1, 0, &pos, &mut IndicatorCache::new());
        assert_eq!(fires, vec![ExitFire::Stop { price: 1.8 }]);
    }

    #[test]
    fn gap_below_stop_fills_at_open() {
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (0.5, 0.6, 0.4, 0.45)]);
        let mut state = ExitState::compile(&[stop(-0.2)], 1.0, None);
        let pos = Position::open(0, 1.0);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        assert_eq!(fires, vec![ExitFire::Stop { price: 0.5 }]);
    }

    #[test]
    fn expiry_closes_at_candle_close() {
        let candles = path(&[
            (1.0, 1.0, 1.0, 1.0),
            (1.0, 1.1, 0.95, 1.02),
            (1.02, 1.1, 0.95, 1.07),
        ]);
        let mut state = ExitState::compile(&[ExitRule::TimeExpiry { hold_bars: 2 }], 1.0, None);
        let pos = Position::open(0, 1.0);
        let mut cache = IndicatorCache::new();
        assert!(state.evaluate(&candles, 1, 0, &pos, &mut cache).is_empty());
        let fires = state.evaluate(&candles, 2, 0, &pos, &mut cache);
        assert_eq!(fires, vec![ExitFire::Expiry { price: 1.07 }]);
    }

    #[test]
    fn min_exit_price_suppresses_target_but_not_stop() {
        let candles = path(&[(1.0, 1.0, 1.0, 1.0), (1.0, 1.6, 0.7, 0.8)]);
        let mut state =
            ExitState::compile(&[target(1.5, 1.0), stop(-0.2)], 1.0, Some(1.7));
        let pos = Position::open(0, 1.0);
        let fires = state.evaluate(&candles, 1, 0, &pos, &mut IndicatorCache::new());
        // The stop still fires even though the target was floored away
        assert_eq!(fires, vec![ExitFire::Stop { price: 0.8 }]);
    }
}
