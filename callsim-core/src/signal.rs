//! Signal expressions: trees of leaf conditions combined by AND/OR groups.
//!
//! A leaf compares an indicator against a constant or another indicator.
//! Crossing operators look one bar back; with insufficient history they
//! evaluate false, never error. A leaf may additionally require the
//! condition to hold for `min_bars_true` of the last `lookback_bars`.
//! Evaluation is pure: identical window, identical result.

use crate::domain::Candle;
use crate::indicators::IndicatorCache;
use serde::{Deserialize, Serialize};

pub use crate::indicators::Indicator;

/// Equality tolerance for the `==` / `!=` operators on f64 indicator values.
const EQ_TOLERANCE: f64 = 1e-9;

/// Comparison operator in a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    CrossesAbove,
    CrossesBelow,
}

/// Right-hand side of a leaf condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Value(f64),
    Indicator(Indicator),
}

/// Leaf condition: `lhs <op> rhs`, optionally windowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub lhs: Indicator,
    pub op: Op,
    pub rhs: Operand,
    /// The condition must hold on at least this many of the trailing
    /// `lookback_bars` bars. Both fields must be set together.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bars_true: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_bars: Option<usize>,
}

/// Expression tree over leaf conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    Leaf(Condition),
    All { children: Vec<Expr> },
    Any { children: Vec<Expr> },
}

impl Expr {
    /// Convenience constructor for a bare comparison.
    pub fn leaf(lhs: Indicator, op: Op, rhs: Operand) -> Self {
        Expr::Leaf(Condition {
            lhs,
            op,
            rhs,
            min_bars_true: None,
            lookback_bars: None,
        })
    }

    /// All leaf conditions in the tree, depth-first (used by validation).
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Expr::Leaf(c) => out.push(c),
            Expr::All { children } | Expr::Any { children } => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
        }
    }

    /// True if any group node has no children (rejected by validation).
    pub fn has_empty_group(&self) -> bool {
        match self {
            Expr::Leaf(_) => false,
            Expr::All { children } | Expr::Any { children } => {
                children.is_empty() || children.iter().any(Expr::has_empty_group)
            }
        }
    }
}

fn operand_value(
    operand: &Operand,
    candles: &[Candle],
    i: usize,
    cache: &mut IndicatorCache,
) -> Option<f64> {
    match operand {
        Operand::Value(v) => Some(*v),
        Operand::Indicator(ind) => cache.evaluate(ind, candles, i).ok(),
    }
}

/// Evaluate a condition at a single index, ignoring any window requirement.
fn condition_at(
    cond: &Condition,
    candles: &[Candle],
    i: usize,
    cache: &mut IndicatorCache,
) -> bool {
    let lhs = match cache.evaluate(&cond.lhs, candles, i) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let rhs = match operand_value(&cond.rhs, candles, i, cache) {
        Some(v) => v,
        None => return false,
    };

    match cond.op {
        Op::Gt => lhs > rhs,
        Op::Ge => lhs >= rhs,
        Op::Lt => lhs < rhs,
        Op::Le => lhs <= rhs,
        Op::Eq => (lhs - rhs).abs() <= EQ_TOLERANCE,
        Op::Ne => (lhs - rhs).abs() > EQ_TOLERANCE,
        Op::CrossesAbove | Op::CrossesBelow => {
            if i == 0 {
                return false;
            }
            let prev_lhs = match cache.evaluate(&cond.lhs, candles, i - 1) {
                Ok(v) => v,
                Err(_) => return false,
            };
            let prev_rhs = match operand_value(&cond.rhs, candles, i - 1, cache) {
                Some(v) => v,
                None => return false,
            };
            match cond.op {
                Op::CrossesAbove => prev_lhs <= prev_rhs && lhs > rhs,
                Op::CrossesBelow => prev_lhs >= prev_rhs && lhs < rhs,
                _ => unreachable!(),
            }
        }
    }
}

fn eval_condition(
    cond: &Condition,
    candles: &[Candle],
    i: usize,
    cache: &mut IndicatorCache,
) -> bool {
    match (cond.min_bars_true, cond.lookback_bars) {
        (Some(min_true), Some(lookback)) => {
            if lookback == 0 || min_true == 0 {
                return condition_at(cond, candles, i, cache);
            }
            // Bars before the series start count as false.
            let start = i.saturating_sub(lookback - 1);
            let mut true_count = 0;
            for j in start..=i {
                if condition_at(cond, candles, j, cache) {
                    true_count += 1;
                }
            }
            true_count >= min_true
        }
        _ => condition_at(cond, candles, i, cache),
    }
}

/// Evaluate an expression tree at index `i`.
pub fn eval_expr(expr: &Expr, candles: &[Candle], i: usize, cache: &mut IndicatorCache) -> bool {
    match expr {
        Expr::Leaf(cond) => eval_condition(cond, candles, i, cache),
        Expr::All { children } => children.iter().all(|c| eval_expr(c, candles, i, cache)),
        Expr::Any { children } => children.iter().any(|c| eval_expr(c, candles, i, cache)),
    }
}
