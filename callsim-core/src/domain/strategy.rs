//! Strategy definition — versioned, serializable entry/exit/re-entry/risk/cost/sizing rules.
//!
//! Pure data: the engine interprets these rules, it never mutates them.
//! Every rule category is a closed tagged union; unknown `type` discriminators
//! fail deserialization rather than falling through to a silent default.
//! Unknown *top-level* keys are preserved under `metadata` (see
//! `validate::load_strategy`) so newer definitions survive round-trips.

use crate::signal::Expr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A versioned strategy definition, immutable per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_sizing: Option<PositionSizing>,
    pub entry: EntryRule,
    pub exit: Vec<ExitRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub re_entry: Option<ReEntryRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costs: Option<CostModel>,
    /// Unknown top-level keys from the source document land here.
    /// `BTreeMap` keeps serialization order deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Entry rule: how the position opens relative to the call's reference time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryRule {
    /// Enter at the reference candle's close.
    Immediate,
    /// Enter at the first candle whose low touches
    /// `reference_close * (1 + drop_percent)` (`drop_percent` is negative).
    PriceDrop { drop_percent: f64, max_wait_bars: usize },
    /// Track the running minimum since the reference candle and enter on the
    /// first candle rebounding `rebound_percent` above it.
    TrailingRebound {
        rebound_percent: f64,
        max_wait_bars: usize,
    },
    /// Enter at the close of the first candle where the expression is true.
    Signal { expression: Expr, max_wait_bars: usize },
}

/// Exit rule: when some fraction of the open position must close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitRule {
    /// Close `fraction_to_exit` when the candle high reaches
    /// `entry_price * multiple`. Fills at the exact target, never the high.
    ProfitTarget { multiple: f64, fraction_to_exit: f64 },
    /// Close everything when the candle low touches the effective stop.
    /// Optionally trails: once the peak multiple reaches
    /// `trailing_activation_multiple`, the stop ratchets to
    /// `max(static_stop, peak * (1 - trailing_percent))`.
    StopLoss {
        loss_percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trailing_activation_multiple: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trailing_percent: Option<f64>,
    },
    /// Close everything at the close of the candle `hold_bars` after entry.
    TimeExpiry { hold_bars: usize },
    /// Close the remaining position at the close of the first candle where
    /// the expression is true.
    Signal { expression: Expr },
    /// Laddered profit taking: independent fractional legs at increasing
    /// multiples. `sequential` gates leg k+1 on leg k having fired.
    Ladder { legs: Vec<LadderLeg>, sequential: bool },
}

/// One leg of a ladder exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderLeg {
    pub fraction_of_position: f64,
    pub multiple: f64,
    /// Optional expression gate: the leg fires only when both the price
    /// target and the expression hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expr>,
}

/// Re-entry rule: adding back position after a partial exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReEntryRule {
    /// Track the running maximum since the last exit and re-enter when price
    /// retraces `retrace_percent` below it.
    TrailingRetrace {
        retrace_percent: f64,
        max_re_entries: u32,
        size_fraction: f64,
    },
    /// Re-enter at the close of the first candle where the expression holds.
    Signal {
        expression: Expr,
        max_re_entries: u32,
        size_fraction: f64,
    },
}

/// Risk limits applied across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loss_percent: Option<f64>,
    /// Profit-taking fills below this price are suppressed (stops are not).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_exit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_position_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_leverage: Option<f64>,
}

/// Cost model: slippage and fees applied to every fill.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostModel {
    #[serde(default)]
    pub entry_slippage_bps: f64,
    #[serde(default)]
    pub exit_slippage_bps: f64,
    #[serde(default)]
    pub fee_percent: f64,
    #[serde(default)]
    pub fixed_fee: f64,
}

/// Position sizing policy: converts the fractional unit into notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionSizing {
    Fixed {
        notional: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_size: Option<f64>,
    },
    PercentOfCapital {
        percent: f64,
        capital: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_size: Option<f64>,
    },
    /// Notional bounded so that hitting the stop loses at most
    /// `risk_fraction` of capital (and no more than `risk.max_loss_percent`
    /// when that limit is set).
    RiskBased {
        capital: f64,
        risk_fraction: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_size: Option<f64>,
    },
}

impl Default for PositionSizing {
    fn default() -> Self {
        // The "original unit": PnL percent is reported over this notional.
        PositionSizing::Fixed {
            notional: 1.0,
            max_size: None,
        }
    }
}
