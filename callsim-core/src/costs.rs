//! Cost and sizing model — converts nominal legs into realized cash flow.
//!
//! Slippage is directional: entry legs pay more (buyer slips up), exit legs
//! receive less (seller slips down). `fee_percent` applies to every leg's
//! gross notional; `fixed_fee` applies once per leg. Every fee and slippage
//! amount is rounded at the point of application (see `quant`) so results
//! are bit-stable across machines.

use crate::domain::{CostModel, PositionSizing, RiskLimits};
use crate::quant::round_cash;

/// Which side of the position a leg is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Entry,
    Exit,
}

/// Realized cash flow for one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// Trigger price after slippage.
    pub gross_price: f64,
    /// Cash moved by the leg, fees included: outflow for entries, inflow
    /// for exits. Always non-negative; the side gives it direction.
    pub net_cash_flow: f64,
    pub fee_paid: f64,
}

/// Compute the realized cash flow for a leg.
///
/// `fraction` is the token fraction of the original unit; `unit_tokens` is
/// the token quantity bought by the full unit at entry.
pub fn compute_fill(
    price: f64,
    fraction: f64,
    unit_tokens: f64,
    side: Side,
    costs: &CostModel,
) -> Fill {
    let slip = match side {
        Side::Entry => 1.0 + costs.entry_slippage_bps / 10_000.0,
        Side::Exit => 1.0 - costs.exit_slippage_bps / 10_000.0,
    };
    let gross_price = round_cash(price * slip);
    let gross_notional = round_cash(fraction * unit_tokens * gross_price);
    let fee_paid = round_cash(gross_notional * costs.fee_percent + costs.fixed_fee);
    let net_cash_flow = match side {
        Side::Entry => round_cash(gross_notional + fee_paid),
        Side::Exit => round_cash((gross_notional - fee_paid).max(0.0)),
    };
    Fill {
        gross_price,
        net_cash_flow,
        fee_paid,
    }
}

/// Slipped entry price for a raw price (used to size the token unit).
pub fn slipped_entry_price(price: f64, costs: &CostModel) -> f64 {
    round_cash(price * (1.0 + costs.entry_slippage_bps / 10_000.0))
}

/// Convert the sizing policy into notional for the original unit.
///
/// `stop_distance` is the fractional distance to the configured stop
/// (e.g. 0.2 for a -20% stop); without a stop rule the full notional is at
/// risk and the distance is 1.0.
pub fn position_notional(
    sizing: &PositionSizing,
    risk: Option<&RiskLimits>,
    stop_distance: f64,
) -> f64 {
    let (raw, max_size) = match sizing {
        PositionSizing::Fixed { notional, max_size } => (*notional, *max_size),
        PositionSizing::PercentOfCapital {
            percent,
            capital,
            max_size,
        } => {
            let mut notional = capital * percent;
            if let Some(lev) = risk.and_then(|r| r.max_leverage) {
                notional = notional.min(capital * lev);
            }
            (notional, *max_size)
        }
        PositionSizing::RiskBased {
            capital,
            risk_fraction,
            max_size,
        } => {
            let distance = stop_distance.max(f64::EPSILON);
            let mut effective_risk = *risk_fraction;
            if let Some(cap) = risk.and_then(|r| r.max_loss_percent) {
                effective_risk = effective_risk.min(cap);
            }
            let mut notional = capital * effective_risk / distance;
            if let Some(lev) = risk.and_then(|r| r.max_leverage) {
                notional = notional.min(capital * lev);
            }
            (notional, *max_size)
        }
    };

    let mut notional = raw;
    if let Some(cap) = max_size {
        notional = notional.min(cap);
    }
    if let Some(cap) = risk.and_then(|r| r.max_position_size) {
        notional = notional.min(cap);
    }
    notional.max(0.0)
}
