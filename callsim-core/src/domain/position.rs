//! Mutable position state for a single run.

use serde::{Deserialize, Serialize};

/// One entry fill (initial entry or re-entry).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryFill {
    pub ts: i64,
    pub price: f64,
    pub fraction: f64,
}

/// Open position state, created at entry and mutated on every fill.
///
/// `remaining_fraction` is measured in token terms against the original
/// sizing unit: 1.0 right after the initial entry, reduced by exits,
/// increased (never above 1.0) by re-entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub remaining_fraction: f64,
    pub entries: Vec<EntryFill>,
    /// Running realized PnL in notional currency: exit inflows minus entry
    /// outflows, fees included.
    pub realized_pnl: f64,
    pub re_entry_count: u32,
    /// Highest price seen since entry or the most recent re-entry.
    /// Trailing-stop logic keys off this mark; re-entries reset it.
    pub trailing_high_water_mark: f64,
    /// `trailing_high_water_mark / entry_price` against the original entry.
    pub peak_multiple: f64,
}

impl Position {
    pub fn open(ts: i64, price: f64) -> Self {
        Self {
            remaining_fraction: 1.0,
            entries: vec![EntryFill {
                ts,
                price,
                fraction: 1.0,
            }],
            realized_pnl: 0.0,
            re_entry_count: 0,
            trailing_high_water_mark: price,
            peak_multiple: 1.0,
        }
    }

    /// Original entry price (the anchor for static stops and targets).
    pub fn entry_price(&self) -> f64 {
        self.entries[0].price
    }

    pub fn is_closed(&self) -> bool {
        self.remaining_fraction <= crate::engine::FRACTION_EPSILON
    }

    /// Fold a new candle high into the trailing mark.
    pub fn observe_high(&mut self, high: f64) {
        if high > self.trailing_high_water_mark {
            self.trailing_high_water_mark = high;
        }
        let multiple = self.trailing_high_water_mark / self.entry_price();
        if multiple > self.peak_multiple {
            self.peak_multiple = multiple;
        }
    }

    /// Re-anchor the trailing mark to a re-entry price.
    pub fn reset_trailing_mark(&mut self, price: f64) {
        self.trailing_high_water_mark = price;
    }
}
