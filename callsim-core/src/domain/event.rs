//! Simulation events and the aggregate result.

use serde::{Deserialize, Serialize};

/// Kind of fill recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Entry,
    PartialExit,
    StopLoss,
    Timeout,
    ReEntry,
}

/// One fill in the append-only event log.
///
/// `price` is the gross trigger price (before slippage); slippage and fees
/// show up in the cash flows that feed `realized_pnl_so_far`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub kind: EventKind,
    pub ts: i64,
    pub price: f64,
    /// Fraction of the original unit moved by this fill.
    pub fraction_of_original: f64,
    /// Remaining fraction after this fill.
    pub remaining_fraction: f64,
    pub realized_pnl_so_far: f64,
    pub reason: String,
}

/// Why the run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The entry rule expired without opening a position. A valid outcome,
    /// not an error.
    NoEntry,
    /// Profit taking closed the full position.
    FullExit,
    StopLoss,
    Timeout,
    SignalExit,
    /// Candles ran out with the position still open; the remainder closed at
    /// the last candle's close. A valid outcome, not an error.
    DataExhausted,
}

/// Aggregate result of one run — a pure function of
/// (strategy definition, candle series, reference time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub events: Vec<SimulationEvent>,
    /// Net PnL over the original notional, in percent.
    pub final_pnl_percent: f64,
    pub total_fees_paid: f64,
    pub exit_reason: ExitReason,
    /// Candles examined, counted from the reference candle inclusive.
    pub candles_consumed: usize,
}

impl SimulationResult {
    /// Outcome for an entry rule that expired: zero events, zero PnL.
    pub fn no_entry(candles_consumed: usize) -> Self {
        Self {
            events: Vec::new(),
            final_pnl_percent: 0.0,
            total_fees_paid: 0.0,
            exit_reason: ExitReason::NoEntry,
            candles_consumed,
        }
    }

    /// BLAKE3 hash over the canonical JSON serialization.
    ///
    /// Two runs with identical inputs must produce identical hashes; replay
    /// verification diffs these instead of whole result files.
    pub fn result_hash(&self) -> String {
        let json = serde_json::to_string(self).expect("SimulationResult must serialize");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
