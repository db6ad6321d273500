//! CallSim Core — deterministic backtesting engine for short-horizon
//! trading calls.
//!
//! This crate contains the heart of the simulator:
//! - Domain types (candles, strategy definitions, positions, events)
//! - Strategy validation (schema, consistency, candle-series checks)
//! - Indicator evaluation with per-series memoization
//! - Signal expression trees (comparisons, crossings, windowed conditions)
//! - Entry, exit, and re-entry evaluators
//! - The candle-by-candle simulation loop
//! - Cost and sizing model (slippage, fees, notional policies)
//!
//! Everything here is pure: no clock, no RNG, no I/O. `engine::simulate` is
//! a function of (strategy, candles, reference time) and nothing else, so
//! identical inputs give bit-identical results on any machine.

pub mod costs;
pub mod domain;
pub mod engine;
pub mod entry;
pub mod error;
pub mod exit;
pub mod indicators;
pub mod quant;
pub mod reentry;
pub mod signal;
pub mod validate;

pub use engine::{simulate, simulate_json};
pub use error::SimulationError;
