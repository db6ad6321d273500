//! CallSim Runner — batch orchestration over the core engine.
//!
//! This crate builds on `callsim-core` to provide:
//! - The candle acquisition boundary (CSV fixtures, synthetic fallback)
//! - Serializable sweep configuration with content-addressed run ids
//! - Single-run driver with failure isolation
//! - Parallel sweep execution over rayon
//! - JSON and CSV artifact export

pub mod call;
pub mod config;
pub mod export;
pub mod provider;
pub mod runner;
pub mod sweep;

pub use call::Call;
pub use config::{ConfigError, CostOverlay, RunId, RunSpec, SweepConfig};
pub use export::{export_json, export_summary_csv, import_json, save_artifacts, SweepArtifact};
pub use provider::{
    load_candles_csv, CandleProvider, CsvProvider, ProviderError, SyntheticProvider,
};
pub use runner::{run_one, RunOutcome, RunRecord, SCHEMA_VERSION};
pub use sweep::{run_sweep, run_sweep_with_progress, SweepResults};
