//! Domain types: candles, strategy definitions, position state, events.

pub mod candle;
pub mod event;
pub mod position;
pub mod strategy;

pub use candle::Candle;
pub use event::{EventKind, ExitReason, SimulationEvent, SimulationResult};
pub use position::{EntryFill, Position};
pub use strategy::{
    CostModel, EntryRule, ExitRule, LadderLeg, PositionSizing, ReEntryRule, RiskLimits,
    StrategyDefinition,
};
