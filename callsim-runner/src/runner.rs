//! Single-run driver: spec in, record out.
//!
//! `run_one` never panics and never returns `Err`: every failure mode of a
//! run (provider failure, bad strategy, bad candles) is folded into the
//! record's outcome. A sweep of a thousand runs reports each failure next
//! to its siblings instead of aborting on the first one.

use callsim_core::{simulate, SimulationError};
use callsim_core::domain::SimulationResult;
use serde::{Deserialize, Serialize};

use crate::config::{RunId, RunSpec};
use crate::provider::{CandleProvider, ProviderError};

/// Schema version for persisted sweep artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// How one run ended: a result, or a structured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Ok { result: SimulationResult },
    Err { kind: String, message: String },
}

/// One run's identity plus outcome, the unit a sweep aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub call_id: String,
    pub strategy_id: String,
    /// Provider name, so synthetic-data results are distinguishable.
    pub provider: String,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, RunOutcome::Ok { .. })
    }

    pub fn result(&self) -> Option<&SimulationResult> {
        match &self.outcome {
            RunOutcome::Ok { result } => Some(result),
            RunOutcome::Err { .. } => None,
        }
    }

    pub fn error(&self) -> Option<(&str, &str)> {
        match &self.outcome {
            RunOutcome::Ok { .. } => None,
            RunOutcome::Err { kind, message } => Some((kind, message)),
        }
    }
}

fn simulation_error_kind(err: &SimulationError) -> &'static str {
    match err {
        SimulationError::Schema { .. } => "schema",
        SimulationError::Consistency { .. } => "consistency",
        SimulationError::InputData { .. } => "input_data",
    }
}

fn failure(spec: &RunSpec, provider: &str, kind: &str, message: String) -> RunRecord {
    RunRecord {
        run_id: spec.run_id(),
        call_id: spec.call.id.clone(),
        strategy_id: spec.strategy_id.clone(),
        provider: provider.to_string(),
        outcome: RunOutcome::Err {
            kind: kind.to_string(),
            message,
        },
    }
}

/// Execute one run spec against a provider.
pub fn run_one(spec: &RunSpec, provider: &dyn CandleProvider) -> RunRecord {
    let candles = match provider.get_candles(
        &spec.call.token_address,
        &spec.call.chain,
        spec.from_ts,
        spec.to_ts,
        &spec.interval,
    ) {
        Ok(candles) => candles,
        Err(err @ ProviderError::NotFound { .. }) => {
            return failure(spec, provider.name(), "provider_not_found", err.to_string())
        }
        Err(err) => return failure(spec, provider.name(), "provider", err.to_string()),
    };

    let def = spec.effective_strategy();
    match simulate(&def, &candles, spec.call.ts) {
        Ok(result) => RunRecord {
            run_id: spec.run_id(),
            call_id: spec.call.id.clone(),
            strategy_id: spec.strategy_id.clone(),
            provider: provider.name().to_string(),
            outcome: RunOutcome::Ok { result },
        },
        Err(err) => failure(
            spec,
            provider.name(),
            simulation_error_kind(&err),
            err.to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Call;
    use crate::provider::SyntheticProvider;
    use callsim_core::domain::{EntryRule, ExitRule, StrategyDefinition};
    use std::collections::BTreeMap;

    fn spec(exit: Vec<ExitRule>) -> RunSpec {
        let strategy = StrategyDefinition {
            version: 1,
            id: Some("s1".into()),
            name: "test".into(),
            description: None,
            tags: Vec::new(),
            position_sizing: None,
            entry: EntryRule::Immediate,
            exit,
            re_entry: None,
            risk: None,
            costs: None,
            metadata: BTreeMap::new(),
        };
        RunSpec {
            call: Call {
                id: "c1".into(),
                token_address: "0xaaa".into(),
                chain: "solana".into(),
                ts: 600,
                source: None,
            },
            strategy_id: "s1".into(),
            strategy,
            overlay: None,
            interval: "1m".into(),
            from_ts: 0,
            to_ts: 6_000,
        }
    }

    #[test]
    fn successful_run_yields_result() {
        let provider = SyntheticProvider::new(1);
        let record = run_one(&spec(vec![ExitRule::TimeExpiry { hold_bars: 10 }]), &provider);
        assert!(record.is_ok(), "{:?}", record.outcome);
        assert_eq!(record.provider, "synthetic");
        assert_eq!(record.call_id, "c1");
        assert!(record.result().unwrap().candles_consumed > 0);
    }

    #[test]
    fn invalid_strategy_becomes_a_failure_record() {
        let provider = SyntheticProvider::new(1);
        let record = run_one(&spec(Vec::new()), &provider);
        assert!(!record.is_ok());
        let (kind, message) = record.error().unwrap();
        assert_eq!(kind, "consistency");
        assert!(!message.is_empty());
    }

    #[test]
    fn missing_data_becomes_a_failure_record() {
        let provider = crate::provider::CsvProvider::new("/nonexistent");
        let record = run_one(&spec(vec![ExitRule::TimeExpiry { hold_bars: 10 }]), &provider);
        let (kind, _) = record.error().unwrap();
        assert_eq!(kind, "provider_not_found");
    }
}
