//! Serializable sweep configuration.
//!
//! A sweep is the cross product of calls, strategy files, and optional
//! cost overlays. `RunSpec` captures everything one run needs; its
//! `run_id()` is a content hash, so identical specs always map to the
//! same id and results are replay-diffable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use callsim_core::domain::{CostModel, StrategyDefinition};
use callsim_core::validate::load_strategy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::call::Call;

/// Unique identifier for one run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("strategy file '{path}' is invalid: {source}")]
    Strategy {
        path: PathBuf,
        #[source]
        source: callsim_core::SimulationError,
    },

    #[error("sweep config has no {0}")]
    Empty(&'static str),
}

/// A named cost overlay: replaces the strategy's own cost model so one
/// strategy can be swept across venue assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOverlay {
    pub name: String,
    pub costs: CostModel,
}

fn default_parallel() -> bool {
    true
}

fn default_interval() -> String {
    "1m".to_string()
}

/// Top-level sweep configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub calls: Vec<Call>,
    /// Paths to strategy definition JSON files, relative to the config file.
    pub strategies: Vec<PathBuf>,
    #[serde(default)]
    pub cost_overlays: Vec<CostOverlay>,
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Seconds of candle history fetched before each call's reference time
    /// (for indicator lookback).
    #[serde(default)]
    pub lookback_secs: i64,
    /// Seconds of candle data fetched after each call's reference time.
    pub horizon_secs: i64,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl SweepConfig {
    /// Load and structurally validate a sweep config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SweepConfig = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        if config.calls.is_empty() {
            return Err(ConfigError::Empty("calls"));
        }
        if config.strategies.is_empty() {
            return Err(ConfigError::Empty("strategies"));
        }
        Ok(config)
    }

    /// Load every referenced strategy file, keyed by strategy id (the
    /// definition's `id` when present, the file stem otherwise).
    ///
    /// `base_dir` anchors relative strategy paths (normally the config
    /// file's directory).
    pub fn load_strategies(
        &self,
        base_dir: &Path,
    ) -> Result<BTreeMap<String, StrategyDefinition>, ConfigError> {
        let mut out = BTreeMap::new();
        for rel in &self.strategies {
            let path = if rel.is_absolute() {
                rel.clone()
            } else {
                base_dir.join(rel)
            };
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let def = load_strategy(&text).map_err(|source| ConfigError::Strategy {
                path: path.clone(),
                source,
            })?;
            let id = def.id.clone().unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "strategy".to_string())
            });
            out.insert(id, def);
        }
        Ok(out)
    }

    /// Expand the cross product call x strategy x overlay into run specs.
    /// With no overlays each pair yields one spec using the strategy's own
    /// cost model.
    pub fn expand(&self, strategies: &BTreeMap<String, StrategyDefinition>) -> Vec<RunSpec> {
        let mut specs = Vec::new();
        for call in &self.calls {
            for (strategy_id, def) in strategies {
                if self.cost_overlays.is_empty() {
                    specs.push(RunSpec::new(call, strategy_id, def, None, self));
                } else {
                    for overlay in &self.cost_overlays {
                        specs.push(RunSpec::new(call, strategy_id, def, Some(overlay), self));
                    }
                }
            }
        }
        specs
    }
}

/// Everything one run needs, serializable so the run id can be derived
/// from content rather than position in the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub call: Call,
    pub strategy_id: String,
    pub strategy: StrategyDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<CostOverlay>,
    pub interval: String,
    pub from_ts: i64,
    pub to_ts: i64,
}

impl RunSpec {
    fn new(
        call: &Call,
        strategy_id: &str,
        strategy: &StrategyDefinition,
        overlay: Option<&CostOverlay>,
        config: &SweepConfig,
    ) -> Self {
        Self {
            call: call.clone(),
            strategy_id: strategy_id.to_string(),
            strategy: strategy.clone(),
            overlay: overlay.cloned(),
            interval: config.interval.clone(),
            from_ts: call.ts - config.lookback_secs,
            to_ts: call.ts + config.horizon_secs,
        }
    }

    /// Deterministic content hash of this spec.
    ///
    /// Two specs with identical content share an id, which is what makes
    /// sweep output diffable across re-runs.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunSpec serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// The strategy with the overlay's cost model applied (if any).
    pub fn effective_strategy(&self) -> StrategyDefinition {
        let mut def = self.strategy.clone();
        if let Some(overlay) = &self.overlay {
            def.costs = Some(overlay.costs);
        }
        def
    }
}
