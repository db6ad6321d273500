//! Sweep execution: many run specs, one record list.
//!
//! Parallel by default over rayon's pool; record order always matches spec
//! order so parallel and sequential sweeps produce identical output.

use rayon::prelude::*;

use crate::config::RunSpec;
use crate::provider::CandleProvider;
use crate::runner::{run_one, RunRecord};

/// Execute every spec. `parallel = false` forces sequential execution
/// (useful for debugging and for deterministic profiling).
pub fn run_sweep(
    specs: &[RunSpec],
    provider: &dyn CandleProvider,
    parallel: bool,
) -> SweepResults {
    let records: Vec<RunRecord> = if parallel {
        specs.par_iter().map(|spec| run_one(spec, provider)).collect()
    } else {
        specs.iter().map(|spec| run_one(spec, provider)).collect()
    };
    SweepResults::new(records)
}

/// Like `run_sweep`, invoking the callback after each run completes with
/// (index, total, record). Callback order follows completion order under
/// parallel execution; the returned records still follow spec order.
pub fn run_sweep_with_progress<F>(
    specs: &[RunSpec],
    provider: &dyn CandleProvider,
    parallel: bool,
    progress: F,
) -> SweepResults
where
    F: Fn(usize, usize, &RunRecord) + Send + Sync,
{
    let total = specs.len();
    let records: Vec<RunRecord> = if parallel {
        specs
            .par_iter()
            .enumerate()
            .map(|(i, spec)| {
                let record = run_one(spec, provider);
                progress(i, total, &record);
                record
            })
            .collect()
    } else {
        specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let record = run_one(spec, provider);
                progress(i, total, &record);
                record
            })
            .collect()
    };
    SweepResults::new(records)
}

/// The records of one sweep, in spec order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResults {
    records: Vec<RunRecord>,
}

impl SweepResults {
    pub fn new(records: Vec<RunRecord>) -> Self {
        Self { records }
    }

    pub fn all(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn successes(&self) -> Vec<&RunRecord> {
        self.records.iter().filter(|r| r.is_ok()).collect()
    }

    pub fn failures(&self) -> Vec<&RunRecord> {
        self.records.iter().filter(|r| !r.is_ok()).collect()
    }

    /// Successful records, best PnL first. Ties keep spec order.
    pub fn sorted_by_pnl(&self) -> Vec<&RunRecord> {
        let mut out = self.successes();
        out.sort_by(|a, b| {
            let pa = a.result().map(|r| r.final_pnl_percent).unwrap_or(f64::MIN);
            let pb = b.result().map(|r| r.final_pnl_percent).unwrap_or(f64::MIN);
            pb.total_cmp(&pa)
        });
        out
    }

    pub fn best(&self) -> Option<&RunRecord> {
        self.sorted_by_pnl().into_iter().next()
    }
}
