use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::benders::{CallbackFault, CutGenerator};
use crate::formulation::master::Master;
use crate::formulation::monolithic::Monolithic;
use crate::formulation::used_bins;
use crate::instance::{Instance, InstanceError};
use crate::milp::{self, BranchAndCut, MilpError, MilpSolver, SolveParams, Status};
use crate::overlap::PointCuts;
use crate::types::{BinResult, Outcome, Placement, Solution, SolveReport, SolveStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Full placement model over all bins.
    Monolithic,
    /// Area-relaxed master with per-bin feasibility cuts.
    #[default]
    Benders,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub strategy: Strategy,
    pub time_limit_secs: Option<f64>,
    pub bin_bound_factor: f64,
    pub max_bins: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            time_limit_secs: None,
            bin_bound_factor: 1.2,
            max_bins: None,
        }
    }
}

impl SolverConfig {
    /// `None` when unlimited. Limits too large for a `Duration` count as unlimited.
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs
            .and_then(|s| Duration::try_from_secs_f64(s.max(0.0)).ok())
    }
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Instance(#[from] InstanceError),
    #[error(transparent)]
    Solver(#[from] MilpError),
    #[error("cut generation aborted the search: {0}")]
    Callback(#[from] CallbackFault),
}

pub struct Solver {
    instance: Instance,
    config: SolverConfig,
    engine: Box<dyn MilpSolver + Send + Sync>,
}

impl Solver {
    pub fn new(instance: Instance, config: SolverConfig) -> Self {
        Self::with_engine(instance, config, Box::new(BranchAndCut))
    }

    pub fn with_engine(
        instance: Instance,
        config: SolverConfig,
        engine: Box<dyn MilpSolver + Send + Sync>,
    ) -> Self {
        Self {
            instance,
            config,
            engine,
        }
    }

    pub fn bin_bound(&self) -> usize {
        match self.config.max_bins {
            Some(k) => k.min(self.instance.items.len()),
            None => self.instance.bin_bound(self.config.bin_bound_factor),
        }
    }

    pub fn solve(&self) -> Result<SolveReport, SolveError> {
        self.instance.validate()?;
        let started = Instant::now();
        let bins = self.bin_bound();
        info!(
            instance = %self.instance.name,
            items = self.instance.items.len(),
            bin = %self.instance.bin,
            bins,
            strategy = ?self.config.strategy,
            "solving"
        );

        if self.instance.items.is_empty() {
            return Ok(SolveReport {
                outcome: Outcome::Packed {
                    solution: Solution::empty(self.instance.bin),
                },
                stats: SolveStats {
                    optimal: true,
                    ..SolveStats::default()
                },
            });
        }
        if bins == 0 {
            return Ok(SolveReport {
                outcome: Outcome::Infeasible,
                stats: SolveStats::default(),
            });
        }

        let cuts = PointCuts::compute(&self.instance.items, self.instance.bin);
        let mut report = match self.config.strategy {
            Strategy::Monolithic => self.solve_monolithic(&cuts, bins, started)?,
            Strategy::Benders => self.solve_benders(&cuts, bins, started)?,
        };
        report.stats.bin_bound = bins;
        report.stats.total_time_secs = started.elapsed().as_secs_f64();

        info!(
            bins_used = report.outcome.solution().map(Solution::bin_count),
            objective = report.stats.objective,
            optimal = report.stats.optimal,
            incomplete = report.stats.incomplete,
            "solve finished"
        );
        Ok(report)
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        self.config
            .time_limit()
            .map(|limit| limit.saturating_sub(started.elapsed()))
    }

    fn solve_monolithic(
        &self,
        cuts: &PointCuts,
        bins: usize,
        started: Instant,
    ) -> Result<SolveReport, SolveError> {
        let mono = Monolithic::build(&self.instance, cuts, bins);
        let params = SolveParams::with_time_limit(self.remaining(started));
        let result = self.engine.solve(&mono.model, &params, None)?;

        let stats = stats_from(&result);
        let Some(outcome) = terminal_outcome(&result) else {
            let value = |v| result.value(v).unwrap_or(0.0);
            let layout = used_bins(&mono.z, value)
                .into_iter()
                .map(|j| (j, mono.x[j].active(&self.instance, value)))
                .collect();
            return Ok(SolveReport {
                outcome: self.packed(layout),
                stats,
            });
        };
        Ok(SolveReport { outcome, stats })
    }

    fn solve_benders(
        &self,
        cuts: &PointCuts,
        bins: usize,
        started: Instant,
    ) -> Result<SolveReport, SolveError> {
        let master = Master::build(&self.instance, bins);
        let mut generator = CutGenerator::new(&self.instance, cuts, &master, self.engine.as_ref());
        let params = SolveParams::with_time_limit(self.remaining(started));
        let result = self
            .engine
            .solve(&master.model, &params, Some(&mut generator))?;

        // The engine has stopped; only now does a fault surface.
        if let Some(fault) = generator.take_fault() {
            return Err(fault.into());
        }

        let mut stats = stats_from(&result);
        stats.callback_time_secs = generator.callback_time().as_secs_f64();
        stats.feasibility_cuts = generator.registry().len();
        if generator.is_incomplete() {
            warn!("cut generation incomplete; reported packing is unverified");
            stats.incomplete = true;
            stats.optimal = false;
        }

        if let Some(outcome) = terminal_outcome(&result) {
            return Ok(SolveReport { outcome, stats });
        }
        let Some(witness) = generator.witness() else {
            warn!("master incumbent without a verified layout");
            return Ok(SolveReport {
                outcome: Outcome::NoSolution,
                stats,
            });
        };

        let value = |v| result.value(v).unwrap_or(0.0);
        let open = used_bins(&master.z, value);
        let layout = witness
            .iter()
            .filter(|(j, _)| open.contains(j))
            .cloned()
            .collect();
        Ok(SolveReport {
            outcome: self.packed(layout),
            stats,
        })
    }

    /// Turns `(bin, placements)` pairs into a solution numbered `1..`.
    fn packed(&self, layout: Vec<(usize, Vec<Placement>)>) -> Outcome {
        let by_bin: BTreeMap<usize, Vec<Placement>> = layout
            .into_iter()
            .filter(|(_, p)| !p.is_empty())
            .collect();
        let bin_area = self.instance.bin.area();
        let bins = by_bin
            .into_iter()
            .map(|(j, mut placements)| {
                placements.sort_by_key(|p| p.item);
                let used: u64 = placements.iter().map(|p| p.rect.area()).sum();
                BinResult {
                    index: j + 1,
                    placements,
                    waste_area: bin_area.saturating_sub(used),
                }
            })
            .collect();
        Outcome::Packed {
            solution: Solution {
                bins,
                stock: self.instance.bin,
            },
        }
    }
}

/// Outcome when the search produced nothing to extract.
fn terminal_outcome(result: &milp::SolveReport) -> Option<Outcome> {
    match result.status {
        Status::Infeasible => Some(Outcome::Infeasible),
        Status::Unbounded => Some(Outcome::Unbounded),
        _ if result.incumbent.is_none() => Some(Outcome::NoSolution),
        _ => None,
    }
}

fn stats_from(result: &milp::SolveReport) -> SolveStats {
    SolveStats {
        objective: result.objective,
        dual_bound: result.best_bound,
        optimal: result.is_optimal(),
        gap: result.gap(),
        node_count: result.node_count,
        incumbents: result.incumbent_count,
        ..SolveStats::default()
    }
}
