use std::collections::HashSet;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::formulation::is_active;
use crate::formulation::master::Master;
use crate::formulation::subproblem::{Feasibility, check_bin};
use crate::instance::Instance;
use crate::milp::{CallbackContext, IncumbentCallback, MilpError, MilpSolver};
use crate::overlap::PointCuts;
use crate::types::Placement;

#[derive(Debug, Error)]
pub enum CallbackFault {
    #[error("subproblem for bin {bin} failed: {source}")]
    Subproblem {
        bin: usize,
        #[source]
        source: MilpError,
    },
    #[error("item {item} is not assigned to exactly one bin in the incumbent")]
    Unassigned { item: u32 },
    #[error("infeasible item set {items:?} reappeared after its cut was injected")]
    RepeatedCut { items: Vec<usize> },
}

/// Item sets already proven not to fit a single bin, for one solve run.
#[derive(Debug, Clone, Default)]
pub struct CutRegistry {
    seen: HashSet<Vec<usize>>,
    order: Vec<Vec<usize>>,
}

impl CutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the set was already registered.
    pub fn insert(&mut self, mut items: Vec<usize>) -> bool {
        items.sort_unstable();
        if self.seen.contains(&items) {
            return false;
        }
        self.seen.insert(items.clone());
        self.order.push(items);
        true
    }

    pub fn contains(&self, items: &[usize]) -> bool {
        let mut key = items.to_vec();
        key.sort_unstable();
        self.seen.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered item sets in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.order.iter().map(Vec::as_slice)
    }
}

/// Splits every master incumbent into per-bin subproblems; each infeasible
/// item set becomes a no-good on every bin.
pub struct CutGenerator<'a> {
    instance: &'a Instance,
    cuts: &'a PointCuts,
    master: &'a Master,
    solver: &'a dyn MilpSolver,
    registry: CutRegistry,
    witness: Option<Vec<(usize, Vec<Placement>)>>,
    callback_time: Duration,
    invocations: usize,
    incomplete: bool,
    fault: Option<CallbackFault>,
}

impl<'a> CutGenerator<'a> {
    pub fn new(
        instance: &'a Instance,
        cuts: &'a PointCuts,
        master: &'a Master,
        solver: &'a dyn MilpSolver,
    ) -> Self {
        Self {
            instance,
            cuts,
            master,
            solver,
            registry: CutRegistry::new(),
            witness: None,
            callback_time: Duration::ZERO,
            invocations: 0,
            incomplete: false,
            fault: None,
        }
    }

    pub fn registry(&self) -> &CutRegistry {
        &self.registry
    }

    /// Placements per bin from the most recent incumbent whose bins all
    /// packed.
    pub fn witness(&self) -> Option<&[(usize, Vec<Placement>)]> {
        self.witness.as_deref()
    }

    pub fn callback_time(&self) -> Duration {
        self.callback_time
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn take_fault(&mut self) -> Option<CallbackFault> {
        self.fault.take()
    }

    /// Items per bin according to `b`. Every item must sit in exactly one bin.
    fn partition(&self, ctx: &CallbackContext<'_>) -> Result<Vec<Vec<usize>>, CallbackFault> {
        let mut per_bin = vec![Vec::new(); self.master.bins()];
        for (item, row) in self.master.b.iter().enumerate() {
            let bins: Vec<usize> = ctx
                .values(row)
                .into_iter()
                .enumerate()
                .filter(|&(_, v)| is_active(v))
                .map(|(j, _)| j)
                .collect();
            let &[bin] = bins.as_slice() else {
                return Err(CallbackFault::Unassigned {
                    item: self.instance.items[item].id,
                });
            };
            per_bin[bin].push(item);
        }
        Ok(per_bin)
    }

    fn separate(&mut self, ctx: &mut CallbackContext<'_>) -> Result<(), CallbackFault> {
        let open = ctx
            .values(&self.master.z)
            .into_iter()
            .filter(|&v| is_active(v))
            .count();
        let per_bin = self.partition(ctx)?;
        debug!(
            objective = ctx.objective(),
            open,
            elapsed_ms = ctx.runtime().as_millis() as u64,
            "checking incumbent"
        );

        let mut placed = Vec::new();
        let mut infeasible = Vec::new();
        for (bin, items) in per_bin.into_iter().enumerate() {
            if items.is_empty() {
                continue;
            }
            let remaining = ctx.remaining();
            if remaining.is_some_and(|r| r.is_zero()) {
                return self.give_up(ctx, bin);
            }
            let verdict = check_bin(self.instance, self.cuts, self.solver, bin, &items, remaining)
                .map_err(|source| CallbackFault::Subproblem { bin: bin + 1, source })?;
            match verdict {
                Feasibility::Feasible(placements) => placed.push((bin, placements)),
                Feasibility::Infeasible => infeasible.push(items),
                Feasibility::Unknown => return self.give_up(ctx, bin),
            }
        }

        if infeasible.is_empty() {
            self.witness = Some(placed);
            return Ok(());
        }

        // Reject the whole batch before touching the registry or the solver.
        if let Some(items) = infeasible.iter().find(|s| self.registry.contains(s)) {
            return Err(CallbackFault::RepeatedCut {
                items: items.clone(),
            });
        }
        for items in infeasible {
            for bin in 0..self.master.bins() {
                ctx.add_lazy(self.master.no_good(&items, bin));
            }
            debug!(?items, "no-good injected on every bin");
            self.registry.insert(items);
        }
        Ok(())
    }

    fn give_up(&mut self, ctx: &mut CallbackContext<'_>, bin: usize) -> Result<(), CallbackFault> {
        warn!(bin = bin + 1, "time limit reached during cut generation");
        self.incomplete = true;
        ctx.terminate();
        Ok(())
    }
}

impl IncumbentCallback for CutGenerator<'_> {
    fn on_incumbent(&mut self, ctx: &mut CallbackContext<'_>) {
        let started = Instant::now();
        self.invocations += 1;
        if let Err(fault) = self.separate(ctx) {
            error!(%fault, "cut generation failed");
            ctx.terminate();
            self.fault = Some(fault);
        }
        self.callback_time += started.elapsed();
    }
}
