use std::time::Duration;

use crate::instance::Instance;
use crate::milp::{MilpError, MilpSolver, Model, ObjectiveSense, SolveParams, Status};
use crate::overlap::PointCuts;
use crate::types::Placement;

use super::{CellCapacity, PlacementVars, add_overlap_constraints};

#[derive(Debug, Clone, PartialEq)]
pub enum Feasibility {
    /// One witness placement per item.
    Feasible(Vec<Placement>),
    Infeasible,
    /// The time budget ran out before a verdict.
    Unknown,
}

/// Can `items` be laid out without overlap on a single bin?
#[derive(Debug, Clone)]
pub struct Subproblem {
    pub bin: usize,
    pub items: Vec<usize>,
    pub model: Model,
    pub x: PlacementVars,
}

impl Subproblem {
    pub fn build(instance: &Instance, cuts: &PointCuts, bin: usize, items: &[usize]) -> Self {
        let mut model = Model::new(format!("subproblem_{}", bin + 1));
        let x = PlacementVars::build(&mut model, instance, items, bin);
        model.set_objective(Default::default(), ObjectiveSense::Minimize);

        add_overlap_constraints(&mut model, cuts, &x, bin, CellCapacity::Unit);
        for (item, expr) in x.per_item() {
            model.add_constraint(
                expr.eq(1.0)
                    .named(format!("place_once_{}", instance.items[item].id)),
            );
        }

        Self {
            bin,
            items: items.to_vec(),
            model,
            x,
        }
    }

    pub fn solve(
        &self,
        instance: &Instance,
        solver: &dyn MilpSolver,
        time_limit: Option<Duration>,
    ) -> Result<Feasibility, MilpError> {
        if self.items.is_empty() {
            return Ok(Feasibility::Feasible(vec![]));
        }
        let report = solver.solve(&self.model, &SolveParams::with_time_limit(time_limit), None)?;
        if report.incumbent.is_some() {
            let placements = self
                .x
                .active(instance, |v| report.value(v).unwrap_or(0.0));
            return Ok(Feasibility::Feasible(placements));
        }
        Ok(match report.status {
            Status::Infeasible => Feasibility::Infeasible,
            _ => Feasibility::Unknown,
        })
    }
}

/// Builds and solves the subproblem for `items` on `bin`.
pub fn check_bin(
    instance: &Instance,
    cuts: &PointCuts,
    solver: &dyn MilpSolver,
    bin: usize,
    items: &[usize],
    time_limit: Option<Duration>,
) -> Result<Feasibility, MilpError> {
    if items.is_empty() {
        return Ok(Feasibility::Feasible(vec![]));
    }
    Subproblem::build(instance, cuts, bin, items).solve(instance, solver, time_limit)
}
