use std::time::Instant;

use tracing::{debug, info};

use super::relaxation::{self, LpOutcome};
use super::{
    CallbackContext, Constraint, IncumbentCallback, MilpError, MilpSolver, Model, ObjectiveSense,
    SolveParams, SolveReport, Status,
};

/// Depth-first branch-and-cut over LP relaxations.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndCut;

#[derive(Debug, Clone)]
struct Node {
    lower: Vec<f64>,
    upper: Vec<f64>,
    /// LP bound of the parent, in the internal (minimising) sense.
    bound: f64,
}

impl MilpSolver for BranchAndCut {
    fn solve(
        &self,
        model: &Model,
        params: &SolveParams,
        mut callback: Option<&mut dyn IncumbentCallback>,
    ) -> Result<SolveReport, MilpError> {
        model.validate()?;
        let started = Instant::now();
        let tol = params.int_tolerance;
        let sign = match model.sense() {
            ObjectiveSense::Minimize => 1.0,
            ObjectiveSense::Maximize => -1.0,
        };
        let integral = objective_is_integral(model);
        let cutoff = |bound: f64, best: f64| {
            if integral {
                (bound - tol).ceil() >= best - tol
            } else {
                bound >= best - 1e-9
            }
        };

        let mut stack = vec![Node {
            lower: model.vars().iter().map(|v| v.lb).collect(),
            upper: model.vars().iter().map(|v| v.ub).collect(),
            bound: f64::NEG_INFINITY,
        }];
        let mut pool: Vec<Constraint> = Vec::new();
        let mut incumbent: Option<(Vec<f64>, f64)> = None;
        let mut incumbent_count = 0;
        let mut node_count = 0u64;
        let mut status = None;
        let mut interrupted_bound = None;

        'search: while let Some(node) = stack.pop() {
            if let Some(limit) = params.time_limit
                && started.elapsed() >= limit
            {
                stack.push(node);
                status = Some(Status::TimeLimit);
                break;
            }
            if let Some((_, best)) = &incumbent
                && cutoff(node.bound, *best)
            {
                continue;
            }
            node_count += 1;

            loop {
                let (values, bound) =
                    match relaxation::solve(model, &pool, &node.lower, &node.upper, sign)? {
                        LpOutcome::Infeasible => break,
                        LpOutcome::Unbounded => {
                            status = Some(Status::Unbounded);
                            break 'search;
                        }
                        LpOutcome::Optimal { values, objective } => (values, objective),
                    };
                if let Some((_, best)) = &incumbent
                    && cutoff(bound, *best)
                {
                    break;
                }

                if let Some((var, value)) = most_fractional(model, &values, tol) {
                    let mut down = Node {
                        bound,
                        ..node.clone()
                    };
                    down.upper[var] = value.floor();
                    let mut up = Node {
                        bound,
                        ..node.clone()
                    };
                    up.lower[var] = value.ceil();
                    stack.push(down);
                    stack.push(up);
                    break;
                }

                let candidate = round_integers(model, values);
                let objective = sign * model.objective().evaluate(&candidate);

                if let Some(cb) = callback.as_mut() {
                    let mut ctx =
                        CallbackContext::new(&candidate, sign * objective, started, params.time_limit);
                    cb.on_incumbent(&mut ctx);
                    let (lazy, terminate) = ctx.into_parts();
                    if terminate {
                        debug!(node = node_count, "search terminated by callback");
                        interrupted_bound = Some(bound);
                        status = Some(Status::Interrupted);
                        break 'search;
                    }
                    let violated = lazy.iter().any(|c| !c.is_satisfied(&candidate, tol));
                    pool.extend(lazy);
                    if violated {
                        continue;
                    }
                }

                incumbent_count += 1;
                debug!(
                    objective = sign * objective,
                    node = node_count,
                    "new incumbent"
                );
                incumbent = Some((candidate, objective));
                break;
            }
        }

        let status = status.unwrap_or(if incumbent.is_some() {
            Status::Optimal
        } else {
            Status::Infeasible
        });
        let best_bound = match status {
            Status::Optimal => incumbent.as_ref().map(|(_, obj)| *obj),
            Status::Infeasible | Status::Unbounded => None,
            Status::TimeLimit | Status::Interrupted => {
                let open = stack
                    .iter()
                    .map(|n| n.bound)
                    .chain(interrupted_bound)
                    .chain(incumbent.as_ref().map(|(_, obj)| *obj))
                    .fold(f64::INFINITY, f64::min);
                open.is_finite().then_some(open)
            }
        };

        let elapsed = started.elapsed();
        info!(
            model = model.name(),
            ?status,
            nodes = node_count,
            incumbents = incumbent_count,
            lazy = pool.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "branch-and-cut finished"
        );

        let (values, objective) = match incumbent {
            Some((values, obj)) => (Some(values), Some(sign * obj)),
            None => (None, None),
        };
        Ok(SolveReport {
            status,
            incumbent: values,
            objective,
            best_bound: best_bound.map(|b| sign * b),
            incumbent_count,
            node_count,
            elapsed,
            lazy_constraints: pool.len(),
        })
    }
}

fn objective_is_integral(model: &Model) -> bool {
    let obj = model.objective();
    obj.constant().fract() == 0.0
        && obj
            .terms()
            .iter()
            .all(|&(v, c)| c.fract() == 0.0 && model.var(v).integer)
}

/// Integer variable farthest from integrality, ties broken by lowest index.
fn most_fractional(model: &Model, values: &[f64], tol: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64, f64)> = None;
    for (i, (def, &x)) in model.vars().iter().zip(values).enumerate() {
        if !def.integer {
            continue;
        }
        let frac = x - x.floor();
        let dist = frac.min(1.0 - frac);
        if dist > tol && best.is_none_or(|(_, _, d)| dist > d) {
            best = Some((i, x, dist));
        }
    }
    best.map(|(i, x, _)| (i, x))
}

fn round_integers(model: &Model, mut values: Vec<f64>) -> Vec<f64> {
    for (def, x) in model.vars().iter().zip(values.iter_mut()) {
        if def.integer {
            *x = x.round();
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp::{LinExpr, Var};
    use std::time::Duration;

    fn sum(vars: &[Var]) -> LinExpr {
        vars.iter().map(|&v| (1.0, v)).collect()
    }

    #[test]
    fn test_knapsack_optimum() {
        let mut m = Model::new("knapsack");
        let x: Vec<Var> = (0..4).map(|i| m.add_binary(format!("x{i}"))).collect();
        let values = [10.0, 13.0, 7.0, 8.0];
        let weights = [3.0, 4.0, 2.0, 3.0];
        m.add_constraint(x.iter().zip(weights).map(|(&v, w)| (w, v)).collect::<LinExpr>().leq(7.0));
        m.set_objective(
            x.iter().zip(values).map(|(&v, c)| (c, v)).collect(),
            ObjectiveSense::Maximize,
        );

        let report = BranchAndCut.solve(&m, &SolveParams::default(), None).unwrap();
        assert_eq!(report.status, Status::Optimal);
        assert!((report.objective.unwrap() - 23.0).abs() < 1e-6);
        assert!((report.best_bound.unwrap() - 23.0).abs() < 1e-6);
        let chosen: Vec<f64> = x.iter().map(|&v| report.value(v).unwrap()).collect();
        assert_eq!(chosen, vec![1.0, 1.0, 0.0, 0.0]);
        assert!(report.gap().unwrap() < 1e-9);
    }

    #[test]
    fn test_general_integer_rounds_up() {
        let mut m = Model::new("int");
        let x = m.add_var("x", 0.0, 10.0, true);
        m.add_constraint([(2.0, x)].into_iter().collect::<LinExpr>().geq(3.0));
        m.set_objective([(1.0, x)].into_iter().collect(), ObjectiveSense::Minimize);

        let report = BranchAndCut.solve(&m, &SolveParams::default(), None).unwrap();
        assert_eq!(report.status, Status::Optimal);
        assert_eq!(report.value(x), Some(2.0));
    }

    #[test]
    fn test_equality_constraint() {
        let mut m = Model::new("eq");
        let x: Vec<Var> = (0..3).map(|i| m.add_binary(format!("x{i}"))).collect();
        m.add_constraint(sum(&x).eq(2.0));
        m.set_objective(
            x.iter().zip([1.0, 2.0, 3.0]).map(|(&v, c)| (c, v)).collect(),
            ObjectiveSense::Minimize,
        );

        let report = BranchAndCut.solve(&m, &SolveParams::default(), None).unwrap();
        assert!((report.objective.unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_model() {
        let mut m = Model::new("infeasible");
        let x: Vec<Var> = (0..2).map(|i| m.add_binary(format!("x{i}"))).collect();
        m.add_constraint(sum(&x).geq(3.0));
        m.set_objective(sum(&x), ObjectiveSense::Minimize);

        let report = BranchAndCut.solve(&m, &SolveParams::default(), None).unwrap();
        assert_eq!(report.status, Status::Infeasible);
        assert!(report.incumbent.is_none());
        assert!(report.best_bound.is_none());
    }

    struct ForbidPair {
        vars: Vec<Var>,
        calls: usize,
    }

    impl IncumbentCallback for ForbidPair {
        fn on_incumbent(&mut self, ctx: &mut CallbackContext<'_>) {
            self.calls += 1;
            if self.vars.iter().all(|&v| ctx.value(v) > 0.5) {
                ctx.add_lazy(sum(&self.vars).leq(1.0).named("pair"));
            }
        }
    }

    #[test]
    fn test_lazy_constraint_cuts_off_incumbent() {
        let mut m = Model::new("lazy");
        let x: Vec<Var> = (0..2).map(|i| m.add_binary(format!("x{i}"))).collect();
        m.set_objective(sum(&x), ObjectiveSense::Maximize);

        let mut cb = ForbidPair {
            vars: x.clone(),
            calls: 0,
        };
        let report = BranchAndCut
            .solve(&m, &SolveParams::default(), Some(&mut cb))
            .unwrap();
        assert_eq!(report.status, Status::Optimal);
        assert!((report.objective.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(report.lazy_constraints, 1);
        assert!(cb.calls >= 2);
        let ones = x.iter().filter(|&&v| report.value(v) == Some(1.0)).count();
        assert_eq!(ones, 1);
    }

    struct StopAtFirst;

    impl IncumbentCallback for StopAtFirst {
        fn on_incumbent(&mut self, ctx: &mut CallbackContext<'_>) {
            ctx.add_lazy(LinExpr::new().geq(1.0));
            ctx.terminate();
        }
    }

    #[test]
    fn test_terminate_discards_pending_cuts() {
        let mut m = Model::new("stop");
        let x = m.add_binary("x");
        m.set_objective([(1.0, x)].into_iter().collect(), ObjectiveSense::Minimize);

        let report = BranchAndCut
            .solve(&m, &SolveParams::default(), Some(&mut StopAtFirst))
            .unwrap();
        assert_eq!(report.status, Status::Interrupted);
        assert!(report.incumbent.is_none());
        assert_eq!(report.lazy_constraints, 0);
    }

    #[test]
    fn test_zero_time_limit() {
        let mut m = Model::new("timeout");
        let x = m.add_binary("x");
        m.set_objective([(1.0, x)].into_iter().collect(), ObjectiveSense::Minimize);

        let params = SolveParams::with_time_limit(Some(Duration::ZERO));
        let report = BranchAndCut.solve(&m, &params, None).unwrap();
        assert_eq!(report.status, Status::TimeLimit);
        assert_eq!(report.node_count, 0);
        assert!(report.best_bound.is_none());
    }
}
