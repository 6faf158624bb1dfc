use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable,
    default_solver, variable,
};

use super::{Constraint, MilpError, Model, Relation};

pub(super) enum LpOutcome {
    Optimal { values: Vec<f64>, objective: f64 },
    Infeasible,
    Unbounded,
}

/// Solves the continuous relaxation of `model` under node bounds `lower`/`upper`
/// with `pool` as additional rows. `sign` is applied to the objective so the LP
/// is always a minimisation; the returned objective is in that internal sense.
pub(super) fn solve(
    model: &Model,
    pool: &[Constraint],
    lower: &[f64],
    upper: &[f64],
    sign: f64,
) -> Result<LpOutcome, MilpError> {
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = lower
        .iter()
        .zip(upper)
        .map(|(&lb, &ub)| vars.add(variable().min(lb).max(ub)))
        .collect();

    let mut objective = Expression::with_capacity(model.objective().terms().len());
    for &(v, c) in model.objective().terms() {
        objective.add_mul(sign * c, handles[v.index()]);
    }

    let mut problem = vars.minimise(objective).using(default_solver);
    for c in model.constraints().iter().chain(pool) {
        if c.expr.is_empty() {
            if !c.is_satisfied(&[], 1e-9) {
                return Ok(LpOutcome::Infeasible);
            }
            continue;
        }
        let mut lhs = Expression::with_capacity(c.expr.terms().len());
        for &(v, coef) in c.expr.terms() {
            lhs.add_mul(coef, handles[v.index()]);
        }
        problem = problem.with(match c.relation {
            Relation::Le => lhs.leq(c.rhs),
            Relation::Ge => lhs.geq(c.rhs),
            Relation::Eq => lhs.eq(c.rhs),
        });
    }

    match problem.solve() {
        Ok(solution) => {
            let values: Vec<f64> = handles.iter().map(|&h| solution.value(h)).collect();
            let objective = sign * model.objective().evaluate(&values);
            Ok(LpOutcome::Optimal { values, objective })
        }
        Err(ResolutionError::Infeasible) => Ok(LpOutcome::Infeasible),
        Err(ResolutionError::Unbounded) => Ok(LpOutcome::Unbounded),
        Err(e) => Err(MilpError::Relaxation(e.to_string())),
    }
}
