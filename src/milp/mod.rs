pub mod branch_and_cut;
mod relaxation;

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

pub use branch_and_cut::BranchAndCut;

#[derive(Debug, Error)]
pub enum MilpError {
    #[error("LP relaxation failed: {0}")]
    Relaxation(String),
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

/// Handle to a variable of one [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(Var, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            terms: Vec::with_capacity(n),
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, coef: f64, var: Var) -> &mut Self {
        self.terms.push((var, coef));
        self
    }

    pub fn add_constant(&mut self, c: f64) -> &mut Self {
        self.constant += c;
        self
    }

    pub fn terms(&self) -> &[(Var, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|&(v, c)| c * values[v.0])
                .sum::<f64>()
    }

    pub fn leq(self, rhs: f64) -> Constraint {
        Constraint::new(self, Relation::Le, rhs)
    }

    pub fn geq(self, rhs: f64) -> Constraint {
        Constraint::new(self, Relation::Ge, rhs)
    }

    pub fn eq(self, rhs: f64) -> Constraint {
        Constraint::new(self, Relation::Eq, rhs)
    }
}

impl FromIterator<(f64, Var)> for LinExpr {
    fn from_iter<T: IntoIterator<Item = (f64, Var)>>(iter: T) -> Self {
        let mut expr = LinExpr::new();
        for (c, v) in iter {
            expr.add_term(c, v);
        }
        expr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

/// `expr (<=|>=|==) rhs`, with the expression's constant folded into `rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub expr: LinExpr,
    pub relation: Relation,
    pub rhs: f64,
    pub name: String,
}

impl Constraint {
    fn new(mut expr: LinExpr, relation: Relation, rhs: f64) -> Self {
        let rhs = rhs - expr.constant;
        expr.constant = 0.0;
        Self {
            expr,
            relation,
            rhs,
            name: String::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_satisfied(&self, values: &[f64], tol: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::Le => lhs <= self.rhs + tol,
            Relation::Ge => lhs >= self.rhs - tol,
            Relation::Eq => (lhs - self.rhs).abs() <= tol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub lb: f64,
    pub ub: f64,
    pub integer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    name: String,
    vars: Vec<VarDef>,
    constraints: Vec<Constraint>,
    objective: LinExpr,
    sense: ObjectiveSense,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_var(&mut self, name: impl Into<String>, lb: f64, ub: f64, integer: bool) -> Var {
        self.vars.push(VarDef {
            name: name.into(),
            lb,
            ub,
            integer,
        });
        Var(self.vars.len() - 1)
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> Var {
        self.add_var(name, 0.0, 1.0, true)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn set_objective(&mut self, objective: LinExpr, sense: ObjectiveSense) {
        self.objective = objective;
        self.sense = sense;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var(&self, v: Var) -> &VarDef {
        &self.vars[v.0]
    }

    pub fn vars(&self) -> &[VarDef] {
        &self.vars
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub(crate) fn validate(&self) -> Result<(), MilpError> {
        for (i, v) in self.vars.iter().enumerate() {
            if v.lb > v.ub {
                return Err(MilpError::InvalidModel(format!(
                    "variable {} ({}) has empty domain [{}, {}]",
                    i, v.name, v.lb, v.ub
                )));
            }
        }
        let n = self.vars.len();
        let out_of_range = self
            .constraints
            .iter()
            .flat_map(|c| c.expr.terms())
            .chain(self.objective.terms())
            .any(|(v, _)| v.0 >= n);
        if out_of_range {
            return Err(MilpError::InvalidModel(
                "expression references a variable of another model".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Optimal,
    Infeasible,
    Unbounded,
    TimeLimit,
    /// A callback requested termination.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct SolveParams {
    pub time_limit: Option<Duration>,
    pub int_tolerance: f64,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            time_limit: None,
            int_tolerance: 1e-6,
        }
    }
}

impl SolveParams {
    pub fn with_time_limit(time_limit: Option<Duration>) -> Self {
        Self {
            time_limit,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub status: Status,
    pub incumbent: Option<Vec<f64>>,
    pub objective: Option<f64>,
    pub best_bound: Option<f64>,
    pub incumbent_count: usize,
    pub node_count: u64,
    pub elapsed: Duration,
    pub lazy_constraints: usize,
}

impl SolveReport {
    pub fn value(&self, var: Var) -> Option<f64> {
        self.incumbent.as_ref().map(|x| x[var.0])
    }

    pub fn is_optimal(&self) -> bool {
        self.status == Status::Optimal
    }

    pub fn gap(&self) -> Option<f64> {
        let obj = self.objective?;
        let bound = self.best_bound?;
        Some((obj - bound).abs() / obj.abs().max(1e-10))
    }
}

/// Handed to an [`IncumbentCallback`] at every new integer-feasible solution.
/// The callback runs synchronously; nothing else touches solver state while
/// it holds the context.
pub struct CallbackContext<'a> {
    values: &'a [f64],
    objective: f64,
    started: Instant,
    time_limit: Option<Duration>,
    lazy: Vec<Constraint>,
    terminate: bool,
}

impl<'a> CallbackContext<'a> {
    pub(crate) fn new(
        values: &'a [f64],
        objective: f64,
        started: Instant,
        time_limit: Option<Duration>,
    ) -> Self {
        Self {
            values,
            objective,
            started,
            time_limit,
            lazy: Vec::new(),
            terminate: false,
        }
    }

    pub fn value(&self, var: Var) -> f64 {
        self.values[var.0]
    }

    pub fn values(&self, vars: &[Var]) -> Vec<f64> {
        vars.iter().map(|&v| self.values[v.0]).collect()
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Time since the search started.
    pub fn runtime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the search limit, `None` when unlimited.
    pub fn remaining(&self) -> Option<Duration> {
        self.time_limit
            .map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    pub fn add_lazy(&mut self, constraint: Constraint) {
        self.lazy.push(constraint);
    }

    pub fn terminate(&mut self) {
        self.terminate = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate
    }

    pub(crate) fn into_parts(self) -> (Vec<Constraint>, bool) {
        (self.lazy, self.terminate)
    }
}

pub trait IncumbentCallback {
    fn on_incumbent(&mut self, ctx: &mut CallbackContext<'_>);
}

pub trait MilpSolver {
    fn solve(
        &self,
        model: &Model,
        params: &SolveParams,
        callback: Option<&mut dyn IncumbentCallback>,
    ) -> Result<SolveReport, MilpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folds_into_rhs() {
        let mut m = Model::new("t");
        let a = m.add_binary("a");
        let b = m.add_binary("b");
        let mut expr = LinExpr::new();
        expr.add_constant(2.0).add_term(-1.0, a).add_term(-1.0, b);
        let c = expr.geq(1.0);
        assert_eq!(c.rhs, -1.0);
        assert_eq!(c.expr.constant(), 0.0);
        assert!(c.is_satisfied(&[1.0, 0.0], 1e-9));
        assert!(!c.is_satisfied(&[1.0, 1.0], 1e-9));
    }

    #[test]
    fn test_validate_rejects_foreign_var() {
        let mut other = Model::new("other");
        other.add_binary("a");
        let stray = other.add_binary("b");
        let mut m = Model::new("m");
        let a = m.add_binary("a");
        m.add_constraint([(1.0, a), (1.0, stray)].into_iter().collect::<LinExpr>().leq(1.0));
        assert!(matches!(m.validate(), Err(MilpError::InvalidModel(_))));
    }

    #[test]
    fn test_callback_context_clock_and_parts() {
        let mut m = Model::new("ctx");
        let a = m.add_binary("a");
        let values = [1.0];
        let limit = Duration::from_secs(3600);
        let mut ctx = CallbackContext::new(&values, 1.0, std::time::Instant::now(), Some(limit));
        assert!(ctx.runtime() < limit);
        let remaining = ctx.remaining().unwrap();
        assert!(remaining <= limit && remaining > Duration::ZERO);
        assert_eq!(ctx.value(a), 1.0);

        let mut expr = LinExpr::new();
        expr.add_term(1.0, a);
        ctx.add_lazy(expr.leq(0.0));
        ctx.terminate();
        let (lazy, terminated) = ctx.into_parts();
        assert_eq!(lazy.len(), 1);
        assert!(terminated);
    }

    #[test]
    fn test_gap() {
        let report = SolveReport {
            status: Status::TimeLimit,
            incumbent: Some(vec![]),
            objective: Some(4.0),
            best_bound: Some(3.0),
            incumbent_count: 1,
            node_count: 10,
            elapsed: Duration::ZERO,
            lazy_constraints: 0,
        };
        assert!((report.gap().unwrap() - 0.25).abs() < 1e-12);
    }
}
