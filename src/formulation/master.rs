use crate::instance::Instance;
use crate::milp::{Constraint, LinExpr, Model, ObjectiveSense, Var};

use super::{AssignKey, add_symmetry_breaking, weighted_bins};

/// Area-relaxed assignment model: `b[i,j]` and `z[j]`, no positions.
#[derive(Debug, Clone)]
pub struct Master {
    pub model: Model,
    /// `b[item][bin]`
    pub b: Vec<Vec<Var>>,
    pub z: Vec<Var>,
}

impl Master {
    pub fn build(instance: &Instance, bins: usize) -> Self {
        let mut model = Model::new("master");
        let z: Vec<Var> = (0..bins)
            .map(|j| model.add_binary(format!("z_{}", j + 1)))
            .collect();
        let b: Vec<Vec<Var>> = instance
            .items
            .iter()
            .map(|it| {
                (0..bins)
                    .map(|j| model.add_binary(format!("b_{}_{}", it.id, j + 1)))
                    .collect()
            })
            .collect();

        model.set_objective(weighted_bins(&z), ObjectiveSense::Minimize);

        for (it, row) in instance.items.iter().zip(&b) {
            let expr: LinExpr = row.iter().map(|&v| (1.0, v)).collect();
            model.add_constraint(expr.eq(1.0).named(format!("assign_once_{}", it.id)));
        }

        let bin_area = instance.bin.area() as f64;
        for j in 0..bins {
            let mut area: LinExpr = instance
                .items
                .iter()
                .zip(&b)
                .map(|(it, row)| (it.area() as f64, row[j]))
                .collect();
            area.add_term(-bin_area, z[j]);
            model.add_constraint(area.leq(0.0).named(format!("capacity_{}", j + 1)));

            let mut used: LinExpr = b.iter().map(|row| (1.0, row[j])).collect();
            used.add_term(-1.0, z[j]);
            model.add_constraint(used.geq(0.0).named(format!("bin_used_{}", j + 1)));
        }

        add_symmetry_breaking(&mut model, &z);

        tracing::info!(
            bins,
            vars = model.num_vars(),
            constraints = model.num_constraints(),
            "master model built"
        );
        Self { model, b, z }
    }

    pub fn bins(&self) -> usize {
        self.z.len()
    }

    pub fn assign_var(&self, key: AssignKey) -> Var {
        self.b[key.item][key.bin]
    }

    /// No-good on `bin`: `Σ_{i ∈ items} (1 − b[i,bin]) >= 1`, i.e. the items
    /// may not all share that bin.
    pub fn no_good(&self, items: &[usize], bin: usize) -> Constraint {
        let mut expr = LinExpr::with_capacity(items.len());
        for &item in items {
            expr.add_constant(1.0)
                .add_term(-1.0, self.assign_var(AssignKey { item, bin }));
        }
        expr.geq(1.0).named(format!("no_good_{}_{}", bin + 1, join(items)))
    }
}

fn join(items: &[usize]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("_")
}
