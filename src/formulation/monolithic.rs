use crate::instance::Instance;
use crate::milp::{LinExpr, Model, ObjectiveSense, Var};
use crate::overlap::PointCuts;

use super::{CellCapacity, PlacementVars, add_overlap_constraints, add_symmetry_breaking, weighted_bins};

/// Full placement model over `K` bins: `x[i,j,l,w]` and `z[j]`.
#[derive(Debug, Clone)]
pub struct Monolithic {
    pub model: Model,
    pub x: Vec<PlacementVars>,
    pub z: Vec<Var>,
}

impl Monolithic {
    pub fn build(instance: &Instance, cuts: &PointCuts, bins: usize) -> Self {
        let mut model = Model::new("monolithic");
        let all_items: Vec<usize> = (0..instance.items.len()).collect();

        let x: Vec<PlacementVars> = (0..bins)
            .map(|j| PlacementVars::build(&mut model, instance, &all_items, j))
            .collect();
        let z: Vec<Var> = (0..bins)
            .map(|j| model.add_binary(format!("z_{}", j + 1)))
            .collect();

        model.set_objective(weighted_bins(&z), ObjectiveSense::Minimize);

        // Each item placed exactly once across all bins.
        let mut placed: Vec<LinExpr> = vec![LinExpr::new(); instance.items.len()];
        for vars in &x {
            for (item, expr) in vars.per_item() {
                for &(v, c) in expr.terms() {
                    placed[item].add_term(c, v);
                }
            }
        }
        for (item, expr) in placed.into_iter().enumerate() {
            model.add_constraint(
                expr.eq(1.0)
                    .named(format!("place_once_{}", instance.items[item].id)),
            );
        }

        let bin_area = instance.bin.area() as f64;
        for (j, vars) in x.iter().enumerate() {
            add_overlap_constraints(&mut model, cuts, vars, j, CellCapacity::Bin(z[j]));

            let area: LinExpr = vars
                .iter()
                .map(|&(key, v)| (instance.items[key.item].area() as f64, v))
                .collect();
            model.add_constraint(area.leq(bin_area).named(format!("area_{}", j + 1)));

            // An open bin holds at least one item.
            let mut used: LinExpr = vars.iter().map(|&(_, v)| (1.0, v)).collect();
            used.add_term(-1.0, z[j]);
            model.add_constraint(used.geq(0.0).named(format!("bin_used_{}", j + 1)));
        }

        add_symmetry_breaking(&mut model, &z);

        tracing::info!(
            bins,
            vars = model.num_vars(),
            constraints = model.num_constraints(),
            "monolithic model built"
        );
        Self { model, x, z }
    }
}
