//! Packing formulations. Bins are indexed `0..K` internally; the objective
//! weight of bin `j` is `j + 1`.

pub mod master;
pub mod monolithic;
pub mod subproblem;

use std::collections::HashMap;

use crate::instance::Instance;
use crate::milp::{LinExpr, Model, Var};
use crate::overlap::{PointCuts, anchors};
use crate::types::Placement;

/// Values above this read back as 1. Used for every {0,1} readback.
pub const ACTIVE_THRESHOLD: f64 = 0.5;

pub fn is_active(value: f64) -> bool {
    value > ACTIVE_THRESHOLD
}

/// `x[item, bin, x, y]`: item placed with its corner at `(x, y)` in `bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlacementKey {
    pub item: usize,
    pub bin: usize,
    pub x: u32,
    pub y: u32,
}

/// `b[item, bin]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssignKey {
    pub item: usize,
    pub bin: usize,
}

/// Right-hand side of the per-cell overlap rows.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CellCapacity {
    /// `<= z[j]`
    Bin(Var),
    /// `<= 1`
    Unit,
}

/// Placement variables of one bin, in creation order plus a keyed lookup.
#[derive(Debug, Clone, Default)]
pub struct PlacementVars {
    vars: Vec<(PlacementKey, Var)>,
    index: HashMap<PlacementKey, Var>,
}

impl PlacementVars {
    pub(crate) fn build(
        model: &mut Model,
        instance: &Instance,
        items: &[usize],
        bin: usize,
    ) -> Self {
        let mut vars = Vec::new();
        for &item in items {
            let it = &instance.items[item];
            for (x, y) in anchors(it.rect, instance.bin) {
                let key = PlacementKey { item, bin, x, y };
                let var = model.add_binary(format!("x_{}_{}_{}_{}", it.id, bin + 1, x, y));
                vars.push((key, var));
            }
        }
        let index = vars.iter().copied().collect();
        Self { vars, index }
    }

    pub fn get(&self, key: &PlacementKey) -> Option<Var> {
        self.index.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PlacementKey, Var)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// `Σ_{l,w} x[item, bin, l, w]` for each item, in first-seen order.
    pub(crate) fn per_item(&self) -> Vec<(usize, LinExpr)> {
        let mut order: Vec<usize> = Vec::new();
        let mut exprs: HashMap<usize, LinExpr> = HashMap::new();
        for &(key, var) in &self.vars {
            exprs
                .entry(key.item)
                .or_insert_with(|| {
                    order.push(key.item);
                    LinExpr::new()
                })
                .add_term(1.0, var);
        }
        order
            .into_iter()
            .filter_map(|i| exprs.remove(&i).map(|e| (i, e)))
            .collect()
    }

    /// Placements whose variable reads as active.
    pub(crate) fn active(&self, instance: &Instance, value: impl Fn(Var) -> f64) -> Vec<Placement> {
        self.vars
            .iter()
            .filter(|&&(_, var)| is_active(value(var)))
            .map(|&(key, _)| {
                let it = &instance.items[key.item];
                Placement {
                    item: it.id,
                    label: it.label,
                    rect: it.rect,
                    x: key.x,
                    y: key.y,
                }
            })
            .collect()
    }
}

/// One row per covered cell of `bin`: `Σ_{(i,l,w) covers (r,s)} x[i,bin,l,w] <= cap`.
pub(crate) fn add_overlap_constraints(
    model: &mut Model,
    cuts: &PointCuts,
    vars: &PlacementVars,
    bin: usize,
    cap: CellCapacity,
) -> usize {
    let mut added = 0;
    for (cell, covering) in cuts.cells() {
        let mut expr = LinExpr::with_capacity(covering.len() + 1);
        for a in covering {
            let key = PlacementKey {
                item: a.item,
                bin,
                x: a.l,
                y: a.w,
            };
            if let Some(var) = vars.get(&key) {
                expr.add_term(1.0, var);
            }
        }
        // A single placement covering a cell can never conflict.
        if expr.terms().len() < 2 && matches!(cap, CellCapacity::Unit) {
            continue;
        }
        if expr.is_empty() {
            continue;
        }
        let rhs = match cap {
            CellCapacity::Bin(z) => {
                expr.add_term(-1.0, z);
                0.0
            }
            CellCapacity::Unit => 1.0,
        };
        model.add_constraint(
            expr.leq(rhs)
                .named(format!("overlap_{}_{}_{}", bin + 1, cell.r, cell.s)),
        );
        added += 1;
    }
    added
}

/// `z[j-1] >= z[j]` for consecutive bins.
pub(crate) fn add_symmetry_breaking(model: &mut Model, z: &[Var]) {
    for j in 1..z.len() {
        let mut expr = LinExpr::with_capacity(2);
        expr.add_term(1.0, z[j - 1]).add_term(-1.0, z[j]);
        model.add_constraint(expr.geq(0.0).named(format!("symmetry_{}_{}", j, j + 1)));
    }
}

/// `Σ_j (j+1)·z[j]`.
pub(crate) fn weighted_bins(z: &[Var]) -> LinExpr {
    z.iter()
        .enumerate()
        .map(|(j, &v)| ((j + 1) as f64, v))
        .collect()
}

/// Bins read as used from `z`, in index order.
pub fn used_bins(z: &[Var], value: impl Fn(Var) -> f64) -> Vec<usize> {
    z.iter()
        .enumerate()
        .filter(|&(_, &v)| is_active(value(v)))
        .map(|(j, _)| j)
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::instance::{Demand, Instance};
    use crate::types::Rect;

    /// Instance from `(w, h, qty)` triples; item type ids are 1-based.
    pub fn instance(bin: (u32, u32), items: &[(u32, u32, u32)]) -> Instance {
        let demands: Vec<Demand> = items
            .iter()
            .enumerate()
            .map(|(i, &(w, h, qty))| Demand {
                id: i as u32 + 1,
                rect: Rect::new(w, h),
                qty,
            })
            .collect();
        Instance::from_demands("test", Rect::new(bin.0, bin.1), &demands).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::instance;
    use super::*;

    #[test]
    fn test_threshold() {
        assert!(is_active(0.51));
        assert!(is_active(1.0));
        assert!(!is_active(0.5));
        assert!(!is_active(1e-7));
    }

    #[test]
    fn test_placement_vars_per_item() {
        let inst = instance((4, 4), &[(3, 3, 1), (4, 1, 1)]);
        let mut model = Model::new("vars");
        let vars = PlacementVars::build(&mut model, &inst, &[0, 1], 0);
        // 3x3 has 2x2 anchors, 4x1 has 1x4.
        assert_eq!(vars.len(), 4 + 4);
        let per_item = vars.per_item();
        assert_eq!(per_item.len(), 2);
        assert_eq!(per_item[0].0, 0);
        assert_eq!(per_item[0].1.terms().len(), 4);
        let key = PlacementKey {
            item: 1,
            bin: 0,
            x: 0,
            y: 3,
        };
        assert!(vars.get(&key).is_some());
        assert!(vars.get(&PlacementKey { x: 1, ..key }).is_none());
    }

    #[test]
    fn test_unit_overlap_skips_uncontested_cells() {
        let inst = instance((2, 1), &[(1, 1, 1)]);
        let cuts = PointCuts::compute(&inst.items, inst.bin);
        let mut model = Model::new("overlap");
        let vars = PlacementVars::build(&mut model, &inst, &[0], 0);
        let rows = add_overlap_constraints(&mut model, &cuts, &vars, 0, CellCapacity::Unit);
        assert_eq!(rows, 0);

        let z = model.add_binary("z");
        let rows = add_overlap_constraints(&mut model, &cuts, &vars, 0, CellCapacity::Bin(z));
        assert_eq!(rows, 2);
    }
}
