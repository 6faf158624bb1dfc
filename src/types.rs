use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn fits_in(&self, other: &Rect) -> bool {
        self.w <= other.w && self.h <= other.h
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// A unit-demand item. `id` is unique after demand expansion, `label` is the
/// id the item carried in the instance file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u32,
    pub label: u32,
    pub rect: Rect,
}

impl Item {
    pub fn area(&self) -> u64 {
        self.rect.area()
    }
}

/// An item with its lower-left corner at grid cell `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub item: u32,
    pub label: u32,
    #[serde(flatten)]
    pub rect: Rect,
    pub x: u32,
    pub y: u32,
}

impl Placement {
    pub fn overlaps(&self, other: &Placement) -> bool {
        self.x < other.x + other.rect.w
            && other.x < self.x + self.rect.w
            && self.y < other.y + other.rect.h
            && other.y < self.y + self.rect.h
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BinResult {
    /// 1-based bin number.
    pub index: usize,
    pub placements: Vec<Placement>,
    pub waste_area: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub bins: Vec<BinResult>,
    pub stock: Rect,
}

impl Solution {
    pub fn empty(stock: Rect) -> Self {
        Self {
            bins: vec![],
            stock,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn item_count(&self) -> usize {
        self.bins.iter().map(|b| b.placements.len()).sum()
    }

    pub fn total_waste_percent(&self) -> f64 {
        let stock_area = self.stock.area();
        let total_stock_area = stock_area * self.bins.len() as u64;
        let total_used: u64 = self
            .bins
            .iter()
            .flat_map(|b| &b.placements)
            .map(|p| p.rect.area())
            .sum();
        if total_stock_area == 0 {
            return 0.0;
        }
        (total_stock_area - total_used) as f64 / total_stock_area as f64 * 100.0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SolveStats {
    pub objective: Option<f64>,
    pub dual_bound: Option<f64>,
    pub optimal: bool,
    pub gap: Option<f64>,
    pub node_count: u64,
    pub incumbents: usize,
    pub total_time_secs: f64,
    pub callback_time_secs: f64,
    /// Cut generation ran out of time; the reported packing is unverified.
    pub incomplete: bool,
    pub feasibility_cuts: usize,
    pub bin_bound: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Packed { solution: Solution },
    NoSolution,
    Infeasible,
    Unbounded,
}

impl Outcome {
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            Outcome::Packed { solution } => Some(solution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub outcome: Outcome,
    pub stats: SolveStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(x: u32, y: u32, w: u32, h: u32) -> Placement {
        Placement {
            item: 1,
            label: 1,
            rect: Rect::new(w, h),
            x,
            y,
        }
    }

    #[test]
    fn test_touching_placements_do_not_overlap() {
        let a = placement(0, 0, 2, 2);
        let b = placement(2, 0, 2, 2);
        let c = placement(0, 2, 4, 1);
        assert!(!a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!b.overlaps(&c));
    }

    #[test]
    fn test_overlapping_placements() {
        let a = placement(0, 0, 3, 3);
        let b = placement(2, 2, 2, 2);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn test_waste_percent() {
        let solution = Solution {
            bins: vec![BinResult {
                index: 1,
                placements: vec![placement(0, 0, 2, 4)],
                waste_area: 8,
            }],
            stock: Rect::new(4, 4),
        };
        assert!((solution.total_waste_percent() - 50.0).abs() < 1e-9);
        assert_eq!(solution.item_count(), 1);
    }

    #[test]
    fn test_empty_solution_has_no_waste() {
        let solution = Solution::empty(Rect::new(10, 10));
        assert_eq!(solution.bin_count(), 0);
        assert_eq!(solution.total_waste_percent(), 0.0);
    }
}
