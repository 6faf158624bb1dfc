//! Point-cut relation: which grid cells an item covers when its lower-left
//! corner sits at a given anchor. Stored sparsely, indexed by covered cell.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::types::{Item, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub r: u32,
    pub s: u32,
}

/// Item `item` placed with its lower-left corner at `(l, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Anchor {
    pub item: usize,
    pub l: u32,
    pub w: u32,
}

/// Every corner position at which `rect` lies fully inside `bin`.
pub fn anchors(rect: Rect, bin: Rect) -> impl Iterator<Item = (u32, u32)> {
    let (max_l, max_w) = if rect.fits_in(&bin) {
        (bin.w - rect.w + 1, bin.h - rect.h + 1)
    } else {
        (0, 0)
    };
    (0..max_l).flat_map(move |l| (0..max_w).map(move |w| (l, w)))
}

#[derive(Debug, Clone)]
pub struct PointCuts {
    bin: Rect,
    covering: HashMap<Cell, Vec<Anchor>>,
    len: usize,
}

impl PointCuts {
    pub fn compute(items: &[Item], bin: Rect) -> Self {
        // Items are independent; collect preserves item order so the merge
        // below is deterministic.
        let per_item: Vec<Vec<(Cell, Anchor)>> = items
            .par_iter()
            .enumerate()
            .map(|(idx, item)| footprints(idx, item.rect, bin))
            .collect();

        let mut covering: HashMap<Cell, Vec<Anchor>> = HashMap::new();
        let mut len = 0;
        for tuples in per_item {
            len += tuples.len();
            for (cell, anchor) in tuples {
                covering.entry(cell).or_default().push(anchor);
            }
        }
        tracing::debug!(items = items.len(), tuples = len, "point cuts computed");

        Self { bin, covering, len }
    }

    /// `Cut(i, l, w, r, s)`.
    pub fn contains(&self, item: usize, l: u32, w: u32, r: u32, s: u32) -> bool {
        self.covering
            .get(&Cell { r, s })
            .is_some_and(|a| a.contains(&Anchor { item, l, w }))
    }

    pub fn covering(&self, cell: Cell) -> &[Anchor] {
        self.covering.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cells in grid order (column-major) with at least one covering anchor.
    pub fn cells(&self) -> impl Iterator<Item = (Cell, &[Anchor])> + '_ {
        (0..self.bin.w)
            .flat_map(move |r| (0..self.bin.h).map(move |s| Cell { r, s }))
            .filter_map(|cell| self.covering.get(&cell).map(|a| (cell, a.as_slice())))
    }

    pub fn bin(&self) -> Rect {
        self.bin
    }

    /// Number of `(item, l, w, r, s)` tuples in the relation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn footprints(idx: usize, rect: Rect, bin: Rect) -> Vec<(Cell, Anchor)> {
    let mut out = Vec::with_capacity(rect.area() as usize * anchors(rect, bin).count());
    for (l, w) in anchors(rect, bin) {
        let anchor = Anchor { item: idx, l, w };
        for r in l..l + rect.w {
            for s in w..w + rect.h {
                out.push((Cell { r, s }, anchor));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn item(id: u32, w: u32, h: u32) -> Item {
        Item {
            id,
            label: id,
            rect: Rect::new(w, h),
        }
    }

    #[test]
    fn test_anchors_cover_all_fitting_positions() {
        let positions: Vec<_> = anchors(Rect::new(2, 3), Rect::new(5, 5)).collect();
        assert_eq!(positions.len(), 4 * 3);
        assert!(positions.contains(&(3, 2)));
        assert!(!positions.contains(&(4, 0)));
        assert!(!positions.contains(&(0, 3)));
        assert_eq!(anchors(Rect::new(6, 1), Rect::new(5, 5)).count(), 0);
    }

    #[test]
    fn test_footprint_matches_brute_force() {
        let bin = Rect::new(5, 5);
        let items = vec![item(1, 2, 3)];
        let cuts = PointCuts::compute(&items, bin);

        for (l, w) in anchors(items[0].rect, bin) {
            let expected: BTreeSet<(u32, u32)> = (l..=l + 1)
                .flat_map(|r| (w..=w + 2).map(move |s| (r, s)))
                .collect();
            let mut marked = BTreeSet::new();
            for r in 0..bin.w {
                for s in 0..bin.h {
                    if cuts.contains(0, l, w, r, s) {
                        marked.insert((r, s));
                    }
                }
            }
            assert_eq!(marked, expected, "anchor ({l}, {w})");
        }
        assert_eq!(cuts.len(), 12 * 6);
    }

    #[test]
    fn test_footprints_reserve_every_anchor() {
        let out = footprints(0, Rect::new(2, 3), Rect::new(5, 5));
        assert_eq!(out.len(), 12 * 6);
        assert!(out.capacity() >= out.len());
        assert!(footprints(0, Rect::new(6, 1), Rect::new(5, 5)).is_empty());
    }

    #[test]
    fn test_invalid_anchor_is_never_cut() {
        let cuts = PointCuts::compute(&[item(1, 2, 3)], Rect::new(5, 5));
        // (4, 0) would push the item past the right edge.
        assert!(!cuts.contains(0, 4, 0, 4, 0));
        assert!(!cuts.contains(1, 0, 0, 0, 0));
    }

    #[test]
    fn test_covering_indexes_by_cell() {
        let items = vec![item(1, 4, 4), item(2, 1, 1)];
        let cuts = PointCuts::compute(&items, Rect::new(4, 4));
        // The full-size item has a single anchor covering every cell; the
        // unit item covers each cell from exactly one anchor.
        for (cell, anchors) in cuts.cells() {
            assert_eq!(anchors.len(), 2, "cell {cell:?}");
            assert!(anchors.contains(&Anchor { item: 0, l: 0, w: 0 }));
            assert!(anchors.contains(&Anchor {
                item: 1,
                l: cell.r,
                w: cell.s
            }));
        }
        assert_eq!(cuts.cells().count(), 16);
        assert_eq!(cuts.len(), 16 + 16);
        assert!(cuts.covering(Cell { r: 9, s: 9 }).is_empty());
    }
}
