use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Item, Rect};

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("failed to read instance: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("bin dimensions must be non-zero")]
    ZeroBin,
    #[error("item {id} has a non-positive dimension")]
    BadDimension { id: u32 },
    #[error("item {id} has a non-positive demand")]
    BadDemand { id: u32 },
    #[error("item {id} ({item}) does not fit in bin {bin}")]
    TooLarge { id: u32, item: Rect, bin: Rect },
}

/// One line of an instance: an item type repeated `qty` times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demand {
    pub id: u32,
    pub rect: Rect,
    pub qty: u32,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub bin: Rect,
    pub items: Vec<Item>,
}

impl Instance {
    /// Validates the demands and expands them into unit items with ids `1..`.
    pub fn from_demands(
        name: impl Into<String>,
        bin: Rect,
        demands: &[Demand],
    ) -> Result<Self, InstanceError> {
        if bin.w == 0 || bin.h == 0 {
            return Err(InstanceError::ZeroBin);
        }
        let mut items = Vec::new();
        let mut next_id = 1;
        for d in demands {
            if d.qty == 0 {
                return Err(InstanceError::BadDemand { id: d.id });
            }
            check_item(d.id, d.rect, bin)?;
            for _ in 0..d.qty {
                items.push(Item {
                    id: next_id,
                    label: d.id,
                    rect: d.rect,
                });
                next_id += 1;
            }
        }
        Ok(Self {
            name: name.into(),
            bin,
            items,
        })
    }

    /// Parses the 2DPackLib text format:
    ///
    /// ```text
    /// <number of item types>
    /// <bin width> <bin height>
    /// <id> <width> <height> <demand>   (one line per item type)
    /// ```
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, InstanceError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (line, header) = lines.next().ok_or(InstanceError::Parse {
            line: 1,
            message: "missing item count".to_string(),
        })?;
        let count = parse_fields(line, header, 1)?[0];
        if count < 0 {
            return Err(InstanceError::Parse {
                line,
                message: format!("invalid item count {count}"),
            });
        }

        let (line, dims) = lines.next().ok_or(InstanceError::Parse {
            line: line + 1,
            message: "missing bin dimensions".to_string(),
        })?;
        let dims = parse_fields(line, dims, 2)?;
        if dims[0] <= 0 || dims[1] <= 0 {
            return Err(InstanceError::ZeroBin);
        }
        let bin = Rect::new(to_u32(line, dims[0])?, to_u32(line, dims[1])?);

        let mut demands = Vec::new();
        for _ in 0..count {
            let Some((line, row)) = lines.next() else {
                return Err(InstanceError::Parse {
                    line: text.lines().count() + 1,
                    message: format!("expected {count} item lines, found {}", demands.len()),
                });
            };
            let f = parse_fields(line, row, 4)?;
            let id = to_u32(line, f[0])?;
            if f[1] <= 0 || f[2] <= 0 {
                return Err(InstanceError::BadDimension { id });
            }
            if f[3] <= 0 {
                return Err(InstanceError::BadDemand { id });
            }
            demands.push(Demand {
                id,
                rect: Rect::new(to_u32(line, f[1])?, to_u32(line, f[2])?),
                qty: to_u32(line, f[3])?,
            });
        }

        Self::from_demands(name, bin, &demands)
    }

    pub fn from_file(path: &Path) -> Result<Self, InstanceError> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(name, &text)
    }

    /// Re-checks item geometry. Instances built by hand skip `from_demands`.
    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.bin.w == 0 || self.bin.h == 0 {
            return Err(InstanceError::ZeroBin);
        }
        for item in &self.items {
            check_item(item.id, item.rect, self.bin)?;
        }
        Ok(())
    }

    pub fn total_area(&self) -> u64 {
        self.items.iter().map(Item::area).sum()
    }

    /// Upper bound on the bins needed: `ceil(ceil(items area / bin area) * factor)`,
    /// clamped to `[1, items]`.
    pub fn bin_bound(&self, factor: f64) -> usize {
        if self.items.is_empty() {
            return 0;
        }
        let lower = self.total_area().div_ceil(self.bin.area());
        let estimate = (lower as f64 * factor).ceil() as usize;
        estimate.clamp(1, self.items.len())
    }
}

fn check_item(id: u32, rect: Rect, bin: Rect) -> Result<(), InstanceError> {
    if rect.w == 0 || rect.h == 0 {
        return Err(InstanceError::BadDimension { id });
    }
    if !rect.fits_in(&bin) {
        return Err(InstanceError::TooLarge {
            id,
            item: rect,
            bin,
        });
    }
    Ok(())
}

fn parse_fields(line: usize, s: &str, expected: usize) -> Result<Vec<i64>, InstanceError> {
    let fields = s
        .split_whitespace()
        .take(expected)
        .map(|f| {
            f.parse::<i64>().map_err(|_| InstanceError::Parse {
                line,
                message: format!("invalid integer '{f}'"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if fields.len() < expected {
        return Err(InstanceError::Parse {
            line,
            message: format!("expected {expected} fields, found {}", fields.len()),
        });
    }
    Ok(fields)
}

fn to_u32(line: usize, v: i64) -> Result<u32, InstanceError> {
    u32::try_from(v).map_err(|_| InstanceError::Parse {
        line,
        message: format!("value {v} out of range"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "3\n10 8\n1 4 3 2\n2 10 8 1\n\n7 2 2 1\n";

    #[test]
    fn test_parse_expands_demand() {
        let inst = Instance::parse("sample", SAMPLE).unwrap();
        assert_eq!(inst.bin, Rect::new(10, 8));
        assert_eq!(inst.items.len(), 4);
        let ids: Vec<u32> = inst.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let labels: Vec<u32> = inst.items.iter().map(|i| i.label).collect();
        assert_eq!(labels, vec![1, 1, 2, 7]);
        assert_eq!(inst.items[0].rect, inst.items[1].rect);
    }

    #[test]
    fn test_parse_rejects_oversized_item() {
        let err = Instance::parse("x", "1\n4 4\n1 5 1 1\n").unwrap_err();
        assert!(matches!(err, InstanceError::TooLarge { id: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_bad_demand() {
        let err = Instance::parse("x", "1\n4 4\n3 1 1 0\n").unwrap_err();
        assert!(matches!(err, InstanceError::BadDemand { id: 3 }));
        let err = Instance::parse("x", "1\n4 4\n3 1 1 -2\n").unwrap_err();
        assert!(matches!(err, InstanceError::BadDemand { id: 3 }));
    }

    #[test]
    fn test_parse_rejects_bad_dimension() {
        let err = Instance::parse("x", "1\n4 4\n2 0 1 1\n").unwrap_err();
        assert!(matches!(err, InstanceError::BadDimension { id: 2 }));
    }

    #[test]
    fn test_parse_rejects_zero_bin() {
        let err = Instance::parse("x", "1\n0 4\n1 1 1 1\n").unwrap_err();
        assert!(matches!(err, InstanceError::ZeroBin));
    }

    #[test]
    fn test_parse_reports_missing_lines() {
        let err = Instance::parse("x", "2\n4 4\n1 1 1 1\n").unwrap_err();
        assert!(matches!(err, InstanceError::Parse { .. }));
        let err = Instance::parse("x", "1\n4 four\n").unwrap_err();
        assert!(matches!(err, InstanceError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_huge_item_count_is_a_parse_error() {
        let err = Instance::parse("x", "99999999999999999\n4 4\n1 1 1 1\n").unwrap_err();
        assert!(matches!(err, InstanceError::Parse { .. }));
    }

    #[test]
    fn test_validate_catches_hand_built_items() {
        let inst = Instance {
            name: "hand".to_string(),
            bin: Rect::new(4, 4),
            items: vec![Item {
                id: 1,
                label: 1,
                rect: Rect::new(2, 5),
            }],
        };
        assert!(matches!(
            inst.validate(),
            Err(InstanceError::TooLarge { id: 1, .. })
        ));
    }

    #[test]
    fn test_bin_bound() {
        let demands = vec![Demand {
            id: 1,
            rect: Rect::new(3, 3),
            qty: 2,
        }];
        let inst = Instance::from_demands("x", Rect::new(4, 4), &demands).unwrap();
        // ceil(18 / 16) = 2, ceil(2 * 1.2) = 3, clamped to 2 items.
        assert_eq!(inst.bin_bound(1.2), 2);

        let demands = vec![Demand {
            id: 1,
            rect: Rect::new(1, 1),
            qty: 40,
        }];
        let inst = Instance::from_demands("x", Rect::new(4, 4), &demands).unwrap();
        // ceil(40 / 16) = 3, ceil(3 * 1.2) = 4.
        assert_eq!(inst.bin_bound(1.2), 4);

        let inst = Instance::from_demands("x", Rect::new(4, 4), &[]).unwrap();
        assert_eq!(inst.bin_bound(1.2), 0);
    }
}
