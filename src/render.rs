use crate::types::{Placement, Rect};

const MAX_WIDTH: f64 = 80.0;
const MAX_HEIGHT: f64 = 40.0;

/// ASCII drawing of one bin. Cell `(0, 0)` is the bottom-left corner.
pub fn render_bin(stock: Rect, placements: &[Placement]) -> String {
    let scale = f64::min(MAX_WIDTH / stock.w as f64, MAX_HEIGHT / stock.h as f64);
    let grid_w = (stock.w as f64 * scale).round() as usize;
    let grid_h = (stock.h as f64 * scale).round() as usize;

    if grid_w == 0 || grid_h == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; grid_w + 1]; grid_h + 1];
    draw_rect(&mut grid, 0, 0, grid_w, grid_h);

    for p in placements {
        let sx = (p.x as f64 * scale).round() as usize;
        let sw = (p.rect.w as f64 * scale).round() as usize;
        let sh = (p.rect.h as f64 * scale).round() as usize;
        let top = ((p.y + p.rect.h) as f64 * scale).round() as usize;
        let sy = grid_h.saturating_sub(top);

        if sw == 0 || sh == 0 {
            continue;
        }

        draw_rect(&mut grid, sx, sy, sw, sh);

        let label: Vec<char> = format!("#{}", p.label).chars().collect();
        if sw > 2 && sh > 0 {
            let cx = sx + sw / 2;
            let cy = sy + sh / 2;
            let start_x = cx.saturating_sub(label.len() / 2);

            for (i, &ch) in label.iter().enumerate() {
                let x = start_x + i;
                if x > sx && x < sx + sw && cy > sy && cy < sy + sh {
                    grid[cy][x] = ch;
                }
            }
        }
    }

    let mut result = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

fn mark(cell: &mut char, line: char) {
    let crossing = if line == '-' { '|' } else { '-' };
    *cell = if *cell == crossing || *cell == '+' {
        '+'
    } else {
        line
    };
}

fn draw_rect(grid: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    let rows = grid.len();
    let Some(cols) = grid.first().map(Vec::len) else {
        return;
    };

    for i in (x..=x + w).filter(|&i| i < cols) {
        for j in [y, y + h] {
            if j < rows {
                mark(&mut grid[j][i], '-');
            }
        }
    }
    for j in (y..=y + h).filter(|&j| j < rows) {
        for i in [x, x + w] {
            if i < cols {
                mark(&mut grid[j][i], '|');
            }
        }
    }
    for cx in [x, x + w] {
        for cy in [y, y + h] {
            if cy < rows && cx < cols {
                grid[cy][cx] = '+';
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(label: u32, w: u32, h: u32, x: u32, y: u32) -> Placement {
        Placement {
            item: label,
            label,
            rect: Rect::new(w, h),
            x,
            y,
        }
    }

    #[test]
    fn test_render_single_item() {
        let stock = Rect::new(10, 5);
        let output = render_bin(stock, &[placement(7, 10, 5, 0, 0)]);
        assert!(output.contains('+'));
        assert!(output.contains('-'));
        assert!(output.contains('|'));
        assert!(output.contains("#7"));
    }

    #[test]
    fn test_origin_is_bottom_left() {
        let stock = Rect::new(10, 10);
        let placements = vec![placement(1, 10, 5, 0, 0), placement(2, 10, 5, 0, 5)];
        let output = render_bin(stock, &placements);
        let row_of = |label: &str| output.lines().position(|l| l.contains(label)).unwrap();
        // Item 2 sits on top of item 1, so it is printed first.
        assert!(row_of("#2") < row_of("#1"));
    }

    #[test]
    fn test_render_empty() {
        let output = render_bin(Rect::new(10, 10), &[]);
        // The bin border is still drawn.
        assert!(output.contains('+'));
        assert!(!output.contains('#'));
    }
}
