//! ASCII plotting of an impact series for terminal output.
//!
//! Fixed-size character grids, deterministic output. Three stacked panels share
//! the same date axis:
//!
//! 1. original: observed response vs counterfactual prediction and its interval
//! 2. pointwise: observed minus predicted
//! 3. cumulative: running sum of the pointwise effect over the post-period
//!
//! Plot elements:
//! - observed / effect: `*`
//! - counterfactual prediction or zero baseline: `-`
//! - interval bounds: `.`
//! - first post-period date: `|`

use crate::domain::SeriesPoint;

const OBSERVED: char = '*';
const BASELINE: char = '-';
const BAND: char = '.';
const MARKER: char = '|';

/// Render the three impact panels, each `width` x `height` characters.
///
/// Returns `None` when there is nothing meaningful to draw (fewer than two
/// points or a single date).
pub fn render_impact_plot(points: &[SeriesPoint], width: usize, height: usize) -> Option<String> {
    let first = points.first()?.date;
    let last = points.last()?.date;
    let span = (last - first).num_days() as f64;
    if points.len() < 2 || span <= 0.0 {
        return None;
    }

    let width = width.max(10);
    let height = height.max(5);
    let axis = Axis { x_max: span, width, height };
    let xs: Vec<f64> = points.iter().map(|p| (p.date - first).num_days() as f64).collect();
    let marker = points.iter().position(|p| p.post).map(|i| xs[i]);

    let col = |f: fn(&SeriesPoint) -> f64| -> Vec<(f64, f64)> {
        xs.iter().copied().zip(points.iter().map(f)).collect()
    };
    let zero: Vec<(f64, f64)> = vec![(0.0, 0.0), (span, 0.0)];

    let original = Panel {
        title: "Original",
        layers: vec![
            (OBSERVED, col(|p| p.actual)),
            (BASELINE, col(|p| p.predicted)),
            (BAND, col(|p| p.predicted_lower)),
            (BAND, col(|p| p.predicted_upper)),
        ],
    };
    let pointwise = Panel {
        title: "Pointwise effect",
        layers: vec![
            (OBSERVED, col(|p| p.point_effect)),
            (BASELINE, zero.clone()),
            (BAND, col(|p| p.actual - p.predicted_upper)),
            (BAND, col(|p| p.actual - p.predicted_lower)),
        ],
    };
    let cumulative = Panel {
        title: "Cumulative effect",
        layers: vec![(OBSERVED, col(|p| p.cumulative_effect)), (BASELINE, zero)],
    };

    let mut out = String::new();
    out.push_str(&format!("Dates: {first} .. {last}"));
    if let Some(i) = points.iter().position(|p| p.post) {
        out.push_str(&format!(" | intervention: {}", points[i].date));
    }
    out.push('\n');
    for panel in [original, pointwise, cumulative] {
        out.push_str(&panel.render(&axis, marker));
    }
    Some(out)
}

struct Axis {
    x_max: f64,
    width: usize,
    height: usize,
}

struct Panel {
    title: &'static str,
    /// Drawn in order; earlier layers win where they overlap.
    layers: Vec<(char, Vec<(f64, f64)>)>,
}

impl Panel {
    fn render(&self, axis: &Axis, marker: Option<f64>) -> String {
        let (y_min, y_max) = y_range(self.layers.iter().flat_map(|(_, pts)| pts.iter().map(|&(_, y)| y)))
            .unwrap_or((-1.0, 1.0));
        let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

        let mut grid = vec![vec![' '; axis.width]; axis.height];
        for (ch, pts) in &self.layers {
            draw_series(&mut grid, pts, *ch, axis.x_max, y_min, y_max);
        }
        if let Some(x) = marker {
            let col = map_x(x, 0.0, axis.x_max, axis.width);
            draw_line(&mut grid, col, 0, col, axis.height - 1, MARKER);
        }

        let mut out = format!("{}: y=[{y_min:.2}, {y_max:.2}]\n", self.title);
        for row in grid {
            out.push_str(&row.into_iter().collect::<String>());
            out.push('\n');
        }
        out
    }
}

fn y_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in values.filter(|y| y.is_finite()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if !(min_y.is_finite() && max_y.is_finite()) {
        return None;
    }
    if max_y > min_y {
        Some((min_y, max_y))
    } else {
        Some((min_y - 1.0, max_y + 1.0))
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_series(grid: &mut [Vec<char>], pts: &[(f64, f64)], ch: char, x_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in pts.iter().filter(|(_, y)| y.is_finite()) {
        let cx = map_x(x, 0.0, x_max, width);
        let cy = map_y(y, y_min, y_max, height);
        let (x0, y0) = prev.unwrap_or((cx, cy));
        draw_line(grid, x0, y0, cx, cy, ch);
        prev = Some((cx, cy));
    }
}

/// Integer line drawing (Bresenham-ish). Only fills blank cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
