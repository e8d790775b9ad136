// THEORY:
// `grid_geometry` is a stateless utility module for the integer geometry the
// superpixel stage needs. Nothing in here knows about colors or images, only
// positions and rectangles.
//
// Key operations:
// 1.  **Neighboring windows**: a `span x span` square of positions around a
//     center. The engine uses this for the local search window of each centroid
//     and for the 3x3 gradient neighborhood. Windows are never clipped; callers
//     drop positions that fall outside their image.
// 2.  **Regular seed grid**: `k` points laid out in near-square cells that keep the
//     rectangle's aspect ratio. When `k` does not factor into whole rows and
//     columns, the last column gets its own vertical spacing so that exactly `k`
//     points come out.
// 3.  **Boundaries**: a member of a position set is on the boundary when any cell
//     of its 3x3 neighborhood is missing from the set. Membership is a hash-set
//     lookup, not a scan.

use crate::core_modules::vector::Position;
use std::collections::HashSet;

/// An axis-aligned rectangle in image space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle anchored at the origin.
    pub const fn sized(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// Positions of the `span x span` square around `center`, enumerated row by row.
///
/// Odd spans are centered exactly. Even spans have one more cell on the negative side.
pub fn neighboring_window(center: Position, span: usize) -> Vec<Position> {
    let span_i32 = span as i32;
    let low = -(span_i32 / 2);
    let high = low + span_i32;

    let mut positions = Vec::with_capacity(span * span);
    for dy in low..high {
        for dx in low..high {
            positions.push(Position::new(center.x() + dx, center.y() + dy));
        }
    }
    positions
}

/// `k` regularly spaced points inside `rect`, one per cell center.
pub fn regular_grid(rect: Rect, k: usize) -> Vec<Position> {
    if k == 0 || rect.width <= 0 || rect.height <= 0 {
        return Vec::new();
    }

    let width = rect.width as usize;
    let height = rect.height as usize;

    let columns = (width * k.isqrt() / height).clamp(1, k);
    let rows = k / columns;
    let cell_width = rect.width as f64 / columns as f64;
    let cell_height = rect.height as f64 / rows as f64;

    // Without an exact factorization the last column is rebuilt with its own spacing.
    let full_columns = if columns * rows == k {
        columns
    } else {
        columns - 1
    };

    let mut positions = Vec::with_capacity(k);
    for column in 0..full_columns {
        let x = rect.x + (cell_width * (column as f64 + 0.5)) as i32;
        for row in 0..rows {
            let y = rect.y + (cell_height * (row as f64 + 0.5)) as i32;
            positions.push(Position::new(x, y));
        }
    }

    let remaining = k - positions.len();
    if remaining > 0 {
        let x = rect.x + (cell_width * (full_columns as f64 + 0.5)) as i32;
        let remainder_height = rect.height as f64 / remaining as f64;
        for row in 0..remaining {
            let y = rect.y + (remainder_height * (row as f64 + 0.5)) as i32;
            positions.push(Position::new(x, y));
        }
    }

    positions
}

/// True when both axis deltas between `a` and `b` are at most `radius`.
#[inline]
pub fn within_square_radius(a: Position, b: Position, radius: i32) -> bool {
    (a.x() - b.x()).abs() <= radius && (a.y() - b.y()).abs() <= radius
}

/// Members of `positions` with at least one missing cell in their 3x3 neighborhood.
pub fn boundary_of(positions: &[Position]) -> Vec<Position> {
    let members: HashSet<Position> = positions.iter().copied().collect();
    positions
        .iter()
        .copied()
        .filter(|position| {
            neighboring_window(*position, 3)
                .iter()
                .any(|neighbor| !members.contains(neighbor))
        })
        .collect()
}
