// THEORY:
// The `vector` module holds the smallest spatial building blocks of the engine.
// A `Vector2` is a plain pair of values and a `Position` is an integer image
// coordinate built on top of it. Positions carry no knowledge of the image they
// belong to: bounds checking is always done by whoever owns the pixel buffer.
//
// The `Mean` trait lives here as well. Both clustering stages repeatedly collapse
// a group of members into a single representative, and every payload type
// (positions, LABXY pixels, RGB colors) knows how to average itself.

use rayon::prelude::*;
use std::ops::{Add, Div};

/// A generic two-dimensional pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vector2<T> {
    pub x: T,
    pub y: T,
}

impl<T> Vector2<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

/// Types that can be collapsed into their arithmetic mean.
pub trait Mean: Sized {
    /// Returns `None` for an empty slice.
    fn mean(items: &[Self]) -> Option<Self>;
}

/// An integer coordinate in image space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub vector: Vector2<i32>,
}

impl Position {
    pub const ZERO: Position = Position::new(0, 0);

    pub const fn new(x: i32, y: i32) -> Self {
        Self {
            vector: Vector2::new(x, y),
        }
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.vector.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.vector.y
    }

    /// Squared Euclidean distance. Widened to `i64` so far-apart coordinates cannot overflow.
    #[inline]
    pub fn distance_to_squared(&self, other: &Position) -> i64 {
        let dx = (self.x() - other.x()) as i64;
        let dy = (self.y() - other.y()) as i64;
        dx * dx + dy * dy
    }

    #[inline]
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.distance_to_squared(other) as f64).sqrt()
    }

    /// Same result as [`Mean::mean`], with the two coordinate sums computed in parallel.
    pub fn mean_parallel(positions: &[Position]) -> Option<Position> {
        if positions.is_empty() {
            return None;
        }
        let count = positions.len() as i64;
        let (sum_x, sum_y) = rayon::join(
            || positions.par_iter().map(|p| p.x() as i64).sum::<i64>(),
            || positions.par_iter().map(|p| p.y() as i64).sum::<i64>(),
        );
        Some(Position::new((sum_x / count) as i32, (sum_y / count) as i32))
    }
}

impl From<Vector2<i32>> for Position {
    fn from(vector: Vector2<i32>) -> Self {
        Self { vector }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, other: Position) -> Position {
        Position::new(self.x() + other.x(), self.y() + other.y())
    }
}

/// Truncating division, component-wise.
impl Div<i32> for Position {
    type Output = Position;

    fn div(self, divisor: i32) -> Position {
        Position::new(self.x() / divisor, self.y() / divisor)
    }
}

impl Mean for Position {
    fn mean(positions: &[Position]) -> Option<Position> {
        if positions.is_empty() {
            return None;
        }
        let count = positions.len() as i64;
        let (sum_x, sum_y) = positions
            .iter()
            .fold((0i64, 0i64), |(sx, sy), p| (sx + p.x() as i64, sy + p.y() as i64));
        Some(Position::new((sum_x / count) as i32, (sum_y / count) as i32))
    }
}
