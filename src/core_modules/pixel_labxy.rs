// THEORY:
// A `PixelLabxy` is a pixel lifted into the 5-dimensional space the superpixel
// stage clusters in: three CIELAB color components plus the 2D image position.
// It is a "dumb" data container. The only behavior it owns is the combined
// color/space distance and the component-wise mean.
//
// The combined distance is
//
//     D = sqrt(ΔL² + Δa² + Δb²) + (m / S) · sqrt(Δx² + Δy²)
//
// where `m` is the compactness and `S` the seed spacing. Dividing the spatial
// term by `S` normalizes it to "grid cells", so compactness means the same thing
// regardless of image size.

use crate::core_modules::color_space::ColorCielab;
use crate::core_modules::vector::{Mean, Position};

/// A pixel in LABXY space: CIELAB color plus image position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelLabxy {
    pub lab: ColorCielab,
    pub position: Position,
}

impl PixelLabxy {
    pub const fn new(lab: ColorCielab, position: Position) -> Self {
        Self { lab, position }
    }

    /// Squared CIELAB distance, ignoring position.
    #[inline]
    pub fn color_distance_squared(&self, other: &PixelLabxy) -> f64 {
        self.lab.distance_squared(&other.lab)
    }

    /// Combined distance with compactness `m` and grid interval `s`.
    #[inline]
    pub fn distance_to(&self, other: &PixelLabxy, m: f64, s: f64) -> f64 {
        let color = self.color_distance_squared(other).sqrt();
        let spatial = self.position.distance_to(&other.position);
        color + (m / s) * spatial
    }
}

/// Running sums for a LABXY mean. Positions are summed as integers and
/// truncated on division, like [`Position`]'s own mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabxySum {
    l: f64,
    a: f64,
    b: f64,
    x: i64,
    y: i64,
    count: usize,
}

impl LabxySum {
    #[inline]
    pub fn push(&mut self, pixel: &PixelLabxy) {
        self.l += pixel.lab.l;
        self.a += pixel.lab.a;
        self.b += pixel.lab.b;
        self.x += pixel.position.x() as i64;
        self.y += pixel.position.y() as i64;
        self.count += 1;
    }

    pub fn merge(mut self, other: LabxySum) -> LabxySum {
        self.l += other.l;
        self.a += other.a;
        self.b += other.b;
        self.x += other.x;
        self.y += other.y;
        self.count += other.count;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<PixelLabxy> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let count = self.count as i64;
        Some(PixelLabxy::new(
            ColorCielab::new(self.l / n, self.a / n, self.b / n),
            Position::new((self.x / count) as i32, (self.y / count) as i32),
        ))
    }
}

impl Mean for PixelLabxy {
    fn mean(pixels: &[PixelLabxy]) -> Option<PixelLabxy> {
        pixels
            .iter()
            .fold(LabxySum::default(), |mut sum, pixel| {
                sum.push(pixel);
                sum
            })
            .mean()
    }
}
