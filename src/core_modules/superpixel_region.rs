// THEORY:
// A `SuperpixelRegion` is a group of image positions plus one representative, its
// centroid. Both stages use the same shape: the superpixel stage with a
// `PixelLabxy` centroid, the color stage with an `RgbVector` centroid. Regions are
// built once a stage has settled, from the final labels, so they only ever grow.

use crate::core_modules::grid_geometry::{boundary_of, within_square_radius};
use crate::core_modules::pixel_labxy::PixelLabxy;
use crate::core_modules::vector::Position;

/// Payloads that sit at a known image position.
pub trait Located {
    fn position(&self) -> Position;
}

impl Located for PixelLabxy {
    fn position(&self) -> Position {
        self.position
    }
}

impl Located for Position {
    fn position(&self) -> Position {
        *self
    }
}

/// Member positions plus a centroid of type `C`.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperpixelRegion<C> {
    positions: Vec<Position>,
    centroid: C,
}

impl<C> SuperpixelRegion<C> {
    pub fn new(centroid: C) -> Self {
        Self {
            positions: Vec::new(),
            centroid,
        }
    }

    pub fn with_positions(centroid: C, positions: Vec<Position>) -> Self {
        Self {
            positions,
            centroid,
        }
    }

    pub fn centroid(&self) -> &C {
        &self.centroid
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn extend_positions<I: IntoIterator<Item = Position>>(&mut self, positions: I) {
        self.positions.extend(positions);
    }

    /// Members on the outline of the region.
    pub fn boundary(&self) -> Vec<Position> {
        boundary_of(&self.positions)
    }
}

impl<C: Located> SuperpixelRegion<C> {
    /// Whether `position` lies within the square `radius` of the centroid.
    pub fn is_candidate(&self, position: Position, radius: i32) -> bool {
        within_square_radius(position, self.centroid.position(), radius)
    }
}
