// THEORY:
// The `SuperpixelEngine` is the SLIC core. It clusters every pixel of an image in
// LABXY space into `K` compact regions, and it is by far the most expensive stage
// of the pipeline.
//
// Key architectural principles:
// 1.  **Windowed search**: a centroid only competes for the pixels inside a
//     `(2S - 1) x (2S - 1)` window around it, where `S = isqrt(N / K)` is the seed
//     spacing. This keeps an assignment pass at `O(N)` instead of `O(N * K)`.
// 2.  **Arena state**: the immutable LABXY pixels and their mutable best-match
//     records live in an `AssignmentTable`, indexed column-major. A position maps to
//     its table slot with `height * x + y`, no lookup structure needed.
// 3.  **Assign / update barrier**: assignment writes labels, update reads them. The
//     update is a parallel fold of per-centroid running sums followed by a merge.
// 4.  **Connectivity repair**: windows do not always overlap after centroids move,
//     so some pixels can end a run unlabeled. `enforce_connectivity` hands each
//     orphan to the most populated nearby region, judged against a snapshot of the
//     region sizes so the outcome does not depend on scheduling. Orphans with no
//     region nearby are reported, never dropped silently.

use crate::core_modules::grid_geometry::{Rect, neighboring_window, regular_grid};
use crate::core_modules::image_adapter::{ImagePixel, PixelSource, to_labxy_pixels};
use crate::core_modules::convergence::Convergence;
use crate::core_modules::labeled_data::AssignmentTable;
use crate::core_modules::pixel_labxy::{LabxySum, PixelLabxy};
use crate::core_modules::superpixel_region::SuperpixelRegion;
use crate::core_modules::vector::Position;
use crate::error::{Result, SegmentationError};
use crate::pipeline::SegmentationConfig;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::time::Instant;

/// Slot of `position` in a column-major buffer, or `None` outside the image.
#[inline]
fn column_major_index(position: Position, width: u32, height: u32) -> Option<usize> {
    let (x, y) = (position.x(), position.y());
    if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
        return None;
    }
    Some(height as usize * x as usize + y as usize)
}

/// The SLIC superpixel engine.
pub struct SuperpixelEngine {
    pixels: AssignmentTable<PixelLabxy>,
    centroids: Vec<PixelLabxy>,
    width: u32,
    height: u32,
    compactness: f64,
    step: usize,
    error_threshold: f64,
    max_iterations: usize,
    iterations: usize,
}

impl SuperpixelEngine {
    /// Converts `source` to LABXY and seeds `config.superpixel_count` centroids on a regular grid.
    pub fn new<P: PixelSource + Sync + ?Sized>(
        source: &P,
        config: &SegmentationConfig,
    ) -> Result<Self> {
        let (width, height) = (source.width(), source.height());
        let pixel_count = source.pixel_count();
        if pixel_count == 0 {
            return Err(SegmentationError::EmptyImage { width, height });
        }
        if config.superpixel_count > pixel_count {
            return Err(SegmentationError::TooManySuperpixels {
                requested: config.superpixel_count,
                pixels: pixel_count,
            });
        }

        let started = Instant::now();
        let seeds = regular_grid(Rect::sized(width as i32, height as i32), config.superpixel_count);
        info!("Seeded {} superpixels in {:?}", seeds.len(), started.elapsed());

        let pixels = to_labxy_pixels(source);
        Self::from_labxy(pixels, width, height, &seeds, config)
    }

    /// Builds an engine over pre-converted column-major pixels and explicit seed positions.
    /// Seeds outside the image are clamped onto its edge.
    pub fn from_labxy(
        pixels: Vec<PixelLabxy>,
        width: u32,
        height: u32,
        seeds: &[Position],
        config: &SegmentationConfig,
    ) -> Result<Self> {
        let started = Instant::now();
        let pixel_count = width as usize * height as usize;
        if pixel_count == 0 {
            return Err(SegmentationError::EmptyImage { width, height });
        }
        if pixels.len() != pixel_count {
            return Err(SegmentationError::InvalidParameter {
                name: "pixels",
                message: "pixel count does not match width x height",
            });
        }
        if seeds.is_empty() {
            return Err(SegmentationError::InvalidParameter {
                name: "superpixel_count",
                message: "at least one seed is required",
            });
        }
        if seeds.len() > pixel_count {
            return Err(SegmentationError::TooManySuperpixels {
                requested: seeds.len(),
                pixels: pixel_count,
            });
        }

        let mut engine = Self {
            pixels: AssignmentTable::new(pixels),
            centroids: Vec::with_capacity(seeds.len()),
            width,
            height,
            compactness: config.compactness,
            step: (pixel_count / seeds.len()).isqrt().max(1),
            error_threshold: config.superpixel_error_threshold,
            max_iterations: config.superpixel_max_iterations,
            iterations: 0,
        };

        for seed in seeds {
            let clamped = Position::new(
                seed.x().clamp(0, width as i32 - 1),
                seed.y().clamp(0, height as i32 - 1),
            );
            let position = if config.relocate_seeds {
                engine.lowest_gradient_position(clamped)
            } else {
                clamped
            };
            if let Some(centroid) = engine.pixel_at(position).copied() {
                engine.centroids.push(centroid);
            }
        }

        info!(
            "Initialized superpixel engine ({}x{}, {} centroids, step {}) in {:?}",
            width,
            height,
            engine.centroids.len(),
            engine.step,
            started.elapsed()
        );
        Ok(engine)
    }

    pub fn step_size(&self) -> usize {
        self.step
    }

    pub fn centroids(&self) -> &[PixelLabxy] {
        &self.centroids
    }

    pub fn pixels(&self) -> &AssignmentTable<PixelLabxy> {
        &self.pixels
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn unlabeled_count(&self) -> usize {
        self.pixels.unlabeled_count()
    }

    fn pixel_at(&self, position: Position) -> Option<&PixelLabxy> {
        column_major_index(position, self.width, self.height)
            .and_then(|index| self.pixels.payload(index))
    }

    /// Squared CIELAB central differences at `position`, or `None` when a neighbor is missing.
    fn gradient_at(&self, position: Position) -> Option<f64> {
        let (x, y) = (position.x(), position.y());
        let right = self.pixel_at(Position::new(x + 1, y))?;
        let left = self.pixel_at(Position::new(x - 1, y))?;
        let below = self.pixel_at(Position::new(x, y + 1))?;
        let above = self.pixel_at(Position::new(x, y - 1))?;
        Some(right.color_distance_squared(left) + below.color_distance_squared(above))
    }

    /// The position in the 3x3 neighborhood of `seed` with the smallest gradient.
    fn lowest_gradient_position(&self, seed: Position) -> Position {
        let mut best = seed;
        let mut best_gradient = f64::INFINITY;
        for candidate in neighboring_window(seed, 3) {
            if let Some(gradient) = self.gradient_at(candidate)
                && gradient < best_gradient
            {
                best_gradient = gradient;
                best = candidate;
            }
        }
        best
    }

    /// Clears every label, then lets each centroid claim the pixels in its window.
    fn assign(&mut self) {
        self.pixels.reset_all();

        let span = 2 * self.step - 1;
        let spacing = self.step as f64;
        let (width, height) = (self.width, self.height);
        for (label, centroid) in self.centroids.iter().enumerate() {
            for position in neighboring_window(centroid.position, span) {
                let Some(index) = column_major_index(position, width, height) else {
                    continue;
                };
                let Some(pixel) = self.pixels.payload(index) else {
                    continue;
                };
                let distance = pixel.distance_to(centroid, self.compactness, spacing);
                self.pixels.offer(index, label, distance);
            }
        }
    }

    /// Moves each centroid to the mean of its members. Returns the summed displacement.
    fn update(&mut self) -> f64 {
        let count = self.centroids.len();
        let sums = self
            .pixels
            .par_iter()
            .fold(
                || vec![LabxySum::default(); count],
                |mut sums, (pixel, assignment)| {
                    if let Some(label) = assignment.label
                        && let Some(sum) = sums.get_mut(label)
                    {
                        sum.push(pixel);
                    }
                    sums
                },
            )
            .reduce(
                || vec![LabxySum::default(); count],
                |left, right| left.into_iter().zip(right).map(|(l, r)| l.merge(r)).collect(),
            );

        let spacing = self.step as f64;
        let mut error = 0.0;
        for (centroid, sum) in self.centroids.iter_mut().zip(&sums) {
            // Centroids that attracted no pixels stay where they are.
            if let Some(mean) = sum.mean() {
                error += centroid.distance_to(&mean, self.compactness, spacing);
                *centroid = mean;
            }
        }
        error
    }

    /// One assign/update round. Returns the residual error.
    pub fn step(&mut self) -> f64 {
        self.assign();
        let error = self.update();
        self.iterations += 1;
        debug!("Superpixel iteration {}: error {:.4}", self.iterations, error);
        error
    }

    /// Iterates until the error drops to the threshold or the iteration cap is hit.
    pub fn solve(&mut self) -> Convergence {
        let started = Instant::now();
        let mut iterations = 0;
        let mut error = f64::INFINITY;

        while iterations < self.max_iterations {
            error = self.step();
            iterations += 1;
            if error <= self.error_threshold {
                info!(
                    "Superpixel error minimized to {:.4} after {} iterations in {:?}",
                    error,
                    iterations,
                    started.elapsed()
                );
                return Convergence::settled(iterations, error);
            }
        }

        warn!(
            "Superpixel stage stopped at the {}-iteration cap with error {:.4} (threshold {})",
            self.max_iterations, error, self.error_threshold
        );
        Convergence::capped(iterations, error)
    }

    /// Collects the current labels into regions and repairs unlabeled pixels.
    pub fn enforce_connectivity(&mut self) -> SuperpixelSegmentation {
        let started = Instant::now();

        let mut regions: Vec<SuperpixelRegion<PixelLabxy>> =
            self.centroids.iter().copied().map(SuperpixelRegion::new).collect();
        for item in self.pixels.iter() {
            if let Some(label) = item.label
                && let Some(region) = regions.get_mut(label)
            {
                region.add_position(item.payload.position);
            }
        }

        let sizes: Vec<usize> = regions.iter().map(SuperpixelRegion::len).collect();
        let radius = 2 * self.step as i32 + 1;

        let orphans: Vec<(usize, Position, Option<usize>)> = self
            .pixels
            .par_iter()
            .enumerate()
            .filter(|(_, (_, assignment))| !assignment.is_labeled())
            .map(|(index, (pixel, _))| {
                let mut best: Option<(usize, usize)> = None;
                for (label, region) in regions.iter().enumerate() {
                    if !region.is_candidate(pixel.position, radius) {
                        continue;
                    }
                    if best.is_none_or(|(_, size)| sizes[label] > size) {
                        best = Some((label, sizes[label]));
                    }
                }
                (index, pixel.position, best.map(|(label, _)| label))
            })
            .collect();

        let spacing = self.step as f64;
        let mut unreachable = Vec::new();
        for (index, position, label) in orphans {
            match label {
                Some(label) => {
                    let centroid = &self.centroids[label];
                    let distance = self.pixels.payload(index).map_or(f64::INFINITY, |pixel| {
                        pixel.distance_to(centroid, self.compactness, spacing)
                    });
                    self.pixels.set(index, label, distance);
                    regions[label].add_position(position);
                }
                None => unreachable.push(position),
            }
        }

        if !unreachable.is_empty() {
            warn!("{} pixels could not be attached to any superpixel", unreachable.len());
        }
        info!("Finalized superpixel connectivity in {:?}", started.elapsed());

        SuperpixelSegmentation {
            regions,
            unreachable,
            width: self.width,
            height: self.height,
        }
    }
}

/// The result of the superpixel stage.
#[derive(Debug, Clone)]
pub struct SuperpixelSegmentation {
    pub regions: Vec<SuperpixelRegion<PixelLabxy>>,
    /// Pixels no region could claim.
    pub unreachable: Vec<Position>,
    pub width: u32,
    pub height: u32,
}

impl SuperpixelSegmentation {
    pub fn is_complete(&self) -> bool {
        self.unreachable.is_empty()
    }

    /// Regions that ended up with at least one member.
    pub fn populated_regions(&self) -> impl Iterator<Item = &SuperpixelRegion<PixelLabxy>> + '_ {
        self.regions.iter().filter(|region| !region.is_empty())
    }

    /// Every member painted with its own superpixel's mean color.
    pub fn to_pixels(&self) -> Vec<ImagePixel> {
        self.regions
            .par_iter()
            .flat_map_iter(|region| {
                let color = region.centroid().lab.to_rgb();
                region
                    .positions()
                    .iter()
                    .map(move |&position| ImagePixel::new(position, color))
            })
            .collect()
    }

    /// Outline positions of every region.
    pub fn boundaries(&self) -> Vec<Position> {
        self.regions
            .par_iter()
            .flat_map_iter(|region| region.boundary())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid_geometry::within_square_radius;
    use crate::core_modules::image_adapter::to_positions;
    use image::{Rgb, RgbImage};
    use std::collections::HashSet;

    fn two_halves(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([220, 30, 30])
            } else {
                Rgb([30, 30, 220])
            }
        })
    }

    fn config(superpixel_count: usize) -> SegmentationConfig {
        SegmentationConfig {
            superpixel_count,
            relocate_seeds: false,
            ..SegmentationConfig::default()
        }
    }

    #[test]
    fn step_size_follows_pixel_density() {
        let image = two_halves(40, 20);
        let engine = SuperpixelEngine::new(&image, &config(8)).expect("engine builds");
        assert_eq!(engine.step_size(), 10);
        assert_eq!(engine.centroids().len(), 8);
        assert_eq!(engine.unlabeled_count(), 800);
    }

    #[test]
    fn first_pass_labels_every_pixel_reached_by_a_window() {
        let image = two_halves(40, 20);
        let mut engine = SuperpixelEngine::new(&image, &config(8)).expect("engine builds");
        engine.step();
        assert_eq!(engine.unlabeled_count(), 0);
        assert_eq!(engine.iterations(), 1);
    }

    #[test]
    fn regions_do_not_mix_colors() {
        let image = two_halves(40, 20);
        let mut engine = SuperpixelEngine::new(&image, &config(8)).expect("engine builds");
        let convergence = engine.solve();
        assert!(convergence.iterations <= 100);

        let segmentation = engine.enforce_connectivity();
        assert!(segmentation.is_complete());
        assert_eq!(engine.unlabeled_count(), 0);

        let mut seen = HashSet::new();
        for region in segmentation.populated_regions() {
            let left = region.positions().iter().filter(|p| p.x() < 20).count();
            assert!(left == 0 || left == region.len(), "region mixes halves");
            for position in region.positions() {
                assert!(seen.insert(*position), "{position:?} belongs to two regions");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn superpixel_rendering_covers_the_image() {
        let image = two_halves(40, 20);
        let mut engine = SuperpixelEngine::new(&image, &config(8)).expect("engine builds");
        engine.solve();
        let segmentation = engine.enforce_connectivity();

        let pixels = segmentation.to_pixels();
        assert_eq!(pixels.len(), 800);
        for pixel in pixels {
            let expected = if pixel.position.x() < 20 { [220, 30, 30] } else { [30, 30, 220] };
            assert_eq!(pixel.color.to_channels(), expected);
        }
        assert!(!segmentation.boundaries().is_empty());
    }

    #[test]
    fn seeds_move_off_edges() {
        let image = RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let pixels = to_labxy_pixels(&image);
        let relocating = SegmentationConfig {
            superpixel_count: 1,
            relocate_seeds: true,
            ..SegmentationConfig::default()
        };
        let seeds = [Position::new(10, 10)];
        let engine = SuperpixelEngine::from_labxy(pixels, 20, 20, &seeds, &relocating)
            .expect("engine builds");
        assert_eq!(engine.centroids()[0].position, Position::new(11, 9));
    }

    /// Repairs `engine` and checks every pre-repair orphan against the largest
    /// candidate region by the sizes seen before repair. Returns the orphan count
    /// alongside the segmentation.
    fn repair_and_check_orphans(engine: &mut SuperpixelEngine) -> (usize, SuperpixelSegmentation) {
        let radius = 2 * engine.step_size() as i32 + 1;
        let centroids = engine.centroids().to_vec();
        let before: Vec<Option<usize>> =
            engine.pixels().assignments().iter().map(|a| a.label).collect();
        let mut sizes = vec![0usize; centroids.len()];
        for label in before.iter().flatten() {
            sizes[*label] += 1;
        }

        let segmentation = engine.enforce_connectivity();
        assert_eq!(engine.centroids(), &centroids[..]);

        let mut orphans = 0;
        for (index, label) in before.iter().enumerate() {
            let after = engine.pixels().assignment(index).expect("slot exists").label;
            if label.is_some() {
                assert_eq!(after, *label, "labeled pixel {index} was relabeled");
                continue;
            }
            orphans += 1;

            let position = engine.pixels().payload(index).expect("slot exists").position;
            let mut expected: Option<usize> = None;
            for (candidate, centroid) in centroids.iter().enumerate() {
                if !within_square_radius(position, centroid.position, radius) {
                    continue;
                }
                if expected.is_none_or(|best| sizes[candidate] > sizes[best]) {
                    expected = Some(candidate);
                }
            }
            assert_eq!(after, expected, "orphan at {position:?}");
            if expected.is_none() {
                assert!(segmentation.unreachable.contains(&position));
            }
        }
        (orphans, segmentation)
    }

    fn horizontal_gradient(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| Rgb([(x * 6) as u8, (y * 3) as u8, 120]))
    }

    #[test]
    fn orphans_join_the_largest_nearby_region() {
        let image = horizontal_gradient(40);
        let seeds = [
            Position::new(5, 5),
            Position::new(12, 5),
            Position::new(5, 14),
            Position::new(30, 30),
        ];
        let capped = SegmentationConfig {
            superpixel_count: seeds.len(),
            relocate_seeds: false,
            superpixel_max_iterations: 1,
            ..SegmentationConfig::default()
        };
        let pixels = to_labxy_pixels(&image);
        let mut engine = SuperpixelEngine::from_labxy(pixels, 40, 40, &seeds, &capped)
            .expect("engine builds");
        assert_eq!(engine.step_size(), 20);
        engine.solve();

        // Outside every seed window: x 32..40 with y 0..11, and x 0..11 with y 34..40.
        assert_eq!(engine.unlabeled_count(), 154);
        let (orphans, segmentation) = repair_and_check_orphans(&mut engine);
        assert_eq!(orphans, 154);
        assert!(segmentation.is_complete());
        assert_eq!(engine.unlabeled_count(), 0);
    }

    #[test]
    fn distant_pixels_are_reported_unreachable() {
        let image = RgbImage::from_pixel(40, 40, Rgb([90, 120, 60]));
        let pixels = to_labxy_pixels(&image);
        let seeds: Vec<Position> = (0..4)
            .flat_map(|x| (0..4).map(move |y| Position::new(x, y)))
            .collect();
        let capped = SegmentationConfig {
            superpixel_count: seeds.len(),
            relocate_seeds: false,
            superpixel_max_iterations: 1,
            ..SegmentationConfig::default()
        };

        let mut engine = SuperpixelEngine::from_labxy(pixels, 40, 40, &seeds, &capped)
            .expect("engine builds");
        let convergence = engine.solve();
        assert_eq!(convergence.iterations, 1);

        let (orphans, segmentation) = repair_and_check_orphans(&mut engine);
        assert!(orphans > segmentation.unreachable.len());
        assert!(!segmentation.is_complete());
        assert!(segmentation.unreachable.contains(&Position::new(39, 39)));

        let claimed: usize = segmentation.regions.iter().map(SuperpixelRegion::len).sum();
        assert_eq!(claimed + segmentation.unreachable.len(), to_positions(&image).len());
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let empty = RgbImage::new(0, 0);
        assert!(matches!(
            SuperpixelEngine::new(&empty, &config(4)),
            Err(SegmentationError::EmptyImage { .. })
        ));

        let tiny = RgbImage::new(2, 2);
        assert!(matches!(
            SuperpixelEngine::new(&tiny, &config(5)),
            Err(SegmentationError::TooManySuperpixels { requested: 5, pixels: 4 })
        ));
    }
}
