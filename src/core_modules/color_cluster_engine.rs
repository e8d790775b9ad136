// THEORY:
// The `ColorClusterEngine` is the second stage: plain K-means over superpixel colors.
// Where the superpixel stage works on hundreds of thousands of pixels, this one
// works on a few hundred superpixels, so it can afford to compare every sample
// against every centroid.
//
// Key architectural principles:
// 1.  **Superpixels as samples**: each sample is one superpixel reduced to its mean
//     color (CIELAB centroid converted back to RGB) plus the positions it covers.
//     Every superpixel counts once, whatever its size.
// 2.  **Same arena as stage one**: samples and their assignments live in an
//     `AssignmentTable`, and the assignment pass is a per-sample parallel update.
// 3.  **Materialize with the cluster color**: the output paints every position of a
//     superpixel with the centroid of the cluster it joined, which is what turns a
//     few hundred superpixels into a `K`-color image.

use crate::core_modules::centroid_strategy::CentroidInitializer;
use crate::core_modules::image_adapter::ImagePixel;
use crate::core_modules::convergence::Convergence;
use crate::core_modules::labeled_data::AssignmentTable;
use crate::core_modules::pixel_labxy::PixelLabxy;
use crate::core_modules::rgb::RgbVector;
use crate::core_modules::superpixel_region::SuperpixelRegion;
use crate::core_modules::vector::{Mean, Position};
use crate::error::{Result, SegmentationError};
use crate::pipeline::SegmentationConfig;
use log::{debug, info, warn};
use rand::RngCore;
use std::time::Instant;

/// One superpixel as seen by the color stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSample {
    pub color: RgbVector,
    pub positions: Vec<Position>,
}

impl From<&SuperpixelRegion<PixelLabxy>> for ColorSample {
    fn from(region: &SuperpixelRegion<PixelLabxy>) -> Self {
        Self {
            color: region.centroid().lab.to_rgb(),
            positions: region.positions().to_vec(),
        }
    }
}

pub struct ColorClusterEngine {
    samples: AssignmentTable<ColorSample>,
    centroids: Vec<RgbVector>,
    initializer: Box<dyn CentroidInitializer>,
    cluster_count: usize,
    error_threshold: f64,
    max_iterations: usize,
    iterations: usize,
}

impl ColorClusterEngine {
    pub fn new(
        samples: Vec<ColorSample>,
        config: &SegmentationConfig,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(SegmentationError::NoSuperpixels);
        }
        if config.cluster_count == 0 {
            return Err(SegmentationError::InvalidParameter {
                name: "cluster_count",
                message: "must be greater than zero",
            });
        }

        let mut engine = Self {
            samples: AssignmentTable::new(samples),
            centroids: Vec::new(),
            initializer: config.centroid_strategy.initializer(config),
            cluster_count: config.cluster_count,
            error_threshold: config.cluster_error_threshold,
            max_iterations: config.cluster_max_iterations,
            iterations: 0,
        };
        engine.seed_centroids(rng)?;
        Ok(engine)
    }

    fn seed_centroids(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        let colors: Vec<RgbVector> = self
            .samples
            .payloads()
            .iter()
            .map(|sample| sample.color)
            .collect();
        self.centroids = self.initializer.initial_centroids(&colors, self.cluster_count, rng)?;
        self.iterations = 0;
        self.samples.reset_all();
        debug!("Seeded {} color centroids: {:?}", self.centroids.len(), self.centroids);
        Ok(())
    }

    pub fn centroids(&self) -> &[RgbVector] {
        &self.centroids
    }

    pub fn samples(&self) -> &AssignmentTable<ColorSample> {
        &self.samples
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Every sample joins its nearest centroid.
    fn assign(&mut self) {
        let centroids = &self.centroids;
        self.samples.par_update(|sample, assignment| {
            assignment.reset();
            if let Some(label) = sample.color.closest_index(centroids) {
                let distance = sample.color.distance_to_squared(&centroids[label]);
                assignment.offer(label, distance as f64);
            }
        });
    }

    /// Moves each centroid to the mean color of its samples. Returns the summed squared movement.
    fn update(&mut self) -> f64 {
        let mut members: Vec<Vec<RgbVector>> = vec![Vec::new(); self.centroids.len()];
        for item in self.samples.iter() {
            if let Some(label) = item.label
                && let Some(colors) = members.get_mut(label)
            {
                colors.push(item.payload.color);
            }
        }

        let mut error = 0.0;
        for (centroid, colors) in self.centroids.iter_mut().zip(&members) {
            if let Some(mean) = RgbVector::mean(colors) {
                error += centroid.distance_to_squared(&mean) as f64;
                *centroid = mean;
            }
        }
        error
    }

    pub fn step(&mut self) -> f64 {
        self.assign();
        let error = self.update();
        self.iterations += 1;
        debug!("Color cluster iteration {}: error {:.1}", self.iterations, error);
        error
    }

    pub fn solve(&mut self) -> Convergence {
        let started = Instant::now();
        let mut iterations = 0;
        let mut error = f64::INFINITY;

        while iterations < self.max_iterations {
            error = self.step();
            iterations += 1;
            if error <= self.error_threshold {
                info!(
                    "Color clusters settled after {} iterations in {:?}",
                    iterations,
                    started.elapsed()
                );
                return Convergence::settled(iterations, error);
            }
        }

        warn!(
            "Color stage stopped at the {}-iteration cap with error {:.1} (threshold {})",
            self.max_iterations, error, self.error_threshold
        );
        Convergence::capped(iterations, error)
    }

    /// Draws fresh centroids and solves again.
    pub fn restart(&mut self, rng: &mut dyn RngCore) -> Result<Convergence> {
        self.seed_centroids(rng)?;
        Ok(self.solve())
    }

    /// One region per centroid, holding the positions of every superpixel that joined it.
    pub fn clusters(&self) -> Vec<SuperpixelRegion<RgbVector>> {
        let mut members: Vec<Vec<Position>> = vec![Vec::new(); self.centroids.len()];
        for item in self.samples.iter() {
            if let Some(label) = item.label
                && let Some(positions) = members.get_mut(label)
            {
                positions.extend(item.payload.positions.iter().copied());
            }
        }
        self.centroids
            .iter()
            .zip(members)
            .map(|(&centroid, positions)| SuperpixelRegion::with_positions(centroid, positions))
            .collect()
    }

    /// Every covered position painted with its cluster's color.
    pub fn to_pixels(&self) -> Vec<ImagePixel> {
        let mut pixels = Vec::new();
        for item in self.samples.iter() {
            let Some(color) = item.label.and_then(|label| self.centroids.get(label)) else {
                continue;
            };
            pixels.extend(
                item.payload
                    .positions
                    .iter()
                    .map(|&position| ImagePixel::new(position, *color)),
            );
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::centroid_strategy::CentroidStrategy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample(color: RgbVector, positions: &[(i32, i32)]) -> ColorSample {
        ColorSample {
            color,
            positions: positions.iter().map(|&(x, y)| Position::new(x, y)).collect(),
        }
    }

    fn three_groups() -> Vec<ColorSample> {
        vec![
            sample(RgbVector::new(250, 10, 10), &[(0, 0), (1, 0)]),
            sample(RgbVector::new(240, 20, 0), &[(2, 0)]),
            sample(RgbVector::new(10, 250, 10), &[(0, 1)]),
            sample(RgbVector::new(20, 240, 20), &[(1, 1), (2, 1)]),
            sample(RgbVector::new(10, 10, 250), &[(0, 2)]),
            sample(RgbVector::new(0, 20, 240), &[(1, 2), (2, 2)]),
        ]
    }

    fn config(cluster_count: usize) -> SegmentationConfig {
        SegmentationConfig {
            cluster_count,
            centroid_strategy: CentroidStrategy::DistanceThreshold,
            cluster_error_threshold: 0.0,
            ..SegmentationConfig::default()
        }
    }

    fn labels(engine: &ColorClusterEngine) -> Vec<Option<usize>> {
        engine.samples().assignments().iter().map(|a| a.label).collect()
    }

    #[test]
    fn converged_clusters_are_a_fixed_point() {
        for strategy in [CentroidStrategy::DistanceThreshold, CentroidStrategy::HueRotation] {
            for seed in 0..10 {
                let config = SegmentationConfig {
                    centroid_strategy: strategy,
                    ..config(3)
                };
                let mut rng = StdRng::seed_from_u64(seed);
                let mut engine = ColorClusterEngine::new(three_groups(), &config, &mut rng)
                    .expect("engine builds");
                let convergence = engine.solve();
                assert!(convergence.converged, "{strategy:?} seed {seed} hit the cap");

                let settled = engine.centroids().to_vec();
                let settled_labels = labels(&engine);
                assert_eq!(engine.step(), 0.0);
                assert_eq!(engine.centroids(), &settled[..], "{strategy:?} seed {seed}");
                assert_eq!(labels(&engine), settled_labels, "{strategy:?} seed {seed}");
            }
        }
    }

    #[test]
    fn separated_groups_land_in_separate_clusters() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut engine = ColorClusterEngine::new(three_groups(), &config(3), &mut rng)
            .expect("engine builds");
        engine.solve();

        let mut centroids = engine.centroids().to_vec();
        centroids.sort_by_key(|c| (c.red, c.green, c.blue));
        assert_eq!(
            centroids,
            vec![
                RgbVector::new(5, 15, 245),
                RgbVector::new(15, 245, 15),
                RgbVector::new(245, 15, 5),
            ]
        );

        let clusters = engine.clusters();
        assert_eq!(clusters.len(), 3);
        assert!(clusters.iter().all(|cluster| cluster.len() == 3));
    }

    #[test]
    fn pixels_take_the_cluster_color() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut engine = ColorClusterEngine::new(three_groups(), &config(3), &mut rng)
            .expect("engine builds");
        engine.solve();

        let pixels = engine.to_pixels();
        assert_eq!(pixels.len(), 9);
        for pixel in pixels {
            let expected = match pixel.position.y() {
                0 => RgbVector::new(245, 15, 5),
                1 => RgbVector::new(15, 245, 15),
                _ => RgbVector::new(5, 15, 245),
            };
            assert_eq!(pixel.color, expected, "at {:?}", pixel.position);
        }
    }

    #[test]
    fn restart_with_the_same_seed_reproduces_the_run() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut engine = ColorClusterEngine::new(three_groups(), &config(2), &mut rng)
            .expect("engine builds");
        engine.solve();
        let first = engine.centroids().to_vec();

        let convergence = engine
            .restart(&mut StdRng::seed_from_u64(4))
            .expect("restart succeeds");
        assert!(convergence.converged);
        assert_eq!(engine.centroids(), &first[..]);
    }

    #[test]
    fn no_samples_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            ColorClusterEngine::new(Vec::new(), &config(3), &mut rng),
            Err(SegmentationError::NoSuperpixels)
        ));
    }

    #[test]
    fn hue_rotation_seeds_k_centroids() {
        let hue = SegmentationConfig {
            cluster_count: 4,
            centroid_strategy: CentroidStrategy::HueRotation,
            ..SegmentationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(8);
        let engine =
            ColorClusterEngine::new(three_groups(), &hue, &mut rng).expect("engine builds");
        assert_eq!(engine.centroids().len(), 4);
    }
}
