// THEORY:
// K-means only finds a local optimum, so where the color centroids start largely
// decides where they end. This module holds the closed set of starting strategies
// for the color stage. Each one draws from the superpixel colors through a caller
// supplied random generator, so a fixed seed reproduces a run exactly.
//
// 1.  **Distance threshold**: sample superpixel colors and keep one only if it is
//     far enough from every color already kept. Sampling gives up after a fixed
//     number of rejections per centroid and reports a degenerate palette instead
//     of spinning forever on a near-uniform image.
// 2.  **Hue rotation**: sample a single color and walk it around the HSV hue wheel
//     in `360 / K` degree steps. Always succeeds, but gray inputs collapse every
//     centroid onto the same color.

use crate::core_modules::rgb::RgbVector;
use crate::error::{Result, SegmentationError};
use crate::pipeline::SegmentationConfig;
use clap::ValueEnum;
use log::debug;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Picks the starting centroids of the color stage.
pub trait CentroidInitializer: Send + Sync {
    /// Returns exactly `count` centroids drawn from `colors`.
    fn initial_centroids(
        &self,
        colors: &[RgbVector],
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RgbVector>>;
}

fn sample(colors: &[RgbVector], rng: &mut dyn RngCore) -> Result<RgbVector> {
    if colors.is_empty() {
        return Err(SegmentationError::NoSuperpixels);
    }
    Ok(colors[rng.random_range(0..colors.len())])
}

/// Rejection sampling on squared RGB distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceThreshold {
    pub min_distance_squared: i64,
    pub max_attempts: usize,
}

impl CentroidInitializer for DistanceThreshold {
    fn initial_centroids(
        &self,
        colors: &[RgbVector],
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RgbVector>> {
        let mut accepted: Vec<RgbVector> = Vec::with_capacity(count);
        while accepted.len() < count {
            let mut attempts = 0;
            loop {
                let candidate = sample(colors, rng)?;
                let isolated = accepted.iter().all(|centroid| {
                    candidate.distance_to_squared(centroid) > self.min_distance_squared
                });
                if isolated {
                    accepted.push(candidate);
                    break;
                }

                attempts += 1;
                if attempts >= self.max_attempts {
                    return Err(SegmentationError::DegeneratePalette {
                        accepted: accepted.len(),
                        requested: count,
                        attempts,
                    });
                }
            }
            debug!("Accepted color centroid {:?} after {} rejections", accepted.last(), attempts);
        }
        Ok(accepted)
    }
}

/// One random color rotated evenly around the hue wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HueRotation;

impl CentroidInitializer for HueRotation {
    fn initial_centroids(
        &self,
        colors: &[RgbVector],
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RgbVector>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut centroids = Vec::with_capacity(count);
        let mut current = sample(colors, rng)?;
        centroids.push(current);
        for _ in 1..count {
            current = current.hsv_rotated(count);
            centroids.push(current);
        }
        Ok(centroids)
    }
}

/// Named choice of initializer, as it appears in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum CentroidStrategy {
    #[serde(rename = "distance")]
    #[value(name = "distance")]
    DistanceThreshold,
    #[default]
    #[serde(rename = "hue")]
    #[value(name = "hue")]
    HueRotation,
}

impl CentroidStrategy {
    pub fn initializer(&self, config: &SegmentationConfig) -> Box<dyn CentroidInitializer> {
        match self {
            CentroidStrategy::DistanceThreshold => Box::new(DistanceThreshold {
                min_distance_squared: config.palette_min_distance_squared,
                max_attempts: config.palette_max_attempts,
            }),
            CentroidStrategy::HueRotation => Box::new(HueRotation),
        }
    }
}
