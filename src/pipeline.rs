// THEORY:
// The `pipeline` module is the top-level API of the segmentation engine. It chains
// the two clustering stages behind one call: an image goes in, and a report comes
// out with the superpixels, the color clusters and a recolored pixel list ready to
// be written back.
//
// Key architectural principles:
// 1.  **Validate first**: every configuration value is checked before any pixel is
//     touched, so a bad run fails in microseconds instead of after the expensive
//     superpixel stage.
// 2.  **Owned worker pool**: the data-parallel passes of both stages run inside a
//     dedicated rayon pool sized by `threads`, not the global one.
// 3.  **Explicit randomness**: the only random decision, the initial color
//     centroids, draws from a generator built from `seed`. A fixed seed makes a
//     whole run reproducible.

use crate::core_modules::centroid_strategy::CentroidStrategy;
use crate::core_modules::color_cluster_engine::{ColorClusterEngine, ColorSample};
use crate::core_modules::image_adapter::{
    ImagePixel, PixelSink, PixelSource, paint_pixels, render_boundaries,
};
use crate::core_modules::convergence::Convergence;
use crate::core_modules::rgb::RgbVector;
use crate::core_modules::superpixel_engine::{SuperpixelEngine, SuperpixelSegmentation};
use crate::core_modules::superpixel_region::SuperpixelRegion;
use crate::core_modules::vector::Position;
use crate::error::{Result, SegmentationError};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

const RECOMMENDED_COMPACTNESS: std::ops::RangeInclusive<f64> = 1.0..=20.0;

/// Configuration for the SegmentationPipeline. Missing fields in a config file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Number of superpixels (K1).
    pub superpixel_count: usize,
    /// Weight of spatial distance against color distance (m).
    pub compactness: f64,
    /// Number of color clusters (K2).
    pub cluster_count: usize,
    pub centroid_strategy: CentroidStrategy,
    /// Move each seed to the lowest-gradient pixel of its 3x3 neighborhood.
    pub relocate_seeds: bool,
    pub superpixel_error_threshold: f64,
    pub superpixel_max_iterations: usize,
    pub cluster_error_threshold: f64,
    pub cluster_max_iterations: usize,
    /// Squared RGB distance a sampled color must keep from every accepted centroid.
    pub palette_min_distance_squared: i64,
    /// Rejected samples allowed per centroid before sampling gives up.
    pub palette_max_attempts: usize,
    /// `None` draws the generator seed from the operating system.
    pub seed: Option<u64>,
    pub threads: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            superpixel_count: 200,
            compactness: 10.0,
            cluster_count: 6,
            centroid_strategy: CentroidStrategy::default(),
            relocate_seeds: true,
            superpixel_error_threshold: 1.0,
            superpixel_max_iterations: 100,
            cluster_error_threshold: 1.0,
            cluster_max_iterations: 100,
            palette_min_distance_squared: 625,
            palette_max_attempts: 10_000,
            seed: None,
            threads: num_cpus::get(),
        }
    }
}

fn invalid(name: &'static str, message: &'static str) -> SegmentationError {
    SegmentationError::InvalidParameter { name, message }
}

impl SegmentationConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.superpixel_count == 0 {
            return Err(invalid("superpixel_count", "must be greater than zero"));
        }
        if self.cluster_count == 0 {
            return Err(invalid("cluster_count", "must be greater than zero"));
        }
        if !self.compactness.is_finite() || self.compactness <= 0.0 {
            return Err(invalid("compactness", "must be a positive number"));
        }
        if !self.superpixel_error_threshold.is_finite() || self.superpixel_error_threshold < 0.0 {
            return Err(invalid("superpixel_error_threshold", "must be a non-negative number"));
        }
        if !self.cluster_error_threshold.is_finite() || self.cluster_error_threshold < 0.0 {
            return Err(invalid("cluster_error_threshold", "must be a non-negative number"));
        }
        if self.superpixel_max_iterations == 0 {
            return Err(invalid("superpixel_max_iterations", "must be greater than zero"));
        }
        if self.cluster_max_iterations == 0 {
            return Err(invalid("cluster_max_iterations", "must be greater than zero"));
        }
        if self.palette_min_distance_squared < 0 {
            return Err(invalid("palette_min_distance_squared", "must not be negative"));
        }
        if self.palette_max_attempts == 0 {
            return Err(invalid("palette_max_attempts", "must be greater than zero"));
        }
        if self.threads == 0 {
            return Err(invalid("threads", "must be greater than zero"));
        }
        if !RECOMMENDED_COMPACTNESS.contains(&self.compactness) {
            warn!(
                "Compactness {} is outside the recommended range {:?}",
                self.compactness, RECOMMENDED_COMPACTNESS
            );
        }
        Ok(())
    }
}

/// Everything a segmentation run produced.
#[derive(Debug, Clone)]
pub struct SegmentationReport {
    pub superpixels: SuperpixelSegmentation,
    /// One region per color centroid, holding every position painted with it.
    pub clusters: Vec<SuperpixelRegion<RgbVector>>,
    /// The recolored image as a flat pixel list.
    pub pixels: Vec<ImagePixel>,
    pub superpixel_convergence: Convergence,
    pub cluster_convergence: Convergence,
}

impl SegmentationReport {
    /// Pixels no superpixel could claim. They are absent from `pixels`.
    pub fn unreachable(&self) -> &[Position] {
        &self.superpixels.unreachable
    }

    pub fn palette(&self) -> Vec<RgbVector> {
        self.clusters.iter().map(|cluster| *cluster.centroid()).collect()
    }

    /// Paints the clustered colors into `sink`. Returns how many pixels were written.
    pub fn render_into<S: PixelSink + ?Sized>(&self, sink: &mut S) -> usize {
        paint_pixels(sink, &self.pixels)
    }

    /// Paints every superpixel with its own mean color.
    pub fn render_superpixels_into<S: PixelSink + ?Sized>(&self, sink: &mut S) -> usize {
        paint_pixels(sink, &self.superpixels.to_pixels())
    }

    /// Outlines every superpixel in `color`.
    pub fn render_boundaries_into<S: PixelSink + ?Sized>(
        &self,
        sink: &mut S,
        color: RgbVector,
    ) -> usize {
        render_boundaries(sink, &self.superpixels.regions, color)
    }
}

/// The main, top-level struct for the segmentation engine.
pub struct SegmentationPipeline {
    config: SegmentationConfig,
    pool: ThreadPool,
}

impl SegmentationPipeline {
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new().num_threads(config.threads).build()?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn run<P: PixelSource + Sync + ?Sized>(&self, source: &P) -> Result<SegmentationReport> {
        self.pool.install(|| self.run_stages(source))
    }

    fn run_stages<P: PixelSource + Sync + ?Sized>(&self, source: &P) -> Result<SegmentationReport> {
        let started = Instant::now();
        let mut rng: Box<dyn RngCore> = match self.config.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_os_rng()),
        };

        // Stage 1: Superpixels
        let mut superpixel_engine = SuperpixelEngine::new(source, &self.config)?;
        let superpixel_convergence = superpixel_engine.solve();
        let superpixels = superpixel_engine.enforce_connectivity();

        // Stage 2: Color Clusters
        let samples: Vec<ColorSample> = superpixels
            .populated_regions()
            .map(ColorSample::from)
            .collect();
        let mut color_engine = ColorClusterEngine::new(samples, &self.config, rng.as_mut())?;
        let cluster_convergence = color_engine.solve();

        let report = SegmentationReport {
            clusters: color_engine.clusters(),
            pixels: color_engine.to_pixels(),
            superpixels,
            superpixel_convergence,
            cluster_convergence,
        };
        info!(
            "Segmented {}x{} image into {} superpixels and {} colors in {:?}",
            source.width(),
            source.height(),
            report.superpixels.populated_regions().count(),
            report.clusters.len(),
            started.elapsed()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SegmentationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.superpixel_count, 200);
        assert_eq!(config.palette_min_distance_squared, 625);
        assert!(config.threads >= 1);
    }

    #[test]
    fn invalid_values_are_rejected_by_name() {
        let cases = [
            (
                "superpixel_count",
                SegmentationConfig {
                    superpixel_count: 0,
                    ..Default::default()
                },
            ),
            (
                "cluster_count",
                SegmentationConfig {
                    cluster_count: 0,
                    ..Default::default()
                },
            ),
            (
                "compactness",
                SegmentationConfig {
                    compactness: f64::NAN,
                    ..Default::default()
                },
            ),
            (
                "superpixel_max_iterations",
                SegmentationConfig {
                    superpixel_max_iterations: 0,
                    ..Default::default()
                },
            ),
            (
                "threads",
                SegmentationConfig {
                    threads: 0,
                    ..Default::default()
                },
            ),
        ];
        for (expected, config) in cases {
            match config.validate() {
                Err(SegmentationError::InvalidParameter { name, .. }) => assert_eq!(name, expected),
                other => panic!("{expected}: expected InvalidParameter, got {other:?}"),
            }
            assert!(SegmentationPipeline::new(config).is_err());
        }
    }

    #[test]
    fn unusual_compactness_is_only_a_warning() {
        let config = SegmentationConfig {
            compactness: 40.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "superpixel_count": 50, "centroid_strategy": "distance", "seed": 3 }"#;
        let config: SegmentationConfig = serde_json::from_str(json).expect("config parses");
        assert_eq!(config.superpixel_count, 50);
        assert_eq!(config.centroid_strategy, CentroidStrategy::DistanceThreshold);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.cluster_count, 6);
    }
}
