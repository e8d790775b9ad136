use image::{Rgb, RgbImage};
use std::collections::HashSet;
use superpixel_vision::core_modules::centroid_strategy::CentroidStrategy;
use superpixel_vision::core_modules::image_adapter::image_helper;
use superpixel_vision::core_modules::rgb::RgbVector;
use superpixel_vision::{SegmentationConfig, SegmentationError, SegmentationPipeline};

const QUADRANT_COLORS: [[u8; 3]; 4] = [[210, 30, 30], [30, 210, 30], [30, 30, 210], [225, 225, 45]];

fn quadrant_of(x: u32, y: u32, size: u32) -> usize {
    (if x < size / 2 { 0 } else { 1 }) + (if y < size / 2 { 0 } else { 2 })
}

fn quadrants(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| Rgb(QUADRANT_COLORS[quadrant_of(x, y, size)]))
}

fn config() -> SegmentationConfig {
    SegmentationConfig {
        superpixel_count: 36,
        cluster_count: 4,
        centroid_strategy: CentroidStrategy::DistanceThreshold,
        seed: Some(7),
        threads: 2,
        ..SegmentationConfig::default()
    }
}

#[test]
fn quadrants_segment_into_their_own_colors() {
    let image = quadrants(60);
    let pipeline = SegmentationPipeline::new(config()).expect("valid config");
    let report = pipeline.run(&image).expect("segmentation succeeds");

    assert!(report.unreachable().is_empty());
    assert_eq!(report.pixels.len(), 3600);
    assert_eq!(report.palette().len(), 4);
    assert!(report.superpixel_convergence.iterations >= 1);
    assert!(report.cluster_convergence.converged);

    let mut output = RgbImage::new(60, 60);
    assert_eq!(report.render_into(&mut output), 3600);

    let mut seen = HashSet::new();
    for (x, y, pixel) in output.enumerate_pixels() {
        let expected = QUADRANT_COLORS[quadrant_of(x, y, 60)];
        for channel in 0..3 {
            assert!(
                (pixel.0[channel] as i32 - expected[channel] as i32).abs() <= 1,
                "({x}, {y}) is {:?}, expected {:?}",
                pixel.0,
                expected
            );
        }
        seen.insert(pixel.0);
    }
    assert_eq!(seen.len(), 4);
}

#[test]
fn clusters_cover_every_position_once() {
    let image = quadrants(60);
    let pipeline = SegmentationPipeline::new(config()).expect("valid config");
    let report = pipeline.run(&image).expect("segmentation succeeds");

    let mut covered = HashSet::new();
    for cluster in &report.clusters {
        for position in cluster.positions() {
            assert!(covered.insert(*position), "{position:?} appears twice");
        }
    }
    assert_eq!(covered.len(), 3600);
}

#[test]
fn fixed_seed_reproduces_the_run() {
    let image = quadrants(40);
    let run = || {
        let pipeline = SegmentationPipeline::new(SegmentationConfig {
            superpixel_count: 16,
            cluster_count: 3,
            centroid_strategy: CentroidStrategy::HueRotation,
            ..config()
        })
        .expect("valid config");
        pipeline.run(&image).expect("segmentation succeeds")
    };

    let first = run();
    let second = run();
    assert_eq!(first.pixels, second.pixels);
    assert_eq!(first.palette(), second.palette());
}

#[test]
fn superpixel_and_boundary_renderings() {
    let image = quadrants(60);
    let pipeline = SegmentationPipeline::new(config()).expect("valid config");
    let report = pipeline.run(&image).expect("segmentation succeeds");

    let mut superpixels = RgbImage::new(60, 60);
    assert_eq!(report.render_superpixels_into(&mut superpixels), 3600);

    let mut outlined = image.clone();
    let painted = report.render_boundaries_into(&mut outlined, RgbVector::new(255, 255, 255));
    assert!(painted > 0 && painted < 3600);
    assert_eq!(outlined.get_pixel(0, 0).0, [255, 255, 255]);
}

#[test]
fn rendered_output_survives_a_png_round_trip() {
    let directory = tempfile::tempdir().expect("Error creating temp dir.");
    let input_path = directory.path().join("quadrants.png");
    let output_path = directory.path().join("clustered.png");
    image_helper::save(&input_path, &quadrants(60)).expect("Error Saving File.");

    let image = image_helper::load(&input_path, None).expect("Error Loading File.");
    let pipeline = SegmentationPipeline::new(config()).expect("valid config");
    let report = pipeline.run(&image).expect("segmentation succeeds");

    let mut clustered = image.clone();
    report.render_into(&mut clustered);
    image_helper::save(&output_path, &clustered).expect("Error Saving File.");

    let reloaded = image_helper::load(&output_path, None).expect("Error Loading File.");
    assert_eq!(reloaded, clustered);
}

#[test]
fn resized_inputs_segment_at_the_new_size() {
    let directory = tempfile::tempdir().expect("Error creating temp dir.");
    let path = directory.path().join("large.png");
    image_helper::save(&path, &quadrants(120)).expect("Error Saving File.");

    let image = image_helper::load(&path, Some((60, 40))).expect("Error Loading File.");
    let pipeline = SegmentationPipeline::new(SegmentationConfig {
        centroid_strategy: CentroidStrategy::HueRotation,
        ..config()
    })
    .expect("valid config");
    let report = pipeline.run(&image).expect("segmentation succeeds");
    assert_eq!(report.pixels.len() + report.unreachable().len(), 2400);
}

#[test]
fn config_files_load_with_defaults_for_missing_fields() {
    let directory = tempfile::tempdir().expect("Error creating temp dir.");
    let path = directory.path().join("config.json");
    let json = r#"{ "superpixel_count": 25, "compactness": 5.0, "centroid_strategy": "hue" }"#;
    std::fs::write(&path, json).expect("Error writing config.");

    let config = SegmentationConfig::from_json_file(&path).expect("config loads");
    assert_eq!(config.superpixel_count, 25);
    assert_eq!(config.compactness, 5.0);
    assert_eq!(config.centroid_strategy, CentroidStrategy::HueRotation);
    assert_eq!(config.cluster_max_iterations, 100);

    std::fs::write(&path, "{ not json").expect("Error writing config.");
    assert!(matches!(
        SegmentationConfig::from_json_file(&path),
        Err(SegmentationError::Config(_))
    ));
}

#[test]
fn too_many_superpixels_is_rejected() {
    let image = RgbImage::new(4, 4);
    let pipeline = SegmentationPipeline::new(config()).expect("valid config");
    assert!(matches!(
        pipeline.run(&image),
        Err(SegmentationError::TooManySuperpixels { requested: 36, pixels: 16 })
    ));
}

#[test]
fn uniform_images_cannot_seed_a_distance_palette() {
    let image = RgbImage::from_pixel(30, 30, Rgb([90, 90, 90]));
    let pipeline = SegmentationPipeline::new(SegmentationConfig {
        superpixel_count: 9,
        cluster_count: 2,
        palette_max_attempts: 100,
        ..config()
    })
    .expect("valid config");
    assert!(matches!(
        pipeline.run(&image),
        Err(SegmentationError::DegeneratePalette { accepted: 1, requested: 2, .. })
    ));
}

#[test]
fn invalid_configs_fail_before_any_work() {
    let result = SegmentationPipeline::new(SegmentationConfig {
        cluster_count: 0,
        ..config()
    });
    assert!(matches!(
        result,
        Err(SegmentationError::InvalidParameter { name: "cluster_count", .. })
    ));
}
