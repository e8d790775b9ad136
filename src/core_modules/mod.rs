pub mod centroid_strategy;
pub mod color_cluster_engine;
pub mod color_space;
pub mod convergence;
pub mod grid_geometry;
pub mod image_adapter;
pub mod labeled_data;
pub mod pixel_labxy;
pub mod rgb;
pub mod superpixel_engine;
pub mod superpixel_region;
pub mod vector;
