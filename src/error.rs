use thiserror::Error;

/// Errors returned by the segmentation engines and the image boundary.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// A configuration value was rejected before any work started.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// The pixel source has no pixels to segment.
    #[error("empty image: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// More superpixels were requested than the image has pixels.
    #[error("requested {requested} superpixels, but the image only has {pixels} pixels")]
    TooManySuperpixels { requested: usize, pixels: usize },

    /// Distance-threshold seeding could not find enough separated colors.
    #[error(
        "degenerate palette: accepted {accepted} of {requested} centroids \
         before {attempts} samples were rejected"
    )]
    DegeneratePalette {
        accepted: usize,
        requested: usize,
        attempts: usize,
    },

    /// The color stage was handed no superpixels with members.
    #[error("no superpixels to cluster")]
    NoSuperpixels,

    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// A configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("could not build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, SegmentationError>;
