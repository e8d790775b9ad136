// THEORY:
// This file is the main entry point for the `superpixel_vision` library crate.
// It exposes the `SegmentationPipeline` and its associated data structures
// (`SegmentationConfig`, `SegmentationReport`) as the high-level interface of the
// engine, plus the `core_modules` for callers that want to drive a single stage
// themselves (for example, stepping the superpixel engine one iteration at a time).

pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use error::{Result, SegmentationError};
pub use pipeline::{SegmentationConfig, SegmentationPipeline, SegmentationReport};
