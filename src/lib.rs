// src/lib.rs - Library interface for the leaf marker pipeline

pub mod components;
pub mod config;
pub mod errors;
pub mod hole_filling;
pub mod image_io;
pub mod image_utils;
pub mod marker;
pub mod morphology;
pub mod otsu;
pub mod output;
pub mod pipeline;
pub mod texture;
pub mod vegetation;

// Re-export commonly used types and functions
pub use errors::{LeafMarkerError, Result};
pub use config::{Config, SegmentationMethod};
pub use image_io::{InputImage, load_image, save_image};
pub use pipeline::{segment_leaf, render_output, process_image, process_batch, Segmentation, SegmentationStats};

// Re-export the pipeline stages
pub use vegetation::{excess_green, excess_red, index_diff, IndexMap};
pub use marker::{compute_marker, compute_marker_with, Marker, MarkerRule, MarkerThresholds};
pub use texture::{texture_filter, TextureParams};
pub use components::{
    label_components,
    select_largest_object,
    select_largest_object_with_stats,
    ComponentStats,
    LabeledComponents,
};
pub use hole_filling::{fill_holes, fill_holes_with, FillMode, HoleFillParams};
pub use morphology::{apply_closing, apply_opening, smooth_boundary};
