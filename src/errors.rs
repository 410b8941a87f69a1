use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for the leaf marker pipeline
#[derive(Error, Debug)]
pub enum LeafMarkerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not read image file {path}: {source}")]
    ImageNotReadable {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Not a color image")]
    NotColorImage,

    #[error("No foreground object found")]
    NoForegroundFound,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, LeafMarkerError>;
