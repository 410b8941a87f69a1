use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{LeafMarkerError, Result};
use crate::hole_filling::{FillMode, HoleFillParams, CLOSING_KERNEL_SIZE, HOLE_AREA_RATIO};
use crate::marker::{MarkerRule, MarkerThresholds};
use crate::morphology::SMOOTHING_KERNEL_SIZE;
use crate::texture::{TextureParams, TEXTURE_THRESHOLD, TEXTURE_WINDOW};

/// Configuration for the leaf marker pipeline
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_input_path")]
    pub input_path: String,

    /// Destination directory; derived from the input when absent
    #[serde(default)]
    pub output_dir: Option<String>,

    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    #[serde(default)]
    pub segmentation_method: SegmentationMethod,

    // Marker classifier
    #[serde(default = "default_marker_rules")]
    pub marker_rules: Vec<MarkerRule>,

    #[serde(default)]
    pub thresholds: MarkerThresholds,

    // Auxiliary texture classifier
    #[serde(default)]
    pub texture_filter: bool,

    #[serde(default = "default_texture_threshold")]
    pub texture_threshold: f64,

    #[serde(default = "default_texture_window")]
    pub texture_window: u32,

    // Hole filling
    #[serde(default)]
    pub fill_mode: FillMode,

    #[serde(default = "default_hole_area_ratio")]
    pub hole_area_ratio: f64,

    #[serde(default = "default_closing_kernel_size")]
    pub closing_kernel_size: u32,

    // Boundary smoothing
    #[serde(default)]
    pub smooth_boundary: bool,

    #[serde(default = "default_smoothing_kernel_size")]
    pub smoothing_kernel_size: u32,

    /// 0 writes the masked photograph, 1..=255 writes the mask at that intensity
    #[serde(default)]
    pub marker_intensity: u32,

    #[serde(default = "default_write_summary")]
    pub write_summary: bool,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,
}

/// Source of the initial background marker
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMethod {
    /// Vegetation index and channel-range rules
    #[default]
    ColorIndex,
    /// Global Otsu threshold on the grayscale image
    Otsu,
}

fn default_input_path() -> String {
    "./input".to_string()
}

fn default_output_suffix() -> String {
    "_marked".to_string()
}

fn default_marker_rules() -> Vec<MarkerRule> {
    vec![MarkerRule::ColorIndex]
}

fn default_texture_threshold() -> f64 {
    TEXTURE_THRESHOLD
}

fn default_texture_window() -> u32 {
    TEXTURE_WINDOW
}

fn default_hole_area_ratio() -> f64 {
    HOLE_AREA_RATIO
}

fn default_closing_kernel_size() -> u32 {
    CLOSING_KERNEL_SIZE
}

fn default_smoothing_kernel_size() -> u32 {
    SMOOTHING_KERNEL_SIZE
}

fn default_write_summary() -> bool {
    true
}

fn default_parallel() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_dir: None,
            output_suffix: default_output_suffix(),
            segmentation_method: SegmentationMethod::ColorIndex,
            marker_rules: default_marker_rules(),
            thresholds: MarkerThresholds::default(),
            texture_filter: false,
            texture_threshold: TEXTURE_THRESHOLD,
            texture_window: TEXTURE_WINDOW,
            fill_mode: FillMode::Flood,
            hole_area_ratio: HOLE_AREA_RATIO,
            closing_kernel_size: CLOSING_KERNEL_SIZE,
            smooth_boundary: false,
            smoothing_kernel_size: SMOOTHING_KERNEL_SIZE,
            marker_intensity: 0,
            write_summary: true,
            use_parallel: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            LeafMarkerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            LeafMarkerError::Config(msg) => {
                LeafMarkerError::Config(format!("Failed to parse config file '{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LeafMarkerError::Config(e.to_string()))
    }

    /// Validate numeric parameters before they reach the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.marker_intensity > 255 {
            return Err(LeafMarkerError::InvalidParameter(format!(
                "marker_intensity must be in 0..=255, got {}", self.marker_intensity
            )));
        }

        if self.smoothing_kernel_size == 0 {
            return Err(LeafMarkerError::InvalidParameter(
                "smoothing_kernel_size must be > 0".to_string(),
            ));
        }

        if self.closing_kernel_size == 0 {
            return Err(LeafMarkerError::InvalidParameter(
                "closing_kernel_size must be > 0".to_string(),
            ));
        }

        if !(self.hole_area_ratio.is_finite() && self.hole_area_ratio >= 0.0) {
            return Err(LeafMarkerError::InvalidParameter(
                "hole_area_ratio must be >= 0.0".to_string(),
            ));
        }

        if self.texture_window == 0 {
            return Err(LeafMarkerError::InvalidParameter(
                "texture_window must be > 0".to_string(),
            ));
        }

        if !self.texture_threshold.is_finite() {
            return Err(LeafMarkerError::InvalidParameter(
                "texture_threshold must be a finite number".to_string(),
            ));
        }

        let t = &self.thresholds;
        if !(t.color_index.is_finite() && t.green_scale.is_finite() && t.red_scale.is_finite()) {
            return Err(LeafMarkerError::InvalidParameter(
                "color index threshold and scales must be finite".to_string(),
            ));
        }

        if self.output_suffix.contains(&['/', '\\'][..]) {
            return Err(LeafMarkerError::Config(
                "output_suffix must not contain path separators".to_string(),
            ));
        }

        Ok(())
    }

    /// Output intensity, clamped into the pixel range
    pub fn marker_intensity(&self) -> u8 {
        self.marker_intensity.min(255) as u8
    }

    pub fn hole_fill_params(&self) -> HoleFillParams {
        HoleFillParams {
            area_ratio: self.hole_area_ratio,
            closing_kernel_size: self.closing_kernel_size,
        }
    }

    pub fn texture_params(&self) -> TextureParams {
        TextureParams {
            window: self.texture_window,
            threshold: self.texture_threshold,
        }
    }
}
