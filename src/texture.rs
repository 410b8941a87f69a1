// src/texture.rs - Local intensity statistic used as a coarse texture classifier

use image::{GrayImage, ImageBuffer, Luma};
use rayon::prelude::*;

use crate::errors::{LeafMarkerError, Result};
use crate::image_utils::{ensure_non_empty, ensure_same_dimensions};
use crate::marker::Marker;

/// Statistic above which a pixel is treated as background
pub const TEXTURE_THRESHOLD: f64 = 220.0;
/// Nominal window size; see `TextureParams::radius`
pub const TEXTURE_WINDOW: u32 = 3;
/// Offset keeping `ln` finite for zero intensities
pub const TEXTURE_EPSILON: f64 = 1e-7;

/// Per-pixel windowed statistic
pub type StatisticMap = ImageBuffer<Luma<f64>, Vec<f64>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TextureParams {
    pub window: u32,
    pub threshold: f64,
}

impl Default for TextureParams {
    fn default() -> Self {
        Self {
            window: TEXTURE_WINDOW,
            threshold: TEXTURE_THRESHOLD,
        }
    }
}

impl TextureParams {
    /// Half-width of the square window: `window - window / 2 - 1`.
    ///
    /// A nominal window of 3 gives radius 1 (a 3x3 window); even windows round
    /// down, so 4 also gives radius 1.
    pub fn radius(&self) -> u32 {
        self.window - self.window / 2 - 1
    }

    fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(LeafMarkerError::InvalidParameter(
                "texture window must be > 0".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(LeafMarkerError::InvalidParameter(format!(
                "texture threshold must be finite, got {}", self.threshold
            )));
        }
        Ok(())
    }
}

/// `I * ln(I + eps)` for every possible 8-bit intensity
fn intensity_table() -> [f64; 256] {
    let mut table = [0.0; 256];
    for (value, entry) in table.iter_mut().enumerate() {
        let intensity = value as f64;
        *entry = intensity * (intensity + TEXTURE_EPSILON).ln();
    }
    table
}

/// Sum of `I * ln(I + eps)` over the window around every pixel.
///
/// Windows are clipped to the image at the borders. Sums come from a
/// summed-area table, so the cost does not grow with the window size.
pub fn texture_statistics(image: &GrayImage, radius: u32) -> Result<StatisticMap> {
    ensure_non_empty(image.dimensions())?;

    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let table = intensity_table();

    // integral[(y + 1) * (w + 1) + (x + 1)] = sum over [0, x] x [0, y]
    let stride = w + 1;
    let mut integral = vec![0.0f64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0.0;
        for x in 0..w {
            row_sum += table[image.get_pixel(x as u32, y as u32)[0] as usize];
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let r = radius as usize;
    let mut values = vec![0.0f64; w * h];
    values.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for (x, value) in row.iter_mut().enumerate() {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);
            *value = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                - integral[y1 * stride + x0]
                + integral[y0 * stride + x0];
        }
    });

    StatisticMap::from_raw(width, height, values).ok_or_else(|| {
        LeafMarkerError::InvalidParameter("statistic buffer size mismatch".to_string())
    })
}

/// Clear marker bits where the local statistic exceeds the threshold
pub fn texture_filter(image: &GrayImage, marker: &mut Marker, params: &TextureParams) -> Result<()> {
    params.validate()?;
    ensure_same_dimensions(marker.dimensions(), image.dimensions())?;

    let statistics = texture_statistics(image, params.radius())?;
    let mut cleared = 0usize;
    for (x, y, value) in statistics.enumerate_pixels() {
        if value[0] > params.threshold && marker.get(x, y) {
            marker.clear(x, y);
            cleared += 1;
        }
    }

    log::debug!(
        "Texture filter (radius {}, threshold {:.1}) cleared {} pixels",
        params.radius(),
        params.threshold,
        cleared
    );

    Ok(())
}
