// src/vegetation.rs - Excess green / excess red vegetation indices

use image::{DynamicImage, ImageBuffer, Luma, Rgb, RgbImage};
use rayon::prelude::*;

use crate::errors::{LeafMarkerError, Result};
use crate::image_utils::ensure_color;

/// Green channel weight of the excess green index
pub const DEFAULT_GREEN_SCALE: f32 = 2.0;

/// Red channel weight of the excess red index
pub const DEFAULT_RED_SCALE: f32 = 1.4;

/// Per-pixel signed score with the same dimensions as its source image
pub type IndexMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Blue, green and red share of every pixel's channel sum
pub struct ChannelFractions {
    pub blue: IndexMap,
    pub green: IndexMap,
    pub red: IndexMap,
}

/// Divide, resolving zero denominators (and any non-finite result) to 0.0
#[inline]
pub fn div0(numerator: f32, denominator: f32) -> f32 {
    let quotient = numerator / denominator;
    if quotient.is_finite() {
        quotient
    } else {
        0.0
    }
}

/// Fractions of a single pixel in (blue, green, red) order
#[inline]
fn pixel_fractions(pixel: &Rgb<u8>) -> (f32, f32, f32) {
    let [red, green, blue] = pixel.0;
    let sum = red as f32 + green as f32 + blue as f32;
    (
        div0(blue as f32, sum),
        div0(green as f32, sum),
        div0(red as f32, sum),
    )
}

/// Evaluate `score` on every pixel's fractions, rows in parallel
fn map_fractions<F>(image: &RgbImage, score: F) -> Result<IndexMap>
where
    F: Fn(f32, f32, f32) -> f32 + Sync,
{
    let (width, height) = image.dimensions();
    let row_len = width as usize * 3;

    let score = &score;
    let values: Vec<f32> = image
        .as_raw()
        .par_chunks(row_len)
        .flat_map_iter(move |row| {
            row.chunks_exact(3).map(move |px| {
                let (blue, green, red) = pixel_fractions(&Rgb([px[0], px[1], px[2]]));
                score(blue, green, red)
            })
        })
        .collect();

    IndexMap::from_raw(width, height, values).ok_or_else(|| {
        LeafMarkerError::InvalidParameter("index buffer size mismatch".to_string())
    })
}

pub(crate) fn check_scale(name: &str, scale: f32) -> Result<()> {
    if !scale.is_finite() {
        return Err(LeafMarkerError::InvalidParameter(format!(
            "{} must be finite, got {}", name, scale
        )));
    }
    Ok(())
}

/// Split an image into its three fractional channel maps
pub fn channel_fractions(image: &DynamicImage) -> Result<ChannelFractions> {
    let rgb = ensure_color(image)?;

    Ok(ChannelFractions {
        blue: map_fractions(&rgb, |blue, _, _| blue)?,
        green: map_fractions(&rgb, |_, green, _| green)?,
        red: map_fractions(&rgb, |_, _, red| red)?,
    })
}

/// Excess green: `scale * green - (red + blue)`
pub fn excess_green(image: &DynamicImage, scale: f32) -> Result<IndexMap> {
    check_scale("green scale", scale)?;
    let rgb = ensure_color(image)?;
    map_fractions(&rgb, |blue, green, red| scale * green - (red + blue))
}

/// Excess red: `scale * red - green`
pub fn excess_red(image: &DynamicImage, scale: f32) -> Result<IndexMap> {
    check_scale("red scale", scale)?;
    let rgb = ensure_color(image)?;
    map_fractions(&rgb, |_, green, red| scale * red - green)
}

/// Excess green minus excess red.
///
/// With the default scales this is `3 * green - 2.4 * red - blue`.
pub fn index_diff(image: &DynamicImage, green_scale: f32, red_scale: f32) -> Result<IndexMap> {
    check_scale("green scale", green_scale)?;
    check_scale("red scale", red_scale)?;
    let rgb = ensure_color(image)?;
    index_diff_rgb(&rgb, green_scale, red_scale)
}

/// Combined index on an already validated color image
pub(crate) fn index_diff_rgb(image: &RgbImage, green_scale: f32, red_scale: f32) -> Result<IndexMap> {
    map_fractions(image, |blue, green, red| {
        let green_index = green_scale * green - (red + blue);
        let red_index = red_scale * red - green;
        green_index - red_index
    })
}
