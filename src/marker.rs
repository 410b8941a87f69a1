// src/marker.rs - Boolean foreground marker and the background rules that narrow it

use clap::ValueEnum;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::image_utils::{ensure_color, ensure_same_dimensions, is_foreground, BACKGROUND, FOREGROUND};
use crate::vegetation::{check_scale, index_diff_rgb, IndexMap, DEFAULT_GREEN_SCALE, DEFAULT_RED_SCALE};

/// Blue level above which a pixel may count as white
pub const WHITE_BLUE_THRESHOLD: u8 = 200;
/// Green level above which a pixel may count as white
pub const WHITE_GREEN_THRESHOLD: u8 = 220;
/// Red level above which a pixel may count as white
pub const WHITE_RED_THRESHOLD: u8 = 200;
/// Level below which all three channels make a pixel count as black
pub const BLACK_THRESHOLD: u8 = 30;
/// Combined index at or below which a pixel is background
pub const COLOR_INDEX_THRESHOLD: f32 = -0.05;

/// Per-pixel candidate-foreground flags, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Marker {
    /// All pixels start as candidate foreground
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![true; width as usize * height as usize],
        }
    }

    /// Marker from a binary mask (any non-zero pixel is foreground)
    pub fn from_mask(mask: &GrayImage) -> Self {
        Self {
            width: mask.width(),
            height: mask.height(),
            bits: mask.pixels().map(is_foreground).collect(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn clear(&mut self, x: u32, y: u32) {
        let idx = (y * self.width + x) as usize;
        self.bits[idx] = false;
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Number of pixels still marked as foreground
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Binary mask: foreground 255, background 0
    pub fn to_mask(&self) -> GrayImage {
        self.render(FOREGROUND)
    }

    /// Foreground pixels set to `value`, background to 0
    pub fn render(&self, value: u8) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.get(x, y) {
                Luma([value])
            } else {
                Luma([BACKGROUND])
            }
        })
    }
}

/// Background rule that clears marker bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MarkerRule {
    /// Near-white pixels (glare, paper)
    RemoveWhites,
    /// Near-black pixels (shadow)
    RemoveBlacks,
    /// Pixels with more blue than green
    RemoveBlues,
    /// Pixels whose combined vegetation index is too low
    ColorIndex,
}

/// Tunable constants of the marker rules
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MarkerThresholds {
    pub white_blue: u8,
    pub white_green: u8,
    pub white_red: u8,
    pub black: u8,
    pub color_index: f32,
    pub green_scale: f32,
    pub red_scale: f32,
}

impl Default for MarkerThresholds {
    fn default() -> Self {
        Self {
            white_blue: WHITE_BLUE_THRESHOLD,
            white_green: WHITE_GREEN_THRESHOLD,
            white_red: WHITE_RED_THRESHOLD,
            black: BLACK_THRESHOLD,
            color_index: COLOR_INDEX_THRESHOLD,
            green_scale: DEFAULT_GREEN_SCALE,
            red_scale: DEFAULT_RED_SCALE,
        }
    }
}

/// Clear every marker bit whose pixel satisfies `is_background(red, green, blue)`
fn clear_where<F>(image: &RgbImage, marker: &mut Marker, is_background: F) -> Result<()>
where
    F: Fn(u8, u8, u8) -> bool + Sync,
{
    ensure_same_dimensions(marker.dimensions(), image.dimensions())?;

    marker
        .bits
        .par_iter_mut()
        .zip(image.as_raw().par_chunks_exact(3))
        .for_each(|(bit, px)| {
            if is_background(px[0], px[1], px[2]) {
                *bit = false;
            }
        });

    Ok(())
}

/// Clear near-white pixels: blue, green and red all above their white thresholds
pub fn remove_whites(image: &RgbImage, marker: &mut Marker, thresholds: &MarkerThresholds) -> Result<()> {
    clear_where(image, marker, |red, green, blue| {
        blue > thresholds.white_blue && green > thresholds.white_green && red > thresholds.white_red
    })
}

/// Clear near-black pixels: all three channels below the black threshold
pub fn remove_blacks(image: &RgbImage, marker: &mut Marker, thresholds: &MarkerThresholds) -> Result<()> {
    clear_where(image, marker, |red, green, blue| {
        blue < thresholds.black && green < thresholds.black && red < thresholds.black
    })
}

/// Clear pixels whose blue channel exceeds the green one
pub fn remove_blues(image: &RgbImage, marker: &mut Marker) -> Result<()> {
    clear_where(image, marker, |_, green, blue| blue > green)
}

/// Clear pixels whose index value is at or below `threshold`
pub fn color_index_marker(index: &IndexMap, marker: &mut Marker, threshold: f32) -> Result<()> {
    ensure_same_dimensions(marker.dimensions(), index.dimensions())?;

    marker
        .bits
        .par_iter_mut()
        .zip(index.as_raw().par_iter())
        .for_each(|(bit, &value)| {
            if value <= threshold {
                *bit = false;
            }
        });

    Ok(())
}

/// Build a marker with the default thresholds
pub fn compute_marker(image: &DynamicImage, rules: &[MarkerRule]) -> Result<Marker> {
    compute_marker_with(image, rules, &MarkerThresholds::default())
}

/// Start from an all-true marker and apply each requested rule to the original image.
///
/// Rules only clear bits and only read the source image, so their order does
/// not change the result.
pub fn compute_marker_with(
    image: &DynamicImage,
    rules: &[MarkerRule],
    thresholds: &MarkerThresholds,
) -> Result<Marker> {
    check_scale("color index threshold", thresholds.color_index)?;
    check_scale("green scale", thresholds.green_scale)?;
    check_scale("red scale", thresholds.red_scale)?;

    let rgb = ensure_color(image)?;
    let (width, height) = rgb.dimensions();
    let mut marker = Marker::full(width, height);

    for rule in rules {
        match rule {
            MarkerRule::RemoveWhites => remove_whites(&rgb, &mut marker, thresholds)?,
            MarkerRule::RemoveBlacks => remove_blacks(&rgb, &mut marker, thresholds)?,
            MarkerRule::RemoveBlues => remove_blues(&rgb, &mut marker)?,
            MarkerRule::ColorIndex => {
                let index = index_diff_rgb(&rgb, thresholds.green_scale, thresholds.red_scale)?;
                color_index_marker(&index, &mut marker, thresholds.color_index)?;
            }
        }
    }

    log::debug!(
        "Marker after {:?}: {} of {} pixels foreground",
        rules,
        marker.count(),
        width as usize * height as usize
    );

    Ok(marker)
}
