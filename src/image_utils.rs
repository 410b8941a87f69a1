use std::borrow::Cow;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use crate::errors::{LeafMarkerError, Result};

/// Constants
pub const FOREGROUND: u8 = 255; // Mask value for object pixels
pub const BACKGROUND: u8 = 0; // Mask value for background pixels

/// Check that an image can feed the color-index stages.
///
/// 8-bit RGB input is borrowed as is; other color layouts (RGBA, 16-bit) are
/// converted once. Grayscale layouts are rejected with `NotColorImage`.
pub fn ensure_color(image: &DynamicImage) -> Result<Cow<'_, RgbImage>> {
    if !image.color().has_color() {
        return Err(LeafMarkerError::NotColorImage);
    }

    let rgb = match image {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other => Cow::Owned(other.to_rgb8()),
    };
    ensure_non_empty(rgb.dimensions())?;

    Ok(rgb)
}

/// Reject grids with a zero width or height
pub fn ensure_non_empty(dimensions: (u32, u32)) -> Result<()> {
    let (width, height) = dimensions;
    if width == 0 || height == 0 {
        return Err(LeafMarkerError::InvalidParameter(format!(
            "image must not be empty, got {}x{}", width, height
        )));
    }
    Ok(())
}

/// Reject two grids that are meant to be combined but differ in size
pub fn ensure_same_dimensions(expected: (u32, u32), actual: (u32, u32)) -> Result<()> {
    if expected != actual {
        return Err(LeafMarkerError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Check if a mask pixel belongs to the object
#[inline]
pub fn is_foreground(pixel: &Luma<u8>) -> bool {
    pixel[0] != BACKGROUND
}

/// Number of object pixels in a mask
pub fn mask_area(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|p| is_foreground(p)).count() as u64
}

/// Normalize any two-valued or gray mask to strict 0 / 255
pub fn binarize(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if is_foreground(mask.get_pixel(x, y)) {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Swap foreground and background
pub fn invert_mask(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if is_foreground(mask.get_pixel(x, y)) {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Black out every pixel of `image` that lies outside the mask
pub fn apply_mask_to_image(image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
    ensure_same_dimensions(image.dimensions(), mask.dimensions())?;

    let mut masked = image.clone();
    for (x, y, pixel) in masked.enumerate_pixels_mut() {
        if !is_foreground(mask.get_pixel(x, y)) {
            *pixel = Rgb([0, 0, 0]);
        }
    }

    Ok(masked)
}

/// Set every object pixel to `intensity`, keeping the background at 0
pub fn recolor_mask(mask: &GrayImage, intensity: u8) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if is_foreground(mask.get_pixel(x, y)) {
            Luma([intensity])
        } else {
            Luma([BACKGROUND])
        }
    })
}
