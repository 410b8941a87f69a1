// src/otsu.rs - Global Otsu thresholding as an alternative background marker

use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold};

use crate::errors::Result;
use crate::image_utils::{ensure_non_empty, ensure_same_dimensions, is_foreground, FOREGROUND};

/// If the marked area exceeds the unmarked area by less than this many pixels,
/// the marker is assumed to cover the background and is inverted.
/// Tuned on full-resolution photographs.
pub const INVERSION_MARGIN: i64 = 2_000_000;

/// Otsu level of a grayscale image and the mask of pixels above it
pub fn otsu_marker(image: &GrayImage) -> Result<(u8, GrayImage)> {
    ensure_non_empty(image.dimensions())?;

    let level = otsu_level(image);
    let marker = threshold(image, level);
    log::debug!("Otsu level {}", level);

    Ok((level, marker))
}

/// Paint marked pixels with `background` and everything else white.
///
/// With `inverse` set, the marker is flipped first unless it clearly covers
/// the larger part of the image (see `INVERSION_MARGIN`).
pub fn apply_marker(image: &GrayImage, marker: &GrayImage, background: u8, inverse: bool) -> Result<GrayImage> {
    ensure_same_dimensions(image.dimensions(), marker.dimensions())?;

    let marked = marker.pixels().filter(|p| is_foreground(p)).count() as i64;
    let unmarked = marker.width() as i64 * marker.height() as i64 - marked;
    let flip = inverse && marked - unmarked < INVERSION_MARGIN;

    Ok(GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if is_foreground(marker.get_pixel(x, y)) != flip {
            Luma([background])
        } else {
            Luma([FOREGROUND])
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_rows(rows: &[&[u8]]) -> GrayImage {
        GrayImage::from_fn(rows[0].len() as u32, rows.len() as u32, |x, y| {
            Luma([rows[y as usize][x as usize]])
        })
    }

    #[test]
    fn test_apply_marker_without_inverse() {
        let image = from_rows(&[&[1, 2, 3], &[4, 5, 6]]);
        let marker = from_rows(&[&[0, 0, 255], &[255, 0, 0]]);

        let out = apply_marker(&image, &marker, 0, false).unwrap();
        assert_eq!(out, from_rows(&[&[255, 255, 0], &[0, 255, 255]]));
    }

    #[test]
    fn test_apply_marker_with_inverse() {
        let image = from_rows(&[&[1, 2, 3], &[4, 5, 6]]);
        let marker = from_rows(&[&[0, 0, 255], &[255, 0, 0]]);

        let out = apply_marker(&image, &marker, 0, true).unwrap();
        assert_eq!(out, from_rows(&[&[0, 0, 255], &[255, 0, 0]]));
    }

    #[test]
    fn test_otsu_separates_two_levels() {
        let image = GrayImage::from_fn(10, 10, |x, _| if x < 4 { Luma([30]) } else { Luma([200]) });
        let (level, marker) = otsu_marker(&image).unwrap();

        assert!((30..200).contains(&level));
        assert_eq!(marker.get_pixel(0, 0)[0], 0);
        assert_eq!(marker.get_pixel(9, 9)[0], FOREGROUND);
    }
}
