use image::{GrayImage, Luma};
use rayon::prelude::*;

use crate::errors::{LeafMarkerError, Result};
use crate::image_utils::{ensure_non_empty, is_foreground, BACKGROUND, FOREGROUND};

/// Square kernel size used to smooth the final silhouette
pub const SMOOTHING_KERNEL_SIZE: u32 = 15;

/// Boolean grid, row-major, used for the separable passes
struct BinaryGrid {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl BinaryGrid {
    fn from_mask(mask: &GrayImage) -> Self {
        Self {
            width: mask.width() as usize,
            height: mask.height() as usize,
            cells: mask.pixels().map(is_foreground).collect(),
        }
    }

    fn to_mask(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            if self.cells[y as usize * self.width + x as usize] {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    fn transposed(&self) -> Self {
        let mut cells = vec![false; self.cells.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                cells[x * self.height + y] = self.cells[y * self.width + x];
            }
        }
        Self {
            width: self.height,
            height: self.width,
            cells,
        }
    }

    /// Replace every row with `pass(row)`, rows in parallel
    fn map_rows<F>(&mut self, pass: F)
    where
        F: Fn(&[bool]) -> Vec<bool> + Sync,
    {
        let width = self.width;
        self.cells.par_chunks_mut(width).for_each(|row| {
            let updated = pass(row);
            row.copy_from_slice(&updated);
        });
    }

    /// Apply a 1-D pass horizontally, then vertically
    fn separable<F>(mut self, pass: F) -> Self
    where
        F: Fn(&[bool]) -> Vec<bool> + Sync,
    {
        self.map_rows(&pass);
        let mut columns = self.transposed();
        columns.map_rows(&pass);
        columns.transposed()
    }
}

/// `out[i]` is true if any `line[j]` with `j` in `[i + lo, i + hi]` is true.
/// Offsets outside the line are ignored.
fn sliding_any(line: &[bool], lo: isize, hi: isize) -> Vec<bool> {
    let n = line.len() as isize;
    let mut prefix = vec![0usize; line.len() + 1];
    for (i, &value) in line.iter().enumerate() {
        prefix[i + 1] = prefix[i] + value as usize;
    }

    (0..n)
        .map(|i| {
            let start = (i + lo).clamp(0, n);
            let end = (i + hi + 1).clamp(0, n);
            end > start && prefix[end as usize] > prefix[start as usize]
        })
        .collect()
}

/// Window offsets `[lo, hi]` of a square kernel anchored at `size / 2`
fn kernel_offsets(kernel_size: u32) -> Result<(isize, isize)> {
    if kernel_size == 0 {
        return Err(LeafMarkerError::InvalidParameter(
            "Kernel size must be greater than 0".to_string(),
        ));
    }
    let anchor = (kernel_size / 2) as isize;
    Ok((-anchor, kernel_size as isize - 1 - anchor))
}

/// Square erosion: a pixel stays foreground only if its whole window is foreground.
/// Pixels beyond the image border do not erode.
pub fn erode(mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
    ensure_non_empty(mask.dimensions())?;
    let (lo, hi) = kernel_offsets(kernel_size)?;

    let grid = BinaryGrid::from_mask(mask).separable(|line| {
        let background: Vec<bool> = line.iter().map(|&v| !v).collect();
        sliding_any(&background, lo, hi).into_iter().map(|hit| !hit).collect()
    });

    Ok(grid.to_mask())
}

/// Square dilation with the reflected kernel, so that opening and closing
/// keep their ordering guarantees for even sizes.
pub fn dilate(mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
    ensure_non_empty(mask.dimensions())?;
    let (lo, hi) = kernel_offsets(kernel_size)?;

    let grid = BinaryGrid::from_mask(mask).separable(|line| sliding_any(line, -hi, -lo));

    Ok(grid.to_mask())
}

/// Apply morphological opening (erosion followed by dilation)
pub fn apply_opening(mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
    let eroded = erode(mask, kernel_size)?;
    dilate(&eroded, kernel_size)
}

/// Apply morphological closing (dilation followed by erosion)
pub fn apply_closing(mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
    let dilated = dilate(mask, kernel_size)?;
    erode(&dilated, kernel_size)
}

/// Remove thin protrusions and jagged edges from the final mask
pub fn smooth_boundary(mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
    log::debug!("Smoothing boundary with {}x{} opening", kernel_size, kernel_size);
    apply_opening(mask, kernel_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::mask_area;

    fn square_mask(size: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    #[test]
    fn test_sliding_any_clips_at_edges() {
        let line = [false, false, true, false, false];
        assert_eq!(sliding_any(&line, -1, 1), vec![false, true, true, true, false]);
        assert_eq!(sliding_any(&line, 0, 2), vec![true, true, true, false, false]);
    }

    #[test]
    fn test_kernel_of_one_is_identity() {
        let mask = square_mask(10, 2, 3, 4);
        assert_eq!(apply_opening(&mask, 1).unwrap(), mask);
        assert_eq!(apply_closing(&mask, 1).unwrap(), mask);
    }

    #[test]
    fn test_zero_kernel_is_rejected() {
        let mask = square_mask(4, 0, 0, 2);
        assert!(matches!(
            smooth_boundary(&mask, 0),
            Err(LeafMarkerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_opening_removes_thin_protrusion() {
        let mut mask = square_mask(30, 5, 5, 12);
        // One-pixel spur sticking out to the right
        for x in 17..28 {
            mask.put_pixel(x, 10, Luma([FOREGROUND]));
        }

        let opened = apply_opening(&mask, 5).unwrap();
        assert_eq!(opened, square_mask(30, 5, 5, 12));
    }

    #[test]
    fn test_opening_keeps_objects_touching_border() {
        let mask = square_mask(20, 0, 0, 8);
        assert_eq!(apply_opening(&mask, 5).unwrap(), mask);
    }

    #[test]
    fn test_closing_fills_small_hole() {
        let mut mask = square_mask(20, 2, 2, 15);
        mask.put_pixel(9, 9, Luma([BACKGROUND]));
        mask.put_pixel(10, 9, Luma([BACKGROUND]));

        let closed = apply_closing(&mask, 3).unwrap();
        assert_eq!(closed, square_mask(20, 2, 2, 15));
    }

    #[test]
    fn test_even_kernels_keep_ordering() {
        let mut mask = square_mask(40, 6, 8, 20);
        mask.put_pixel(1, 1, Luma([FOREGROUND]));
        mask.put_pixel(15, 15, Luma([BACKGROUND]));

        let opened = apply_opening(&mask, 4).unwrap();
        let closed = apply_closing(&mask, 4).unwrap();
        for ((o, m), c) in opened.pixels().zip(mask.pixels()).zip(closed.pixels()) {
            assert!(o[0] <= m[0]);
            assert!(m[0] <= c[0]);
        }
        assert!(mask_area(&opened) < mask_area(&mask));
        assert!(mask_area(&closed) > mask_area(&mask));
    }

    #[test]
    fn test_erode_and_dilate_square() {
        let mask = square_mask(20, 5, 5, 7);
        assert_eq!(erode(&mask, 3).unwrap(), square_mask(20, 6, 6, 5));
        assert_eq!(dilate(&mask, 3).unwrap(), square_mask(20, 4, 4, 9));
    }
}
