// src/hole_filling.rs - Closing interior gaps of the selected object

use std::collections::VecDeque;

use clap::ValueEnum;
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::components::{label_components, Connectivity};
use crate::errors::{LeafMarkerError, Result};
use crate::image_utils::{ensure_non_empty, invert_mask, is_foreground, mask_area, FOREGROUND};
use crate::morphology::apply_closing;

/// Holes smaller than this share of the object area are filled
pub const HOLE_AREA_RATIO: f64 = 0.3;
/// Square kernel size of the closing-based policy
pub const CLOSING_KERNEL_SIZE: u32 = 50;

/// How interior gaps of the object are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Leave the mask as is
    No,
    /// Fill background not reachable from the outside, away from the image edges
    #[default]
    Flood,
    /// Fill enclosed holes smaller than a share of the object area
    Threshold,
    /// Morphological closing with a large square kernel
    Morph,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoleFillParams {
    pub area_ratio: f64,
    pub closing_kernel_size: u32,
}

impl Default for HoleFillParams {
    fn default() -> Self {
        Self {
            area_ratio: HOLE_AREA_RATIO,
            closing_kernel_size: CLOSING_KERNEL_SIZE,
        }
    }
}

/// Fill holes with the default parameters
pub fn fill_holes(mask: &GrayImage, mode: FillMode) -> Result<GrayImage> {
    fill_holes_with(mask, mode, &HoleFillParams::default())
}

pub fn fill_holes_with(mask: &GrayImage, mode: FillMode, params: &HoleFillParams) -> Result<GrayImage> {
    ensure_non_empty(mask.dimensions())?;

    let filled = match mode {
        FillMode::No => mask.clone(),
        FillMode::Flood => flood_fill_holes(mask),
        FillMode::Threshold => threshold_fill_holes(mask, params.area_ratio)?,
        FillMode::Morph => apply_closing(mask, params.closing_kernel_size)?,
    };

    log::debug!(
        "Hole filling ({:?}) added {} pixels",
        mode,
        mask_area(&filled).saturating_sub(mask_area(mask))
    );

    Ok(filled)
}

const FOUR_NEIGHBORS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Collect the 4-connected background region containing `start`, marking it in `visited`
fn grow_background(
    foreground: &[bool],
    visited: &mut [bool],
    width: usize,
    height: usize,
    start: usize,
) -> Vec<usize> {
    let mut region = Vec::new();
    let mut queue = VecDeque::from([start]);
    visited[start] = true;

    while let Some(idx) = queue.pop_front() {
        region.push(idx);
        let (x, y) = ((idx % width) as i64, (idx / width) as i64);
        for (dx, dy) in FOUR_NEIGHBORS {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let next = ny as usize * width + nx as usize;
            if !foreground[next] && !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }

    region
}

/// First and last foreground index along each row and each column
struct InteriorSpans {
    rows: Vec<Option<(usize, usize)>>,
    columns: Vec<Option<(usize, usize)>>,
}

impl InteriorSpans {
    fn new(foreground: &[bool], width: usize, height: usize) -> Self {
        let mut rows = vec![None; height];
        let mut columns: Vec<Option<(usize, usize)>> = vec![None; width];

        for y in 0..height {
            for x in 0..width {
                if !foreground[y * width + x] {
                    continue;
                }
                rows[y] = Some(rows[y].map_or((x, x), |(first, _)| (first, x)));
                columns[x] = Some(columns[x].map_or((y, y), |(first, _)| (first, y)));
            }
        }

        Self { rows, columns }
    }

    /// Inside the foreground extent of both its row and its column
    fn contains(&self, x: usize, y: usize) -> bool {
        let in_row = self.rows[y].map_or(false, |(first, last)| first <= x && x <= last);
        let in_column = self.columns[x].map_or(false, |(first, last)| first <= y && y <= last);
        in_row && in_column
    }
}

/// Flood the background from the first background pixel in raster order; the
/// unreached background forms hole candidates. A candidate region is filled
/// only if every pixel lies within the row and column extent of the object,
/// which keeps background pinched against the image edge untouched.
fn flood_fill_holes(mask: &GrayImage) -> GrayImage {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let foreground: Vec<bool> = mask.pixels().map(is_foreground).collect();

    let seed = match foreground.iter().position(|&fg| !fg) {
        Some(seed) => seed,
        None => {
            log::debug!("Flood fill: mask has no background, nothing to fill");
            return mask.clone();
        }
    };

    let mut visited = vec![false; foreground.len()];
    grow_background(&foreground, &mut visited, width, height, seed);

    let spans = InteriorSpans::new(&foreground, width, height);
    let mut filled = mask.clone();

    for idx in 0..foreground.len() {
        if foreground[idx] || visited[idx] {
            continue;
        }
        let region = grow_background(&foreground, &mut visited, width, height, idx);
        let enclosed = region.iter().all(|&p| spans.contains(p % width, p / width));
        if enclosed {
            for p in region {
                filled.put_pixel((p % width) as u32, (p / width) as u32, Luma([FOREGROUND]));
            }
        }
    }

    filled
}

/// Label the inverted mask; enclosed background regions smaller than
/// `area_ratio * object_area` are filled, larger ones stay as openings.
/// Regions touching the image border are never holes.
fn threshold_fill_holes(mask: &GrayImage, area_ratio: f64) -> Result<GrayImage> {
    if !(area_ratio.is_finite() && area_ratio >= 0.0) {
        return Err(LeafMarkerError::InvalidParameter(format!(
            "hole area ratio must be a non-negative number, got {}", area_ratio
        )));
    }

    let (width, height) = mask.dimensions();
    let object_area = mask_area(mask);
    let min_size = area_ratio * object_area as f64;

    let holes = label_components(&invert_mask(mask), Connectivity::Eight)?;

    let small_holes: Vec<bool> = holes
        .stats()
        .iter()
        .map(|hole| {
            let b = hole.bounds;
            let touches_border =
                b.min_x == 0 || b.min_y == 0 || b.max_x + 1 == width || b.max_y + 1 == height;
            !touches_border && (hole.area as f64) < min_size
        })
        .collect();

    log::debug!(
        "Threshold fill: {} background regions, min hole size {:.1}, {} filled",
        holes.count(),
        min_size,
        small_holes.iter().filter(|&&small| small).count()
    );

    let fill = holes.mask_where(|label| small_holes[(label - 1) as usize]);
    Ok(GrayImage::from_fn(width, height, |x, y| {
        if is_foreground(mask.get_pixel(x, y)) || is_foreground(fill.get_pixel(x, y)) {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_mask(width: u32, height: u32, cx: f64, cy: f64, outer: f64, inner: f64) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            if d <= outer && d > inner {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        })
    }

    fn rect(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32, value: u8) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([value]));
            }
        }
    }

    #[test]
    fn test_no_fill_passes_through() {
        let ring = disk_mask(30, 30, 15.0, 15.0, 10.0, 3.0);
        assert_eq!(fill_holes(&ring, FillMode::No).unwrap(), ring);
    }

    #[test]
    fn test_flood_fills_enclosed_hole() {
        let ring = disk_mask(30, 30, 15.0, 15.0, 10.0, 3.0);
        let solid = disk_mask(30, 30, 15.0, 15.0, 10.0, -1.0);
        assert_eq!(fill_holes(&ring, FillMode::Flood).unwrap(), solid);
    }

    #[test]
    fn test_flood_skips_hole_touching_border() {
        // Inner disk reaches column 0, so it is only bounded by the image edge there
        let ring = disk_mask(40, 40, 2.0, 20.0, 10.0, 3.0);
        assert!(ring.get_pixel(0, 20)[0] == 0);

        let filled = fill_holes(&ring, FillMode::Flood).unwrap();
        assert_eq!(filled, ring);
    }

    #[test]
    fn test_flood_skips_pocket_open_to_edge() {
        // U shape whose pocket opens onto the top edge
        let mut mask = GrayImage::new(30, 30);
        rect(&mut mask, 5, 0, 21, 21, FOREGROUND);
        rect(&mut mask, 10, 0, 11, 15, 0);

        let filled = fill_holes(&mask, FillMode::Flood).unwrap();
        assert_eq!(filled, mask);
    }

    #[test]
    fn test_flood_on_full_foreground_is_noop() {
        let mask = GrayImage::from_pixel(6, 6, Luma([FOREGROUND]));
        assert_eq!(fill_holes(&mask, FillMode::Flood).unwrap(), mask);
    }

    #[test]
    fn test_threshold_fills_small_and_keeps_large_holes() {
        let mut mask = GrayImage::new(70, 50);
        rect(&mut mask, 10, 10, 50, 30, FOREGROUND);
        rect(&mut mask, 14, 15, 10, 10, 0); // 100 pixel hole
        rect(&mut mask, 32, 15, 20, 20, 0); // 400 pixel hole
        assert_eq!(mask_area(&mask), 1000);

        let filled = fill_holes(&mask, FillMode::Threshold).unwrap();
        assert_eq!(filled.get_pixel(18, 20)[0], FOREGROUND);
        assert_eq!(filled.get_pixel(40, 25)[0], 0);
        assert_eq!(mask_area(&filled), 1100);
    }

    #[test]
    fn test_threshold_with_only_outer_background() {
        // Object covers most of the frame; the border region is not a hole
        let mut mask = GrayImage::new(20, 20);
        rect(&mut mask, 1, 1, 18, 18, FOREGROUND);
        assert_eq!(fill_holes(&mask, FillMode::Threshold).unwrap(), mask);
    }

    #[test]
    fn test_threshold_rejects_negative_ratio() {
        let mask = GrayImage::from_pixel(4, 4, Luma([FOREGROUND]));
        let params = HoleFillParams { area_ratio: -0.1, ..HoleFillParams::default() };
        assert!(matches!(
            fill_holes_with(&mask, FillMode::Threshold, &params),
            Err(LeafMarkerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_morph_closes_hole() {
        let mut mask = GrayImage::new(140, 140);
        // Margin wider than half the kernel so the closing does not reach the edge
        rect(&mut mask, 30, 30, 80, 80, FOREGROUND);
        let solid = mask.clone();
        rect(&mut mask, 60, 60, 5, 5, 0);

        assert_eq!(fill_holes(&mask, FillMode::Morph).unwrap(), solid);
    }
}
