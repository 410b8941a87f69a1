// src/components.rs - Connected-component labelling and largest-object selection

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::connected_components;
pub use imageproc::region_labelling::Connectivity;

use crate::errors::{LeafMarkerError, Result};
use crate::image_utils::{binarize, ensure_non_empty, BACKGROUND, FOREGROUND};

/// Label 0 is background, every positive label one connected region
pub type LabelMap = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Inclusive pixel bounds of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    fn at(x: u32, y: u32) -> Self {
        Self { min_x: x, min_y: y, max_x: x, max_y: y }
    }

    fn expand_to_contain(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Area and extent of one labelled region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStats {
    pub label: u32,
    pub area: u64,
    pub bounds: BoundingBox,
}

/// Label map of a binary mask together with per-label statistics
#[derive(Debug, Clone)]
pub struct LabeledComponents {
    labels: LabelMap,
    stats: Vec<ComponentStats>,
}

impl LabeledComponents {
    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Statistics ordered by label; `stats()[i].label == i + 1`
    pub fn stats(&self) -> &[ComponentStats] {
        &self.stats
    }

    pub fn count(&self) -> usize {
        self.stats.len()
    }

    /// Component with the most pixels; ties go to the lowest label
    pub fn largest(&self) -> Option<&ComponentStats> {
        self.stats
            .iter()
            .fold(None, |best: Option<&ComponentStats>, candidate| match best {
                Some(current) if current.area >= candidate.area => Some(current),
                _ => Some(candidate),
            })
    }

    /// Mask with 255 wherever the pixel carries one of `selected` labels
    pub fn mask_where<F>(&self, selected: F) -> GrayImage
    where
        F: Fn(u32) -> bool,
    {
        let (width, height) = self.labels.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let label = self.labels.get_pixel(x, y)[0];
            if label != 0 && selected(label) {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    /// Mask of a single label
    pub fn mask_of(&self, label: u32) -> GrayImage {
        self.mask_where(|l| l == label)
    }
}

/// Label the foreground of a mask; any non-zero pixel is foreground
pub fn label_components(mask: &GrayImage, connectivity: Connectivity) -> Result<LabeledComponents> {
    ensure_non_empty(mask.dimensions())?;

    // Labelling groups equal pixel values, so collapse foreground to one value first
    let binary = binarize(mask);
    let labels = connected_components(&binary, connectivity, Luma([BACKGROUND]));

    let mut stats: Vec<ComponentStats> = Vec::new();
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel[0];
        if label == 0 {
            continue;
        }

        let idx = (label - 1) as usize;
        while stats.len() <= idx {
            let next_label = stats.len() as u32 + 1;
            stats.push(ComponentStats {
                label: next_label,
                area: 0,
                bounds: BoundingBox::at(x, y),
            });
        }

        let entry = &mut stats[idx];
        if entry.area == 0 {
            entry.bounds = BoundingBox::at(x, y);
        } else {
            entry.bounds.expand_to_contain(x, y);
        }
        entry.area += 1;
    }

    Ok(LabeledComponents { labels, stats })
}

/// The winning region of a mask plus the labelling it was chosen from
#[derive(Debug, Clone)]
pub struct LargestObject {
    pub mask: GrayImage,
    pub stats: ComponentStats,
    pub components: LabeledComponents,
}

/// Keep only the largest 8-connected foreground region
pub fn select_largest_object(mask: &GrayImage) -> Result<GrayImage> {
    select_largest_object_with_stats(mask).map(|largest| largest.mask)
}

/// Same as `select_largest_object`, also returning the statistics behind the choice.
///
/// An all-background mask yields `NoForegroundFound`.
pub fn select_largest_object_with_stats(mask: &GrayImage) -> Result<LargestObject> {
    let components = label_components(mask, Connectivity::Eight)?;

    let stats = *components.largest().ok_or(LeafMarkerError::NoForegroundFound)?;
    let largest_mask = components.mask_of(stats.label);

    log::debug!(
        "Largest of {} components: label {} with {} pixels",
        components.count(),
        stats.label,
        stats.area
    );

    Ok(LargestObject {
        mask: largest_mask,
        stats,
        components,
    })
}
