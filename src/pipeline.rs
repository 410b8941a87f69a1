// src/pipeline.rs - Background marker -> largest object -> hole filling -> smoothing

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, GrayImage};
use rayon::prelude::*;

use crate::config::{Config, SegmentationMethod};
use crate::components::select_largest_object_with_stats;
use crate::errors::{LeafMarkerError, Result};
use crate::hole_filling::fill_holes_with;
use crate::image_io::{load_image, output_path_for, save_image, InputImage};
use crate::image_utils::{apply_mask_to_image, ensure_non_empty, mask_area, recolor_mask, BACKGROUND};
use crate::marker::{compute_marker_with, Marker};
use crate::morphology::smooth_boundary;
use crate::otsu::{apply_marker, otsu_marker};
use crate::texture::texture_filter;

/// Numbers gathered while segmenting one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentationStats {
    pub width: u32,
    pub height: u32,
    pub marker_pixels: u64,
    pub component_count: usize,
    pub object_area: u64,
    pub filled_pixels: u64,
    pub final_area: u64,
}

/// Final leaf mask (0 / 255) and how it was reached
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub mask: GrayImage,
    pub stats: SegmentationStats,
}

/// Outcome of one file in a batch
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub path: PathBuf,
    pub output: Option<PathBuf>,
    pub stats: Option<SegmentationStats>,
    pub status: String,
}

impl ImageReport {
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

/// Build the initial foreground marker with the configured method
pub fn generate_background_marker(image: &DynamicImage, config: &Config) -> Result<Marker> {
    match config.segmentation_method {
        SegmentationMethod::ColorIndex => {
            let mut marker = compute_marker_with(image, &config.marker_rules, &config.thresholds)?;
            if config.texture_filter {
                texture_filter(&image.to_luma8(), &mut marker, &config.texture_params())?;
            }
            Ok(marker)
        }
        SegmentationMethod::Otsu => {
            let gray = image.to_luma8();
            let (_, level_mask) = otsu_marker(&gray)?;
            // The white side of the applied marker is the leaf
            let segmented = apply_marker(&gray, &level_mask, BACKGROUND, true)?;
            Ok(Marker::from_mask(&segmented))
        }
    }
}

/// Segment the leaf of one image into a binary mask
pub fn segment_leaf(image: &DynamicImage, config: &Config) -> Result<Segmentation> {
    let (width, height) = image.dimensions();
    ensure_non_empty((width, height))?;

    let marker = generate_background_marker(image, config)?;
    let marker_pixels = marker.count() as u64;

    let largest = select_largest_object_with_stats(&marker.to_mask())?;
    let filled = fill_holes_with(&largest.mask, config.fill_mode, &config.hole_fill_params())?;
    let filled_area = mask_area(&filled);

    let mask = if config.smooth_boundary {
        smooth_boundary(&filled, config.smoothing_kernel_size)?
    } else {
        filled
    };

    let stats = SegmentationStats {
        width,
        height,
        marker_pixels,
        component_count: largest.components.count(),
        object_area: largest.stats.area,
        filled_pixels: filled_area.saturating_sub(largest.stats.area),
        final_area: mask_area(&mask),
    };

    log::debug!("Segmentation stats: {:?}", stats);

    Ok(Segmentation { mask, stats })
}

/// Masked photograph for intensity 0, otherwise the mask at that intensity
pub fn render_output(image: &DynamicImage, mask: &GrayImage, marker_intensity: u8) -> Result<DynamicImage> {
    if marker_intensity > 0 {
        return Ok(DynamicImage::ImageLuma8(recolor_mask(mask, marker_intensity)));
    }

    let masked = apply_mask_to_image(&image.to_rgb8(), mask)?;
    Ok(DynamicImage::ImageRgb8(masked))
}

/// Segment one decoded image and write the result into `destination`
pub fn process_image(input: &InputImage, config: &Config, destination: &Path) -> Result<(PathBuf, SegmentationStats)> {
    let segmentation = segment_leaf(&input.image, config)?;
    let output = render_output(&input.image, &segmentation.mask, config.marker_intensity())?;

    let output_path = output_path_for(&input.path, destination, &config.output_suffix)?;
    save_image(&output, &output_path)?;

    log::info!("Marker generated for image file: {}", input.path.display());
    Ok((output_path, segmentation.stats))
}

/// Load, segment and save one file; any failure becomes the report's status
fn process_file(path: &Path, config: &Config, destination: &Path) -> ImageReport {
    let outcome = load_image(path).and_then(|input| process_image(&input, config, destination));

    match outcome {
        Ok((output, stats)) => ImageReport {
            path: path.to_path_buf(),
            output: Some(output),
            stats: Some(stats),
            status: "ok".to_string(),
        },
        Err(e) => {
            match &e {
                LeafMarkerError::ImageNotReadable { .. } => {
                    log::error!("Could not read image file: {}", path.display())
                }
                LeafMarkerError::NotColorImage => {
                    log::error!("Not color image file: {}", path.display())
                }
                LeafMarkerError::NoForegroundFound => log::warn!("{}: {}", path.display(), e),
                _ => log::error!("Failed to process {}: {}", path.display(), e),
            }
            ImageReport {
                path: path.to_path_buf(),
                output: None,
                stats: None,
                status: e.to_string(),
            }
        }
    }
}

/// Process every file; a failing input only marks its own report
pub fn process_batch(files: &[PathBuf], config: &Config, destination: &Path) -> Vec<ImageReport> {
    if config.use_parallel {
        files
            .par_iter()
            .map(|path| process_file(path, config, destination))
            .collect()
    } else {
        files
            .iter()
            .map(|path| process_file(path, config, destination))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hole_filling::FillMode;
    use image::{Luma, Rgb, RgbImage};

    const LEAF: Rgb<u8> = Rgb([60, 160, 40]);
    const PAPER: Rgb<u8> = Rgb([235, 235, 240]);

    /// Green disk with a white speck inside, plus a small green blob elsewhere
    fn leaf_photo() -> DynamicImage {
        let rgb = RgbImage::from_fn(60, 60, |x, y| {
            let d = ((x as f64 - 30.0).powi(2) + (y as f64 - 30.0).powi(2)).sqrt();
            let in_blob = (2..5).contains(&x) && (2..5).contains(&y);
            let in_speck = (29..=31).contains(&x) && (29..=31).contains(&y);
            if (d <= 20.0 && !in_speck) || in_blob {
                LEAF
            } else {
                PAPER
            }
        });
        DynamicImage::ImageRgb8(rgb)
    }

    #[test]
    fn test_segment_leaf_keeps_largest_filled_object() {
        let config = Config::default();
        let segmentation = segment_leaf(&leaf_photo(), &config).unwrap();
        let stats = segmentation.stats;

        assert_eq!(stats.component_count, 2);
        assert_eq!(stats.filled_pixels, 9);
        assert_eq!(stats.final_area, stats.object_area + 9);
        assert_eq!(segmentation.mask.get_pixel(30, 30)[0], 255);
        assert_eq!(segmentation.mask.get_pixel(3, 3)[0], 0);
    }

    #[test]
    fn test_no_fill_keeps_speck() {
        let config = Config { fill_mode: FillMode::No, ..Config::default() };
        let segmentation = segment_leaf(&leaf_photo(), &config).unwrap();
        assert_eq!(segmentation.mask.get_pixel(30, 30)[0], 0);
        assert_eq!(segmentation.stats.filled_pixels, 0);
    }

    #[test]
    fn test_blank_photo_has_no_foreground() {
        let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, PAPER));
        assert!(matches!(
            segment_leaf(&blank, &Config::default()),
            Err(LeafMarkerError::NoForegroundFound)
        ));
    }

    #[test]
    fn test_grayscale_photo_is_rejected_by_color_index() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        assert!(matches!(
            segment_leaf(&gray, &Config::default()),
            Err(LeafMarkerError::NotColorImage)
        ));
    }

    #[test]
    fn test_render_output_modes() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, LEAF));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([255]));

        let masked = render_output(&image, &mask, 0).unwrap().to_rgb8();
        assert_eq!(masked.get_pixel(0, 0), &LEAF);
        assert_eq!(masked.get_pixel(1, 0), &Rgb([0, 0, 0]));

        let contrast = render_output(&image, &mask, 5).unwrap().to_luma8();
        assert_eq!(contrast.get_pixel(0, 0)[0], 5);
        assert_eq!(contrast.get_pixel(1, 0)[0], 0);
    }

    fn square_on_field(width: u32, height: u32, side: u32, square: u8, field: u8) -> DynamicImage {
        let (x0, y0) = ((width - side) / 2, (height - side) / 2);
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
            if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
                Luma([square])
            } else {
                Luma([field])
            }
        }))
    }

    #[test]
    fn test_otsu_method_accepts_grayscale() {
        // Small image: the marker is flipped and the bright square stays white
        let image = square_on_field(40, 40, 20, 210, 40);
        let config = Config { segmentation_method: SegmentationMethod::Otsu, ..Config::default() };
        let segmentation = segment_leaf(&image, &config).unwrap();

        assert_eq!(segmentation.stats.object_area, 400);
        assert_eq!(segmentation.mask.get_pixel(20, 20)[0], 255);
        assert_eq!(segmentation.mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_otsu_keeps_dark_leaf_on_full_resolution_photo() {
        // 2.2 million pixels, bright field exceeds the dark square by more than the margin
        let image = square_on_field(2000, 1100, 100, 40, 210);
        let config = Config {
            segmentation_method: SegmentationMethod::Otsu,
            fill_mode: FillMode::No,
            ..Config::default()
        };
        let segmentation = segment_leaf(&image, &config).unwrap();

        assert_eq!(segmentation.stats.object_area, 10_000);
        assert_eq!(segmentation.mask.get_pixel(1000, 550)[0], 255);
        assert_eq!(segmentation.mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_texture_filter_only_clears_color_index_bits() {
        // Paper strip on top, then a dark green half and a bright green half
        let rgb = RgbImage::from_fn(40, 20, |x, y| {
            if y < 2 {
                PAPER
            } else if x < 20 {
                Rgb([2, 10, 1])
            } else {
                LEAF
            }
        });
        let image = DynamicImage::ImageRgb8(rgb);

        let plain = generate_background_marker(&image, &Config::default()).unwrap();
        let textured_config = Config { texture_filter: true, ..Config::default() };
        let textured = generate_background_marker(&image, &textured_config).unwrap();

        assert!(!plain.get(10, 0));
        assert!(plain.get(10, 10) && plain.get(30, 10));
        // Dark pixels stay below the statistic threshold, bright ones do not
        assert!(textured.get(10, 10));
        assert!(!textured.get(30, 10));
        assert!(plain
            .bits()
            .iter()
            .zip(textured.bits())
            .all(|(&before, &after)| before || !after));
    }
}
