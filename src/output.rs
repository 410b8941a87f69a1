use std::fs;
use std::path::{Path, PathBuf};
use csv::Writer;

use crate::errors::Result;
use crate::pipeline::ImageReport;

/// File name of the per-batch summary
pub const SUMMARY_FILENAME: &str = "segmentation_summary.csv";

/// Write one row per processed file into `<output_dir>/segmentation_summary.csv`
pub fn write_summary_csv<P: AsRef<Path>>(reports: &[ImageReport], output_dir: P) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(SUMMARY_FILENAME);

    // Create directory if it doesn't exist
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(&output_path)?;

    writer.write_record([
        "Filename",
        "Width",
        "Height",
        "Marker_Pixels",
        "Component_Count",
        "Object_Area",
        "Filled_Pixels",
        "Final_Area",
        "Status",
    ])?;

    for report in reports {
        let filename = report.path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Failed files keep their row with empty measurements
        let measurements: Vec<String> = match &report.stats {
            Some(stats) => vec![
                stats.width.to_string(),
                stats.height.to_string(),
                stats.marker_pixels.to_string(),
                stats.component_count.to_string(),
                stats.object_area.to_string(),
                stats.filled_pixels.to_string(),
                stats.final_area.to_string(),
            ],
            None => vec![String::new(); 7],
        };

        let mut record = Vec::with_capacity(9);
        record.push(filename);
        record.extend(measurements);
        record.push(report.status.clone());
        writer.write_record(&record)?;
    }

    writer.flush()?;

    Ok(output_path)
}
