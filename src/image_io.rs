use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::fs;
use image::DynamicImage;

use crate::errors::{LeafMarkerError, Result};

/// File extensions picked up when walking an input directory
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Represents an input image with its metadata
pub struct InputImage {
    pub image: DynamicImage,
    pub path: PathBuf,
}

/// Check whether a path carries one of the supported image extensions
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Get all image files directly inside a directory, sorted by path
pub fn get_image_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.is_dir() {
        return Err(LeafMarkerError::InvalidPath(dir_path.to_path_buf()));
    }

    let mut image_files = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        if has_image_extension(&path) {
            image_files.push(path);
        } else {
            log::warn!("{} doesn't have a valid image extension, skipping", path.display());
        }
    }

    image_files.sort();
    Ok(image_files)
}

/// Decode an image file
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let image = image::open(path).map_err(|source| LeafMarkerError::ImageNotReadable {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(InputImage {
        image,
        path: path.to_path_buf(),
    })
}

/// Encode an image; the format follows the file extension
pub fn save_image<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
    let path = path.as_ref();

    // JPEG has no alpha channel and no 16-bit support
    let is_jpeg = path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false);

    if is_jpeg && image.color().has_alpha() {
        DynamicImage::ImageRgb8(image.to_rgb8()).save(path)?;
    } else {
        image.save(path)?;
    }

    Ok(())
}

/// `<destination>/<stem><suffix>.<ext>` for an input file, `.png` when it has no extension
pub fn output_path_for(input: &Path, destination: &Path, suffix: &str) -> Result<PathBuf> {
    let stem = input.file_stem()
        .ok_or_else(|| LeafMarkerError::InvalidPath(input.to_path_buf()))?;

    // File names need not be UTF-8
    let mut name = OsString::from(stem);
    name.push(suffix);
    name.push(".");
    name.push(input.extension().unwrap_or(OsStr::new("png")));

    Ok(destination.join(name))
}

/// Where results go.
///
/// An explicit destination must already exist. Otherwise single files write
/// next to themselves and directories write to a sibling `<dir>_markers`.
pub fn resolve_destination(input: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(destination) = explicit {
        if !destination.is_dir() {
            return Err(LeafMarkerError::InvalidPath(destination.to_path_buf()));
        }
        return Ok(destination.to_path_buf());
    }

    if input.is_dir() {
        let mut name = input.file_name()
            .ok_or_else(|| LeafMarkerError::InvalidPath(input.to_path_buf()))?
            .to_os_string();
        name.push("_markers");
        let destination = input.with_file_name(name);
        fs::create_dir_all(&destination)?;
        Ok(destination)
    } else {
        Ok(input.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("leaf_marker_io_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_extension_filter() {
        assert!(has_image_extension(Path::new("a/leaf.JPG")));
        assert!(has_image_extension(Path::new("leaf.jpeg")));
        assert!(has_image_extension(Path::new("leaf.png")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("README")));
    }

    #[test]
    fn test_output_path_keeps_extension() {
        let out = output_path_for(Path::new("/data/apple leaf.JPG"), Path::new("/out"), "_marked").unwrap();
        assert_eq!(out, PathBuf::from("/out/apple leaf_marked.JPG"));

        let bare = output_path_for(Path::new("/data/scan"), Path::new("/out"), "_marked").unwrap();
        assert_eq!(bare, PathBuf::from("/out/scan_marked.png"));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_path_accepts_non_utf8_stem() {
        use std::os::unix::ffi::OsStrExt;

        let input = Path::new("/data").join(OsStr::from_bytes(b"b_\xffleaf.png"));
        let out = output_path_for(&input, Path::new("/out"), "_marked").unwrap();
        assert_eq!(out, Path::new("/out").join(OsStr::from_bytes(b"b_\xffleaf_marked.png")));
    }

    #[test]
    fn test_unreadable_file_reports_image_not_readable() {
        let dir = scratch_dir("unreadable");
        let path = dir.join("txt.png");
        fs::write(&path, "this is not an image").unwrap();

        let result = load_image(&path);
        assert!(matches!(result, Err(LeafMarkerError::ImageNotReadable { .. })));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_directory_listing_skips_other_files() {
        let dir = scratch_dir("listing");
        fs::write(dir.join("b.png"), b"").unwrap();
        fs::write(dir.join("a.jpg"), b"").unwrap();
        fs::write(dir.join("notes.txt"), b"").unwrap();

        let files = get_image_files_in_dir(&dir).unwrap();
        assert_eq!(files, vec![dir.join("a.jpg"), dir.join("b.png")]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_explicit_destination_is_rejected() {
        let missing = std::env::temp_dir().join("leaf_marker_io_missing_destination_dir");
        let result = resolve_destination(Path::new("leaf.png"), Some(&missing));
        assert!(matches!(result, Err(LeafMarkerError::InvalidPath(_))));
    }

    #[test]
    fn test_single_file_destination_is_its_directory() {
        let destination = resolve_destination(Path::new("photos/leaf.png"), None).unwrap();
        assert_eq!(destination, PathBuf::from("photos"));
        let bare = resolve_destination(Path::new("leaf.png"), None).unwrap();
        assert_eq!(bare, PathBuf::from("."));
    }
}
