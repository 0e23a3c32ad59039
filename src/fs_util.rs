use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::ChartError;

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, ChartError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| ChartError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| ChartError::Archive(format!("{}: {err}", zip_path.display())))?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ChartError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(ChartError::Archive(format!(
                    "zip entry path traversal detected in {}",
                    zip_path.display()
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| ChartError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| ChartError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| ChartError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| ChartError::Archive(err.to_string()))?;
        extracted.push(entry_path);
    }
    Ok(extracted)
}

pub fn validate_zip(zip_path: &Path) -> Result<(), ChartError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| ChartError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| ChartError::Archive(format!("{}: {err}", zip_path.display())))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ChartError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| ChartError::Archive(err.to_string()))?;
    }
    Ok(())
}

/// All GeoTIFFs under `root`, sorted so batch order is stable between runs.
pub fn find_tiff_files(root: &Path) -> Vec<PathBuf> {
    let mut out = find_files(root, is_tiff);
    out.sort();
    out
}

pub fn find_sample_tile(root: &Path) -> Option<PathBuf> {
    let mut tiles = find_files(root, |path| has_extension(path, &["png"]));
    tiles.sort();
    tiles.into_iter().next()
}

pub fn tiles_dir_for(tiff: &Path) -> PathBuf {
    let stem = tiff
        .file_stem()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_default();
    tiff.with_file_name(format!("{stem}_tiles"))
}

/// `path` relative to `root` with forward slashes, for use as a stable key.
pub fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn is_tiff(path: &Path) -> bool {
    has_extension(path, &["tif", "tiff"])
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| exts.iter().any(|ext| value.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn find_files<F>(root: &Path, keep: F) -> Vec<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        if let Ok(entries) = fs::read_dir(&path) {
            for entry in entries.flatten() {
                // Symlinked directories are not followed; a link cycle would never end.
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                } else if keep(&path) {
                    out.push(path);
                }
            }
        }
    }
    out
}
