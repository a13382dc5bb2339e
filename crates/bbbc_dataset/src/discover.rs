//! Dataset path discovery and filename-based ground-truth association.
//!
//! BBBC releases ship as two sibling directories (e.g. `BBBC005_v1_images/`
//! and `BBBC005_v1_ground_truth/`), with the ground-truth file for an image
//! derivable from the image's own filename. The convention is brittle and
//! dataset-specific, so mapping failures are hard errors.

use crate::types::{BbbcError, BbbcLayout, DatasetResult, SampleIndex};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["tif", "tiff", "png"];

/// Locate the `*images` and `*ground_truth` subdirectories under `root`.
///
/// When several candidates match, the lexicographically first one wins.
pub fn discover_layout(root: &Path) -> DatasetResult<BbbcLayout> {
    let entries = fs::read_dir(root).map_err(|e| BbbcError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut image_dirs: Vec<PathBuf> = Vec::new();
    let mut truth_dirs: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.ends_with("ground_truth") {
            truth_dirs.push(path);
        } else if name.ends_with("images") {
            image_dirs.push(path);
        }
    }
    image_dirs.sort();
    truth_dirs.sort();

    let images_dir = image_dirs.into_iter().next().ok_or_else(|| BbbcError::Layout {
        root: root.to_path_buf(),
        msg: "no subdirectory ending in 'images' found".to_string(),
    })?;
    let truth_dir = truth_dirs.into_iter().next().ok_or_else(|| BbbcError::Layout {
        root: root.to_path_buf(),
        msg: "no subdirectory ending in 'ground_truth' found".to_string(),
    })?;

    Ok(BbbcLayout {
        images_dir,
        truth_dir,
    })
}

/// Derive the ground-truth filename for an image filename.
///
/// Filenames are underscore-delimited (e.g.
/// `SIMCEPImages_B12_C25_F7_s05_w1.TIF`). Ground truth collapses the well
/// row to `A` (token 1) and the focus level to `F1` (token 3); every other
/// token, including the extension-bearing tail, carries over unchanged.
pub fn truth_name_for(image_name: &str) -> DatasetResult<String> {
    let mut tokens: Vec<String> = image_name.split('_').map(str::to_string).collect();
    if tokens.len() < 4 {
        return Err(BbbcError::Naming {
            name: image_name.to_string(),
            msg: format!("expected at least 4 underscore-delimited tokens, got {}", tokens.len()),
        });
    }
    // Byte index 1 is only valid if the leading character is ASCII.
    let row_tail = tokens[1].get(1..).ok_or_else(|| BbbcError::Naming {
        name: image_name.to_string(),
        msg: format!("well-row token '{}' does not start with an ASCII character", tokens[1]),
    })?;
    tokens[1] = format!("A{row_tail}");
    tokens[3] = "F1".to_string();
    Ok(tokens.join("_"))
}

/// Enumerate image files under `root` and pair each with its derived
/// ground-truth path. Sorted by filename for a deterministic ordering.
pub fn index_dataset(root: &Path) -> DatasetResult<Vec<SampleIndex>> {
    let layout = discover_layout(root)?;
    index_layout(&layout)
}

pub fn index_layout(layout: &BbbcLayout) -> DatasetResult<Vec<SampleIndex>> {
    let entries = fs::read_dir(&layout.images_dir).map_err(|e| BbbcError::Io {
        path: layout.images_dir.clone(),
        source: e,
    })?;

    let mut image_paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        })
        .collect();
    image_paths.sort();

    let mut indices = Vec::with_capacity(image_paths.len());
    for image_path in image_paths {
        let name = image_path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BbbcError::Naming {
                name: image_path.display().to_string(),
                msg: "non-UTF-8 filename".to_string(),
            })?;
        let truth_path = layout.truth_dir.join(truth_name_for(name)?);
        indices.push(SampleIndex {
            image_path,
            truth_path,
        });
    }
    Ok(indices)
}
