//! Core types and error definitions for bbbc_dataset.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, BbbcError>;

#[derive(Debug, Error)]
pub enum BbbcError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("dataset layout error under {root}: {msg}")]
    Layout { root: PathBuf, msg: String },
    #[error("cannot derive ground-truth name from {name}: {msg}")]
    Naming { name: String, msg: String },
    #[error("ground-truth file missing for image {image}: expected {truth}")]
    MissingTruth { image: PathBuf, truth: PathBuf },
    #[error("{0}")]
    Other(String),
}

/// One indexed image/ground-truth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    pub image_path: PathBuf,
    pub truth_path: PathBuf,
}

/// A decoded sample ready for batch assembly.
#[derive(Debug, Clone)]
pub struct DatasetSample {
    /// Image in CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    /// Ground-truth mask in HW layout, normalized to [0, 1].
    pub mask_hw: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

/// Resolved locations of the image and ground-truth directories.
#[derive(Debug, Clone)]
pub struct BbbcLayout {
    pub images_dir: PathBuf,
    pub truth_dir: PathBuf,
}
