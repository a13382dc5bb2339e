//! BBBC dataset loading, splitting, and Burn-compatible batching.
//!
//! This crate provides utilities for:
//! - Discovering the `*images`/`*ground_truth` directory pair of a BBBC
//!   release
//! - Deriving ground-truth filenames from image filenames
//! - Deterministic contiguous train/validation splitting
//! - Burn-compatible batch iteration over decoded image/mask pairs

pub mod batch;
pub mod discover;
pub mod sampler;
pub mod types;

pub use batch::{load_sample, BatchIter, BbbcBatch, BbbcLoaders, DatasetConfig};
pub use discover::{discover_layout, index_dataset, index_layout, truth_name_for};
pub use sampler::{split_contiguous, ChunkSampler};
pub use types::{BbbcError, BbbcLayout, DatasetResult, DatasetSample, SampleIndex};
