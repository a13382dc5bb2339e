//! Sample loading and Burn-compatible batch iteration.

use crate::sampler::{split_contiguous, ChunkSampler};
use crate::types::{BbbcError, DatasetResult, DatasetSample, SampleIndex};
use crate::{discover_layout, index_layout};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::imageops::FilterType;
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Resize all images/masks to this (width, height). If None, images
    /// must already share dimensions within a batch.
    pub target_size: Option<(u32, u32)>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self { target_size: None }
    }
}

/// A collated batch of microscopy images and their ground-truth masks.
pub struct BbbcBatch<B: Backend> {
    /// `[batch, 3, H, W]`, values in 0..1.
    pub images: Tensor<B, 4>,
    /// `[batch, 1, H, W]`, values in 0..1.
    pub masks: Tensor<B, 4>,
}

/// Index-backed loaders for the deterministic train/validation split.
pub struct BbbcLoaders {
    indices: Vec<SampleIndex>,
    train: ChunkSampler,
    val: ChunkSampler,
    cfg: DatasetConfig,
}

impl BbbcLoaders {
    /// Discover the BBBC layout under `root`, index it, and split it with
    /// `split_contiguous` (first half train, second half validation).
    pub fn from_root(root: &Path, cfg: DatasetConfig) -> DatasetResult<Self> {
        let layout = discover_layout(root)?;
        let indices = index_layout(&layout)?;
        let (train, val) = split_contiguous(indices.len());
        Ok(Self {
            indices,
            train,
            val,
            cfg,
        })
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn val_len(&self) -> usize {
        self.val.len()
    }

    pub fn train_iter(&self) -> BatchIter<'_> {
        BatchIter::new(&self.indices, self.train, self.cfg.clone())
    }

    pub fn val_iter(&self) -> BatchIter<'_> {
        BatchIter::new(&self.indices, self.val, self.cfg.clone())
    }

    /// First validation sample, decoded. Used for dashboard panes.
    pub fn first_val_sample(&self) -> DatasetResult<Option<DatasetSample>> {
        if self.val.is_empty() {
            return Ok(None);
        }
        match self.indices.get(self.val.indices().start) {
            Some(idx) => load_sample(idx, &self.cfg).map(Some),
            None => Ok(None),
        }
    }
}

/// Iterates a contiguous split in fixed-size batches, decoding samples in
/// parallel and assembling Burn tensors.
pub struct BatchIter<'a> {
    indices: &'a [SampleIndex],
    cursor: usize,
    end: usize,
    cfg: DatasetConfig,
    processed_samples: usize,
    processed_batches: usize,
    started: Instant,
    last_logged_samples: usize,
    log_every_samples: Option<usize>,
}

impl<'a> BatchIter<'a> {
    pub fn new(indices: &'a [SampleIndex], sampler: ChunkSampler, cfg: DatasetConfig) -> Self {
        let range = sampler.indices();
        let end = range.end.min(indices.len());
        let log_every_samples = log_every_from_env(std::env::var("CELLCOUNT_LOG_EVERY").ok());
        Self {
            indices,
            cursor: range.start.min(end),
            end,
            cfg,
            processed_samples: 0,
            processed_batches: 0,
            started: Instant::now(),
            last_logged_samples: 0,
            log_every_samples,
        }
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<BbbcBatch<B>>> {
        if self.cursor >= self.end {
            return Ok(None);
        }
        let batch_size = batch_size.max(1);
        let take = (self.cursor + batch_size).min(self.end);
        let slice = &self.indices[self.cursor..take];
        self.cursor = take;

        let mut loaded: Vec<(usize, DatasetResult<DatasetSample>)> = slice
            .par_iter()
            .enumerate()
            .map(|(i, idx)| (i, load_sample(idx, &self.cfg)))
            .collect();
        loaded.sort_by_key(|(i, _)| *i);

        let mut expected_size: Option<(u32, u32)> = None;
        let mut images_buf: Vec<f32> = Vec::new();
        let mut masks_buf: Vec<f32> = Vec::new();
        let mut batch_len = 0usize;

        for (_i, res) in loaded {
            let sample = res?;
            let size = (sample.width, sample.height);
            match expected_size {
                None => {
                    expected_size = Some(size);
                    let pixels = sample.width as usize * sample.height as usize;
                    images_buf.reserve(slice.len() * 3 * pixels);
                    masks_buf.reserve(slice.len() * pixels);
                }
                Some(sz) if sz != size => {
                    return Err(BbbcError::Other(format!(
                        "batch contains varying image sizes ({}x{} vs {}x{}); set a target_size to force consistency",
                        size.0, size.1, sz.0, sz.1
                    )));
                }
                _ => {}
            }
            images_buf.extend_from_slice(&sample.image_chw);
            masks_buf.extend_from_slice(&sample.mask_hw);
            batch_len += 1;
        }

        let (width, height) = match expected_size {
            Some(sz) => sz,
            None => return Ok(None),
        };
        let (w, h) = (width as usize, height as usize);

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_buf, [batch_len, 3, h, w]),
            device,
        );
        let masks = Tensor::<B, 4>::from_data(
            TensorData::new(masks_buf, [batch_len, 1, h, w]),
            device,
        );

        self.processed_samples += batch_len;
        self.processed_batches += 1;
        self.maybe_log_progress();

        Ok(Some(BbbcBatch { images, masks }))
    }

    fn maybe_log_progress(&mut self) {
        let Some(threshold) = self.log_every_samples else {
            return;
        };
        let processed_since = self
            .processed_samples
            .saturating_sub(self.last_logged_samples);
        if processed_since < threshold {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        eprintln!(
            "[dataset] batches={} samples={} elapsed={:.1}s rate={:.1} img/s",
            self.processed_batches,
            self.processed_samples,
            secs,
            self.processed_samples as f32 / secs,
        );
        self.last_logged_samples = self.processed_samples;
    }
}

/// Progress-log cadence from `CELLCOUNT_LOG_EVERY`: "off"/"0" disables,
/// a positive integer sets it, anything else warns and keeps the default.
fn log_every_from_env(raw: Option<String>) -> Option<usize> {
    let Some(val) = raw else {
        return Some(DEFAULT_LOG_EVERY_SAMPLES);
    };
    if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
        return None;
    }
    match val.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                eprintln!(
                    "[dataset] ignoring CELLCOUNT_LOG_EVERY={val:?} (expected a positive integer or 'off'); logging every {DEFAULT_LOG_EVERY_SAMPLES} samples"
                );
            });
            Some(DEFAULT_LOG_EVERY_SAMPLES)
        }
    }
}

/// Decode one image/ground-truth pair into normalized CHW / HW buffers.
pub fn load_sample(idx: &SampleIndex, cfg: &DatasetConfig) -> DatasetResult<DatasetSample> {
    if !idx.truth_path.exists() {
        return Err(BbbcError::MissingTruth {
            image: idx.image_path.clone(),
            truth: idx.truth_path.clone(),
        });
    }

    let mut img = image::open(&idx.image_path)
        .map_err(|e| BbbcError::Image {
            path: idx.image_path.clone(),
            source: e,
        })?
        .to_rgb8();
    let mut mask = image::open(&idx.truth_path)
        .map_err(|e| BbbcError::Image {
            path: idx.truth_path.clone(),
            source: e,
        })?
        .to_luma8();

    if let Some((tw, th)) = cfg.target_size {
        if img.dimensions() != (tw, th) {
            img = image::imageops::resize(&img, tw, th, FilterType::Triangle);
        }
        if mask.dimensions() != (tw, th) {
            // Nearest keeps the mask binary.
            mask = image::imageops::resize(&mask, tw, th, FilterType::Nearest);
        }
    }

    let (width, height) = img.dimensions();
    if mask.dimensions() != (width, height) {
        return Err(BbbcError::Other(format!(
            "image {} is {}x{} but ground truth {} is {}x{}",
            idx.image_path.display(),
            width,
            height,
            idx.truth_path.display(),
            mask.dimensions().0,
            mask.dimensions().1,
        )));
    }

    let pixels = width as usize * height as usize;
    let mut image_chw = Vec::with_capacity(3 * pixels);
    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                image_chw.push(img.get_pixel(x, y)[c] as f32 / 255.0);
            }
        }
    }
    let mask_hw: Vec<f32> = mask.as_raw().iter().map(|v| *v as f32 / 255.0).collect();

    Ok(DatasetSample {
        image_chw,
        mask_hw,
        width,
        height,
    })
}
