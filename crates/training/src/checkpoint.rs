//! Checkpoint persistence.
//!
//! Every epoch writes a "latest" trio (model weights, optimizer state,
//! JSON metadata) under a fixed checkpoint directory; a "best" trio is
//! written alongside it whenever the validation loss strictly improves.

use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use models::{Fpn, FpnConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Stem of the per-epoch checkpoint trio.
pub const LATEST: &str = "fpn_latest";
/// Stem of the best-so-far checkpoint trio.
pub const BEST: &str = "fpn_best";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub avg_val_loss: f32,
    /// Effective learning rate after decay; resume restores this so the
    /// halving schedule is cumulative across runs.
    pub learning_rate: f64,
}

#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    dir: PathBuf,
}

impl CheckpointPaths {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Extensionless stems: the recorder appends its own extension.
    fn model_stem(&self, which: &str) -> PathBuf {
        self.dir.join(which)
    }

    fn optim_stem(&self, which: &str) -> PathBuf {
        self.dir.join(format!("{which}_optim"))
    }

    fn meta_file(&self, which: &str) -> PathBuf {
        self.dir.join(format!("{which}.json"))
    }

    pub fn latest_exists(&self) -> bool {
        self.meta_file(LATEST).is_file() && self.dir.join(format!("{LATEST}.bin")).is_file()
    }

    pub fn best_exists(&self) -> bool {
        self.meta_file(BEST).is_file()
    }
}

/// Persist the latest checkpoint trio, and the best trio when `is_best`.
pub fn save_checkpoint<B, O>(
    paths: &CheckpointPaths,
    model: &Fpn<B>,
    optim: &O,
    meta: &CheckpointMeta,
    is_best: bool,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<Fpn<B>, B>,
{
    fs::create_dir_all(paths.dir())?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

    let mut targets = vec![LATEST];
    if is_best {
        targets.push(BEST);
    }
    for which in targets {
        model
            .clone()
            .save_file(paths.model_stem(which), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save {which} model checkpoint: {e}"))?;
        recorder
            .record(optim.to_record(), paths.optim_stem(which))
            .map_err(|e| anyhow::anyhow!("failed to save {which} optimizer state: {e}"))?;
        fs::write(paths.meta_file(which), serde_json::to_vec_pretty(meta)?)?;
    }
    Ok(())
}

pub fn load_meta(paths: &CheckpointPaths, which: &str) -> anyhow::Result<CheckpointMeta> {
    let path = paths.meta_file(which);
    let raw = fs::read(&path)
        .map_err(|e| anyhow::anyhow!("failed to read checkpoint metadata {}: {e}", path.display()))?;
    serde_json::from_slice(&raw)
        .map_err(|e| anyhow::anyhow!("malformed checkpoint metadata {}: {e}", path.display()))
}

pub fn load_model<B: Backend>(
    paths: &CheckpointPaths,
    which: &str,
    cfg: FpnConfig,
    device: &B::Device,
) -> anyhow::Result<Fpn<B>> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    Fpn::<B>::new(cfg, device)
        .load_file(paths.model_stem(which), &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load {which} model checkpoint: {e}"))
}

/// Restore the optimizer's moment tensors from the latest checkpoint.
pub fn load_optimizer<B, O>(
    paths: &CheckpointPaths,
    optim: O,
    device: &B::Device,
) -> anyhow::Result<O>
where
    B: AutodiffBackend,
    O: Optimizer<Fpn<B>, B>,
{
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(paths.optim_stem(LATEST), device)
        .map_err(|e| anyhow::anyhow!("failed to load optimizer state: {e}"))?;
    Ok(optim.load_record(record))
}

/// Best validation loss on disk, if a best checkpoint exists.
pub fn best_loss_hint(paths: &CheckpointPaths) -> Option<f32> {
    load_meta(paths, BEST).ok().map(|m| m.avg_val_loss)
}
