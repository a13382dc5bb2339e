#![recursion_limit = "256"]

pub mod checkpoint;
pub mod dashboard;
pub mod util;

pub use checkpoint::{CheckpointMeta, CheckpointPaths};
pub use dashboard::DashboardClient;
pub use util::{run_train, BackendKind, TrainArgs};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
