//! Burn ML models for cell segmentation/counting in the cellcount stack.
//!
//! This crate defines the network architecture used for density-map
//! regression on microscopy images:
//! - `Fpn`: a small Feature Pyramid Network producing a single-channel
//!   density map at input resolution.
//!
//! These are pure Burn Modules; the `training` crate owns the epoch loop,
//! checkpointing, and dataset plumbing.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::Tensor;

#[derive(Debug, Clone, Copy)]
pub struct FpnConfig {
    /// Channel width of the stem; doubled at each downsampling stage.
    pub base_channels: usize,
    /// Channel width of the lateral/top-down pyramid levels.
    pub pyramid_channels: usize,
}

impl Default for FpnConfig {
    fn default() -> Self {
        Self {
            base_channels: 16,
            pyramid_channels: 64,
        }
    }
}

/// Feature Pyramid Network for density-map regression.
///
/// Shapes:
/// - Input images: `[B, 3, H, W]`, values in 0..1
/// - Output density: `[B, 1, H, W]`, sigmoid-bounded to 0..1
#[derive(Debug, Module)]
pub struct Fpn<B: Backend> {
    stem: Conv2d<B>,
    down1: Conv2d<B>,
    down2: Conv2d<B>,
    down3: Conv2d<B>,
    lateral1: Conv2d<B>,
    lateral2: Conv2d<B>,
    lateral3: Conv2d<B>,
    smooth1: Conv2d<B>,
    smooth2: Conv2d<B>,
    head_hidden: Conv2d<B>,
    head_out: Conv2d<B>,
}

impl<B: Backend> Fpn<B> {
    pub fn new(cfg: FpnConfig, device: &B::Device) -> Self {
        let base = cfg.base_channels.max(1);
        let pyr = cfg.pyramid_channels.max(1);

        let stem = Conv2dConfig::new([3, base], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let down1 = Conv2dConfig::new([base, base * 2], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let down2 = Conv2dConfig::new([base * 2, base * 4], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let down3 = Conv2dConfig::new([base * 4, base * 8], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let lateral1 = Conv2dConfig::new([base * 2, pyr], [1, 1]).init(device);
        let lateral2 = Conv2dConfig::new([base * 4, pyr], [1, 1]).init(device);
        let lateral3 = Conv2dConfig::new([base * 8, pyr], [1, 1]).init(device);

        let smooth1 = Conv2dConfig::new([pyr, pyr], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let smooth2 = Conv2dConfig::new([pyr, pyr], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let head_hidden = Conv2dConfig::new([pyr, pyr], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let head_out = Conv2dConfig::new([pyr, 1], [1, 1]).init(device);

        Self {
            stem,
            down1,
            down2,
            down3,
            lateral1,
            lateral2,
            lateral3,
            smooth1,
            smooth2,
            head_hidden,
            head_out,
        }
    }

    /// Forward pass returning a density map at the input resolution.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();

        let c1 = relu(self.stem.forward(input));
        let c2 = relu(self.down1.forward(c1));
        let c3 = relu(self.down2.forward(c2.clone()));
        let c4 = relu(self.down3.forward(c3.clone()));

        // Top-down pathway: lateral 1x1 projections merged with upsampled
        // coarser levels, smoothed by 3x3 convs.
        let p4 = self.lateral3.forward(c4);

        let l3 = self.lateral2.forward(c3);
        let [_, _, h3, w3] = l3.dims();
        let p3 = self.smooth2.forward(l3 + upsample_to(p4, [h3, w3]));

        let l2 = self.lateral1.forward(c2);
        let [_, _, h2, w2] = l2.dims();
        let p2 = self.smooth1.forward(l2 + upsample_to(p3, [h2, w2]));

        let x = relu(self.head_hidden.forward(p2));
        let density = sigmoid(self.head_out.forward(x));
        upsample_to(density, [height, width])
    }
}

fn upsample_to<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    interpolate(x, size, InterpolateOptions::new(InterpolateMode::Nearest))
}

/// MSE between the predicted density map and the ground-truth mask.
pub fn fpn_loss<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    MseLoss::new().forward(pred, target, Reduction::Mean)
}

/// Per-sample density mass (sum over the map), shape `[B]`.
///
/// On masks this is proportional to total cell area; comparing it against
/// the predicted mass gives a cheap counting error proxy.
pub fn density_mass<B: Backend>(density: Tensor<B, 4>) -> Tensor<B, 1> {
    let batch = density.dims()[0];
    density
        .reshape([batch as i32, -1])
        .sum_dim(1)
        .reshape([batch])
}

pub mod prelude {
    pub use super::{density_mass, fpn_loss, Fpn, FpnConfig};
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn forward_preserves_input_resolution() {
        let device = Default::default();
        let model = Fpn::<B>::new(FpnConfig::default(), &device);
        let input = Tensor::<B, 4>::zeros([2, 3, 16, 24], &device);
        let out = model.forward(input);
        assert_eq!(out.dims(), [2, 1, 16, 24]);
    }

    #[test]
    fn forward_handles_odd_sizes() {
        let device = Default::default();
        let model = Fpn::<B>::new(FpnConfig::default(), &device);
        let input = Tensor::<B, 4>::zeros([1, 3, 17, 23], &device);
        let out = model.forward(input);
        assert_eq!(out.dims(), [1, 1, 17, 23]);
    }

    #[test]
    fn density_is_bounded() {
        let device = Default::default();
        let model = Fpn::<B>::new(FpnConfig::default(), &device);
        let input = Tensor::<B, 4>::ones([1, 3, 8, 8], &device);
        let out: Vec<f32> = model
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        assert!(!out.is_empty());
        assert!(out.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.0));
    }

    #[test]
    fn loss_is_zero_on_identical_maps() {
        let device = Default::default();
        let map = Tensor::<B, 4>::ones([1, 1, 4, 4], &device);
        let loss: Vec<f32> = fpn_loss(map.clone(), map)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        assert!((loss[0]).abs() < 1e-7);
    }

    #[test]
    fn density_mass_sums_per_sample() {
        let device = Default::default();
        let map = Tensor::<B, 4>::ones([2, 1, 3, 3], &device);
        let mass: Vec<f32> = density_mass(map)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        assert_eq!(mass.len(), 2);
        assert!((mass[0] - 9.0).abs() < 1e-5);
        assert!((mass[1] - 9.0).abs() < 1e-5);
    }
}
