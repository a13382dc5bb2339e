use std::fs;
use std::path::Path;

use bbbc_dataset::{
    index_dataset, load_sample, BbbcError, BbbcLoaders, DatasetConfig, SampleIndex,
};
use image::{GrayImage, Luma, Rgb, RgbImage};

/// Write a synthetic BBBC-style dataset: `n` images following the
/// underscore naming convention plus their ground-truth masks.
fn write_synthetic_dataset(root: &Path, n: usize, size: u32) {
    let images_dir = root.join("synthetic_v1_images");
    let truth_dir = root.join("synthetic_v1_ground_truth");
    fs::create_dir_all(&images_dir).unwrap();
    fs::create_dir_all(&truth_dir).unwrap();

    for i in 0..n {
        let img = RgbImage::from_fn(size, size, |x, _y| {
            if x < size / 2 {
                Rgb([200, 40, 40])
            } else {
                Rgb([10, 10, 10])
            }
        });
        img.save(images_dir.join(format!("img_B{i:02}_C5_F3_s1_w1.png")))
            .unwrap();

        let mask = GrayImage::from_fn(size, size, |x, _y| {
            if x < size / 2 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        mask.save(truth_dir.join(format!("img_A{i:02}_C5_F1_s1_w1.png")))
            .unwrap();
    }
}

#[test]
fn index_pairs_images_with_ground_truth() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 3, 4);

    let indices = index_dataset(temp.path()).unwrap();
    assert_eq!(indices.len(), 3);
    // Sorted by filename; each image pairs with its row-A focus-1 mask.
    assert!(indices[0].image_path.ends_with("img_B00_C5_F3_s1_w1.png"));
    assert!(indices[0].truth_path.ends_with("img_A00_C5_F1_s1_w1.png"));
    assert!(indices[2].truth_path.ends_with("img_A02_C5_F1_s1_w1.png"));
}

#[test]
fn load_sample_normalizes_image_and_mask() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 1, 4);

    let indices = index_dataset(temp.path()).unwrap();
    let sample = load_sample(&indices[0], &DatasetConfig::default()).unwrap();
    assert_eq!(sample.width, 4);
    assert_eq!(sample.height, 4);
    assert_eq!(sample.image_chw.len(), 3 * 16);
    assert_eq!(sample.mask_hw.len(), 16);
    // Left half of the mask is 255 -> 1.0, right half 0.
    assert!((sample.mask_hw[0] - 1.0).abs() < 1e-6);
    assert!((sample.mask_hw[3]).abs() < 1e-6);
    // Red channel of the left half: 200/255.
    assert!((sample.image_chw[0] - 200.0 / 255.0).abs() < 1e-6);
}

#[test]
fn load_sample_errors_on_missing_ground_truth() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 1, 4);
    let indices = index_dataset(temp.path()).unwrap();

    let bad = SampleIndex {
        image_path: indices[0].image_path.clone(),
        truth_path: indices[0].truth_path.with_file_name("img_A99_C5_F1_s1_w1.png"),
    };
    let err = load_sample(&bad, &DatasetConfig::default()).unwrap_err();
    assert!(matches!(err, BbbcError::MissingTruth { .. }));
}

#[test]
fn loaders_split_and_batch() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 4, 4);

    let loaders = BbbcLoaders::from_root(temp.path(), DatasetConfig::default()).unwrap();
    assert_eq!(loaders.train_len(), 2);
    assert_eq!(loaders.val_len(), 2);

    let device = Default::default();
    let mut iter = loaders.train_iter();
    let batch = iter
        .next_batch::<burn_ndarray::NdArray<f32>>(2, &device)
        .unwrap()
        .unwrap();
    assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
    assert_eq!(batch.masks.dims(), [2, 1, 4, 4]);
    assert!(iter
        .next_batch::<burn_ndarray::NdArray<f32>>(2, &device)
        .unwrap()
        .is_none());
}

#[test]
fn short_final_batch_is_kept() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 6, 4);

    let loaders = BbbcLoaders::from_root(temp.path(), DatasetConfig::default()).unwrap();
    assert_eq!(loaders.train_len(), 3);

    let device = Default::default();
    let mut iter = loaders.train_iter();
    let first = iter
        .next_batch::<burn_ndarray::NdArray<f32>>(2, &device)
        .unwrap()
        .unwrap();
    assert_eq!(first.images.dims()[0], 2);
    let second = iter
        .next_batch::<burn_ndarray::NdArray<f32>>(2, &device)
        .unwrap()
        .unwrap();
    assert_eq!(second.images.dims()[0], 1);
}

#[test]
fn target_size_forces_uniform_dimensions() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 2, 6);

    let cfg = DatasetConfig {
        target_size: Some((4, 4)),
    };
    let loaders = BbbcLoaders::from_root(temp.path(), cfg).unwrap();
    let device = Default::default();
    let mut iter = loaders.train_iter();
    let batch = iter
        .next_batch::<burn_ndarray::NdArray<f32>>(1, &device)
        .unwrap()
        .unwrap();
    assert_eq!(batch.images.dims(), [1, 3, 4, 4]);
}

#[test]
fn varying_sizes_in_one_batch_error_without_target_size() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 1, 4);

    // A second, larger pair that sorts into the same batch.
    let images_dir = temp.path().join("synthetic_v1_images");
    let truth_dir = temp.path().join("synthetic_v1_ground_truth");
    RgbImage::new(6, 6)
        .save(images_dir.join("img_B01_C5_F3_s1_w1.png"))
        .unwrap();
    GrayImage::new(6, 6)
        .save(truth_dir.join("img_A01_C5_F1_s1_w1.png"))
        .unwrap();

    let device = Default::default();
    // Iterate the full index so both pairs land in the same batch.
    let indices = index_dataset(temp.path()).unwrap();
    let mut iter = bbbc_dataset::BatchIter::new(
        &indices,
        bbbc_dataset::ChunkSampler::new(2, 0),
        DatasetConfig::default(),
    );
    let err = match iter.next_batch::<burn_ndarray::NdArray<f32>>(2, &device) {
        Err(err) => err,
        Ok(_) => panic!("expected a varying-size error"),
    };
    assert!(matches!(err, BbbcError::Other(_)));
    assert!(err.to_string().contains("target_size"));
}

#[test]
fn load_sample_errors_on_mismatched_mask_dimensions() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 1, 4);

    // Overwrite the mask with one of the wrong size.
    let truth_dir = temp.path().join("synthetic_v1_ground_truth");
    GrayImage::new(6, 6)
        .save(truth_dir.join("img_A00_C5_F1_s1_w1.png"))
        .unwrap();

    let indices = index_dataset(temp.path()).unwrap();
    let err = load_sample(&indices[0], &DatasetConfig::default()).unwrap_err();
    assert!(matches!(err, BbbcError::Other(_)));
    assert!(err.to_string().contains("ground truth"));
}

#[test]
fn first_val_sample_comes_from_second_half() {
    let temp = tempfile::tempdir().unwrap();
    write_synthetic_dataset(temp.path(), 4, 4);

    let loaders = BbbcLoaders::from_root(temp.path(), DatasetConfig::default()).unwrap();
    let sample = loaders.first_val_sample().unwrap().unwrap();
    assert_eq!(sample.width, 4);
}
