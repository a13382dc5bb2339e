use bbbc_dataset::{BbbcLoaders, DatasetConfig};
use clap::{Parser, ValueEnum};
use models::{density_mass, fpn_loss, Fpn, FpnConfig};
use std::path::Path;
use training::checkpoint::{self, CheckpointPaths};
use training::util::{validate_backend_choice, BackendKind};
use training::TrainBackend;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Which {
    Latest,
    Best,
}

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate an FPN checkpoint on the validation half of a BBBC dataset"
)]
struct Args {
    /// Path to the BBBC dataset root (contains *images/ and *ground_truth/).
    #[arg(long)]
    dataset: String,
    /// Checkpoint directory written by the train binary.
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: String,
    /// Which checkpoint trio to evaluate.
    #[arg(long, value_enum, default_value_t = Which::Best)]
    which: Which,
    /// Batch size.
    #[arg(long, default_value_t = 5)]
    batch_size: usize,
    /// Resize all images/masks to this square size before batching.
    #[arg(long)]
    target_size: Option<u32>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    validate_backend_choice(args.backend)?;

    let cfg = DatasetConfig {
        target_size: args.target_size.map(|s| (s, s)),
    };
    let loaders = BbbcLoaders::from_root(Path::new(&args.dataset), cfg)?;
    if loaders.val_len() == 0 {
        println!("No validation samples found under {}", args.dataset);
        return Ok(());
    }

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let paths = CheckpointPaths::new(&args.checkpoint_dir);
    let which = match args.which {
        Which::Latest => checkpoint::LATEST,
        Which::Best => checkpoint::BEST,
    };
    let model = checkpoint::load_model::<TrainBackend>(&paths, which, FpnConfig::default(), &device)
        .unwrap_or_else(|e| {
            println!("Failed to load {which} checkpoint; using fresh model ({e})");
            Fpn::<TrainBackend>::new(FpnConfig::default(), &device)
        });

    let mut losses = Vec::new();
    let mut mass_errors = Vec::new();
    let mut iter = loaders.val_iter();
    loop {
        let batch = match iter.next_batch::<TrainBackend>(args.batch_size, &device)? {
            Some(batch) => batch,
            None => break,
        };
        let pred = model.forward(batch.images);
        let loss = fpn_loss(pred.clone(), batch.masks.clone());
        losses.push(
            loss.into_data()
                .to_vec::<f32>()
                .unwrap_or_default()
                .into_iter()
                .next()
                .unwrap_or(0.0),
        );

        // Per-image difference between predicted and true density mass.
        let diff = (density_mass(pred) - density_mass(batch.masks)).abs();
        mass_errors.extend(diff.into_data().to_vec::<f32>().unwrap_or_default());
    }

    let avg_loss = mean(&losses);
    let avg_mass_err = mean(&mass_errors);
    println!(
        "Eval complete ({which}): val loss={avg_loss:.6}, mean |mass error|={avg_mass_err:.3} over {} samples",
        mass_errors.len()
    );
    Ok(())
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f32>() / xs.len() as f32
    }
}
