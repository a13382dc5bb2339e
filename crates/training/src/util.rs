use bbbc_dataset::{BbbcLoaders, DatasetConfig, DatasetSample};
use burn::backend::Autodiff;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use clap::{Parser, ValueEnum};
use models::{fpn_loss, Fpn, FpnConfig};
use std::path::Path;

use crate::checkpoint::{self, CheckpointMeta, CheckpointPaths};
use crate::dashboard::{self, DashboardClient};
use crate::TrainBackend;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the cell-counting FPN on a BBBC dataset")]
pub struct TrainArgs {
    /// Path to the BBBC dataset root (contains *images/ and *ground_truth/).
    #[arg(long)]
    pub dataset: String,
    /// Number of epochs.
    #[arg(long, default_value_t = 1)]
    pub num_epochs: usize,
    /// Batch size.
    #[arg(long, default_value_t = 5)]
    pub batch_size: usize,
    /// Learning rate.
    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,
    /// Continue from the latest saved checkpoint.
    #[arg(long)]
    pub resume: bool,
    /// Push per-epoch panes to a Visdom dashboard.
    #[arg(long)]
    pub display: bool,
    /// Dashboard address.
    #[arg(long, default_value = "http://localhost:8097")]
    pub display_addr: String,
    /// Checkpoint directory (latest/best trios are written here).
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,
    /// Resize all images/masks to this square size before batching.
    #[arg(long)]
    pub target_size: Option<u32>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

type ADBackend = Autodiff<TrainBackend>;

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;

    let cfg = DatasetConfig {
        target_size: args.target_size.map(|s| (s, s)),
    };
    let loaders = BbbcLoaders::from_root(Path::new(&args.dataset), cfg)
        .map_err(|e| anyhow::anyhow!("failed to index BBBC dataset at {}: {e}", args.dataset))?;
    if loaders.train_len() == 0 {
        anyhow::bail!("no training images found under {}", args.dataset);
    }
    println!(
        "dataset: {} train / {} val samples",
        loaders.train_len(),
        loaders.val_len()
    );

    let device = <ADBackend as Backend>::Device::default();
    let paths = CheckpointPaths::new(&args.checkpoint_dir);

    let mut model = Fpn::<ADBackend>::new(FpnConfig::default(), &device);
    let mut optim = AdamConfig::new().init();
    let mut lr = args.learning_rate;
    let mut best_loss = f32::INFINITY;
    let mut start_epoch = 0usize;

    if args.resume && paths.latest_exists() {
        println!("continuing from previous checkpoint...");
        let meta = checkpoint::load_meta(&paths, checkpoint::LATEST)?;
        model = checkpoint::load_model::<ADBackend>(
            &paths,
            checkpoint::LATEST,
            FpnConfig::default(),
            &device,
        )?;
        optim = checkpoint::load_optimizer(&paths, optim, &device)?;
        lr = meta.learning_rate;
        start_epoch = meta.epoch + 1;
        best_loss = checkpoint::best_loss_hint(&paths).unwrap_or(meta.avg_val_loss);
    }

    let display = match args.display {
        true => Some(DashboardClient::new(&args.display_addr)?),
        false => None,
    };
    let val_example = match display {
        Some(_) => loaders
            .first_val_sample()
            .map_err(|e| anyhow::anyhow!("failed to load validation example: {e}"))?,
        None => None,
    };

    for epoch in start_epoch..start_epoch + args.num_epochs {
        if epoch > 0 && epoch % 20 == 0 {
            lr *= 0.5;
            println!("epoch {epoch}: learning rate decayed to {lr:e}");
        }

        let (next_model, train_loss) =
            train_epoch(&loaders, model, &mut optim, lr, args.batch_size, &device)?;
        model = next_model;
        let val_loss = validate(&loaders, &model, args.batch_size, &device)?;

        let is_best = val_loss < best_loss;
        if is_best {
            best_loss = val_loss;
        }
        checkpoint::save_checkpoint(
            &paths,
            &model,
            &optim,
            &CheckpointMeta {
                epoch,
                avg_val_loss: val_loss,
                learning_rate: lr,
            },
            is_best,
        )?;

        println!(
            "epoch {epoch}: train loss {train_loss:.6}, val loss {val_loss:.6}{}",
            if is_best { " (best)" } else { "" }
        );

        if let (Some(client), Some(example)) = (&display, &val_example) {
            // Dashboard failures are warnings; training keeps going.
            if let Err(e) = push_epoch_panes(client, epoch, example, &model, val_loss, &device) {
                eprintln!("Warning: dashboard push failed: {e}");
            }
        }
    }

    println!("Saved checkpoints to {}", paths.dir().display());
    Ok(())
}

fn train_epoch<O>(
    loaders: &BbbcLoaders,
    mut model: Fpn<ADBackend>,
    optim: &mut O,
    lr: f64,
    batch_size: usize,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<(Fpn<ADBackend>, f32)>
where
    O: Optimizer<Fpn<ADBackend>, ADBackend>,
{
    let mut losses = Vec::new();
    let mut iter = loaders.train_iter();
    loop {
        let batch = match iter.next_batch::<ADBackend>(batch_size, device)? {
            Some(batch) => batch,
            None => break,
        };
        let pred = model.forward(batch.images);
        let loss = fpn_loss(pred, batch.masks);
        let loss_detached = loss.clone().detach();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);
        losses.push(scalar(loss_detached));
    }
    Ok((model, mean(&losses)))
}

fn validate(
    loaders: &BbbcLoaders,
    model: &Fpn<ADBackend>,
    batch_size: usize,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<f32> {
    let mut losses = Vec::new();
    let mut iter = loaders.val_iter();
    loop {
        let batch = match iter.next_batch::<ADBackend>(batch_size, device)? {
            Some(batch) => batch,
            None => break,
        };
        let pred = model.forward(batch.images);
        let loss = fpn_loss(pred, batch.masks).detach();
        losses.push(scalar(loss));
    }
    Ok(mean(&losses))
}

fn push_epoch_panes(
    client: &DashboardClient,
    epoch: usize,
    example: &DatasetSample,
    model: &Fpn<ADBackend>,
    val_loss: f32,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<()> {
    let (w, h) = (example.width, example.height);
    let input = Tensor::<ADBackend, 4>::from_data(
        TensorData::new(example.image_chw.clone(), [1, 3, h as usize, w as usize]),
        device,
    );
    let pred_hw: Vec<f32> = model
        .forward(input)
        .detach()
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default();

    let input_png = dashboard::rgb_png(w, h, &example.image_chw)?;
    let target_png = dashboard::gray_png(w, h, &example.mask_hw)?;
    let prediction_png = dashboard::gray_png(w, h, &pred_hw)?;
    client.push_epoch(epoch, &input_png, &target_png, &prediction_png)?;
    client.append_loss(epoch, val_loss)
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose the ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            println!("note: built with backend-wgpu; training will use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

fn scalar(t: Tensor<ADBackend, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

fn mean(losses: &[f32]) -> f32 {
    if losses.is_empty() {
        0.0
    } else {
        losses.iter().sum::<f32>() / losses.len() as f32
    }
}
