//! MixMatch / ReMixMatch CLI
//!
//! Trains the demo classifier on the synthetic shapes dataset with either
//! algorithm, writing the configuration, step scalars, per-epoch history and
//! checkpoints to a timestamped run directory. The best checkpoint is
//! reloaded and evaluated once training ends.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    module::{AutodiffModule, Module},
    optim::{decay::WeightDecayConfig, AdamConfig, Optimizer, SgdConfig},
    record::CompactRecorder,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use mixmatch_ssl::backend::{backend_name, default_device, seed_backend, DefaultBackend, Device, TrainingBackend};
use mixmatch_ssl::dataset::{stratified_split, LabeledBatch, SslLoader, ToyBatcher, ToyShapes, ViewScheme, ZipCycleLoader};
use mixmatch_ssl::model::{AlgorithmKind, ExperimentConfig, OptimizerKind, ToyClassifier, ToyClassifierConfig};
use mixmatch_ssl::ssl::{SelfTransform, Warmup};
use mixmatch_ssl::training::{
    min_max, BestMetric, EarlyStopping, FileCheckpoint, JsonLinesRecorder, LrSchedulerHook, MixMatch,
    ReMixMatch, SslAlgorithm, Trainer,
};
use mixmatch_ssl::utils::logging::{init_logging, LogConfig};

type Model = ToyClassifier<TrainingBackend>;

/// MixMatch and ReMixMatch semi-supervised training
#[derive(Parser, Debug)]
#[command(name = "mixmatch_ssl")]
#[command(version)]
#[command(about = "MixMatch / ReMixMatch semi-supervised training with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train on the synthetic shapes dataset
    Train {
        /// Algorithm: mixmatch or remixmatch (overrides the config file)
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Experiment configuration (JSON); the toy preset when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Parent directory of the run directories
        #[arg(short, long, default_value = "output/runs")]
        output_dir: String,
    },

    /// Print (or save) the default experiment configuration
    Config {
        /// Algorithm of the preset
        #[arg(short, long, default_value = "mixmatch")]
        algorithm: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            algorithm,
            config,
            epochs,
            seed,
            output_dir,
        } => {
            print_banner();
            cmd_train(algorithm.as_deref(), config.as_deref(), epochs, seed, &output_dir)?;
        }

        Commands::Config { algorithm, output } => {
            cmd_config(&algorithm, output.as_deref())?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ==================================================================
    MixMatch SSL - semi-supervised training with Burn + Rust
 ==================================================================
  "#
        .green()
    );
}

fn cmd_config(algorithm: &str, output: Option<&Path>) -> Result<()> {
    let config = ExperimentConfig::toy(algorithm.parse()?);
    match output {
        Some(path) => {
            config.save(path)?;
            println!("{} {}", "Configuration written to".green(), path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn cmd_train(
    algorithm: Option<&str>,
    config_path: Option<&Path>,
    epochs: Option<usize>,
    seed: Option<u64>,
    output_dir: &str,
) -> Result<()> {
    let algorithm: Option<AlgorithmKind> = algorithm.map(str::parse).transpose()?;

    let mut config = match config_path {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ExperimentConfig::toy(algorithm.unwrap_or_default()),
    };
    if let Some(algorithm) = algorithm {
        config.algorithm = algorithm;
    }
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }
    if let Some(seed) = seed {
        config.training.seed = seed;
    }
    config.validate()?;

    seed_backend(config.training.seed);
    let device = default_device();

    let run_dir = Path::new(output_dir).join(format!(
        "{}_{}",
        config.algorithm.to_string().to_lowercase(),
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    std::fs::create_dir_all(&run_dir)?;
    config.save(&run_dir.join("config.json"))?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Algorithm:     {}", config.algorithm.to_string().yellow());
    println!("  Backend:       {}", backend_name());
    println!("  Epochs:        {}", config.training.epochs);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Optimizer:     {:?}", config.training.optimizer);
    println!("  Seed:          {}", config.training.seed);
    println!("  Run directory: {}", run_dir.display());
    println!();

    // Data
    let data = &config.data;
    let (train, val) = ToyShapes::train_val(data)?;
    let mut split_rng = ChaCha8Rng::seed_from_u64(data.seed);
    let split = stratified_split(&train.labels(), data.labeled_ratio, &mut split_rng)?;

    let ssl = match config.algorithm {
        AlgorithmKind::MixMatch => &config.mixmatch,
        AlgorithmKind::ReMixMatch => &config.remixmatch.base,
    };
    let views = match config.algorithm {
        AlgorithmKind::MixMatch => ViewScheme::Weak(ssl.n_augms),
        AlgorithmKind::ReMixMatch => ViewScheme::WeakThenStrong { strong: ssl.n_augms },
    };

    let mut loader = ZipCycleLoader::new(
        train.subset(&split.labeled),
        train.subset(&split.unlabeled),
        data.batch_size_s,
        data.batch_size_u,
        data.cycle,
        views,
        ToyBatcher::<TrainingBackend>::new(device.clone(), data.image_size, data.num_classes),
        data.image_size,
        data.seed,
    )?;
    let validation = val.labeled_batches::<DefaultBackend>(64, &device)?;

    info!(
        "{} labeled / {} unlabeled training images, {} validation images, {} batches per epoch",
        split.labeled.len(),
        split.unlabeled.len(),
        val.items().len(),
        loader.len()
    );

    // Model
    let auxiliary_classes = match config.algorithm {
        AlgorithmKind::MixMatch => None,
        AlgorithmKind::ReMixMatch => Some(SelfTransform::<TrainingBackend, 4>::num_transforms(
            &config.remixmatch.self_transform,
        )),
    };
    let model: Model = ToyClassifierConfig::new(data.input_features(), data.num_classes)
        .with_hidden_size(config.hidden_size)
        .with_auxiliary_classes(auxiliary_classes)
        .init(&device);

    let warmup_steps = ssl.warmup.resolve_steps(loader.len(), config.training.epochs);
    let warmup = Warmup::new(ssl.lambda_u, warmup_steps)?;

    let weight_decay = (config.training.weight_decay > 0.0)
        .then(|| WeightDecayConfig::new(config.training.weight_decay as f64));

    let run = Run {
        config: &config,
        warmup,
        loader: &mut loader,
        validation: &validation,
        run_dir: &run_dir,
        device,
    };

    match (config.algorithm, config.training.optimizer) {
        (AlgorithmKind::MixMatch, OptimizerKind::Adam) => run.execute(
            model,
            AdamConfig::new().with_weight_decay(weight_decay).init(),
            MixMatch::new(config.mixmatch.clone())?,
        ),
        (AlgorithmKind::MixMatch, OptimizerKind::Sgd) => run.execute(
            model,
            SgdConfig::new().with_weight_decay(weight_decay).init(),
            MixMatch::new(config.mixmatch.clone())?,
        ),
        (AlgorithmKind::ReMixMatch, OptimizerKind::Adam) => run.execute(
            model,
            AdamConfig::new().with_weight_decay(weight_decay).init(),
            ReMixMatch::from_config(config.remixmatch.clone())?,
        ),
        (AlgorithmKind::ReMixMatch, OptimizerKind::Sgd) => run.execute(
            model,
            SgdConfig::new().with_weight_decay(weight_decay).init(),
            ReMixMatch::from_config(config.remixmatch.clone())?,
        ),
    }
}

/// Everything a training run needs besides the optimizer and the algorithm
struct Run<'a> {
    config: &'a ExperimentConfig,
    warmup: Warmup,
    loader: &'a mut ZipCycleLoader<TrainingBackend>,
    validation: &'a [LabeledBatch<DefaultBackend, 4>],
    run_dir: &'a Path,
    device: Device,
}

impl Run<'_> {
    fn execute<O, A>(self, model: Model, optimizer: O, algorithm: A) -> Result<()>
    where
        O: Optimizer<Model, TrainingBackend>,
        A: SslAlgorithm<TrainingBackend, Model, 4>,
    {
        let training = &self.config.training;
        let ssl = match self.config.algorithm {
            AlgorithmKind::MixMatch => &self.config.mixmatch,
            AlgorithmKind::ReMixMatch => &self.config.remixmatch.base,
        };

        let recorder = JsonLinesRecorder::create(&self.run_dir.join("scalars.jsonl"))?;
        let fresh_model = model.clone();
        let best_checkpoint = FileCheckpoint::new(self.run_dir, "best_model");
        let mut trainer: Trainer<_, _, _, _, 4> = Trainer::new(
            model,
            optimizer,
            algorithm,
            self.warmup,
            ssl.warmup.unit,
            training.clone(),
            self.device.clone(),
        )?
        .with_recorder(recorder);

        // The scheduler runs first so later hooks see this epoch's learning rate unchanged
        if let Some(scheduler) = &training.lr_scheduler {
            trainer = trainer.with_hook(LrSchedulerHook::new(scheduler.clone()));
        }
        if let Some(metric) = &training.checkpoint_metric {
            trainer = trainer.with_checkpoint(
                BestMetric::new(metric.clone(), training.checkpoint_mode),
                best_checkpoint.clone(),
            );
            if let Some(patience) = training.early_stopping_patience {
                trainer = trainer.with_hook(EarlyStopping::new(metric.clone(), training.checkpoint_mode, patience));
            }
        }

        let history = trainer.fit(self.loader, self.validation)?;

        std::fs::write(
            self.run_dir.join("history.json"),
            serde_json::to_string_pretty(&history)?,
        )?;
        std::fs::write(
            self.run_dir.join("metrics_min_max.json"),
            serde_json::to_string_pretty(&min_max(&history))?,
        )?;
        trainer
            .model()
            .clone()
            .save_file(self.run_dir.join("final_model"), &CompactRecorder::new())
            .map_err(|e| anyhow::anyhow!("failed to save final model: {:?}", e))?;

        println!();
        println!("{}", "Training Summary:".cyan().bold());
        println!("  Epochs run:      {}", history.len());
        println!("  Optimizer steps: {}", trainer.state().optimizer_steps);
        if let Some(last) = history.last() {
            for (name, value) in last.iter().filter(|(name, _)| name.starts_with("val/")) {
                println!("  {:16} {:.4}", format!("{}:", name), value);
            }
            if let Some(loss) = last.get("train/loss") {
                println!("  {:16} {:.4}", "train/loss:", loss);
            }
        }

        // Only written once a validation metric reached a new best
        let best_file = best_checkpoint.path().with_extension("mpk");
        if training.checkpoint_metric.is_some() && best_file.exists() {
            let best = best_checkpoint.load::<TrainingBackend, _>(fresh_model, &self.device)?;
            let metrics = trainer.evaluate_model(&best.valid(), self.validation);
            std::fs::write(
                self.run_dir.join("best_eval.json"),
                serde_json::to_string_pretty(&metrics)?,
            )?;

            println!("{}", "Best checkpoint:".cyan().bold());
            for (name, value) in metrics.iter() {
                println!("  {:16} {:.4}", format!("{}:", name), value);
            }
        }

        if trainer.state().stopped_early {
            println!("  {}", "Stopped early".yellow());
        }
        println!("  Outputs in {}", self.run_dir.display().to_string().green());

        Ok(())
    }
}
