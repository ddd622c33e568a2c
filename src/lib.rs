//! # MixMatch SSL
//!
//! MixMatch and ReMixMatch semi-supervised training built on the Burn framework.
//!
//! ## Features
//!
//! - **Label guessing** over K augmented views, sharpened by temperature
//! - **MixUp** between labeled and pseudo-labeled examples
//! - **Warmup** of the unsupervised loss weight, per iteration or per epoch
//! - **ReMixMatch** distribution alignment and self-supervised transform prediction
//! - **Gradient accumulation**, learning rate schedules, early stopping and checkpoints
//!
//! ## Modules
//!
//! - `ssl`: algorithm building blocks (sharpen, mixup, warmup, guess, compose, align, self-transforms)
//! - `training`: the step algorithms, the training loop, losses, hooks and recorders
//! - `model`: the classifier contract and a small demo classifier, plus configuration
//! - `dataset`: batch types, the loader contract and a synthetic dataset
//! - `utils`: logging, metrics and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mixmatch_ssl::model::{MixMatchConfig, ToyClassifierConfig};
//! use mixmatch_ssl::ssl::{Warmup, WarmupUnit};
//! use mixmatch_ssl::training::{MixMatch, Trainer, TrainingConfig};
//!
//! let model = ToyClassifierConfig::new(64, 3).init(&device);
//! let algorithm = MixMatch::new(MixMatchConfig::default())?;
//! let mut trainer = Trainer::new(model, optimizer, algorithm,
//!     Warmup::new(1.0, 1000)?, WarmupUnit::Iteration, TrainingConfig::default(), device)?;
//! trainer.fit(&mut loader, &validation)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod ssl;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{LabeledBatch, SslBatch, SslLoader, UnlabeledBatch};
pub use model::{Activation, SslModel, ToyClassifier, ToyClassifierConfig};
pub use model::{AlgorithmKind, ExperimentConfig, MixMatchConfig, ReMixMatchConfig};
pub use training::{MixMatch, ReMixMatch, SslAlgorithm, Trainer, TrainingConfig, TrainingState};
pub use utils::error::{Result, SslError};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
