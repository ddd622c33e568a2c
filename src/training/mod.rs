//! Training module for semi-supervised learning
//!
//! This module provides:
//! - The `SslAlgorithm` step contract and its two implementations
//! - The generic training loop with gradient accumulation and warmup
//! - Loss functions, learning rate schedules and post-epoch hooks
//! - Scalar recording and best-model checkpoints
//!
//! ## MixMatch family
//!
//! Every step:
//! 1. Guess sharpened pseudo-labels for the unlabeled views (no gradient)
//! 2. Shuffle labeled and unlabeled examples together and MixUp both halves
//! 3. Weight the supervised and unsupervised losses, the latter ramped up by a warmup
//!
//! ReMixMatch adds distribution alignment, a consistency term on a raw
//! strong view and a self-supervised transform prediction task.

pub mod accumulation;
pub mod algorithm;
pub mod checkpoint;
pub mod hooks;
pub mod loss;
pub mod mixmatch;
pub mod recorder;
pub mod remixmatch;
pub mod scheduler;
pub mod trainer;

// Re-export main types for convenience
pub use accumulation::AccumulationPolicy;
pub use algorithm::{SslAlgorithm, StepOutput};
pub use checkpoint::{load_model, CheckpointSink, FileCheckpoint};
pub use hooks::{BestMetric, EarlyStopping, HookAction, LrSchedulerHook, MetricMode, PostEpochHook};
pub use loss::LossKind;
pub use mixmatch::MixMatch;
pub use recorder::{min_max, EpochMetrics, JsonLinesRecorder, MemoryRecorder, MinMax, NullRecorder, Recorder};
pub use remixmatch::{AlignOrder, ReMixMatch};
pub use scheduler::LRScheduler;
pub use trainer::{Trainer, TrainingState};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
