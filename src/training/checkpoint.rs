//! Best-model checkpoints
//!
//! The trainer tracks one caller-named metric and hands the model to a
//! `CheckpointSink` whenever that metric reaches a new best.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use tracing::info;

use crate::utils::error::{Result, SslError};

/// Receives the model on every new best
pub trait CheckpointSink<B: Backend, M: Module<B>> {
    fn save_best(&mut self, model: &M, epoch: usize, metric: &str, value: f64) -> Result<()>;
}

/// Saves the best model to `<dir>/<name>.mpk` with Burn's `CompactRecorder`
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    dir: PathBuf,
    name: String,
}

impl FileCheckpoint {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Path without extension, as expected by Burn's file recorders
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Load weights saved by this checkpoint into `model`
    pub fn load<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        load_model(model, &self.path(), device)
    }
}

impl<B: Backend, M: Module<B>> CheckpointSink<B, M> for FileCheckpoint {
    fn save_best(&mut self, model: &M, epoch: usize, metric: &str, value: f64) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path();
        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .map_err(|e| SslError::Checkpoint(format!("failed to save {:?}: {:?}", path, e)))?;

        info!(
            "Checkpoint saved to {:?} (epoch {}, {} = {:.4})",
            path,
            epoch + 1,
            metric,
            value
        );
        Ok(())
    }
}

/// Load a model saved with `CompactRecorder`
pub fn load_model<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
    model
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(|e| SslError::Checkpoint(format!("failed to load {:?}: {:?}", path, e)))
}
