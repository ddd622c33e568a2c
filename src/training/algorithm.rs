//! The per-step contract between the trainer and an SSL algorithm
//!
//! An algorithm turns one batch into a weighted loss. The trainer owns
//! everything around it: backward, accumulation, optimizer updates, warmup,
//! recording and hooks.

use burn::tensor::{backend::AutodiffBackend, Tensor};
use rand_chacha::ChaCha8Rng;

use crate::dataset::SslBatch;
use crate::model::Activation;
use crate::utils::error::Result;
use crate::utils::metrics::TargetKind;

/// Weighted loss of one step plus the scalars worth recording
pub struct StepOutput<B: AutodiffBackend> {
    /// Scalar loss, still attached to the graph
    pub loss: Tensor<B, 1>,
    /// `(name, value)` pairs, recorded as `train/<name>`
    pub scalars: Vec<(&'static str, f64)>,
}

/// One semi-supervised training step
pub trait SslAlgorithm<B: AutodiffBackend, M, const D: usize> {
    fn name(&self) -> &'static str;

    /// Reject models that lack something this algorithm needs.
    ///
    /// Called once when the trainer is built, never inside the loop.
    fn check_model(&self, _model: &M) -> Result<()> {
        Ok(())
    }

    /// Activation applied to the model's logits
    fn activation(&self) -> Activation;

    fn target_kind(&self) -> TargetKind;

    /// Compute the weighted loss of one batch.
    ///
    /// # Arguments
    /// * `model` - current parameters
    /// * `batch` - labeled batch and unlabeled views
    /// * `lambda_u` - current weight of the unsupervised term
    /// * `rng` - explicit source of every random draw of the step
    /// * `device` - where new tensors are created
    fn step(
        &mut self,
        model: &M,
        batch: SslBatch<B, D>,
        lambda_u: f64,
        rng: &mut ChaCha8Rng,
        device: &B::Device,
    ) -> Result<StepOutput<B>>;

    /// Keep the state changes made by the last `step`.
    ///
    /// Called by the trainer once the step's loss is finite. A step that is
    /// never committed leaves the algorithm as it was before the step.
    fn commit_step(&mut self) {}
}
