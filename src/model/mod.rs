//! Model module: the classifier contract used by the trainers
//!
//! The training code never looks inside a network. It needs:
//! - `forward`: logits for the main classification head
//! - `forward_auxiliary`: logits of the self-supervised head, which only
//!   ReMixMatch requires and which is checked before training starts
//!
//! `ToyClassifier` is a small fully-connected network that implements both,
//! used by the CLI demo and the tests.

pub mod classifier;
pub mod config;

use burn::tensor::{
    activation::{sigmoid, softmax},
    backend::Backend,
    Tensor,
};
use serde::{Deserialize, Serialize};

use crate::utils::metrics::TargetKind;

pub use classifier::{ToyClassifier, ToyClassifierConfig};
pub use config::{
    AlgorithmKind, ExperimentConfig, MixMatchConfig, OptimizerKind, ReMixMatchConfig,
    TrainingConfig, WarmupConfig,
};

/// Lower bound applied to activated outputs before anything takes their log
pub const PROBABILITY_FLOOR: f64 = 2e-30;

/// Classifier contract for semi-supervised training.
///
/// `D` is the rank of the input tensors, batch dimension included.
pub trait SslModel<B: Backend, const D: usize> {
    /// Logits of the classification head, `[batch, num_classes]`
    fn forward(&self, inputs: Tensor<B, D>) -> Tensor<B, 2>;

    /// Logits of the self-supervised head, `[batch, num_transforms]`.
    ///
    /// `None` when the model has no such head.
    fn forward_auxiliary(&self, _inputs: Tensor<B, D>) -> Option<Tensor<B, 2>> {
        None
    }

    /// Number of outputs of the self-supervised head, if any
    fn auxiliary_classes(&self) -> Option<usize> {
        None
    }
}

/// Maps logits to probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Row-wise softmax, for multi-class targets
    #[default]
    Softmax,
    /// Element-wise sigmoid, for multi-label targets
    Sigmoid,
}

impl Activation {
    /// Natural activation for a kind of targets
    pub fn for_targets(kind: TargetKind) -> Self {
        match kind {
            TargetKind::MultiClass => Activation::Softmax,
            TargetKind::MultiLabel => Activation::Sigmoid,
        }
    }

    /// Activate `logits` along `dim`, clamped away from zero
    pub fn apply<B: Backend, const D: usize>(&self, logits: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
        let probs = match self {
            Activation::Softmax => softmax(logits, dim),
            Activation::Sigmoid => sigmoid(logits),
        };
        probs.clamp_min(PROBABILITY_FLOOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]], &device);

        let probs = Activation::Softmax.apply(logits, 1);
        let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_activation_is_clamped() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[-200.0, 200.0]], &device);

        let probs: Vec<f32> = Activation::Softmax.apply(logits, 1).into_data().to_vec().unwrap();
        assert!(probs[0] > 0.0);
        assert!((probs[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_activation_for_targets() {
        assert_eq!(Activation::for_targets(TargetKind::MultiClass), Activation::Softmax);
        assert_eq!(Activation::for_targets(TargetKind::MultiLabel), Activation::Sigmoid);
    }
}
