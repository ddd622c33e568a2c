//! Metrics on probability tensors
//!
//! MixMatch targets are probability rows rather than class indices, so the
//! metrics here compare two `[batch, classes]` float tensors:
//! - categorical accuracy (argmax agreement) for multi-class problems
//! - micro-averaged F-score on thresholded rows for multi-label problems

use std::fmt;

use burn::tensor::{backend::Backend, ElementConversion, Tensor};
use serde::{Deserialize, Serialize};

/// Decision threshold used for multi-label predictions
pub const MULTILABEL_THRESHOLD: f64 = 0.5;

/// Kind of targets the classifier is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// One class per example, one-hot or soft targets
    #[default]
    MultiClass,
    /// Several classes per example, multi-hot targets
    MultiLabel,
}

impl TargetKind {
    /// Short metric name used in recorder keys (`acc` or `fscore`)
    pub fn metric_name(&self) -> &'static str {
        match self {
            TargetKind::MultiClass => "acc",
            TargetKind::MultiLabel => "fscore",
        }
    }

    /// Score predictions against targets with the metric of this kind
    pub fn score<B: Backend>(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> f64 {
        match self {
            TargetKind::MultiClass => categorical_accuracy(pred, target),
            TargetKind::MultiLabel => multilabel_fscore(pred, target, MULTILABEL_THRESHOLD),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::MultiClass => write!(f, "multi-class"),
            TargetKind::MultiLabel => write!(f, "multi-label"),
        }
    }
}

/// Fraction of rows whose argmax agrees between `pred` and `target`
pub fn categorical_accuracy<B: Backend>(pred: Tensor<B, 2>, target: Tensor<B, 2>) -> f64 {
    let [batch_size, _] = pred.dims();
    if batch_size == 0 {
        return 0.0;
    }

    let correct: i64 = pred
        .argmax(1)
        .equal(target.argmax(1))
        .int()
        .sum()
        .into_scalar()
        .elem();

    correct as f64 / batch_size as f64
}

/// Micro-averaged F1 between thresholded predictions and multi-hot targets.
///
/// Returns 1.0 when neither side has a single positive.
pub fn multilabel_fscore<B: Backend>(pred: Tensor<B, 2>, target: Tensor<B, 2>, threshold: f64) -> f64 {
    let pred_pos = pred.greater_equal_elem(threshold).float();
    let target_pos = target.greater_equal_elem(0.5).float();

    let tp: f64 = (pred_pos.clone() * target_pos.clone())
        .sum()
        .into_scalar()
        .elem();
    let predicted: f64 = pred_pos.sum().into_scalar().elem();
    let actual: f64 = target_pos.sum().into_scalar().elem();

    let denom = predicted + actual;
    if denom == 0.0 {
        1.0
    } else {
        2.0 * tp / denom
    }
}
