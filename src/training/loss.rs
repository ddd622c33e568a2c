//! Loss functions on probability targets
//!
//! All losses take activated predictions (probabilities) and soft targets of
//! the same `[batch, classes]` shape, and reduce to a mean scalar.

use std::fmt;
use std::str::FromStr;

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::model::PROBABILITY_FLOOR;
use crate::utils::error::{Result, SslError};
use crate::utils::metrics::TargetKind;

/// Selectable loss criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    /// Cross-entropy against probability vectors
    #[serde(rename = "ce")]
    CrossEntropy,
    /// Mean squared error between probability vectors
    #[serde(rename = "mse")]
    Mse,
    /// Binary cross-entropy, for multi-hot targets
    #[serde(rename = "bce")]
    BinaryCrossEntropy,
}

impl LossKind {
    /// Parse a criterion name, reporting `param` on failure
    pub fn parse(param: &str, name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "ce" | "cross_entropy" => Ok(LossKind::CrossEntropy),
            "mse" => Ok(LossKind::Mse),
            "bce" | "binary_cross_entropy" => Ok(LossKind::BinaryCrossEntropy),
            other => Err(SslError::config(
                param,
                format!("unknown loss '{}' (expected ce, mse or bce)", other),
            )),
        }
    }

    /// Supervised criterion matching a kind of targets
    pub fn for_targets(kind: TargetKind) -> Self {
        match kind {
            TargetKind::MultiClass => LossKind::CrossEntropy,
            TargetKind::MultiLabel => LossKind::BinaryCrossEntropy,
        }
    }

    /// Mean loss of `probs` against `targets`
    pub fn compute<B: Backend>(&self, probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            LossKind::CrossEntropy => cross_entropy_with_targets(probs, targets),
            LossKind::Mse => mean_squared_error(probs, targets),
            LossKind::BinaryCrossEntropy => binary_cross_entropy(probs, targets),
        }
    }
}

impl FromStr for LossKind {
    type Err = SslError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse("criterion", s)
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossKind::CrossEntropy => write!(f, "ce"),
            LossKind::Mse => write!(f, "mse"),
            LossKind::BinaryCrossEntropy => write!(f, "bce"),
        }
    }
}

/// `mean_i( -sum_c targets[i, c] * log(probs[i, c]) )`
pub fn cross_entropy_with_targets<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_probs = probs.clamp_min(PROBABILITY_FLOOR).log();
    (targets * log_probs).sum_dim(1).neg().mean()
}

/// Mean over all elements of `(probs - targets)^2`
pub fn mean_squared_error<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (probs - targets).powf_scalar(2.0).mean()
}

/// Mean over all elements of `-(t log p + (1 - t) log(1 - p))`
pub fn binary_cross_entropy<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let probs = probs.clamp(PROBABILITY_FLOOR, 1.0 - 1e-7);
    let positive = targets.clone() * probs.clone().log();
    let negative = targets.neg().add_scalar(1.0) * probs.neg().add_scalar(1.0).log();
    (positive + negative).neg().mean()
}
