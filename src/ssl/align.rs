//! Distribution alignment
//!
//! Two FIFO windows keep the mean class distribution of the last H labeled
//! batches and of the last H unlabeled predictions. Pseudo-labels are then
//! rescaled by `mean_labeled / mean_unlabeled` and renormalized, which pulls
//! the marginal of the guesses towards the marginal of the labels.

use std::collections::VecDeque;

use burn::tensor::{backend::Backend, Tensor};

use crate::utils::error::{Result, SslError};

/// Default lower bound for the alignment denominators
pub const DEFAULT_ALIGN_EPSILON: f64 = 1e-6;

/// Bounded window of per-batch mean distributions
#[derive(Debug, Clone)]
pub struct RunningDistribution<B: Backend> {
    name: String,
    capacity: usize,
    window: VecDeque<Tensor<B, 2>>,
}

impl<B: Backend> RunningDistribution<B> {
    /// Create an empty window holding at most `capacity` entries
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SslError::config("history", "must be at least 1"));
        }

        Ok(Self {
            name: name.into(),
            capacity,
            window: VecDeque::with_capacity(capacity),
        })
    }

    /// Push the row-mean of `batch` (`[N, classes]`), evicting the oldest entry when full
    pub fn add(&mut self, batch: Tensor<B, 2>) {
        let mean = batch.detach().mean_dim(0);
        self.window.push_back(mean);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    /// Mean over the window, `[1, classes]`
    pub fn mean(&self) -> Result<Tensor<B, 2>> {
        if self.window.is_empty() {
            return Err(SslError::EmptyWindow(self.name.clone()));
        }

        let entries: Vec<Tensor<B, 2>> = self.window.iter().cloned().collect();
        Ok(Tensor::cat(entries, 0).mean_dim(0))
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Labeled and unlabeled windows plus the alignment rule
#[derive(Debug, Clone)]
pub struct DistributionAligner<B: Backend> {
    labeled: RunningDistribution<B>,
    unlabeled: RunningDistribution<B>,
    epsilon: f64,
}

impl<B: Backend> DistributionAligner<B> {
    pub fn new(history: usize, epsilon: f64) -> Result<Self> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(SslError::config(
                "align_epsilon",
                format!("must be a finite value > 0, got {}", epsilon),
            ));
        }

        Ok(Self {
            labeled: RunningDistribution::new("labeled", history)?,
            unlabeled: RunningDistribution::new("unlabeled", history)?,
            epsilon,
        })
    }

    /// Record a batch of labels
    pub fn add_labeled(&mut self, targets: Tensor<B, 2>) {
        self.labeled.add(targets);
    }

    /// Record a batch of (unsharpened) unlabeled predictions
    pub fn add_unlabeled(&mut self, predictions: Tensor<B, 2>) {
        self.unlabeled.add(predictions);
    }

    pub fn labeled(&self) -> &RunningDistribution<B> {
        &self.labeled
    }

    pub fn unlabeled(&self) -> &RunningDistribution<B> {
        &self.unlabeled
    }

    /// `yu * mean_labeled / max(mean_unlabeled, eps)`, then L1-renormalized per row
    pub fn align(&self, yu: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let mean_labeled = self.labeled.mean()?;
        let mean_unlabeled = self.unlabeled.mean()?.clamp_min(self.epsilon);

        let classes = yu.dims()[1];
        if mean_labeled.dims()[1] != classes {
            return Err(SslError::shape("aligned classes", classes, mean_labeled.dims()[1]));
        }

        let scaled = yu.detach() * mean_labeled / mean_unlabeled;
        let norm = scaled.clone().abs().sum_dim(1).clamp_min(self.epsilon);
        Ok(scaled / norm)
    }
}
