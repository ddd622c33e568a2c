//! Stratified labeled/unlabeled split
//!
//! Simulates the semi-supervised setting on a fully labeled dataset: in each
//! class a fraction of the examples keeps its label and the rest is treated
//! as unlabeled. Every class keeps at least one labeled example.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{Result, SslError};

/// Indices into the original dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSplit {
    pub labeled: Vec<usize>,
    pub unlabeled: Vec<usize>,
}

impl LabeledSplit {
    pub fn total(&self) -> usize {
        self.labeled.len() + self.unlabeled.len()
    }
}

/// Split example indices by class, keeping `labeled_ratio` of each class labeled.
///
/// # Arguments
/// * `labels` - class of every example
/// * `labeled_ratio` - fraction in `(0, 1]`, rounded per class, at least one per class
/// * `rng` - shuffles each class before the cut
pub fn stratified_split<R: Rng + ?Sized>(
    labels: &[usize],
    labeled_ratio: f64,
    rng: &mut R,
) -> Result<LabeledSplit> {
    if !(labeled_ratio > 0.0 && labeled_ratio <= 1.0) {
        return Err(SslError::config(
            "labeled_ratio",
            format!("must be in (0, 1], got {}", labeled_ratio),
        ));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(index);
    }

    let mut split = LabeledSplit {
        labeled: Vec::new(),
        unlabeled: Vec::new(),
    };

    for indices in by_class.values_mut() {
        indices.shuffle(rng);
        let n_labeled = ((indices.len() as f64 * labeled_ratio).round() as usize).clamp(1, indices.len());
        split.labeled.extend_from_slice(&indices[..n_labeled]);
        split.unlabeled.extend_from_slice(&indices[n_labeled..]);
    }

    info!(
        "Split {} examples over {} classes: {} labeled, {} unlabeled",
        labels.len(),
        by_class.len(),
        split.labeled.len(),
        split.unlabeled.len()
    );

    Ok(split)
}
