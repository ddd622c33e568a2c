//! Zipped labeled/unlabeled loader
//!
//! Labeled and unlabeled examples are shuffled and batched independently,
//! then zipped. The shorter side is cycled when the policy is `Max`, the
//! longer side is cut when it is `Min`. Both sides drop their last partial
//! batch, so every batch has exactly the configured size.
//!
//! Each unlabeled batch is emitted as several augmented views of the same
//! examples, following a `ViewScheme`.

use burn::tensor::backend::Backend;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::augmentation::Augmentation;
use crate::dataset::toy::{ToyBatcher, ToyItem};
use crate::dataset::{LabeledBatch, SslBatch, SslLoader, UnlabeledBatch};
use crate::utils::error::{Result, SslError};

/// Which loader sets the number of batches per epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Run until the longer loader is exhausted, cycling the shorter one
    #[default]
    Max,
    /// Stop with the shorter loader
    Min,
}

/// How the unlabeled views of a batch are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewScheme {
    /// `k` weakly augmented views (MixMatch)
    Weak(usize),
    /// One weak view followed by `strong` strongly augmented views (ReMixMatch)
    WeakThenStrong { strong: usize },
}

impl ViewScheme {
    pub fn num_views(&self) -> usize {
        match self {
            ViewScheme::Weak(k) => *k,
            ViewScheme::WeakThenStrong { strong } => strong + 1,
        }
    }
}

/// Loader over in-memory `ToyItem`s
pub struct ZipCycleLoader<B: Backend> {
    labeled: Vec<ToyItem>,
    unlabeled: Vec<ToyItem>,
    batch_size_s: usize,
    batch_size_u: usize,
    policy: CyclePolicy,
    views: ViewScheme,
    weak: Augmentation,
    strong: Augmentation,
    batcher: ToyBatcher<B>,
    image_size: usize,
    seed: u64,
}

impl<B: Backend> ZipCycleLoader<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        labeled: Vec<ToyItem>,
        unlabeled: Vec<ToyItem>,
        batch_size_s: usize,
        batch_size_u: usize,
        policy: CyclePolicy,
        views: ViewScheme,
        batcher: ToyBatcher<B>,
        image_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if labeled.is_empty() || unlabeled.is_empty() {
            return Err(SslError::Dataset(format!(
                "both loaders need examples (labeled: {}, unlabeled: {})",
                labeled.len(),
                unlabeled.len()
            )));
        }
        if batch_size_s == 0 || batch_size_u == 0 {
            return Err(SslError::config("batch_size", "must be at least 1"));
        }
        if labeled.len() < batch_size_s || unlabeled.len() < batch_size_u {
            return Err(SslError::Dataset(format!(
                "not enough examples for one full batch (labeled: {} < {} or unlabeled: {} < {})",
                labeled.len(),
                batch_size_s,
                unlabeled.len(),
                batch_size_u
            )));
        }
        if let Some(item) = labeled.iter().chain(&unlabeled).find(|item| item.label >= batcher.num_classes()) {
            return Err(SslError::Dataset(format!(
                "label {} is outside the {} classes of the batcher",
                item.label,
                batcher.num_classes()
            )));
        }
        if views.num_views() == 0 {
            return Err(SslError::config("n_augms", "at least one unlabeled view is needed"));
        }

        debug!(
            "ZipCycleLoader: {} labeled / {} unlabeled, batch sizes {}/{}, {:?}, {:?}",
            labeled.len(),
            unlabeled.len(),
            batch_size_s,
            batch_size_u,
            policy,
            views
        );

        Ok(Self {
            labeled,
            unlabeled,
            batch_size_s,
            batch_size_u,
            policy,
            views,
            weak: Augmentation::weak(),
            strong: Augmentation::strong(),
            batcher,
            image_size,
            seed,
        })
    }

    fn labeled_batches(&self) -> usize {
        self.labeled.len() / self.batch_size_s
    }

    fn unlabeled_batches(&self) -> usize {
        self.unlabeled.len() / self.batch_size_u
    }

    fn make_batch(
        &self,
        index: usize,
        labeled_order: &[usize],
        unlabeled_order: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Result<SslBatch<B, 4>> {
        let labeled_items = chunk(labeled_order, index % self.labeled_batches(), self.batch_size_s);
        let unlabeled_items = chunk(unlabeled_order, index % self.unlabeled_batches(), self.batch_size_u);

        // ReMixMatch supervises on strongly augmented labeled examples
        let labeled_augmentation = match self.views {
            ViewScheme::Weak(_) => &self.weak,
            ViewScheme::WeakThenStrong { .. } => &self.strong,
        };
        let images: Vec<Vec<f32>> = labeled_items
            .iter()
            .map(|&i| labeled_augmentation.apply(&self.labeled[i].image, self.image_size, rng))
            .collect();
        let labels: Vec<usize> = labeled_items.iter().map(|&i| self.labeled[i].label).collect();

        let views = (0..self.views.num_views())
            .map(|view| {
                let augmentation = match self.views {
                    ViewScheme::WeakThenStrong { .. } if view > 0 => &self.strong,
                    _ => &self.weak,
                };
                let images = unlabeled_items
                    .iter()
                    .map(|&i| augmentation.apply(&self.unlabeled[i].image, self.image_size, rng))
                    .collect();
                self.batcher.images(images)
            })
            .collect();

        Ok(SslBatch {
            labeled: LabeledBatch {
                inputs: self.batcher.images(images),
                targets: self.batcher.targets(&labels)?,
            },
            unlabeled: UnlabeledBatch { views },
        })
    }
}

/// The `index`-th full slice of `order` of length `size`
fn chunk(order: &[usize], index: usize, size: usize) -> &[usize] {
    let start = index * size;
    &order[start..start + size]
}

impl<B: Backend> SslLoader<B, 4> for ZipCycleLoader<B> {
    fn len(&self) -> usize {
        match self.policy {
            CyclePolicy::Max => self.labeled_batches().max(self.unlabeled_batches()),
            CyclePolicy::Min => self.labeled_batches().min(self.unlabeled_batches()),
        }
    }

    fn batches(&mut self, epoch: usize) -> Box<dyn Iterator<Item = Result<SslBatch<B, 4>>> + '_> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(epoch as u64));

        let mut labeled_order: Vec<usize> = (0..self.labeled.len()).collect();
        let mut unlabeled_order: Vec<usize> = (0..self.unlabeled.len()).collect();
        labeled_order.shuffle(&mut rng);
        unlabeled_order.shuffle(&mut rng);

        let this: &Self = self;
        Box::new(
            (0..this.len()).map(move |index| this.make_batch(index, &labeled_order, &unlabeled_order, &mut rng)),
        )
    }
}
