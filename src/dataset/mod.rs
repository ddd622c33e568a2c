//! Dataset module: batch types, the loader contract and a synthetic dataset
//!
//! Training consumes `SslBatch`es: a labeled batch with probability-row
//! targets plus one or more augmented views of an unlabeled batch. Anything
//! that can hand out a finite sequence of them per epoch is an `SslLoader`.
//!
//! The rest of the module builds such loaders for the CLI demo and the tests:
//! - `toy`: `ToyShapes`, small single-channel images with one pattern per class
//! - `split`: stratified labeled/unlabeled split
//! - `augmentation`: weak and strong host-side augmentations
//! - `loader`: `ZipCycleLoader`, zipping labeled and unlabeled batches

pub mod augmentation;
pub mod loader;
pub mod split;
pub mod toy;

use burn::tensor::{backend::Backend, Tensor};

use crate::utils::error::Result;

pub use augmentation::Augmentation;
pub use loader::{CyclePolicy, ViewScheme, ZipCycleLoader};
pub use split::{stratified_split, LabeledSplit};
pub use toy::{ToyBatcher, ToyDataConfig, ToyItem, ToyShapes};

/// Labeled inputs with `[batch, classes]` target rows
#[derive(Clone, Debug)]
pub struct LabeledBatch<B: Backend, const D: usize> {
    pub inputs: Tensor<B, D>,
    pub targets: Tensor<B, 2>,
}

/// Augmented views of the same unlabeled examples, in the same order
#[derive(Clone, Debug)]
pub struct UnlabeledBatch<B: Backend, const D: usize> {
    pub views: Vec<Tensor<B, D>>,
}

/// One training step worth of data
#[derive(Clone, Debug)]
pub struct SslBatch<B: Backend, const D: usize> {
    pub labeled: LabeledBatch<B, D>,
    pub unlabeled: UnlabeledBatch<B, D>,
}

/// Source of training batches
pub trait SslLoader<B: Backend, const D: usize> {
    /// Number of batches per epoch, known ahead
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh finite iterator over the batches of `epoch`
    fn batches(&mut self, epoch: usize) -> Box<dyn Iterator<Item = Result<SslBatch<B, D>>> + '_>;
}

/// Pre-built batches, replayed identically every epoch
impl<B: Backend, const D: usize> SslLoader<B, D> for Vec<SslBatch<B, D>> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn batches(&mut self, _epoch: usize) -> Box<dyn Iterator<Item = Result<SslBatch<B, D>>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}
