//! Label-preserving transforms for the self-supervised auxiliary task
//!
//! Each example of a batch gets one transform drawn uniformly at random; the
//! model's auxiliary head then has to predict which one it was.
//!
//! - `Rotation`: 0, 90, 180 or 270 degrees on square images `[N, C, H, W]`
//! - `Flips`: identity, flip last axis, flip second-to-last axis, or both
//!   (spectrograms, where rotation makes no sense)

use burn::tensor::{backend::Backend, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ssl::one_hot;
use crate::utils::error::{Result, SslError};

/// A family of transforms whose index is a classification target
pub trait SelfTransform<B: Backend, const D: usize> {
    /// Number of distinct transforms (outputs of the auxiliary head)
    fn num_transforms(&self) -> usize;

    /// Transform every example of `inputs` with a randomly chosen member.
    ///
    /// # Returns
    /// * The transformed batch (same shape) and `[N, num_transforms]` one-hot
    ///   transform ids
    fn apply<R: Rng + ?Sized>(
        &self,
        inputs: Tensor<B, D>,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<(Tensor<B, D>, Tensor<B, 2>)>;
}

/// Applies `transform(example, id)` row by row and builds the one-hot ids
fn per_example<B, const D: usize, R, F>(
    inputs: Tensor<B, D>,
    num_transforms: usize,
    rng: &mut R,
    device: &B::Device,
    transform: F,
) -> Result<(Tensor<B, D>, Tensor<B, 2>)>
where
    B: Backend,
    R: Rng + ?Sized,
    F: Fn(Tensor<B, D>, usize) -> Tensor<B, D>,
{
    let batch_size = inputs.dims()[0];
    let ids: Vec<usize> = (0..batch_size)
        .map(|_| rng.gen_range(0..num_transforms))
        .collect();

    let rows: Vec<Tensor<B, D>> = ids
        .iter()
        .enumerate()
        .map(|(row, &id)| transform(inputs.clone().narrow(0, row, 1), id))
        .collect();

    Ok((Tensor::cat(rows, 0), one_hot(&ids, num_transforms, device)?))
}

/// Quarter-turn rotations of square images
#[derive(Debug, Clone, Copy, Default)]
pub struct Rotation;

impl Rotation {
    /// Rotate `[N, C, H, W]` counter-clockwise by `quarter_turns * 90` degrees
    pub fn rotate<B: Backend>(images: Tensor<B, 4>, quarter_turns: usize) -> Tensor<B, 4> {
        match quarter_turns % 4 {
            0 => images,
            1 => images.swap_dims(2, 3).flip([2]),
            2 => images.flip([2, 3]),
            _ => images.swap_dims(2, 3).flip([3]),
        }
    }
}

impl<B: Backend> SelfTransform<B, 4> for Rotation {
    fn num_transforms(&self) -> usize {
        4
    }

    fn apply<R: Rng + ?Sized>(
        &self,
        inputs: Tensor<B, 4>,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<(Tensor<B, 4>, Tensor<B, 2>)> {
        let [_, _, height, width] = inputs.dims();
        if height != width {
            return Err(SslError::shape("rotation image width", width, height));
        }

        per_example(inputs, 4, rng, device, Self::rotate)
    }
}

/// Flips along the two innermost axes
#[derive(Debug, Clone, Copy, Default)]
pub struct Flips;

impl Flips {
    /// Flip id: 0 none, 1 last axis, 2 second-to-last axis, 3 both
    pub fn flip<B: Backend, const D: usize>(inputs: Tensor<B, D>, id: usize) -> Tensor<B, D> {
        match id % 4 {
            0 => inputs,
            1 => inputs.flip([D as isize - 1]),
            2 => inputs.flip([D as isize - 2]),
            _ => inputs.flip([D as isize - 2, D as isize - 1]),
        }
    }
}

impl<B: Backend, const D: usize> SelfTransform<B, D> for Flips {
    fn num_transforms(&self) -> usize {
        4
    }

    fn apply<R: Rng + ?Sized>(
        &self,
        inputs: Tensor<B, D>,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<(Tensor<B, D>, Tensor<B, 2>)> {
        if D < 3 {
            return Err(SslError::shape("flip input rank", D, 3));
        }

        per_example(inputs, 4, rng, device, Self::flip)
    }
}

/// Serializable choice of transform for image batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelfTransformKind {
    #[default]
    Rotation,
    Flips,
}

impl<B: Backend> SelfTransform<B, 4> for SelfTransformKind {
    fn num_transforms(&self) -> usize {
        match self {
            SelfTransformKind::Rotation => SelfTransform::<B, 4>::num_transforms(&Rotation),
            SelfTransformKind::Flips => SelfTransform::<B, 4>::num_transforms(&Flips),
        }
    }

    fn apply<R: Rng + ?Sized>(
        &self,
        inputs: Tensor<B, 4>,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<(Tensor<B, 4>, Tensor<B, 2>)> {
        match self {
            SelfTransformKind::Rotation => Rotation.apply(inputs, rng, device),
            SelfTransformKind::Flips => Flips.apply(inputs, rng, device),
        }
    }
}
