//! Building blocks of MixMatch and ReMixMatch
//!
//! Each component is independent of the training loop:
//! - `sharpen`: temperature sharpening of probability rows
//! - `mixup`: MixUp interpolation with a Beta-distributed coefficient
//! - `warmup`: linear ramp of the unsupervised loss weight
//! - `guess`: pseudo-labels from K augmented views, without gradient
//! - `compose`: the MixMatch batch composition (tile, shuffle, mix)
//! - `align`: running class-distribution alignment (ReMixMatch)
//! - `self_transform`: label-preserving transforms for the auxiliary task
//!
//! Every random draw goes through an explicitly passed generator and every
//! tensor that is created lands on an explicitly passed device.

pub mod align;
pub mod compose;
pub mod guess;
pub mod mixup;
pub mod self_transform;
pub mod sharpen;
pub mod warmup;

use burn::tensor::{backend::Backend, Tensor, TensorData};

use crate::utils::error::{Result, SslError};

pub use align::{DistributionAligner, RunningDistribution};
pub use compose::{BatchComposer, MixedBatch};
pub use guess::LabelGuesser;
pub use mixup::{MixUp, Mixed};
pub use self_transform::{Flips, Rotation, SelfTransform, SelfTransformKind};
pub use sharpen::{sharpen, Sharpener};
pub use warmup::{Warmup, WarmupState, WarmupUnit};

/// Build a `[indices.len(), num_classes]` one-hot tensor
///
/// Every index must be below `num_classes`.
pub fn one_hot<B: Backend>(indices: &[usize], num_classes: usize, device: &B::Device) -> Result<Tensor<B, 2>> {
    let mut data = vec![0.0f32; indices.len() * num_classes];
    for (row, &class) in indices.iter().enumerate() {
        if class >= num_classes {
            return Err(SslError::shape(format!("class index of row {}", row), class, num_classes));
        }
        data[row * num_classes + class] = 1.0;
    }

    Ok(Tensor::from_floats(TensorData::new(data, [indices.len(), num_classes]), device))
}
