//! Backend abstraction - Multi-backend support
//!
//! Training always runs on `Autodiff<DefaultBackend>`; evaluation and label
//! statistics that never need gradients run on the inner backend.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray"), not(feature = "cpu")))]
compile_error!("At least one backend (cuda, ndarray, or cpu) must be enabled!");

/// The autodiff backend used by the trainers
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device type of the selected backend
pub type Device = <DefaultBackend as Backend>::Device;

/// Get the default device
pub fn default_device() -> Device {
    Device::default()
}

/// Seed the backend generator used for parameter initialisation.
///
/// Host-side randomness (permutations, MixUp coefficients, transforms) goes
/// through the explicit `ChaCha8Rng` handed to each component; this only
/// covers what Burn draws internally.
pub fn seed_backend(seed: u64) {
    DefaultBackend::seed(seed);
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
    {
        "NdArray (CPU)"
    }
}
