//! MixUp interpolation
//!
//! Draws `lambda ~ Beta(alpha, alpha)` once per call and returns
//! `lambda * x1 + (1 - lambda) * x2` together with the same interpolation of
//! the labels. With `apply_max`, lambda is folded to `max(lambda, 1 - lambda)`
//! so the result always stays closer to the first operand.

use burn::tensor::{backend::Backend, Tensor};
use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::utils::error::{Result, SslError};

/// Result of one interpolation
#[derive(Debug, Clone)]
pub struct Mixed<B: Backend, const D: usize> {
    pub inputs: Tensor<B, D>,
    pub targets: Tensor<B, 2>,
    /// Coefficient applied to the first operand
    pub lambda: f64,
}

/// MixUp interpolator
#[derive(Debug, Clone)]
pub struct MixUp {
    alpha: f64,
    apply_max: bool,
    beta: Beta<f64>,
}

impl MixUp {
    /// Create an interpolator drawing from `Beta(alpha, alpha)`
    pub fn new(alpha: f64, apply_max: bool) -> Result<Self> {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(SslError::config(
                "alpha",
                format!("must be a finite value > 0, got {}", alpha),
            ));
        }

        let beta = Beta::new(alpha, alpha)
            .map_err(|e| SslError::config("alpha", format!("invalid Beta parameter: {}", e)))?;

        Ok(Self {
            alpha,
            apply_max,
            beta,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn apply_max(&self) -> bool {
        self.apply_max
    }

    /// Draw one mixing coefficient
    pub fn sample_lambda<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let lambda = self.beta.sample(rng);
        if self.apply_max {
            lambda.max(1.0 - lambda)
        } else {
            lambda
        }
    }

    /// Interpolate two batches and their labels with a single coefficient.
    ///
    /// # Arguments
    /// * `x1`, `x2` - inputs of identical shape
    /// * `y1`, `y2` - `[batch, classes]` labels matching the inputs row for row
    /// * `rng` - source of the coefficient
    ///
    /// # Returns
    /// * The mixed batch and the coefficient used, or a shape error
    pub fn mix<B: Backend, const D: usize, R: Rng + ?Sized>(
        &self,
        x1: Tensor<B, D>,
        x2: Tensor<B, D>,
        y1: Tensor<B, 2>,
        y2: Tensor<B, 2>,
        rng: &mut R,
    ) -> Result<Mixed<B, D>> {
        check_same_dims("mixup inputs", &x1.dims(), &x2.dims())?;
        check_same_dims("mixup labels", &y1.dims(), &y2.dims())?;

        let batch_size = x1.dims()[0];
        if y1.dims()[0] != batch_size {
            return Err(SslError::shape("mixup label rows", y1.dims()[0], batch_size));
        }

        let lambda = self.sample_lambda(rng);
        Ok(Mixed {
            inputs: x1.mul_scalar(lambda) + x2.mul_scalar(1.0 - lambda),
            targets: y1.mul_scalar(lambda) + y2.mul_scalar(1.0 - lambda),
            lambda,
        })
    }
}

fn check_same_dims(what: &str, got: &[usize], expected: &[usize]) -> Result<()> {
    for (axis, (&g, &e)) in got.iter().zip(expected).enumerate() {
        if g != e {
            return Err(SslError::shape(format!("{} (axis {})", what, axis), g, e));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;

    #[test]
    fn test_max_policy_keeps_lambda_above_half() {
        let mixup = MixUp::new(0.75, true).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..2000 {
            let lambda = mixup.sample_lambda(&mut rng);
            assert!((0.5..=1.0).contains(&lambda), "lambda = {}", lambda);
        }
    }

    #[test]
    fn test_without_max_lambda_covers_both_halves() {
        let mixup = MixUp::new(0.75, false).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let below = (0..2000)
            .map(|_| mixup.sample_lambda(&mut rng))
            .filter(|&l| l < 0.5)
            .count();
        assert!(below > 0 && below < 2000);
    }

    #[test]
    fn test_identical_operands_are_unchanged() {
        let device = Default::default();
        let mixup = MixUp::new(0.75, true).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, -2.0, 3.0], [0.5, 0.0, 4.0]], &device);
        let y = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);

        let mixed = mixup
            .mix(x.clone(), x.clone(), y.clone(), y.clone(), &mut rng)
            .unwrap();

        let got: Vec<f32> = mixed.inputs.into_data().to_vec().unwrap();
        let want: Vec<f32> = x.into_data().to_vec().unwrap();
        for (a, b) in got.iter().zip(want.iter()) {
            assert!((a - b).abs() < 1e-5);
        }

        let got: Vec<f32> = mixed.targets.into_data().to_vec().unwrap();
        let want: Vec<f32> = y.into_data().to_vec().unwrap();
        for (a, b) in got.iter().zip(want.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mixed_labels_follow_lambda() {
        let device = Default::default();
        let mixup = MixUp::new(0.75, true).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let x1 = Tensor::<TestBackend, 2>::ones([2, 3], &device);
        let x2 = Tensor::<TestBackend, 2>::zeros([2, 3], &device);
        let y1 = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [1.0, 0.0]], &device);
        let y2 = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0], [0.0, 1.0]], &device);

        let mixed = mixup.mix(x1, x2, y1, y2, &mut rng).unwrap();
        let lambda = mixed.lambda as f32;

        let inputs: Vec<f32> = mixed.inputs.into_data().to_vec().unwrap();
        assert!(inputs.iter().all(|v| (v - lambda).abs() < 1e-5));

        let targets: Vec<f32> = mixed.targets.into_data().to_vec().unwrap();
        assert!((targets[0] - lambda).abs() < 1e-5);
        assert!((targets[1] - (1.0 - lambda)).abs() < 1e-5);
    }

    #[test]
    fn test_batch_mismatch_fails_fast() {
        let device = Default::default();
        let mixup = MixUp::new(0.75, true).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let x1 = Tensor::<TestBackend, 2>::zeros([3, 2], &device);
        let x2 = Tensor::<TestBackend, 2>::zeros([4, 2], &device);
        let y1 = Tensor::<TestBackend, 2>::zeros([3, 2], &device);
        let y2 = Tensor::<TestBackend, 2>::zeros([4, 2], &device);

        let err = mixup.mix(x1, x2, y1, y2, &mut rng).unwrap_err();
        assert!(matches!(err, SslError::ShapeMismatch { got: 3, expected: 4, .. }));
    }

    #[test]
    fn test_invalid_alpha() {
        assert!(MixUp::new(0.0, true).is_err());
        assert!(MixUp::new(-0.5, false).is_err());
        assert!(MixUp::new(f64::INFINITY, true).is_err());
    }
}
