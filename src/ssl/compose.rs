//! MixMatch batch composition
//!
//! Given a labeled batch `(xs, ys)` of Ns rows, K unlabeled views of Nu rows
//! and their pseudo-labels `yu`:
//! 1. the K views are stacked view after view into K*Nu rows and `yu` is
//!    tiled K times to match
//! 2. labeled and unlabeled rows are concatenated and shuffled with one
//!    permutation shared by inputs and labels
//! 3. the labeled batch is mixed with the first Ns shuffled rows, the
//!    unlabeled rows with the remaining K*Nu
//!
//! The outputs are detached: they are inputs and targets for the next forward
//! pass, not something to differentiate through.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::ssl::mixup::MixUp;
use crate::utils::error::{Result, SslError};

/// Output of `BatchComposer::compose`
#[derive(Debug, Clone)]
pub struct MixedBatch<B: Backend, const D: usize> {
    /// `[Ns, ...]`
    pub xs_mix: Tensor<B, D>,
    /// `[Ns, classes]`
    pub ys_mix: Tensor<B, 2>,
    /// `[K * Nu, ...]`
    pub xu_mix: Tensor<B, D>,
    /// `[K * Nu, classes]`
    pub yu_mix: Tensor<B, 2>,
    pub lambda_s: f64,
    pub lambda_u: f64,
}

/// Builds the mixed labeled and unlabeled batches of a MixMatch step
#[derive(Debug, Clone)]
pub struct BatchComposer {
    mixup: MixUp,
}

impl BatchComposer {
    pub fn new(mixup: MixUp) -> Self {
        Self { mixup }
    }

    pub fn mixup(&self) -> &MixUp {
        &self.mixup
    }

    /// Compose the mixed batches.
    ///
    /// # Arguments
    /// * `xs`, `ys` - labeled inputs and their `[Ns, classes]` label rows
    /// * `views` - K unlabeled views, each `[Nu, ...]` with the trailing shape of `xs`
    /// * `yu` - `[Nu, classes]` pseudo-labels shared by all views
    /// * `rng` - source of the permutation and of both mixing coefficients
    /// * `device` - where the permutation indices are created
    pub fn compose<B: Backend, const D: usize, R: Rng + ?Sized>(
        &self,
        xs: Tensor<B, D>,
        ys: Tensor<B, 2>,
        views: &[Tensor<B, D>],
        yu: Tensor<B, 2>,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<MixedBatch<B, D>> {
        let num_labeled = xs.dims()[0];
        let num_unlabeled = yu.dims()[0];
        let num_views = views.len();

        if num_views == 0 {
            return Err(SslError::shape("unlabeled views", 0, 1));
        }
        if num_labeled == 0 || num_unlabeled == 0 {
            return Err(SslError::shape("batch rows", 0, 1));
        }
        if ys.dims()[0] != num_labeled {
            return Err(SslError::shape("labeled label rows", ys.dims()[0], num_labeled));
        }
        if ys.dims()[1] != yu.dims()[1] {
            return Err(SslError::shape("pseudo-label classes", yu.dims()[1], ys.dims()[1]));
        }
        for view in views {
            let dims = view.dims();
            if dims[0] != num_unlabeled {
                return Err(SslError::shape("unlabeled view rows", dims[0], num_unlabeled));
            }
            for axis in 1..D {
                if dims[axis] != xs.dims()[axis] {
                    return Err(SslError::shape(
                        format!("unlabeled view axis {}", axis),
                        dims[axis],
                        xs.dims()[axis],
                    ));
                }
            }
        }

        let num_flat = num_views * num_unlabeled;
        let xu_flat = Tensor::cat(views.to_vec(), 0).detach();
        let yu_multi = Tensor::cat(vec![yu.detach(); num_views], 0);

        let xs = xs.detach();
        let ys = ys.detach();
        let w_x = Tensor::cat(vec![xs.clone(), xu_flat.clone()], 0);
        let w_y = Tensor::cat(vec![ys.clone(), yu_multi.clone()], 0);

        let mut order: Vec<i64> = (0..(num_labeled + num_flat) as i64).collect();
        order.shuffle(rng);
        let permutation =
            Tensor::<B, 1, Int>::from_data(TensorData::new(order, [num_labeled + num_flat]), device);

        let w_x = w_x.select(0, permutation.clone());
        let w_y = w_y.select(0, permutation);

        let mixed_s = self.mixup.mix(
            xs,
            w_x.clone().narrow(0, 0, num_labeled),
            ys,
            w_y.clone().narrow(0, 0, num_labeled),
            rng,
        )?;
        let mixed_u = self.mixup.mix(
            xu_flat,
            w_x.narrow(0, num_labeled, num_flat),
            yu_multi,
            w_y.narrow(0, num_labeled, num_flat),
            rng,
        )?;

        Ok(MixedBatch {
            xs_mix: mixed_s.inputs.detach(),
            ys_mix: mixed_s.targets.detach(),
            xu_mix: mixed_u.inputs.detach(),
            yu_mix: mixed_u.targets.detach(),
            lambda_s: mixed_s.lambda,
            lambda_u: mixed_u.lambda,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssl::one_hot;
    use burn_ndarray::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;

    fn composer() -> BatchComposer {
        BatchComposer::new(MixUp::new(0.75, true).unwrap())
    }

    #[test]
    fn test_output_shapes_and_simplex_rows() {
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let xs = Tensor::<TestBackend, 4>::ones([4, 1, 3, 3], &device);
        let ys = one_hot::<TestBackend>(&[0, 1, 2, 1], 3, &device).unwrap();
        let views = vec![
            Tensor::<TestBackend, 4>::zeros([4, 1, 3, 3], &device),
            Tensor::<TestBackend, 4>::zeros([4, 1, 3, 3], &device).add_scalar(0.5),
        ];
        let yu = Tensor::<TestBackend, 2>::from_floats(
            [[0.2, 0.3, 0.5], [0.9, 0.05, 0.05], [0.1, 0.8, 0.1], [1.0, 0.0, 0.0]],
            &device,
        );

        let mixed = composer()
            .compose(xs, ys, &views, yu, &mut rng, &device)
            .unwrap();

        assert_eq!(mixed.xs_mix.dims(), [4, 1, 3, 3]);
        assert_eq!(mixed.ys_mix.dims(), [4, 3]);
        assert_eq!(mixed.xu_mix.dims(), [8, 1, 3, 3]);
        assert_eq!(mixed.yu_mix.dims(), [8, 3]);
        assert!(mixed.lambda_s >= 0.5 && mixed.lambda_u >= 0.5);

        for labels in [mixed.ys_mix, mixed.yu_mix] {
            let sums: Vec<f32> = labels.clone().sum_dim(1).into_data().to_vec().unwrap();
            assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
            let values: Vec<f32> = labels.into_data().to_vec().unwrap();
            assert!(values.iter().all(|v| *v >= -1e-6));
        }
    }

    #[test]
    fn test_identical_rows_are_preserved() {
        // When every row is the same, any permutation and any lambda leave it unchanged.
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let xs = Tensor::<TestBackend, 2>::ones([2, 3], &device);
        let ys = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5], [0.5, 0.5]], &device);
        let views = vec![Tensor::<TestBackend, 2>::ones([2, 3], &device)];
        let yu = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5], [0.5, 0.5]], &device);

        let mixed = composer()
            .compose(xs, ys, &views, yu, &mut rng, &device)
            .unwrap();

        let values: Vec<f32> = mixed.xu_mix.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_view_shape_mismatch() {
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let xs = Tensor::<TestBackend, 2>::ones([2, 3], &device);
        let ys = one_hot::<TestBackend>(&[0, 1], 2, &device).unwrap();
        let views = vec![Tensor::<TestBackend, 2>::ones([3, 3], &device)];
        let yu = one_hot::<TestBackend>(&[0, 1], 2, &device).unwrap();

        let err = composer()
            .compose(xs, ys, &views, yu, &mut rng, &device)
            .unwrap_err();
        assert!(matches!(err, SslError::ShapeMismatch { got: 3, expected: 2, .. }));
    }

    #[test]
    fn test_no_views() {
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let xs = Tensor::<TestBackend, 2>::ones([2, 3], &device);
        let ys = one_hot::<TestBackend>(&[0, 1], 2, &device).unwrap();
        let yu = one_hot::<TestBackend>(&[0, 1], 2, &device).unwrap();

        assert!(composer()
            .compose(xs, ys, &[], yu, &mut rng, &device)
            .is_err());
    }

    #[test]
    fn test_outputs_are_detached_from_the_graph() {
        type AutodiffBackend = burn::backend::Autodiff<NdArray>;
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let xs = Tensor::<AutodiffBackend, 2>::ones([2, 3], &device).require_grad();
        let ys = one_hot::<AutodiffBackend>(&[0, 1], 2, &device).unwrap().require_grad();
        let views = vec![
            Tensor::<AutodiffBackend, 2>::zeros([2, 3], &device).require_grad(),
            Tensor::<AutodiffBackend, 2>::ones([2, 3], &device).require_grad(),
        ];
        let yu = Tensor::<AutodiffBackend, 2>::from_floats([[0.7, 0.3], [0.4, 0.6]], &device).require_grad();

        let mixed = composer()
            .compose(xs, ys, &views, yu, &mut rng, &device)
            .unwrap();

        assert!(!mixed.xs_mix.is_require_grad());
        assert!(!mixed.ys_mix.is_require_grad());
        assert!(!mixed.xu_mix.is_require_grad());
        assert!(!mixed.yu_mix.is_require_grad());
    }
}
