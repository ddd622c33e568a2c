//! ReMixMatch training step
//!
//! The unlabeled part of a batch holds one weak view followed by
//! `n_augms` strong views. Per step:
//! 1. predict on the weak view and push the labeled targets and the weak
//!    predictions into the distribution aligner
//! 2. align and sharpen the weak predictions into pseudo-labels
//! 3. compose over all `n_augms + 1` views, like MixMatch
//! 4. add a consistency term on the first strong view (`u1`) and a
//!    self-supervised term on a transformed copy of it (`r`)

use burn::tensor::{
    backend::{AutodiffBackend, Backend},
    ElementConversion,
};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::SslBatch;
use crate::model::config::ReMixMatchConfig;
use crate::model::{Activation, SslModel};
use crate::ssl::{
    BatchComposer, DistributionAligner, LabelGuesser, MixUp, SelfTransform, SelfTransformKind,
    Sharpener,
};
use crate::training::algorithm::{SslAlgorithm, StepOutput};
use crate::training::loss::cross_entropy_with_targets;
use crate::utils::error::{Result, SslError};
use crate::utils::metrics::{categorical_accuracy, TargetKind};

/// Order of distribution alignment and sharpening on the weak predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlignOrder {
    #[default]
    AlignThenSharpen,
    SharpenThenAlign,
}

/// ReMixMatch algorithm
///
/// `T` is the self-transform family; its size must match the model's
/// auxiliary head, which is checked when the trainer is built.
pub struct ReMixMatch<B: Backend, T = SelfTransformKind> {
    config: ReMixMatchConfig,
    activation: Activation,
    guesser: LabelGuesser,
    sharpener: Sharpener,
    composer: BatchComposer,
    aligner: DistributionAligner<B>,
    staged: Option<DistributionAligner<B>>,
    transform: T,
}

impl<B: Backend, T> ReMixMatch<B, T> {
    pub fn new(config: ReMixMatchConfig, transform: T) -> Result<Self> {
        config.validate()?;

        let base = &config.base;
        let activation = Activation::for_targets(base.target_kind);
        let guesser = LabelGuesser::new(base.temperature, activation)?;
        let sharpener = Sharpener::new(base.temperature)?;
        let composer = BatchComposer::new(MixUp::new(base.alpha, base.apply_max)?);
        let aligner = DistributionAligner::new(config.history, config.align_epsilon)?;

        debug!(
            "ReMixMatch: T={}, alpha={}, lambda_u={}, lambda_u1={}, lambda_r={}, history={}, {:?}",
            base.temperature,
            base.alpha,
            base.lambda_u,
            config.lambda_u1,
            config.lambda_r,
            config.history,
            config.align_order
        );

        Ok(Self {
            config,
            activation,
            guesser,
            sharpener,
            composer,
            aligner,
            staged: None,
            transform,
        })
    }

    pub fn config(&self) -> &ReMixMatchConfig {
        &self.config
    }

    /// Alignment windows as of the last committed step
    pub fn aligner(&self) -> &DistributionAligner<B> {
        &self.aligner
    }
}

impl<B: Backend> ReMixMatch<B, SelfTransformKind> {
    /// Uses the transform named in the configuration
    pub fn from_config(config: ReMixMatchConfig) -> Result<Self> {
        let transform = config.self_transform;
        Self::new(config, transform)
    }
}

impl<B, M, T, const D: usize> SslAlgorithm<B, M, D> for ReMixMatch<B, T>
where
    B: AutodiffBackend,
    M: SslModel<B, D>,
    T: SelfTransform<B, D>,
{
    fn name(&self) -> &'static str {
        "ReMixMatch"
    }

    fn check_model(&self, model: &M) -> Result<()> {
        let expected = self.transform.num_transforms();
        match model.auxiliary_classes() {
            None => Err(SslError::config(
                "forward_auxiliary",
                "ReMixMatch needs a model with a self-supervised head",
            )),
            Some(classes) if classes != expected => Err(SslError::config(
                "auxiliary_classes",
                format!(
                    "self-supervised head has {} outputs but the self-transform has {} members",
                    classes, expected
                ),
            )),
            Some(_) => Ok(()),
        }
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn target_kind(&self) -> TargetKind {
        self.config.base.target_kind
    }

    fn step(
        &mut self,
        model: &M,
        batch: SslBatch<B, D>,
        lambda_u: f64,
        rng: &mut ChaCha8Rng,
        device: &B::Device,
    ) -> Result<StepOutput<B>> {
        self.staged = None;
        let base = &self.config.base;
        let SslBatch { labeled, unlabeled } = batch;
        let views = unlabeled.views;
        if views.len() != base.n_augms + 1 {
            return Err(SslError::shape("unlabeled views (weak + strong)", views.len(), base.n_augms + 1));
        }

        let pred_weak = self.guesser.average_predictions(model, &views[..1])?;

        // Window updates stay staged until the trainer commits the step
        let mut aligner = self.aligner.clone();
        aligner.add_labeled(labeled.targets.clone().detach());
        aligner.add_unlabeled(pred_weak.clone());

        let yu = match self.config.align_order {
            AlignOrder::AlignThenSharpen => self.sharpener.apply(aligner.align(pred_weak)?),
            AlignOrder::SharpenThenAlign => aligner.align(self.sharpener.apply(pred_weak))?,
        }
        .detach();
        self.staged = Some(aligner);

        let mixed = self
            .composer
            .compose(labeled.inputs, labeled.targets, &views, yu.clone(), rng, device)?;

        let xu1 = views[1].clone().detach();
        let (xu1_transformed, targets_r) = self.transform.apply(xu1.clone(), rng, device)?;

        let pred_s = self.activation.apply(model.forward(mixed.xs_mix), 1);
        let pred_u = self.activation.apply(model.forward(mixed.xu_mix), 1);
        let pred_u1 = self.activation.apply(model.forward(xu1), 1);
        let logits_r = model.forward_auxiliary(xu1_transformed).ok_or_else(|| {
            SslError::config("forward_auxiliary", "model has no self-supervised head")
        })?;
        let pred_r = Activation::Softmax.apply(logits_r, 1);

        let loss_s = base.criterion_s.compute(pred_s.clone(), mixed.ys_mix.clone());
        let loss_u = base.criterion_u.compute(pred_u.clone(), mixed.yu_mix.clone());
        let loss_u1 = base.criterion_u.compute(pred_u1, yu);
        let loss_r = cross_entropy_with_targets(pred_r.clone(), targets_r.clone());

        let scalar = |loss: &burn::tensor::Tensor<B, 1>| -> f64 { loss.clone().into_scalar().elem() };
        let values = [scalar(&loss_s), scalar(&loss_u), scalar(&loss_u1), scalar(&loss_r)];

        let loss = loss_s.mul_scalar(base.lambda_s)
            + loss_u.mul_scalar(lambda_u)
            + loss_u1.mul_scalar(self.config.lambda_u1)
            + loss_r.mul_scalar(self.config.lambda_r);

        let kind = base.target_kind;
        let (score_s, score_u) = match kind {
            TargetKind::MultiClass => ("acc_s_mix", "acc_u_mix"),
            TargetKind::MultiLabel => ("fscore_s_mix", "fscore_u_mix"),
        };

        Ok(StepOutput {
            loss,
            scalars: vec![
                ("loss_s", values[0]),
                ("loss_u", values[1]),
                ("loss_u1", values[2]),
                ("loss_r", values[3]),
                ("lambda_u", lambda_u),
                ("mixup_lambda_s", mixed.lambda_s),
                ("mixup_lambda_u", mixed.lambda_u),
                (score_s, kind.score(pred_s.detach(), mixed.ys_mix)),
                (score_u, kind.score(pred_u.detach(), mixed.yu_mix)),
                ("acc_r", categorical_accuracy(pred_r.detach(), targets_r)),
            ],
        })
    }
    fn commit_step(&mut self) {
        if let Some(aligner) = self.staged.take() {
            self.aligner = aligner;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{LabeledBatch, UnlabeledBatch};
    use crate::model::{ToyClassifier, ToyClassifierConfig};
    use crate::ssl::{one_hot, Rotation};
    use burn::backend::Autodiff;
    use burn::tensor::{Distribution, Tensor};
    use burn_ndarray::NdArray;
    use rand::SeedableRng;

    type TestBackend = Autodiff<NdArray>;
    type TestDevice = <TestBackend as Backend>::Device;

    fn images(device: &TestDevice, rows: usize) -> Tensor<TestBackend, 4> {
        Tensor::random([rows, 1, 4, 4], Distribution::Uniform(0.0, 1.0), device)
    }

    fn batch(device: &TestDevice, views: usize) -> SslBatch<TestBackend, 4> {
        SslBatch {
            labeled: LabeledBatch {
                inputs: images(device, 2),
                targets: one_hot(&[0, 1], 2, device).unwrap(),
            },
            unlabeled: UnlabeledBatch {
                views: (0..views).map(|_| images(device, 3)).collect(),
            },
        }
    }

    fn algorithm() -> ReMixMatch<TestBackend, Rotation> {
        ReMixMatch::new(ReMixMatchConfig::default(), Rotation).unwrap()
    }

    #[test]
    fn test_model_without_auxiliary_head_is_rejected() {
        let device = Default::default();
        let model = ToyClassifierConfig::new(16, 2).init::<TestBackend>(&device);

        let err = SslAlgorithm::<TestBackend, _, 4>::check_model(&algorithm(), &model).unwrap_err();
        assert!(format!("{}", err).contains("forward_auxiliary"));
    }

    #[test]
    fn test_auxiliary_head_size_must_match_transform() {
        let device = Default::default();
        let model = ToyClassifierConfig::new(16, 2)
            .with_auxiliary_classes(Some(3))
            .init::<TestBackend>(&device);

        let err = SslAlgorithm::<TestBackend, _, 4>::check_model(&algorithm(), &model).unwrap_err();
        assert!(format!("{}", err).contains("auxiliary_classes"));

        let model = ToyClassifierConfig::new(16, 2)
            .with_auxiliary_classes(Some(4))
            .init::<TestBackend>(&device);
        assert!(SslAlgorithm::<TestBackend, _, 4>::check_model(&algorithm(), &model).is_ok());
    }

    #[test]
    fn test_step_updates_windows_and_reports_all_terms() {
        let device = Default::default();
        let model = ToyClassifierConfig::new(16, 2)
            .with_hidden_size(8)
            .with_auxiliary_classes(Some(4))
            .init::<TestBackend>(&device);
        let mut algorithm = algorithm();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..2 {
            let out = algorithm
                .step(&model, batch(&device, 3), 1.5, &mut rng, &device)
                .unwrap();

            let names: Vec<&str> = out.scalars.iter().map(|(n, _)| *n).collect();
            for expected in ["loss_s", "loss_u", "loss_u1", "loss_r", "acc_r", "lambda_u"] {
                assert!(names.contains(&expected), "missing {}", expected);
            }
            let loss: f64 = out.loss.into_scalar().elem();
            assert!(loss.is_finite());
            SslAlgorithm::<TestBackend, ToyClassifier<TestBackend>, 4>::commit_step(&mut algorithm);
        }

        assert_eq!(algorithm.aligner().labeled().len(), 2);
        assert_eq!(algorithm.aligner().unlabeled().len(), 2);
    }

    #[test]
    fn test_uncommitted_step_leaves_windows_untouched() {
        let device = Default::default();
        let model = ToyClassifierConfig::new(16, 2)
            .with_auxiliary_classes(Some(4))
            .init::<TestBackend>(&device);
        let mut algorithm = algorithm();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        algorithm
            .step(&model, batch(&device, 3), 1.0, &mut rng, &device)
            .unwrap();
        assert!(algorithm.aligner().unlabeled().is_empty());

        algorithm
            .step(&model, batch(&device, 3), 1.0, &mut rng, &device)
            .unwrap();
        SslAlgorithm::<TestBackend, ToyClassifier<TestBackend>, 4>::commit_step(&mut algorithm);
        assert_eq!(algorithm.aligner().labeled().len(), 1);
        assert_eq!(algorithm.aligner().unlabeled().len(), 1);
    }

    #[test]
    fn test_weak_view_is_required() {
        let device = Default::default();
        let model = ToyClassifierConfig::new(16, 2)
            .with_auxiliary_classes(Some(4))
            .init::<TestBackend>(&device);
        let mut algorithm = algorithm();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        // n_augms = 2 strong views, so 3 views are expected
        let result = algorithm.step(&model, batch(&device, 2), 1.0, &mut rng, &device);
        assert!(matches!(result, Err(SslError::ShapeMismatch { got: 2, expected: 3, .. })));
    }

    #[test]
    fn test_sharpen_then_align_keeps_pseudo_labels_on_simplex() {
        let device = Default::default();
        let model = ToyClassifierConfig::new(16, 2)
            .with_auxiliary_classes(Some(4))
            .init::<TestBackend>(&device);
        let config = ReMixMatchConfig {
            align_order: AlignOrder::SharpenThenAlign,
            ..Default::default()
        };
        let mut algorithm = ReMixMatch::<TestBackend, _>::from_config(config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let out = algorithm
            .step(&model, batch(&device, 3), 1.0, &mut rng, &device)
            .unwrap();
        let loss_u1 = out
            .scalars
            .iter()
            .find(|(n, _)| *n == "loss_u1")
            .map(|(_, v)| *v)
            .unwrap();
        assert!(loss_u1.is_finite() && loss_u1 >= 0.0);
    }
}
