//! MixMatch training step
//!
//! 1. guess pseudo-labels for the K unlabeled views (no gradient)
//! 2. compose the mixed labeled and unlabeled batches
//! 3. forward both mixed batches
//! 4. `loss = lambda_s * L_s(p_s, ys_mix) + lambda_u * L_u(p_u, yu_mix)`

use burn::tensor::{backend::AutodiffBackend, ElementConversion};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::dataset::SslBatch;
use crate::model::config::MixMatchConfig;
use crate::model::{Activation, SslModel};
use crate::ssl::{BatchComposer, LabelGuesser, MixUp};
use crate::training::algorithm::{SslAlgorithm, StepOutput};
use crate::utils::error::{Result, SslError};
use crate::utils::metrics::TargetKind;

/// MixMatch algorithm
#[derive(Debug, Clone)]
pub struct MixMatch {
    config: MixMatchConfig,
    activation: Activation,
    guesser: LabelGuesser,
    composer: BatchComposer,
}

impl MixMatch {
    pub fn new(config: MixMatchConfig) -> Result<Self> {
        config.validate()?;

        let activation = Activation::for_targets(config.target_kind);
        let guesser = LabelGuesser::new(config.temperature, activation)?;
        let composer = BatchComposer::new(MixUp::new(config.alpha, config.apply_max)?);

        debug!(
            "MixMatch: T={}, alpha={}, lambda_s={}, lambda_u={}, K={}, criterion_u={}",
            config.temperature,
            config.alpha,
            config.lambda_s,
            config.lambda_u,
            config.n_augms,
            config.criterion_u
        );

        Ok(Self {
            config,
            activation,
            guesser,
            composer,
        })
    }

    pub fn config(&self) -> &MixMatchConfig {
        &self.config
    }
}

impl<B, M, const D: usize> SslAlgorithm<B, M, D> for MixMatch
where
    B: AutodiffBackend,
    M: SslModel<B, D>,
{
    fn name(&self) -> &'static str {
        "MixMatch"
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn target_kind(&self) -> TargetKind {
        self.config.target_kind
    }

    fn step(
        &mut self,
        model: &M,
        batch: SslBatch<B, D>,
        lambda_u: f64,
        rng: &mut ChaCha8Rng,
        device: &B::Device,
    ) -> Result<StepOutput<B>> {
        let SslBatch { labeled, unlabeled } = batch;
        let views = unlabeled.views;
        if views.len() != self.config.n_augms {
            return Err(SslError::shape("unlabeled views", views.len(), self.config.n_augms));
        }

        let yu = self.guesser.guess(model, &views)?;
        let mixed = self
            .composer
            .compose(labeled.inputs, labeled.targets, &views, yu, rng, device)?;

        let pred_s = self.activation.apply(model.forward(mixed.xs_mix), 1);
        let pred_u = self.activation.apply(model.forward(mixed.xu_mix), 1);

        let loss_s = self
            .config
            .criterion_s
            .compute(pred_s.clone(), mixed.ys_mix.clone());
        let loss_u = self
            .config
            .criterion_u
            .compute(pred_u.clone(), mixed.yu_mix.clone());

        let loss_s_value: f64 = loss_s.clone().into_scalar().elem();
        let loss_u_value: f64 = loss_u.clone().into_scalar().elem();
        let loss = loss_s.mul_scalar(self.config.lambda_s) + loss_u.mul_scalar(lambda_u);

        let kind = self.config.target_kind;
        let (score_s, score_u) = match kind {
            TargetKind::MultiClass => ("acc_s_mix", "acc_u_mix"),
            TargetKind::MultiLabel => ("fscore_s_mix", "fscore_u_mix"),
        };

        Ok(StepOutput {
            loss,
            scalars: vec![
                ("loss_s", loss_s_value),
                ("loss_u", loss_u_value),
                ("lambda_u", lambda_u),
                ("mixup_lambda_s", mixed.lambda_s),
                ("mixup_lambda_u", mixed.lambda_u),
                (score_s, kind.score(pred_s.detach(), mixed.ys_mix)),
                (score_u, kind.score(pred_u.detach(), mixed.yu_mix)),
            ],
        })
    }
}
