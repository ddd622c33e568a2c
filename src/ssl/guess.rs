//! Label guessing
//!
//! Pseudo-labels for an unlabeled batch: each of the K augmented views goes
//! through the model on its own, the activated predictions are averaged
//! element-wise, and the average is sharpened. Inputs and outputs are
//! detached so nothing here contributes to the gradient.

use burn::tensor::{backend::Backend, Tensor};

use crate::model::{Activation, SslModel};
use crate::ssl::sharpen::Sharpener;
use crate::utils::error::{Result, SslError};

/// Produces sharpened pseudo-labels from multiple views
#[derive(Debug, Clone, Copy)]
pub struct LabelGuesser {
    sharpener: Sharpener,
    activation: Activation,
}

impl LabelGuesser {
    pub fn new(temperature: f64, activation: Activation) -> Result<Self> {
        Ok(Self {
            sharpener: Sharpener::new(temperature)?,
            activation,
        })
    }

    pub fn temperature(&self) -> f64 {
        self.sharpener.temperature()
    }

    /// Mean of the activated predictions over `views`, detached
    pub fn average_predictions<B, M, const D: usize>(
        &self,
        model: &M,
        views: &[Tensor<B, D>],
    ) -> Result<Tensor<B, 2>>
    where
        B: Backend,
        M: SslModel<B, D>,
    {
        let (first, rest) = views
            .split_first()
            .ok_or_else(|| SslError::shape("unlabeled views", 0, 1))?;

        let batch_size = first.dims()[0];
        let mut sum = self.predict(model, first.clone());
        for view in rest {
            if view.dims()[0] != batch_size {
                return Err(SslError::shape("unlabeled view rows", view.dims()[0], batch_size));
            }
            sum = sum + self.predict(model, view.clone());
        }

        Ok(sum.div_scalar(views.len() as f64).detach())
    }

    /// Sharpened average prediction over `views`.
    ///
    /// # Arguments
    /// * `model` - classifier; left in whatever mode the caller uses
    /// * `views` - K >= 1 augmentations of the same batch, same example order
    ///
    /// # Returns
    /// * `[batch, classes]` pseudo-labels on the simplex
    pub fn guess<B, M, const D: usize>(&self, model: &M, views: &[Tensor<B, D>]) -> Result<Tensor<B, 2>>
    where
        B: Backend,
        M: SslModel<B, D>,
    {
        let mean = self.average_predictions(model, views)?;
        Ok(self.sharpener.apply(mean).detach())
    }

    fn predict<B, M, const D: usize>(&self, model: &M, view: Tensor<B, D>) -> Tensor<B, 2>
    where
        B: Backend,
        M: SslModel<B, D>,
    {
        let logits = model.forward(view.detach());
        self.activation.apply(logits, 1).detach()
    }
}
