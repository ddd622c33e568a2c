//! Fully-connected classifier with an optional self-supervised head
//!
//! Inputs of any rank are flattened after the batch dimension, passed through
//! one hidden layer, then through the classification head. When configured
//! with `auxiliary_classes`, a second head on the same hidden features
//! predicts which self-transform was applied to the input.

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{backend::Backend, Tensor},
};

use crate::model::SslModel;

/// Configuration for the ToyClassifier
#[derive(Config, Debug)]
pub struct ToyClassifierConfig {
    /// Number of input features once flattened (e.g. `channels * height * width`)
    pub input_features: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Width of the hidden layer
    #[config(default = "64")]
    pub hidden_size: usize,

    /// Dropout rate applied to the hidden features
    #[config(default = "0.0")]
    pub dropout_rate: f64,

    /// Outputs of the self-supervised head (4 for rotations), none by default
    pub auxiliary_classes: Option<usize>,
}

impl ToyClassifierConfig {
    /// Initialize a new model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> ToyClassifier<B> {
        let hidden = LinearConfig::new(self.input_features, self.hidden_size).init(device);
        let head = LinearConfig::new(self.hidden_size, self.num_classes).init(device);
        let auxiliary_head = self
            .auxiliary_classes
            .map(|classes| LinearConfig::new(self.hidden_size, classes).init(device));

        ToyClassifier {
            hidden,
            relu: Relu::new(),
            dropout: DropoutConfig::new(self.dropout_rate).init(),
            head,
            auxiliary_head,
            num_classes: self.num_classes,
        }
    }
}

/// Small MLP classifier
#[derive(Module, Debug)]
pub struct ToyClassifier<B: Backend> {
    pub hidden: Linear<B>,
    pub relu: Relu,
    pub dropout: Dropout,
    pub head: Linear<B>,
    pub auxiliary_head: Option<Linear<B>>,
    num_classes: usize,
}

impl<B: Backend> ToyClassifier<B> {
    /// Number of classes of the main head
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn features<const D: usize>(&self, inputs: Tensor<B, D>) -> Tensor<B, 2> {
        let x: Tensor<B, 2> = inputs.flatten(1, D - 1);
        let x = self.hidden.forward(x);
        let x = self.relu.forward(x);
        self.dropout.forward(x)
    }
}

impl<B: Backend, const D: usize> SslModel<B, D> for ToyClassifier<B> {
    fn forward(&self, inputs: Tensor<B, D>) -> Tensor<B, 2> {
        self.head.forward(self.features(inputs))
    }

    fn forward_auxiliary(&self, inputs: Tensor<B, D>) -> Option<Tensor<B, 2>> {
        let head = self.auxiliary_head.as_ref()?;
        Some(head.forward(self.features(inputs)))
    }

    fn auxiliary_classes(&self) -> Option<usize> {
        self.auxiliary_head
            .as_ref()
            .map(|head| head.weight.dims()[1])
    }
}
