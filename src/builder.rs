//! Factory for the AlexNet-style binary classifier.
//!
//! The network is three convolution blocks followed by two wide fully
//! connected layers and a single sigmoid unit. For a 100x100 image the
//! feature maps go 47x47x48, 23x23x48, 23x23x128, 11x11x128, 5x5x192.

use log::debug;

use crate::activation::ActivationType;
use crate::error::Result;
use crate::layers::{LayerConfig, Padding};
use crate::loss::Loss;
use crate::metric::Metric;
use crate::model::Model;
use crate::optimizer::AdamConfig;
use crate::shape::InputShape;

/// The fixed layer sequence of [`like_alexnet`].
pub fn alexnet_layers() -> Vec<LayerConfig> {
    use ActivationType::{ReLU, Sigmoid};

    vec![
        LayerConfig::conv2d(48, 7, 2, Padding::Valid),
        LayerConfig::activation(ReLU),
        LayerConfig::batch_norm(),
        LayerConfig::max_pool(2),
        LayerConfig::dropout(0.5),
        LayerConfig::conv2d(128, 5, 1, Padding::Same),
        LayerConfig::activation(ReLU),
        LayerConfig::batch_norm(),
        LayerConfig::max_pool(2),
        LayerConfig::conv2d(192, 3, 2, Padding::Valid),
        LayerConfig::activation(ReLU),
        LayerConfig::batch_norm(),
        LayerConfig::flatten(),
        LayerConfig::dense(2048, ReLU),
        LayerConfig::dropout(0.5),
        LayerConfig::dense(2048, ReLU),
        LayerConfig::dropout(0.5),
        LayerConfig::dense(1, Sigmoid),
    ]
}

/// Builds and compiles the classifier for `input_shape`.
///
/// The model is compiled with Adam using `hyperparameters`, binary
/// cross-entropy loss and the accuracy metric. Inputs smaller than 29x29
/// fail with [`Error::DimensionMismatch`](crate::Error::DimensionMismatch)
/// because a pooling or convolution stage would have no output.
pub fn like_alexnet(input_shape: impl Into<InputShape>, hyperparameters: AdamConfig) -> Result<Model> {
    build(Model::new(input_shape), hyperparameters)
}

/// [`like_alexnet`] with reproducible weight initialization and dropout masks.
pub fn like_alexnet_seeded(
    input_shape: impl Into<InputShape>,
    hyperparameters: AdamConfig,
    seed: u64,
) -> Result<Model> {
    build(Model::with_seed(input_shape, seed), hyperparameters)
}

fn build(mut model: Model, hyperparameters: AdamConfig) -> Result<Model> {
    for layer in alexnet_layers() {
        model.add(layer)?;
    }
    model.compile(hyperparameters, Loss::BinaryCrossEntropy, &[Metric::Accuracy]);

    debug!(
        "built like_alexnet for input {:?}: {} layers, {} parameters",
        model.input_shape(),
        model.layers().len(),
        model.parameter_count()
    );
    Ok(model)
}
