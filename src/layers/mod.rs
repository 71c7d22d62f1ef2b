pub mod activation;
pub mod batch_norm;
pub mod conv2d;
pub mod dropout;
pub mod feed_forward;
pub mod flatten;
pub mod max_pool;

use std::fmt::Debug;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::initializer::WeightInitStrategy;
use crate::shape::Shape;

pub use activation::ActivationLayer;
pub use batch_norm::BatchNormLayer;
pub use conv2d::{Conv2DLayer, Padding};
pub use dropout::DropoutLayer;
pub use feed_forward::FeedForwardLayer;
pub use flatten::FlattenLayer;
pub use max_pool::MaxPoolLayer;

/// Whether a forward pass is part of training.
///
/// Dropout and batch normalization behave differently in the two modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

/// A trainable tensor paired with the gradient accumulated for it.
pub struct Param<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
}

pub trait Layer: Debug {
    fn name(&self) -> &str;
    fn config(&self) -> LayerConfig;
    fn input_shape(&self) -> Shape;
    fn output_shape(&self) -> Shape;

    /// Runs the layer on a batch; axis 0 of `input` is the batch axis.
    fn forward(&mut self, input: &ArrayD<f32>, mode: Mode) -> Result<ArrayD<f32>>;

    /// Accumulates parameter gradients and returns the gradient for the input
    /// of the most recent forward pass.
    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    fn parameters(&mut self) -> Vec<Param<'_>> {
        Vec::new()
    }

    /// Current values of all weights, trainable or not.
    fn weights(&self) -> Vec<ArrayViewD<'_, f32>> {
        Vec::new()
    }

    fn zero_grads(&mut self) {}

    fn parameter_count(&self) -> usize {
        0
    }

    fn trainable_parameter_count(&self) -> usize {
        self.parameter_count()
    }

    fn clone_box(&self) -> Box<dyn Layer>;
}

impl Clone for Box<dyn Layer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Serializable description of a layer, mirroring Keras' `class_name`/`config` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum LayerConfig {
    Conv2D {
        filters: usize,
        kernel_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
        #[serde(default)]
        kernel_initializer: WeightInitStrategy,
    },
    Activation {
        activation: ActivationType,
    },
    BatchNormalization {
        momentum: f32,
        epsilon: f32,
    },
    MaxPooling2D {
        pool_size: (usize, usize),
        strides: (usize, usize),
    },
    Dropout {
        rate: f32,
    },
    Flatten,
    Dense {
        units: usize,
        activation: ActivationType,
        #[serde(default)]
        kernel_initializer: WeightInitStrategy,
    },
}

impl LayerConfig {
    /// Square-kernel convolution with equal strides on both axes.
    pub fn conv2d(filters: usize, kernel_size: usize, stride: usize, padding: Padding) -> Self {
        LayerConfig::Conv2D {
            filters,
            kernel_size: (kernel_size, kernel_size),
            strides: (stride, stride),
            padding,
            kernel_initializer: WeightInitStrategy::default(),
        }
    }

    pub fn activation(activation: ActivationType) -> Self {
        LayerConfig::Activation { activation }
    }

    pub fn batch_norm() -> Self {
        LayerConfig::BatchNormalization {
            momentum: batch_norm::DEFAULT_MOMENTUM,
            epsilon: batch_norm::DEFAULT_EPSILON,
        }
    }

    /// Pooling with stride equal to the pool size.
    pub fn max_pool(pool_size: usize) -> Self {
        LayerConfig::MaxPooling2D {
            pool_size: (pool_size, pool_size),
            strides: (pool_size, pool_size),
        }
    }

    pub fn dropout(rate: f32) -> Self {
        LayerConfig::Dropout { rate }
    }

    pub fn flatten() -> Self {
        LayerConfig::Flatten
    }

    pub fn dense(units: usize, activation: ActivationType) -> Self {
        LayerConfig::Dense {
            units,
            activation,
            kernel_initializer: WeightInitStrategy::default(),
        }
    }

    /// Replaces the kernel initializer of a Conv2D or Dense config; other
    /// layers have no kernel and are returned unchanged.
    pub fn with_kernel_initializer(mut self, initializer: WeightInitStrategy) -> Self {
        match &mut self {
            LayerConfig::Conv2D { kernel_initializer, .. } | LayerConfig::Dense { kernel_initializer, .. } => {
                *kernel_initializer = initializer;
            }
            _ => {}
        }
        self
    }

    /// Keras class name, e.g. `Conv2D`.
    pub fn class_name(&self) -> &'static str {
        match self {
            LayerConfig::Conv2D { .. } => "Conv2D",
            LayerConfig::Activation { .. } => "Activation",
            LayerConfig::BatchNormalization { .. } => "BatchNormalization",
            LayerConfig::MaxPooling2D { .. } => "MaxPooling2D",
            LayerConfig::Dropout { .. } => "Dropout",
            LayerConfig::Flatten => "Flatten",
            LayerConfig::Dense { .. } => "Dense",
        }
    }

    /// Prefix for generated layer names, e.g. `conv2d` in `conv2d_1`.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            LayerConfig::Conv2D { .. } => "conv2d",
            LayerConfig::Activation { .. } => "activation",
            LayerConfig::BatchNormalization { .. } => "batch_normalization",
            LayerConfig::MaxPooling2D { .. } => "max_pooling2d",
            LayerConfig::Dropout { .. } => "dropout",
            LayerConfig::Flatten => "flatten",
            LayerConfig::Dense { .. } => "dense",
        }
    }

    /// Instantiates the layer for the given per-sample input shape.
    pub fn build(
        &self,
        name: impl Into<String>,
        input_shape: Shape,
        rng: &mut StdRng,
    ) -> Result<Box<dyn Layer>> {
        let name = name.into();
        let layer: Box<dyn Layer> = match *self {
            LayerConfig::Conv2D {
                filters,
                kernel_size,
                strides,
                padding,
                kernel_initializer,
            } => Box::new(Conv2DLayer::new(
                name,
                input_shape,
                filters,
                kernel_size,
                strides,
                padding,
                kernel_initializer,
                rng,
            )?),
            LayerConfig::Activation { activation } => {
                Box::new(ActivationLayer::new(name, input_shape, activation))
            }
            LayerConfig::BatchNormalization { momentum, epsilon } => {
                Box::new(BatchNormLayer::new(name, input_shape, momentum, epsilon)?)
            }
            LayerConfig::MaxPooling2D { pool_size, strides } => {
                Box::new(MaxPoolLayer::new(name, input_shape, pool_size, strides)?)
            }
            LayerConfig::Dropout { rate } => {
                Box::new(DropoutLayer::new(name, input_shape, rate, rng.random())?)
            }
            LayerConfig::Flatten => Box::new(FlattenLayer::new(name, input_shape)),
            LayerConfig::Dense {
                units,
                activation,
                kernel_initializer,
            } => Box::new(FeedForwardLayer::new(
                name,
                input_shape,
                units,
                activation,
                kernel_initializer,
                rng,
            )?),
        };
        Ok(layer)
    }
}

/// Checks that `input` is a batch of samples shaped `expected`.
pub(crate) fn check_input(expected: Shape, input: &ArrayD<f32>) -> Result<()> {
    let shape = input.shape();
    if shape.is_empty() || shape[1..] != expected.dims()[..] {
        return Err(Error::InputShape {
            expected: expected.to_string(),
            actual: shape.to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn dimension_mismatch(layer: &str, reason: impl Into<String>) -> Error {
    Error::DimensionMismatch {
        layer: layer.to_string(),
        reason: reason.into(),
    }
}
