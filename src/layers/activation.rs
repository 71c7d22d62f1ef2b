use ndarray::ArrayD;

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::shape::Shape;

use super::{check_input, Layer, LayerConfig, Mode};

/// Standalone element-wise activation.
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    pub name: String,
    pub shape: Shape,
    pub activation: ActivationType,
    preactivation_cache: Option<ArrayD<f32>>,
}

impl ActivationLayer {
    pub fn new(name: String, shape: Shape, activation: ActivationType) -> Self {
        ActivationLayer {
            name,
            shape,
            activation,
            preactivation_cache: None,
        }
    }
}

impl Layer for ActivationLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Activation {
            activation: self.activation,
        }
    }

    fn input_shape(&self) -> Shape {
        self.shape
    }

    fn output_shape(&self) -> Shape {
        self.shape
    }

    fn forward(&mut self, input: &ArrayD<f32>, mode: Mode) -> Result<ArrayD<f32>> {
        check_input(self.shape, input)?;
        if mode == Mode::Training {
            self.preactivation_cache = Some(input.clone());
        }
        Ok(self.activation.forward(input))
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let preactivation = self
            .preactivation_cache
            .as_ref()
            .ok_or_else(|| Error::MissingForwardCache(self.name.clone()))?;
        Ok(self.activation.backward(preactivation, grad_output))
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
