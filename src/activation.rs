use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Enum representing different activation function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    Sigmoid,
    ReLU,
    Tanh,
    Linear,
}

impl ActivationType {
    /// Applies the activation function to a given input
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            ActivationType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationType::ReLU => x.max(0.0),
            ActivationType::Tanh => x.tanh(),
            ActivationType::Linear => x,
        }
    }

    /// Computes the derivative of the activation function
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationType::Sigmoid => {
                let sigmoid = 1.0 / (1.0 + (-x).exp());
                sigmoid * (1.0 - sigmoid)
            },
            ActivationType::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationType::Tanh => 1.0 - x.tanh().powi(2),
            ActivationType::Linear => 1.0,
        }
    }

    pub fn forward(&self, preactivation: &ArrayD<f32>) -> ArrayD<f32> {
        match self {
            ActivationType::Linear => preactivation.clone(),
            _ => preactivation.mapv(|x| self.apply(x)),
        }
    }

    /// Chains `grad_output` through the activation, given the cached preactivation.
    pub fn backward(&self, preactivation: &ArrayD<f32>, grad_output: &ArrayD<f32>) -> ArrayD<f32> {
        match self {
            ActivationType::Linear => grad_output.clone(),
            _ => grad_output * &preactivation.mapv(|x| self.derivative(x)),
        }
    }

    /// Name used in layer names and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            ActivationType::Sigmoid => "sigmoid",
            ActivationType::ReLU => "relu",
            ActivationType::Tanh => "tanh",
            ActivationType::Linear => "linear",
        }
    }
}
