use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis, Ix2};
use rand::rngs::StdRng;

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::initializer::WeightInitStrategy;
use crate::shape::Shape;

use super::{check_input, dimension_mismatch, Layer, LayerConfig, Mode, Param};

/// Fully connected layer with a fused activation.
#[derive(Debug, Clone)]
pub struct FeedForwardLayer {
    pub name: String,
    pub inputs: usize,
    pub neurons: usize,
    pub activation: ActivationType,
    pub kernel_initializer: WeightInitStrategy,
    pub weights: Array2<f32>, // (inputs, neurons)
    pub bias: Array1<f32>,
    pub weight_grads: Array2<f32>,
    pub bias_grads: Array1<f32>,
    input_cache: Option<Array2<f32>>,
    preactivation_cache: Option<ArrayD<f32>>,
}

impl FeedForwardLayer {
    pub fn new(
        name: String,
        input_shape: Shape,
        neurons: usize,
        activation: ActivationType,
        kernel_initializer: WeightInitStrategy,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let inputs = match input_shape {
            Shape::Flat(features) => features,
            Shape::Spatial { .. } => {
                return Err(dimension_mismatch(
                    &name,
                    format!("expected a flat input, got ({}); add a Flatten layer first", input_shape),
                ))
            }
        };
        if inputs == 0 {
            return Err(dimension_mismatch(&name, "input has no features"));
        }
        if neurons == 0 {
            return Err(Error::InvalidLayer(format!("{}: units must be positive", name)));
        }

        let weights = kernel_initializer.sample((inputs, neurons), inputs, neurons, rng)?;

        Ok(FeedForwardLayer {
            name,
            inputs,
            neurons,
            activation,
            kernel_initializer,
            weights,
            bias: Array1::zeros(neurons),
            weight_grads: Array2::zeros((inputs, neurons)),
            bias_grads: Array1::zeros(neurons),
            input_cache: None,
            preactivation_cache: None,
        })
    }
}

impl Layer for FeedForwardLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Dense {
            units: self.neurons,
            activation: self.activation,
            kernel_initializer: self.kernel_initializer,
        }
    }

    fn input_shape(&self) -> Shape {
        Shape::Flat(self.inputs)
    }

    fn output_shape(&self) -> Shape {
        Shape::Flat(self.neurons)
    }

    fn forward(&mut self, input: &ArrayD<f32>, mode: Mode) -> Result<ArrayD<f32>> {
        check_input(self.input_shape(), input)?;
        let input = input.view().into_dimensionality::<Ix2>()?;

        // input is (batch × inputs), weights is (inputs × neurons), result is (batch × neurons)
        let preactivation = (input.dot(&self.weights) + &self.bias).into_dyn();
        let output = self.activation.forward(&preactivation);

        if mode == Mode::Training {
            self.input_cache = Some(input.to_owned());
            self.preactivation_cache = Some(preactivation);
        }
        Ok(output)
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let (input, preactivation) = match (&self.input_cache, &self.preactivation_cache) {
            (Some(input), Some(preactivation)) => (input, preactivation),
            _ => return Err(Error::MissingForwardCache(self.name.clone())),
        };

        // Gradient with respect to preactivation
        let dlayer = self
            .activation
            .backward(preactivation, grad_output)
            .into_dimensionality::<Ix2>()?;

        self.weight_grads += &input.t().dot(&dlayer);
        self.bias_grads += &dlayer.sum_axis(Axis(0));

        // weights is (inputs × neurons), dlayer is (batch × neurons), result is (batch × inputs)
        Ok(dlayer.dot(&self.weights.t()).into_dyn())
    }

    fn parameters(&mut self) -> Vec<Param<'_>> {
        vec![
            Param {
                value: self.weights.view_mut().into_dyn(),
                grad: self.weight_grads.view().into_dyn(),
            },
            Param {
                value: self.bias.view_mut().into_dyn(),
                grad: self.bias_grads.view().into_dyn(),
            },
        ]
    }

    fn weights(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.weights.view().into_dyn(), self.bias.view().into_dyn()]
    }

    fn zero_grads(&mut self) {
        self.weight_grads.fill(0.0);
        self.bias_grads.fill(0.0);
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::SeedableRng;

    fn dense(inputs: usize, neurons: usize, activation: ActivationType) -> FeedForwardLayer {
        let mut rng = StdRng::seed_from_u64(11);
        FeedForwardLayer::new(
            "dense_1".to_string(),
            Shape::Flat(inputs),
            neurons,
            activation,
            WeightInitStrategy::GlorotUniform,
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn test_forward_known_weights() {
        let mut layer = dense(2, 1, ActivationType::Sigmoid);
        layer.weights = arr2(&[[1.0], [-1.0]]);

        let output = layer
            .forward(&arr2(&[[3.0, 3.0], [2.0, 0.0]]).into_dyn(), Mode::Inference)
            .unwrap();

        assert!((output[[0, 0]] - 0.5).abs() < 1e-6);
        assert!((output[[1, 0]] - ActivationType::Sigmoid.apply(2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_parameter_count() {
        // Parameter count should be weights + biases
        assert_eq!(dense(3, 4, ActivationType::ReLU).parameter_count(), 3 * 4 + 4);
        assert_eq!(dense(2048, 1, ActivationType::Sigmoid).parameter_count(), 2049);
    }

    #[test]
    fn test_gradients_accumulate_until_zeroed() {
        let mut layer = dense(2, 2, ActivationType::Linear);
        let input = arr2(&[[1.0, 2.0]]).into_dyn();

        for _ in 0..2 {
            let output = layer.forward(&input, Mode::Training).unwrap();
            layer.backward(&ArrayD::ones(output.raw_dim())).unwrap();
        }
        assert_eq!(layer.bias_grads, ndarray::arr1(&[2.0, 2.0]));
        assert_eq!(layer.weight_grads, arr2(&[[2.0, 2.0], [4.0, 4.0]]));

        layer.zero_grads();
        assert!(layer.weight_grads.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_rejects_spatial_input() {
        let mut rng = StdRng::seed_from_u64(11);
        let result = FeedForwardLayer::new(
            "dense_1".to_string(),
            Shape::Spatial { height: 5, width: 5, channels: 192 },
            2048,
            ActivationType::ReLU,
            WeightInitStrategy::GlorotUniform,
            &mut rng,
        );
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }
}
