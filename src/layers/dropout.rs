use ndarray::ArrayD;

use crate::error::{Error, Result};
use crate::shape::Shape;

use super::{check_input, Layer, LayerConfig, Mode};

/// Inverted dropout: kept activations are scaled by `1 / (1 - rate)` during
/// training so inference can pass values through unchanged.
#[derive(Debug, Clone)]
pub struct DropoutLayer {
    pub name: String,
    pub shape: Shape,
    dropout_rate: f32,
    scale: f32,
    mask: Option<ArrayD<f32>>,
    rng: fastrand::Rng,
}

impl DropoutLayer {
    pub fn new(name: String, shape: Shape, dropout_rate: f32, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&dropout_rate) {
            return Err(Error::InvalidLayer(format!(
                "{}: dropout rate must be in [0, 1), got {}",
                name, dropout_rate
            )));
        }

        Ok(DropoutLayer {
            name,
            shape,
            dropout_rate,
            scale: 1.0 / (1.0 - dropout_rate),
            mask: None,
            rng: fastrand::Rng::with_seed(seed),
        })
    }

    pub fn rate(&self) -> f32 {
        self.dropout_rate
    }
}

impl Layer for DropoutLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Dropout {
            rate: self.dropout_rate,
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
        match mode {
            Mode::Training => {
                let rng = &mut self.rng;
                let (rate, scale) = (self.dropout_rate, self.scale);
                let mask = ArrayD::from_shape_fn(input.raw_dim(), |_| {
                    if rng.f32() >= rate { scale } else { 0.0 }
                });

                let output = input * &mask;
                self.mask = Some(mask);
                Ok(output)
            }
            // During inference, just pass through
            Mode::Inference => Ok(input.clone()),
        }
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        // During backprop, we multiply gradients by the same mask
        let mask = self
            .mask
            .as_ref()
            .ok_or_else(|| Error::MissingForwardCache(self.name.clone()))?;
        Ok(grad_output * mask)
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_is_identity() {
        let mut dropout = DropoutLayer::new("dropout_1".to_string(), Shape::Flat(64), 0.5, 1).unwrap();
        let input = ArrayD::<f32>::ones(vec![2, 64]);

        let output = dropout.forward(&input, Mode::Inference).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_training_drops_and_rescales() {
        let mut dropout = DropoutLayer::new("dropout_1".to_string(), Shape::Flat(1000), 0.5, 1).unwrap();
        let input = ArrayD::<f32>::ones(vec![1, 1000]);

        let output = dropout.forward(&input, Mode::Training).unwrap();
        let dropped = output.iter().filter(|&&v| v == 0.0).count();

        assert!(output.iter().all(|&v| v == 0.0 || v == 2.0));
        assert!(dropped > 400 && dropped < 600, "dropped {} of 1000", dropped);

        // Gradient flows only through kept units
        let grad = dropout.backward(&ArrayD::ones(vec![1, 1000])).unwrap();
        assert_eq!(grad, output);
    }

    #[test]
    fn test_rejects_invalid_rate() {
        assert!(DropoutLayer::new("d".to_string(), Shape::Flat(4), 1.0, 0).is_err());
        assert!(DropoutLayer::new("d".to_string(), Shape::Flat(4), -0.1, 0).is_err());
    }
}
