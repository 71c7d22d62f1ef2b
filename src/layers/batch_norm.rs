use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis};

use crate::error::{Error, Result};
use crate::shape::Shape;

use super::{check_input, Layer, LayerConfig, Mode, Param};

pub const DEFAULT_MOMENTUM: f32 = 0.99;
pub const DEFAULT_EPSILON: f32 = 1e-3;

/// Batch normalization over the last axis (channels for images, features for
/// flat inputs).
#[derive(Debug, Clone)]
pub struct BatchNormLayer {
    pub name: String,
    pub shape: Shape,
    pub momentum: f32,
    pub epsilon: f32,
    // Parameters (learnable)
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    gamma_grads: Array1<f32>,
    beta_grads: Array1<f32>,
    // Buffers (non-learnable)
    pub moving_mean: Array1<f32>,
    pub moving_variance: Array1<f32>,
    cache: Option<NormCache>,
}

#[derive(Debug, Clone)]
struct NormCache {
    normalized: Array2<f32>,
    inv_std: Array1<f32>,
}

impl BatchNormLayer {
    pub fn new(name: String, shape: Shape, momentum: f32, epsilon: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&momentum) || epsilon <= 0.0 {
            return Err(Error::InvalidLayer(format!(
                "{}: momentum must be in [0, 1] and epsilon positive",
                name
            )));
        }
        let features = shape.last_axis();
        Ok(BatchNormLayer {
            name,
            shape,
            momentum,
            epsilon,
            gamma: Array1::ones(features),
            beta: Array1::zeros(features),
            gamma_grads: Array1::zeros(features),
            beta_grads: Array1::zeros(features),
            moving_mean: Array1::zeros(features),
            moving_variance: Array1::ones(features),
            cache: None,
        })
    }

    fn features(&self) -> usize {
        self.gamma.len()
    }
}

impl Layer for BatchNormLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::BatchNormalization {
            momentum: self.momentum,
            epsilon: self.epsilon,
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
        let features = self.features();
        // Every position but the last axis is a sample of the per-feature statistics
        let rows = input.len() / features;
        let x = input.to_shape((rows, features))?;

        let (mean, variance) = match mode {
            Mode::Training if rows > 0 => {
                let mean = x.sum_axis(Axis(0)) / rows as f32;
                let centered = &x - &mean;
                let variance = (&centered * &centered).sum_axis(Axis(0)) / rows as f32;

                // Moving variance is the unbiased estimate
                let correction = if rows > 1 { rows as f32 / (rows as f32 - 1.0) } else { 1.0 };
                let m = self.momentum;
                self.moving_mean = &self.moving_mean * m + &mean * (1.0 - m);
                self.moving_variance = &self.moving_variance * m + &variance * ((1.0 - m) * correction);

                (mean, variance)
            }
            _ => (self.moving_mean.clone(), self.moving_variance.clone()),
        };

        let inv_std = variance.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        let normalized = (&x - &mean) * &inv_std;
        let output = &normalized * &self.gamma + &self.beta;

        if mode == Mode::Training {
            self.cache = Some(NormCache { normalized, inv_std });
        }

        Ok(output.into_shape_with_order(input.raw_dim())?)
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| Error::MissingForwardCache(self.name.clone()))?;
        let (rows, features) = cache.normalized.dim();
        let grad = grad_output.to_shape((rows, features))?;

        self.gamma_grads += &(&grad * &cache.normalized).sum_axis(Axis(0));
        self.beta_grads += &grad.sum_axis(Axis(0));

        if rows == 0 {
            return Ok(grad_output.clone());
        }

        // Batch statistics depend on every row, so each row's gradient does too
        let n = rows as f32;
        let grad_normalized = &grad * &self.gamma;
        let sum_grad = grad_normalized.sum_axis(Axis(0));
        let sum_grad_dot = (&grad_normalized * &cache.normalized).sum_axis(Axis(0));
        let scaled = &grad_normalized * n - &sum_grad - &cache.normalized * &sum_grad_dot;
        let grad_input = scaled * &(&cache.inv_std / n);

        Ok(grad_input.into_shape_with_order(grad_output.raw_dim())?)
    }

    fn parameters(&mut self) -> Vec<Param<'_>> {
        vec![
            Param {
                value: self.gamma.view_mut().into_dyn(),
                grad: self.gamma_grads.view().into_dyn(),
            },
            Param {
                value: self.beta.view_mut().into_dyn(),
                grad: self.beta_grads.view().into_dyn(),
            },
        ]
    }

    fn weights(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![
            self.gamma.view().into_dyn(),
            self.beta.view().into_dyn(),
            self.moving_mean.view().into_dyn(),
            self.moving_variance.view().into_dyn(),
        ]
    }

    fn zero_grads(&mut self) {
        self.gamma_grads.fill(0.0);
        self.beta_grads.fill(0.0);
    }

    fn parameter_count(&self) -> usize {
        4 * self.features()
    }

    fn trainable_parameter_count(&self) -> usize {
        2 * self.features()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
