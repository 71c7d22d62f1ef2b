use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInitStrategy {
    /// Xavier/Glorot uniform initialization
    #[default]
    GlorotUniform,

    /// He initialization (good for ReLU networks)
    HeNormal,
}

impl WeightInitStrategy {
    /// Samples a `(rows, cols)` weight matrix.
    ///
    /// `fan_in` and `fan_out` are passed separately because for convolutions
    /// they include the receptive field, not just the matrix dimensions.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        shape: (usize, usize),
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<Array2<f32>> {
        if fan_in == 0 || fan_out == 0 {
            return Err(Error::InvalidLayer(format!(
                "cannot initialize weights with fan_in={} fan_out={}",
                fan_in, fan_out
            )));
        }

        match self {
            WeightInitStrategy::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                Ok(Array2::from_shape_fn(shape, |_| rng.random_range(-limit..limit)))
            }
            WeightInitStrategy::HeNormal => {
                let std_dev = (2.0 / fan_in as f32).sqrt();
                let normal_dist = Normal::new(0.0, std_dev)
                    .map_err(|e| Error::InvalidLayer(e.to_string()))?;
                Ok(Array2::from_shape_fn(shape, |_| normal_dist.sample(rng)))
            }
        }
    }
}
