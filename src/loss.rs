use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Clip applied to predictions before taking logarithms.
pub const PREDICTION_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    #[serde(rename = "binary_crossentropy")]
    BinaryCrossEntropy,
    MeanSquaredError,
}

impl Loss {
    /// Mean loss over every element of the batch.
    pub fn calculate(&self, prediction: &ArrayD<f32>, target: &ArrayD<f32>) -> f32 {
        let count = prediction.len().max(1) as f32;
        match self {
            Loss::BinaryCrossEntropy => {
                // -(y·ln p + (1 - y)·ln(1 - p)), with p clipped away from 0 and 1
                let total: f32 = prediction
                    .iter()
                    .zip(target.iter())
                    .map(|(&p, &y)| {
                        let p = clip(p);
                        -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                    })
                    .sum();
                total / count
            }
            Loss::MeanSquaredError => {
                let total: f32 = prediction
                    .iter()
                    .zip(target.iter())
                    .map(|(&p, &y)| (p - y).powi(2))
                    .sum();
                total / count
            }
        }
    }

    /// Gradient of [`Loss::calculate`] with respect to the prediction.
    pub fn gradient(&self, prediction: &ArrayD<f32>, target: &ArrayD<f32>) -> ArrayD<f32> {
        let count = prediction.len().max(1) as f32;
        let mut grad = prediction.clone();
        match self {
            Loss::BinaryCrossEntropy => {
                grad.zip_mut_with(target, |p, &y| {
                    let clipped = clip(*p);
                    *p = (clipped - y) / (clipped * (1.0 - clipped)) / count;
                });
            }
            Loss::MeanSquaredError => {
                grad.zip_mut_with(target, |p, &y| *p = 2.0 * (*p - y) / count);
            }
        }
        grad
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::BinaryCrossEntropy => "binary_crossentropy",
            Loss::MeanSquaredError => "mean_squared_error",
        }
    }
}

fn clip(p: f32) -> f32 {
    p.clamp(PREDICTION_EPSILON, 1.0 - PREDICTION_EPSILON)
}
