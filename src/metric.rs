use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Binary accuracy: a prediction above 0.5 counts as the positive class.
    #[serde(alias = "acc")]
    Accuracy,
}

impl Metric {
    pub fn calculate(&self, prediction: &ArrayD<f32>, target: &ArrayD<f32>) -> f32 {
        match self {
            Metric::Accuracy => {
                if prediction.is_empty() {
                    return 0.0;
                }
                let correct = prediction
                    .iter()
                    .zip(target.iter())
                    .filter(|&(&p, &y)| {
                        let label = if p > 0.5 { 1.0 } else { 0.0 };
                        label == y
                    })
                    .count();
                correct as f32 / prediction.len() as f32
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
        }
    }
}
