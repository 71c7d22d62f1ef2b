//! Optimizer configurations and their update rules.
//!
//! Configurations are plain serde structs whose fields default independently,
//! so a partial JSON object such as `{"lr": 0.01}` is a complete config.

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layers::Param;

/// Fallback for `AdamConfig::epsilon` when it is left unset.
pub const DEFAULT_EPSILON: f32 = 1e-7;

/// Adam configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    /// Step size.
    #[serde(alias = "lr")]
    pub learning_rate: f32,
    /// Decay rate of the first moment estimate.
    pub beta_1: f32,
    /// Decay rate of the second moment estimate.
    pub beta_2: f32,
    /// A value required for numerical stability; `None` means [`DEFAULT_EPSILON`].
    pub epsilon: Option<f32>,
    /// Learning rate decay over each update.
    pub decay: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            learning_rate: 0.001,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: None,
            decay: 0.0,
        }
    }
}

impl AdamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses hyperparameters from a JSON object; absent keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_beta_1(mut self, beta_1: f32) -> Self {
        self.beta_1 = beta_1;
        self
    }

    pub fn with_beta_2(mut self, beta_2: f32) -> Self {
        self.beta_2 = beta_2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: Option<f32>) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_decay(mut self, decay: f32) -> Self {
        self.decay = decay;
        self
    }

    pub fn effective_epsilon(&self) -> f32 {
        self.epsilon.unwrap_or(DEFAULT_EPSILON)
    }

    pub fn init(&self) -> Adam {
        Adam {
            config: self.clone(),
            iterations: 0,
            moments: Vec::new(),
        }
    }
}

/// Plain gradient descent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgdConfig {
    #[serde(alias = "lr")]
    pub learning_rate: f32,
}

impl Default for SgdConfig {
    fn default() -> Self {
        SgdConfig { learning_rate: 0.01 }
    }
}

impl SgdConfig {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    pub fn init(&self) -> Sgd {
        Sgd {
            config: self.clone(),
            iterations: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum OptimizerConfig {
    Adam(AdamConfig),
    #[serde(rename = "SGD")]
    Sgd(SgdConfig),
}

impl OptimizerConfig {
    pub fn init(&self) -> Optimizer {
        match self {
            OptimizerConfig::Adam(config) => Optimizer::Adam(config.init()),
            OptimizerConfig::Sgd(config) => Optimizer::Sgd(config.init()),
        }
    }
}

impl From<AdamConfig> for OptimizerConfig {
    fn from(config: AdamConfig) -> Self {
        OptimizerConfig::Adam(config)
    }
}

impl From<SgdConfig> for OptimizerConfig {
    fn from(config: SgdConfig) -> Self {
        OptimizerConfig::Sgd(config)
    }
}

/// Adam optimizer as described in the paper [Adam: A Method for Stochastic Optimization](https://arxiv.org/pdf/1412.6980.pdf).
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    iterations: usize,
    // (first moment, second moment) per parameter, created on the first step
    moments: Vec<(ArrayD<f32>, ArrayD<f32>)>,
}

impl Adam {
    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Learning rate after time-based decay for the current iteration.
    pub fn current_learning_rate(&self) -> f32 {
        self.config.learning_rate / (1.0 + self.config.decay * self.iterations as f32)
    }

    pub fn step(&mut self, params: Vec<Param<'_>>) {
        if self.moments.len() != params.len() {
            self.moments = params
                .iter()
                .map(|p| (ArrayD::zeros(p.value.raw_dim()), ArrayD::zeros(p.value.raw_dim())))
                .collect();
        }

        let (beta_1, beta_2) = (self.config.beta_1, self.config.beta_2);
        let epsilon = self.config.effective_epsilon();
        let t = (self.iterations + 1) as i32;
        // Bias correction folded into the step size
        let lr_t = self.current_learning_rate() * (1.0 - beta_2.powi(t)).sqrt() / (1.0 - beta_1.powi(t));

        for (Param { mut value, grad }, (m, v)) in params.into_iter().zip(self.moments.iter_mut()) {
            Zip::from(&mut value)
                .and(&grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta_1 * *m + (1.0 - beta_1) * g;
                    *v = beta_2 * *v + (1.0 - beta_2) * g * g;
                    *p -= lr_t * *m / (v.sqrt() + epsilon);
                });
        }
        self.iterations += 1;
    }
}

#[derive(Debug, Clone)]
pub struct Sgd {
    config: SgdConfig,
    iterations: usize,
}

impl Sgd {
    pub fn step(&mut self, params: Vec<Param<'_>>) {
        let learning_rate = self.config.learning_rate;
        for Param { mut value, grad } in params {
            value.scaled_add(-learning_rate, &grad);
        }
        self.iterations += 1;
    }
}

#[derive(Debug, Clone)]
pub enum Optimizer {
    Adam(Adam),
    Sgd(Sgd),
}

impl Optimizer {
    pub fn step(&mut self, params: Vec<Param<'_>>) {
        match self {
            Optimizer::Adam(adam) => adam.step(params),
            Optimizer::Sgd(sgd) => sgd.step(params),
        }
    }

    /// Number of updates applied so far.
    pub fn iterations(&self) -> usize {
        match self {
            Optimizer::Adam(adam) => adam.iterations,
            Optimizer::Sgd(sgd) => sgd.iterations,
        }
    }

    pub fn config(&self) -> OptimizerConfig {
        match self {
            Optimizer::Adam(adam) => OptimizerConfig::Adam(adam.config.clone()),
            Optimizer::Sgd(sgd) => OptimizerConfig::Sgd(sgd.config.clone()),
        }
    }
}
