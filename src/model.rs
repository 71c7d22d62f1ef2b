use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};
use ndarray::{ArrayD, ArrayViewD, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hyperparameters::FitConfig;
use crate::layers::{check_input, Layer, LayerConfig, Mode};
use crate::loss::Loss;
use crate::metric::Metric;
use crate::optimizer::{Optimizer, OptimizerConfig};
use crate::shape::{InputShape, Shape};

/// A linear stack of layers with shapes inferred as layers are added.
#[derive(Debug, Clone)]
pub struct Model {
    input_shape: InputShape,
    layers: Vec<Box<dyn Layer>>,
    compilation: Option<Compilation>,
    rng: StdRng,
    name_counts: BTreeMap<&'static str, usize>,
}

/// Optimizer, loss and metrics bound to a model by [`Model::compile`].
#[derive(Debug, Clone)]
pub struct Compilation {
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub metrics: Vec<Metric>,
}

impl Compilation {
    fn logs(&self, outputs: &ArrayD<f32>, targets: &ArrayD<f32>) -> BatchLogs {
        BatchLogs {
            loss: self.loss.calculate(outputs, targets),
            metrics: self
                .metrics
                .iter()
                .map(|metric| (*metric, metric.calculate(outputs, targets)))
                .collect(),
        }
    }
}

/// Loss and metric values for one batch, or averaged over an epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchLogs {
    pub loss: f32,
    pub metrics: Vec<(Metric, f32)>,
}

impl BatchLogs {
    pub fn metric(&self, metric: Metric) -> Option<f32> {
        self.metrics
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|&(_, value)| value)
    }
}

impl fmt::Display for BatchLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loss: {:.4}", self.loss)?;
        for (metric, value) in &self.metrics {
            write!(f, " - {}: {:.4}", metric.name(), value)?;
        }
        Ok(())
    }
}

/// Per-epoch logs produced by [`Model::fit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    pub epochs: Vec<BatchLogs>,
}

impl History {
    pub fn last(&self) -> Option<&BatchLogs> {
        self.epochs.last()
    }
}

/// A named layer inside an [`Architecture`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub layer: LayerConfig,
}

/// Everything needed to rebuild a model except its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub input_shape: InputShape,
    pub layers: Vec<LayerSpec>,
    pub optimizer: Option<OptimizerConfig>,
    pub loss: Option<Loss>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl Model {
    pub fn new(input_shape: impl Into<InputShape>) -> Self {
        Self::with_rng(input_shape.into(), StdRng::from_rng(&mut rand::rng()))
    }

    /// Like [`Model::new`], but weight initialization and dropout masks are
    /// reproducible.
    pub fn with_seed(input_shape: impl Into<InputShape>, seed: u64) -> Self {
        Self::with_rng(input_shape.into(), StdRng::seed_from_u64(seed))
    }

    fn with_rng(input_shape: InputShape, rng: StdRng) -> Self {
        Model {
            input_shape,
            layers: Vec::new(),
            compilation: None,
            rng,
            name_counts: BTreeMap::new(),
        }
    }

    /// Rebuilds a model from its architecture, with fresh weights.
    pub fn from_architecture(architecture: &Architecture, seed: Option<u64>) -> Result<Self> {
        let mut model = match seed {
            Some(seed) => Model::with_seed(architecture.input_shape, seed),
            None => Model::new(architecture.input_shape),
        };
        for spec in &architecture.layers {
            model.add(spec.layer.clone())?;
        }
        if let (Some(optimizer), Some(loss)) = (&architecture.optimizer, architecture.loss) {
            model.compile(optimizer.clone(), loss, &architecture.metrics);
        }
        Ok(model)
    }

    pub fn from_json(json: &str, seed: Option<u64>) -> Result<Self> {
        let architecture: Architecture = serde_json::from_str(json)?;
        Self::from_architecture(&architecture, seed)
    }

    /// Appends a layer whose input is the current output shape of the model.
    ///
    /// Fails with [`Error::DimensionMismatch`] when the layer cannot accept
    /// that shape, e.g. a kernel larger than the feature map it slides over.
    pub fn add(&mut self, config: LayerConfig) -> Result<&mut Self> {
        let input_shape = self.output_shape();
        let prefix = config.name_prefix();
        let index = self.name_counts.get(prefix).copied().unwrap_or(0) + 1;
        let name = format!("{}_{}", prefix, index);

        let layer = config.build(name, input_shape, &mut self.rng)?;
        debug!(
            "added {} ({}) with output shape ({})",
            layer.name(),
            config.class_name(),
            layer.output_shape()
        );

        self.name_counts.insert(prefix, index);
        self.layers.push(layer);
        Ok(self)
    }

    /// Binds an optimizer, loss and metrics; resets any optimizer state.
    pub fn compile(&mut self, optimizer: impl Into<OptimizerConfig>, loss: Loss, metrics: &[Metric]) {
        self.compilation = Some(Compilation {
            optimizer: optimizer.into().init(),
            loss,
            metrics: metrics.to_vec(),
        });
    }

    pub fn is_compiled(&self) -> bool {
        self.compilation.is_some()
    }

    pub fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    pub fn output_shape(&self) -> Shape {
        self.layers
            .last()
            .map(|layer| layer.output_shape())
            .unwrap_or_else(|| self.input_shape.into())
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layer_configs(&self) -> Vec<LayerConfig> {
        self.layers.iter().map(|layer| layer.config()).collect()
    }

    pub fn loss(&self) -> Option<Loss> {
        self.compilation.as_ref().map(|c| c.loss)
    }

    pub fn metrics(&self) -> &[Metric] {
        self.compilation
            .as_ref()
            .map(|c| c.metrics.as_slice())
            .unwrap_or(&[])
    }

    pub fn optimizer(&self) -> Option<&Optimizer> {
        self.compilation.as_ref().map(|c| &c.optimizer)
    }

    pub fn optimizer_config(&self) -> Option<OptimizerConfig> {
        self.optimizer().map(|optimizer| optimizer.config())
    }

    pub fn architecture(&self) -> Architecture {
        Architecture {
            input_shape: self.input_shape,
            layers: self
                .layers
                .iter()
                .map(|layer| LayerSpec {
                    name: layer.name().to_string(),
                    layer: layer.config(),
                })
                .collect(),
            optimizer: self.optimizer_config(),
            loss: self.loss(),
            metrics: self.metrics().to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.architecture())?)
    }

    /// All weight tensors in layer order, including non-trainable statistics.
    pub fn weights(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.layers.iter().flat_map(|layer| layer.weights()).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }

    pub fn trainable_parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.trainable_parameter_count())
            .sum()
    }

    /// Keras-style table of layers, output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let rule = |c: char| c.to_string().repeat(66) + "\n";
        let mut out = String::new();
        out += &rule('_');
        out += &format!("{:<30}{:<26}{:>10}\n", "Layer (type)", "Output Shape", "Param #");
        out += &rule('=');
        for layer in &self.layers {
            out += &format!(
                "{:<30}{:<26}{:>10}\n",
                format!("{} ({})", layer.name(), layer.config().class_name()),
                format!("(None, {})", layer.output_shape()),
                layer.parameter_count()
            );
        }
        out += &rule('=');
        let total = self.parameter_count();
        let trainable = self.trainable_parameter_count();
        out += &format!("Total params: {}\n", total);
        out += &format!("Trainable params: {}\n", trainable);
        out += &format!("Non-trainable params: {}\n", total - trainable);
        out += &rule('_');
        out
    }

    fn forward(&mut self, inputs: &ArrayD<f32>, mode: Mode) -> Result<ArrayD<f32>> {
        check_input(self.input_shape.into(), inputs)?;

        let mut layers = self.layers.iter_mut();
        let Some(first) = layers.next() else {
            return Ok(inputs.clone());
        };
        let mut output = first.forward(inputs, mode)?;
        for layer in layers {
            output = layer.forward(&output, mode)?;
        }
        Ok(output)
    }

    /// Inference-mode forward pass: dropout is off and batch normalization
    /// uses its moving statistics.
    pub fn predict(&mut self, inputs: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.forward(inputs, Mode::Inference)
    }

    /// Reshapes `targets` to the model's output for the batch in `inputs`.
    fn align_targets(&self, inputs: &ArrayD<f32>, targets: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let batch = inputs.shape().first().copied().unwrap_or(0);
        if batch == 0 {
            return Err(Error::EmptyBatch);
        }

        let output_shape = self.output_shape().with_batch(batch);
        let expected: usize = output_shape.iter().product();
        if targets.shape().first() != Some(&batch) || targets.len() != expected {
            return Err(Error::TargetShape {
                outputs: output_shape,
                targets: targets.shape().to_vec(),
            });
        }
        Ok(targets.to_shape(output_shape)?.into_owned())
    }

    /// Runs one optimizer step on a single batch and returns its loss and metrics,
    /// measured before the update.
    pub fn train_on_batch(&mut self, inputs: &ArrayD<f32>, targets: &ArrayD<f32>) -> Result<BatchLogs> {
        if self.compilation.is_none() {
            return Err(Error::NotCompiled);
        }
        let targets = self.align_targets(inputs, targets)?;

        for layer in self.layers.iter_mut() {
            layer.zero_grads();
        }
        let outputs = self.forward(inputs, Mode::Training)?;

        let compilation = self.compilation.as_mut().ok_or(Error::NotCompiled)?;
        let logs = compilation.logs(&outputs, &targets);

        let mut grad = compilation.loss.gradient(&outputs, &targets);
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }

        let mut params = Vec::new();
        for layer in self.layers.iter_mut() {
            params.extend(layer.parameters());
        }
        compilation.optimizer.step(params);

        Ok(logs)
    }

    /// Loss and metrics in inference mode, without touching any weights.
    pub fn evaluate(&mut self, inputs: &ArrayD<f32>, targets: &ArrayD<f32>) -> Result<BatchLogs> {
        if self.compilation.is_none() {
            return Err(Error::NotCompiled);
        }
        let targets = self.align_targets(inputs, targets)?;
        let outputs = self.forward(inputs, Mode::Inference)?;

        let compilation = self.compilation.as_ref().ok_or(Error::NotCompiled)?;
        Ok(compilation.logs(&outputs, &targets))
    }

    /// Trains for `config.epochs` passes over in-memory data.
    ///
    /// Each epoch's logs are the sample-weighted mean of its batch logs.
    pub fn fit(&mut self, inputs: &ArrayD<f32>, targets: &ArrayD<f32>, config: &FitConfig) -> Result<History> {
        if self.compilation.is_none() {
            return Err(Error::NotCompiled);
        }
        if config.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".to_string()));
        }
        let targets = self.align_targets(inputs, targets)?;

        let samples = inputs.shape()[0];
        let mut indices: Vec<usize> = (0..samples).collect();
        let mut history = History::default();

        for epoch in 0..config.epochs {
            if config.shuffle {
                indices.shuffle(&mut self.rng);
            }

            let batches = indices.chunks(config.batch_size);
            let batch_count = batches.len();
            let mut loss_sum = 0.0;
            let mut metric_sums: Vec<(Metric, f32)> = Vec::new();

            for (batch_idx, batch) in batches.enumerate() {
                let x = inputs.select(Axis(0), batch);
                let y = targets.select(Axis(0), batch);
                let logs = self.train_on_batch(&x, &y)?;

                let weight = batch.len() as f32;
                loss_sum += logs.loss * weight;
                if metric_sums.is_empty() {
                    metric_sums = logs.metrics.iter().map(|&(m, _)| (m, 0.0)).collect();
                }
                for ((_, sum), (_, value)) in metric_sums.iter_mut().zip(&logs.metrics) {
                    *sum += value * weight;
                }

                if batch_idx % 100 == 0 {
                    debug!("Batch {} / {}, {}", batch_idx + 1, batch_count, logs);
                }
            }

            let epoch_logs = BatchLogs {
                loss: loss_sum / samples as f32,
                metrics: metric_sums
                    .into_iter()
                    .map(|(m, sum)| (m, sum / samples as f32))
                    .collect(),
            };
            info!("Epoch {}/{} - {}", epoch + 1, config.epochs, epoch_logs);
            history.epochs.push(epoch_logs);
        }

        Ok(history)
    }
}
