mod activation;
mod builder;
mod error;
mod hyperparameters;
mod initializer;
pub mod layers;
mod loss;
mod metric;
mod model;
mod optimizer;
mod shape;

pub use activation::ActivationType;
pub use builder::{alexnet_layers, like_alexnet, like_alexnet_seeded};
pub use error::{Error, Result};
pub use hyperparameters::FitConfig;
pub use initializer::WeightInitStrategy;
pub use layers::{Layer, LayerConfig, Mode, Padding, Param};
pub use loss::Loss;
pub use metric::Metric;
pub use model::{Architecture, BatchLogs, Compilation, History, LayerSpec, Model};
pub use optimizer::{Adam, AdamConfig, Optimizer, OptimizerConfig, Sgd, SgdConfig};
pub use shape::{InputShape, Shape};
