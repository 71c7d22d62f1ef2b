use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Dimension mismatch in layer `{layer}`: {reason}")]
    DimensionMismatch { layer: String, reason: String },

    #[error("Input shape mismatch: expected (None, {expected}), got {actual:?}")]
    InputShape { expected: String, actual: Vec<usize> },

    #[error("Target shape mismatch: model outputs {outputs:?} but targets have shape {targets:?}")]
    TargetShape {
        outputs: Vec<usize>,
        targets: Vec<usize>,
    },

    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Invalid layer configuration: {0}")]
    InvalidLayer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model must be compiled before training or evaluation")]
    NotCompiled,

    #[error("Backward pass on layer `{0}` before any training forward pass")]
    MissingForwardCache(String),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
