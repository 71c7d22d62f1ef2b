use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed image shape a model accepts, channels last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        InputShape {
            height,
            width,
            channels,
        }
    }
}

impl From<(usize, usize, usize)> for InputShape {
    fn from((height, width, channels): (usize, usize, usize)) -> Self {
        InputShape::new(height, width, channels)
    }
}

impl From<InputShape> for Shape {
    fn from(input: InputShape) -> Self {
        Shape::Spatial {
            height: input.height,
            width: input.width,
            channels: input.channels,
        }
    }
}

/// Per-sample shape of the activations flowing between layers.
///
/// The batch axis is never part of a `Shape`; tensors carry it as axis 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Spatial {
        height: usize,
        width: usize,
        channels: usize,
    },
    Flat(usize),
}

impl Shape {
    pub fn dims(&self) -> Vec<usize> {
        match *self {
            Shape::Spatial {
                height,
                width,
                channels,
            } => vec![height, width, channels],
            Shape::Flat(features) => vec![features],
        }
    }

    /// Number of scalars in one sample.
    pub fn size(&self) -> usize {
        self.dims().iter().product()
    }

    /// Full tensor shape for a batch of `batch` samples.
    pub fn with_batch(&self, batch: usize) -> Vec<usize> {
        let mut dims = Vec::with_capacity(4);
        dims.push(batch);
        dims.extend(self.dims());
        dims
    }

    /// Size of the last axis, the one batch normalization works over.
    pub fn last_axis(&self) -> usize {
        match *self {
            Shape::Spatial { channels, .. } => channels,
            Shape::Flat(features) => features,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Shape::Spatial {
                height,
                width,
                channels,
            } => write!(f, "{}, {}, {}", height, width, channels),
            Shape::Flat(features) => write!(f, "{}", features),
        }
    }
}
