use ndarray::{s, Array1, Array2, Array4, ArrayD, ArrayView4, ArrayViewD, Axis, Ix4};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::initializer::WeightInitStrategy;
use crate::shape::Shape;

use super::{check_input, dimension_mismatch, Layer, LayerConfig, Mode, Param};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding; windows must fit entirely inside the input.
    Valid,
    /// Pads so that `output = ceil(input / stride)`.
    Same,
}

impl Padding {
    /// Output length along one axis and the padding added before it.
    ///
    /// Returns `None` when the axis would produce no output at all.
    pub fn output_dim(&self, input: usize, kernel: usize, stride: usize) -> Option<(usize, usize)> {
        if input == 0 || kernel == 0 || stride == 0 {
            return None;
        }
        match self {
            Padding::Valid => {
                if input < kernel {
                    None
                } else {
                    Some(((input - kernel) / stride + 1, 0))
                }
            }
            Padding::Same => {
                let output = input.div_ceil(stride);
                let total = ((output - 1) * stride + kernel).saturating_sub(input);
                // The odd pixel of padding goes after, like TensorFlow
                Some((output, total / 2))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    pub name: String,
    pub input_shape: (usize, usize, usize),  // (height, width, channels)
    pub output_shape: (usize, usize, usize), // (height, width, filters)
    pub filters: usize,
    pub kernel_size: (usize, usize),
    pub stride: (usize, usize),
    pub padding: Padding,
    pub kernel_initializer: WeightInitStrategy,
    pad: (usize, usize), // (top, left)
    pub weights: Array2<f32>, // (kernel_h * kernel_w * channels, filters)
    pub bias: Array1<f32>,
    pub weight_grads: Array2<f32>,
    pub bias_grads: Array1<f32>,
    cols_cache: Option<Array2<f32>>,
}

impl Conv2DLayer {
    pub fn new(
        name: String,
        input_shape: Shape,
        filters: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: Padding,
        kernel_initializer: WeightInitStrategy,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let (height, width, channels) = match input_shape {
            Shape::Spatial { height, width, channels } => (height, width, channels),
            Shape::Flat(_) => {
                return Err(dimension_mismatch(
                    &name,
                    format!("expected a spatial (height, width, channels) input, got ({})", input_shape),
                ))
            }
        };
        if filters == 0 {
            return Err(Error::InvalidLayer(format!("{}: filters must be positive", name)));
        }
        if channels == 0 {
            return Err(dimension_mismatch(&name, "input has no channels"));
        }
        let (kernel_h, kernel_w) = kernel_size;

        // Calculate output dimensions
        let too_small = || {
            dimension_mismatch(
                &name,
                format!(
                    "kernel {}x{} with stride {:?} and {:?} padding leaves no output for input ({})",
                    kernel_h, kernel_w, stride, padding, input_shape
                ),
            )
        };
        let (output_h, pad_top) = padding.output_dim(height, kernel_h, stride.0).ok_or_else(too_small)?;
        let (output_w, pad_left) = padding.output_dim(width, kernel_w, stride.1).ok_or_else(too_small)?;

        let inputs = kernel_h * kernel_w * channels;
        let weights = kernel_initializer.sample(
            (inputs, filters),
            inputs,
            kernel_h * kernel_w * filters,
            rng,
        )?;

        Ok(Conv2DLayer {
            name,
            input_shape: (height, width, channels),
            output_shape: (output_h, output_w, filters),
            filters,
            kernel_size,
            stride,
            padding,
            kernel_initializer,
            pad: (pad_top, pad_left),
            weights,
            bias: Array1::zeros(filters),
            weight_grads: Array2::zeros((inputs, filters)),
            bias_grads: Array1::zeros(filters),
            cols_cache: None,
        })
    }

    /// Lays every receptive field out as one row: `(batch * out_h * out_w, k_h * k_w * c)`.
    fn im2col(&self, input: ArrayView4<f32>) -> Array2<f32> {
        let batch = input.dim().0;
        let (height, width, channels) = self.input_shape;
        let (output_h, output_w, _) = self.output_shape;
        let (kernel_h, kernel_w) = self.kernel_size;

        let mut cols = Array2::zeros((batch * output_h * output_w, kernel_h * kernel_w * channels));

        for b in 0..batch {
            for oy in 0..output_h {
                for ox in 0..output_w {
                    let row = (b * output_h + oy) * output_w + ox;
                    for ky in 0..kernel_h {
                        let Some(iy) = self.source_index(oy, ky, self.stride.0, self.pad.0, height) else {
                            continue;
                        };
                        for kx in 0..kernel_w {
                            let Some(ix) = self.source_index(ox, kx, self.stride.1, self.pad.1, width) else {
                                continue;
                            };
                            let base = (ky * kernel_w + kx) * channels;
                            cols.slice_mut(s![row, base..base + channels])
                                .assign(&input.slice(s![b, iy, ix, ..]));
                        }
                    }
                }
            }
        }
        cols
    }

    /// Inverse of `im2col`: sums each column entry back into its input pixel.
    fn col2im(&self, cols: &Array2<f32>, batch: usize) -> Array4<f32> {
        let (height, width, channels) = self.input_shape;
        let (output_h, output_w, _) = self.output_shape;
        let (kernel_h, kernel_w) = self.kernel_size;

        let mut image = Array4::zeros((batch, height, width, channels));

        for b in 0..batch {
            for oy in 0..output_h {
                for ox in 0..output_w {
                    let row = (b * output_h + oy) * output_w + ox;
                    for ky in 0..kernel_h {
                        let Some(iy) = self.source_index(oy, ky, self.stride.0, self.pad.0, height) else {
                            continue;
                        };
                        for kx in 0..kernel_w {
                            let Some(ix) = self.source_index(ox, kx, self.stride.1, self.pad.1, width) else {
                                continue;
                            };
                            let base = (ky * kernel_w + kx) * channels;
                            let mut pixel = image.slice_mut(s![b, iy, ix, ..]);
                            pixel += &cols.slice(s![row, base..base + channels]);
                        }
                    }
                }
            }
        }
        image
    }

    /// Input coordinate read by output position `out` at kernel offset `k`,
    /// or `None` when it falls into the padding.
    fn source_index(&self, out: usize, k: usize, stride: usize, pad: usize, limit: usize) -> Option<usize> {
        (out * stride + k).checked_sub(pad).filter(|&i| i < limit)
    }
}

impl Layer for Conv2DLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Conv2D {
            filters: self.filters,
            kernel_size: self.kernel_size,
            strides: self.stride,
            padding: self.padding,
            kernel_initializer: self.kernel_initializer,
        }
    }

    fn input_shape(&self) -> Shape {
        let (height, width, channels) = self.input_shape;
        Shape::Spatial { height, width, channels }
    }

    fn output_shape(&self) -> Shape {
        let (height, width, channels) = self.output_shape;
        Shape::Spatial { height, width, channels }
    }

    fn forward(&mut self, input: &ArrayD<f32>, mode: Mode) -> Result<ArrayD<f32>> {
        check_input(self.input_shape(), input)?;
        let input = input.view().into_dimensionality::<Ix4>()?;
        let batch = input.dim().0;

        // Convolution as one matrix product over all receptive fields
        let cols = self.im2col(input);
        let mut output = cols.dot(&self.weights);
        output += &self.bias;

        if mode == Mode::Training {
            self.cols_cache = Some(cols);
        }

        let (output_h, output_w, filters) = self.output_shape;
        Ok(output
            .into_shape_with_order((batch, output_h, output_w, filters))?
            .into_dyn())
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let cols = self
            .cols_cache
            .as_ref()
            .ok_or_else(|| Error::MissingForwardCache(self.name.clone()))?;
        let rows = cols.nrows();
        let grad = grad_output.to_shape((rows, self.filters))?;

        self.weight_grads += &cols.t().dot(&grad);
        self.bias_grads += &grad.sum_axis(Axis(0));

        let grad_cols = grad.dot(&self.weights.t());
        let (output_h, output_w, _) = self.output_shape;
        let batch = rows / (output_h * output_w);
        Ok(self.col2im(&grad_cols, batch).into_dyn())
    }

    fn parameters(&mut self) -> Vec<Param<'_>> {
        vec![
            Param {
                value: self.weights.view_mut().into_dyn(),
                grad: self.weight_grads.view().into_dyn(),
            },
            Param {
                value: self.bias.view_mut().into_dyn(),
                grad: self.bias_grads.view().into_dyn(),
            },
        ]
    }

    fn weights(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.weights.view().into_dyn(), self.bias.view().into_dyn()]
    }

    fn zero_grads(&mut self) {
        self.weight_grads.fill(0.0);
        self.bias_grads.fill(0.0);
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
