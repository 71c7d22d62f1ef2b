use ndarray::{Array4, ArrayD, Ix4};

use crate::error::{Error, Result};
use crate::shape::Shape;

use super::{check_input, dimension_mismatch, Layer, LayerConfig, Mode};

#[derive(Debug, Clone)]
pub struct MaxPoolLayer {
    pub name: String,
    pub input_shape: (usize, usize, usize),  // (height, width, channels)
    pub output_shape: (usize, usize, usize),
    pub pool_size: (usize, usize),
    pub stride: (usize, usize),
    max_indices: Option<Array4<(usize, usize)>>,
}

impl MaxPoolLayer {
    pub fn new(
        name: String,
        input_shape: Shape,
        pool_size: (usize, usize),
        stride: (usize, usize),
    ) -> Result<Self> {
        let (input_height, input_width, channels) = match input_shape {
            Shape::Spatial { height, width, channels } => (height, width, channels),
            Shape::Flat(_) => {
                return Err(dimension_mismatch(
                    &name,
                    format!("expected a spatial (height, width, channels) input, got ({})", input_shape),
                ))
            }
        };
        if pool_size.0 == 0 || pool_size.1 == 0 || stride.0 == 0 || stride.1 == 0 {
            return Err(Error::InvalidLayer(format!(
                "{}: pool size and stride must be positive",
                name
            )));
        }
        if input_height < pool_size.0 || input_width < pool_size.1 {
            return Err(dimension_mismatch(
                &name,
                format!(
                    "pool {}x{} does not fit input ({}); output would be empty",
                    pool_size.0, pool_size.1, input_shape
                ),
            ));
        }

        // Calculate output dimensions
        let output_height = ((input_height - pool_size.0) / stride.0) + 1;
        let output_width = ((input_width - pool_size.1) / stride.1) + 1;

        Ok(MaxPoolLayer {
            name,
            input_shape: (input_height, input_width, channels),
            output_shape: (output_height, output_width, channels),
            pool_size,
            stride,
            max_indices: None,
        })
    }
}

impl Layer for MaxPoolLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::MaxPooling2D {
            pool_size: self.pool_size,
            strides: self.stride,
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
        let input_4d = input.view().into_dimensionality::<Ix4>()?;
        let batch = input_4d.dim().0;
        let (output_height, output_width, channels) = self.output_shape;

        let mut output = Array4::<f32>::zeros((batch, output_height, output_width, channels));
        let mut max_indices = Array4::<(usize, usize)>::from_elem(
            (batch, output_height, output_width, channels),
            (0, 0),
        );

        // Perform max pooling
        for b in 0..batch {
            for h in 0..output_height {
                for w in 0..output_width {
                    let h_start = h * self.stride.0;
                    let w_start = w * self.stride.1;
                    for c in 0..channels {
                        let mut max_val = f32::NEG_INFINITY;
                        let mut max_pos = (h_start, w_start);

                        // Find maximum in pooling window
                        for ph in 0..self.pool_size.0 {
                            for pw in 0..self.pool_size.1 {
                                let val = input_4d[[b, h_start + ph, w_start + pw, c]];
                                if val > max_val {
                                    max_val = val;
                                    max_pos = (h_start + ph, w_start + pw);
                                }
                            }
                        }

                        output[[b, h, w, c]] = max_val;
                        max_indices[[b, h, w, c]] = max_pos;
                    }
                }
            }
        }

        if mode == Mode::Training {
            self.max_indices = Some(max_indices);
        }
        Ok(output.into_dyn())
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let max_indices = self
            .max_indices
            .as_ref()
            .ok_or_else(|| Error::MissingForwardCache(self.name.clone()))?;
        let grad_output_4d = grad_output.view().into_dimensionality::<Ix4>()?;
        if grad_output_4d.dim() != max_indices.dim() {
            return Err(dimension_mismatch(
                &self.name,
                format!("gradient shape {:?} does not match the last forward pass", grad_output.shape()),
            ));
        }

        let (height, width, channels) = self.input_shape;
        let batch = grad_output_4d.dim().0;
        let mut input_gradient = Array4::<f32>::zeros((batch, height, width, channels));

        // Route each gradient back to the position that won the max
        for ((b, h, w, c), &(max_h, max_w)) in max_indices.indexed_iter() {
            input_gradient[[b, max_h, max_w, c]] += grad_output_4d[[b, h, w, c]];
        }

        Ok(input_gradient.into_dyn())
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
