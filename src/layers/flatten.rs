use ndarray::ArrayD;

use crate::error::Result;
use crate::shape::Shape;

use super::{check_input, Layer, LayerConfig, Mode};

#[derive(Debug, Clone)]
pub struct FlattenLayer {
    pub name: String,
    pub input_shape: Shape,
}

impl FlattenLayer {
    pub fn new(name: String, input_shape: Shape) -> Self {
        FlattenLayer { name, input_shape }
    }
}

impl Layer for FlattenLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Flatten
    }

    fn input_shape(&self) -> Shape {
        self.input_shape
    }

    fn output_shape(&self) -> Shape {
        Shape::Flat(self.input_shape.size())
    }

    fn forward(&mut self, input: &ArrayD<f32>, _mode: Mode) -> Result<ArrayD<f32>> {
        check_input(self.input_shape, input)?;
        let batch = input.shape()[0];
        // Row-major over (height, width, channels)
        let flat = input.to_shape(vec![batch, self.input_shape.size()])?;
        Ok(flat.into_owned())
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let batch = grad_output.shape()[0];
        let grad = grad_output.to_shape(self.input_shape.with_batch(batch))?;
        Ok(grad.into_owned())
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
