use crate::{
    dataloader::error::EngineError,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::layer::{Layer, LayerGradients};

#[derive(Clone, Debug, PartialEq)]
pub enum ElementWiseOperation {
    Add,
}

impl ElementWiseOperation {
    fn name(&self) -> String {
        match self {
            ElementWiseOperation::Add => "Add".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ElementWiseLayer {
    pub operation: ElementWiseOperation,
}

impl ElementWiseLayer {
    pub fn new(operation: ElementWiseOperation) -> Self {
        Self { operation }
    }

    fn check_shapes<'a>(&self, input_shapes: &[&'a TensorDesc]) -> Result<&'a TensorDesc, EngineError> {
        if input_shapes.len() < 2 {
            return Err(EngineError::InvalidGraph(format!(
                "Element-wise operation requires at least 2 inputs, got {}",
                input_shapes.len()
            )));
        }

        // All inputs must have the same shape
        let first_shape = input_shapes[0];
        for shape in &input_shapes[1..] {
            if *shape != first_shape {
                return Err(EngineError::ShapeMismatch {
                    layer: self.operation.name(),
                    expected: format!("{:?}", first_shape.to_dims()),
                    actual: (*shape).clone(),
                });
            }
        }
        Ok(first_shape)
    }
}

impl Layer for ElementWiseLayer {
    fn output_shape(&self, _batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError> {
        // Output has the same shape as inputs
        self.check_shapes(input_shapes).cloned()
    }

    fn input_requirements(&self) -> (usize, Option<usize>) {
        (2, None) // At least 2 inputs, no upper limit
    }

    fn name(&self) -> String {
        self.operation.name()
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, EngineError> {
        let shapes: Vec<&TensorDesc> = inputs.iter().map(|t| &t.desc).collect();
        self.check_shapes(&shapes)?;

        let mut output = inputs[0].clone();
        for input in &inputs[1..] {
            match self.operation {
                ElementWiseOperation::Add => output.add_assign(input)?,
            }
        }
        Ok(output)
    }

    fn backward(&self, inputs: &[&Tensor], _output: &Tensor, grad_output: &Tensor) -> Result<LayerGradients, EngineError> {
        let grads = match self.operation {
            ElementWiseOperation::Add => vec![grad_output.clone(); inputs.len()],
        };

        Ok(LayerGradients {
            inputs: grads,
            parameters: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> Tensor {
        Tensor::from_vec(TensorDesc::new_matrix(1, values.len()), values.to_vec())
    }

    #[test]
    fn add_sums_inputs_and_broadcasts_gradient() {
        let layer = ElementWiseLayer::new(ElementWiseOperation::Add);
        let (a, b) = (vector(&[1.0, 2.0]), vector(&[0.5, -2.0]));
        let out = layer.forward(&[&a, &b]).unwrap();
        assert_eq!(out.data, vec![1.5, 0.0]);

        let g = vector(&[3.0, 4.0]);
        let grads = layer.backward(&[&a, &b], &out, &g).unwrap();
        assert_eq!(grads.inputs.len(), 2);
        assert!(grads.inputs.iter().all(|t| t.data == g.data));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let layer = ElementWiseLayer::new(ElementWiseOperation::Add);
        let (a, b) = (vector(&[1.0]), vector(&[1.0, 2.0]));
        assert!(matches!(
            layer.forward(&[&a, &b]),
            Err(EngineError::ShapeMismatch { .. })
        ));
    }
}
