use crate::{
    dataloader::error::EngineError,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::layer::{expect_inputs, Layer, LayerGradients};

#[derive(Clone, Debug, PartialEq)]
pub enum ActivationType {
    ReLU,
    Sigmoid,
    // Normalizes over the feature axis of a [N, features] matrix
    Softmax,
}

impl ActivationType {
    pub fn name(&self) -> String {
        match self {
            ActivationType::ReLU => "ReLU".to_string(),
            ActivationType::Sigmoid => "Sigmoid".to_string(),
            ActivationType::Softmax => "Softmax".to_string(),
        }
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax_row(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}

// ReLU, Sigmoid, Softmax
#[derive(Clone)]
pub struct ActivationLayer {
    pub activation_type: ActivationType,
}

impl ActivationLayer {
    pub fn new(activation_type: ActivationType) -> Self {
        Self { activation_type }
    }

    fn softmax_features(&self, desc: &TensorDesc) -> Result<usize, EngineError> {
        match desc {
            TensorDesc::Matrix { cols, .. } => Ok(*cols),
            other => Err(EngineError::ShapeMismatch {
                layer: "Softmax".into(),
                expected: "N×features matrix".into(),
                actual: other.clone(),
            }),
        }
    }
}

impl Layer for ActivationLayer {
    fn output_shape(&self, _batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError> {
        expect_inputs("Activation", input_shapes.len(), 1)?;
        if self.activation_type == ActivationType::Softmax {
            self.softmax_features(input_shapes[0])?;
        }

        // Activation functions preserve input shape
        Ok(input_shapes[0].clone())
    }

    fn input_requirements(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn name(&self) -> String {
        self.activation_type.name()
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, EngineError> {
        expect_inputs("Activation", inputs.len(), 1)?;
        let mut output = inputs[0].clone();

        match self.activation_type {
            ActivationType::ReLU => output.data.iter_mut().for_each(|v| *v = v.max(0.0)),
            ActivationType::Sigmoid => output.data.iter_mut().for_each(|v| *v = sigmoid(*v)),
            ActivationType::Softmax => {
                let features = self.softmax_features(&output.desc)?;
                output.data.chunks_mut(features.max(1)).for_each(softmax_row);
            }
        }
        Ok(output)
    }

    fn backward(&self, inputs: &[&Tensor], output: &Tensor, grad_output: &Tensor) -> Result<LayerGradients, EngineError> {
        expect_inputs("Activation", inputs.len(), 1)?;
        let mut grad = grad_output.clone();

        match self.activation_type {
            ActivationType::ReLU => {
                for (g, x) in grad.data.iter_mut().zip(inputs[0].data.iter()) {
                    if *x <= 0.0 {
                        *g = 0.0;
                    }
                }
            }
            ActivationType::Sigmoid => {
                for (g, y) in grad.data.iter_mut().zip(output.data.iter()) {
                    *g *= y * (1.0 - y);
                }
            }
            ActivationType::Softmax => {
                // dx_i = y_i * (g_i - sum_j g_j y_j)
                let features = self.softmax_features(&output.desc)?.max(1);
                for (g, y) in grad.data.chunks_mut(features).zip(output.data.chunks(features)) {
                    let dot: f32 = g.iter().zip(y.iter()).map(|(g, y)| g * y).sum();
                    for (g, y) in g.iter_mut().zip(y.iter()) {
                        *g = y * (*g - dot);
                    }
                }
            }
        }

        Ok(LayerGradients {
            inputs: vec![grad],
            parameters: Vec::new(),
        })
    }
}
