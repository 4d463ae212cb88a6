use crate::{
    dataloader::error::EngineError,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::layer::{expect_inputs, Layer, LayerGradients};

/// Graph entry point holding an image batch in NCHW layout.
///
/// The graph has no upstream layer for it, so `forward` receives the caller's
/// batch as its single input and only checks the per-sample shape.
#[derive(Clone)]
pub struct InputLayer {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl InputLayer {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width }
    }

    fn check(&self, desc: &TensorDesc) -> Result<(), EngineError> {
        match desc {
            TensorDesc::Tensor4D { channels, height, width, .. }
                if *channels == self.channels && *height == self.height && *width == self.width =>
            {
                Ok(())
            }
            other => Err(EngineError::ShapeMismatch {
                layer: "InputBuffer".into(),
                expected: format!("N×{}×{}×{}", self.channels, self.height, self.width),
                actual: other.clone(),
            }),
        }
    }
}

impl Layer for InputLayer {
    fn output_shape(&self, batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError> {
        // Input layers ignore input_shapes since they're entry points
        if !input_shapes.is_empty() {
            return Err(EngineError::InvalidGraph(format!(
                "InputBuffer expects 0 inputs, got {}",
                input_shapes.len()
            )));
        }

        Ok(TensorDesc::new_tensor4d(batch_size, self.channels, self.height, self.width))
    }

    fn input_requirements(&self) -> (usize, Option<usize>) {
        (0, Some(0))
    }

    fn name(&self) -> String {
        "InputBuffer".to_string()
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, EngineError> {
        expect_inputs("InputBuffer", inputs.len(), 1)?;
        self.check(&inputs[0].desc)?;
        Ok(inputs[0].clone())
    }

    fn backward(&self, _inputs: &[&Tensor], _output: &Tensor, _grad_output: &Tensor) -> Result<LayerGradients, EngineError> {
        // Nothing upstream to propagate into
        Ok(LayerGradients {
            inputs: Vec::new(),
            parameters: Vec::new(),
        })
    }
}
