use rand::rngs::StdRng;

use crate::{
    dataloader::error::EngineError,
    model::weight_init::WeightInit,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

/// Gradients produced by one layer's backward pass.
pub struct LayerGradients {
    // One per input, in input order
    pub inputs: Vec<Tensor>,
    // One per trainable parameter, in `parameters()` order
    pub parameters: Vec<Tensor>,
}

pub trait Layer: Send + Sync {
    // Calculate the output shape of this layer for the given batch size
    fn output_shape(&self, batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError>;

    // For graph verification, how many inputs this layer requires (min and max)
    fn input_requirements(&self) -> (usize, Option<usize>);

    // Return a string representation of the layers type
    fn name(&self) -> String;

    // Return optional configuration details for the layer
    fn config_string(&self) -> Option<String> {
        None
    }

    // Return the total number of trainable parameters in this layer
    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }

    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    // Kernels take `weight_init`, biases start at zero
    fn init_parameters(&mut self, _weight_init: &WeightInit, _rng: &mut StdRng) {}

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, EngineError>;

    // `output` is this layer's forward result for the same `inputs`
    fn backward(&self, inputs: &[&Tensor], output: &Tensor, grad_output: &Tensor) -> Result<LayerGradients, EngineError>;
}

pub(crate) fn expect_inputs(layer: &str, inputs: usize, expected: usize) -> Result<(), EngineError> {
    if inputs != expected {
        return Err(EngineError::InvalidGraph(format!(
            "{} layer requires exactly {} input(s), got {}",
            layer, expected, inputs
        )));
    }
    Ok(())
}
