use crate::{
    dataloader::error::EngineError,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::layer::{expect_inputs, Layer, LayerGradients};

/// Per-sample target shape; the batch dimension is always carried through.
#[derive(Clone, Debug, PartialEq)]
pub enum ReshapeTarget {
    // [N, everything else]
    Flatten,
    // [N, C, H, W]
    Image { channels: usize, height: usize, width: usize },
}

#[derive(Clone)]
pub struct ReshapeLayer {
    target: ReshapeTarget,
}

impl ReshapeLayer {
    pub fn new(target: ReshapeTarget) -> Self {
        Self { target }
    }

    pub fn flatten() -> Self {
        Self {
            target: ReshapeTarget::Flatten,
        }
    }

    fn resolve(&self, batch_size: usize, input: &TensorDesc) -> Result<TensorDesc, EngineError> {
        let per_sample = input.num_elements() / input.batch_size().max(1);

        let resolved = match &self.target {
            ReshapeTarget::Flatten => TensorDesc::new_matrix(batch_size, per_sample),
            ReshapeTarget::Image { channels, height, width } => {
                if channels * height * width != per_sample {
                    return Err(EngineError::ShapeMismatch {
                        layer: "Reshape".into(),
                        expected: format!("{} elements per sample", channels * height * width),
                        actual: input.clone(),
                    });
                }
                TensorDesc::new_tensor4d(batch_size, *channels, *height, *width)
            }
        };
        Ok(resolved)
    }
}

impl Layer for ReshapeLayer {
    fn output_shape(&self, batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError> {
        expect_inputs("Reshape", input_shapes.len(), 1)?;
        self.resolve(batch_size, input_shapes[0])
    }

    fn input_requirements(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn name(&self) -> String {
        match self.target {
            ReshapeTarget::Flatten => "Flatten".to_string(),
            ReshapeTarget::Image { .. } => "Reshape".to_string(),
        }
    }

    fn config_string(&self) -> Option<String> {
        match &self.target {
            ReshapeTarget::Flatten => None,
            ReshapeTarget::Image { channels, height, width } => {
                Some(format!("target={}×{}×{}", channels, height, width))
            }
        }
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, EngineError> {
        expect_inputs("Reshape", inputs.len(), 1)?;
        let desc = self.resolve(inputs[0].desc.batch_size(), &inputs[0].desc)?;
        Ok(inputs[0].reshaped(desc))
    }

    fn backward(&self, inputs: &[&Tensor], _output: &Tensor, grad_output: &Tensor) -> Result<LayerGradients, EngineError> {
        expect_inputs("Reshape", inputs.len(), 1)?;
        Ok(LayerGradients {
            inputs: vec![grad_output.reshaped(inputs[0].desc.clone())],
            parameters: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_keeps_batch_and_order() {
        let input = Tensor::from_vec(
            TensorDesc::new_tensor4d(2, 2, 1, 2),
            (0..8).map(|v| v as f32).collect(),
        );
        let out = ReshapeLayer::flatten().forward(&[&input]).unwrap();

        assert_eq!(out.desc, TensorDesc::new_matrix(2, 4));
        assert_eq!(out.row(1), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn image_target_must_match_element_count() {
        let input = TensorDesc::new_matrix(3, 12);
        let ok = ReshapeLayer::new(ReshapeTarget::Image { channels: 3, height: 2, width: 2 });
        assert_eq!(
            ok.output_shape(3, &[&input]).unwrap(),
            TensorDesc::new_tensor4d(3, 3, 2, 2)
        );

        let bad = ReshapeLayer::new(ReshapeTarget::Image { channels: 5, height: 2, width: 2 });
        assert!(bad.output_shape(3, &[&input]).is_err());
    }

    #[test]
    fn backward_restores_input_shape() {
        let input = Tensor::zeros(TensorDesc::new_tensor4d(1, 2, 3, 3));
        let layer = ReshapeLayer::flatten();
        let out = layer.forward(&[&input]).unwrap();
        let grads = layer.backward(&[&input], &out, &out).unwrap();
        assert_eq!(grads.inputs[0].desc, input.desc);
    }
}
