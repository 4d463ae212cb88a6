use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::{
    dataloader::error::EngineError,
    model::weight_init::WeightInit,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::layer::{expect_inputs, Layer, LayerGradients};

#[derive(Clone)]
pub struct LinearLayer {
    pub in_features: usize,
    pub out_features: usize,
    pub bias: bool,

    // [out_features, in_features]
    pub weights: Tensor,
    // [out_features], empty when bias is disabled
    pub biases: Tensor,
}

impl LinearLayer {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::new_with(in_features, out_features, true)
    }

    pub fn new_with(in_features: usize, out_features: usize, bias: bool) -> Self {
        Self {
            in_features,
            out_features,
            bias,
            weights: Tensor::zeros(TensorDesc::new_matrix(out_features, in_features)),
            biases: Tensor::zeros(TensorDesc::new_vector(if bias { out_features } else { 0 })),
        }
    }

    fn rows(&self, desc: &TensorDesc) -> Result<usize, EngineError> {
        match desc {
            TensorDesc::Matrix { rows, cols } if *cols == self.in_features => Ok(*rows),
            other => Err(EngineError::ShapeMismatch {
                layer: "Linear".into(),
                expected: format!("N×{}", self.in_features),
                actual: other.clone(),
            }),
        }
    }
}

impl Layer for LinearLayer {
    fn output_shape(&self, batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError> {
        expect_inputs("Linear", input_shapes.len(), 1)?;
        self.rows(input_shapes[0])?;

        // Output shape is [batch_size, out_features]
        Ok(TensorDesc::new_matrix(batch_size, self.out_features))
    }

    fn input_requirements(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn name(&self) -> String {
        "Linear".to_string()
    }

    fn config_string(&self) -> Option<String> {
        Some(format!(
            "in={}, out={}, bias={}",
            self.in_features, self.out_features, self.bias
        ))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        if self.bias {
            vec![&self.weights, &self.biases]
        } else {
            vec![&self.weights]
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        if self.bias {
            vec![&mut self.weights, &mut self.biases]
        } else {
            vec![&mut self.weights]
        }
    }

    fn init_parameters(&mut self, weight_init: &WeightInit, rng: &mut StdRng) {
        self.weights.data = weight_init.init(&self.weights.desc.to_dims(), rng);
        self.biases.data.iter_mut().for_each(|b| *b = 0.0);
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, EngineError> {
        expect_inputs("Linear", inputs.len(), 1)?;
        let rows = self.rows(&inputs[0].desc)?;

        let x = &inputs[0].data;
        let w = &self.weights.data;
        let mut out = vec![0.0f32; rows * self.out_features];

        // y = x W^T + b
        out.par_chunks_mut(self.out_features.max(1))
            .enumerate()
            .for_each(|(n, y)| {
                let x = &x[n * self.in_features..(n + 1) * self.in_features];
                for (o, y) in y.iter_mut().enumerate() {
                    let w = &w[o * self.in_features..(o + 1) * self.in_features];
                    let dot: f32 = x.iter().zip(w.iter()).map(|(a, b)| a * b).sum();
                    *y = dot + if self.bias { self.biases.data[o] } else { 0.0 };
                }
            });

        Ok(Tensor::from_vec(TensorDesc::new_matrix(rows, self.out_features), out))
    }

    fn backward(&self, inputs: &[&Tensor], _output: &Tensor, grad_output: &Tensor) -> Result<LayerGradients, EngineError> {
        expect_inputs("Linear", inputs.len(), 1)?;
        let rows = self.rows(&inputs[0].desc)?;

        let x = &inputs[0].data;
        let g = &grad_output.data;
        let w = &self.weights.data;

        // dx = g W
        let mut grad_input = vec![0.0f32; rows * self.in_features];
        grad_input
            .par_chunks_mut(self.in_features.max(1))
            .enumerate()
            .for_each(|(n, dx)| {
                let g = &g[n * self.out_features..(n + 1) * self.out_features];
                for (o, &go) in g.iter().enumerate() {
                    let w = &w[o * self.in_features..(o + 1) * self.in_features];
                    dx.iter_mut().zip(w.iter()).for_each(|(d, w)| *d += go * w);
                }
            });

        // dW = g^T x, one output row per task
        let mut grad_weights = vec![0.0f32; w.len()];
        grad_weights
            .par_chunks_mut(self.in_features.max(1))
            .enumerate()
            .for_each(|(o, dw)| {
                for n in 0..rows {
                    let go = g[n * self.out_features + o];
                    let x = &x[n * self.in_features..(n + 1) * self.in_features];
                    dw.iter_mut().zip(x.iter()).for_each(|(d, x)| *d += go * x);
                }
            });

        let mut parameters = vec![Tensor::from_vec(self.weights.desc.clone(), grad_weights)];
        if self.bias {
            let mut grad_biases = vec![0.0f32; self.out_features];
            for row in g.chunks(self.out_features.max(1)) {
                grad_biases.iter_mut().zip(row.iter()).for_each(|(b, g)| *b += g);
            }
            parameters.push(Tensor::from_vec(self.biases.desc.clone(), grad_biases));
        }

        Ok(LayerGradients {
            inputs: vec![Tensor::from_vec(inputs[0].desc.clone(), grad_input)],
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::test_util::{check_input_gradient, check_parameter_gradient, seeded_tensor};
    use rand::SeedableRng;

    #[test]
    fn computes_affine_map() {
        let mut layer = LinearLayer::new(2, 1);
        layer.weights.data = vec![2.0, -1.0];
        layer.biases.data = vec![0.5];

        let input = Tensor::from_vec(TensorDesc::new_matrix(2, 2), vec![1.0, 1.0, 3.0, 2.0]);
        assert_eq!(layer.forward(&[&input]).unwrap().data, vec![1.5, 4.5]);
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let input = TensorDesc::new_matrix(4, 7);
        assert!(LinearLayer::new(8, 2).output_shape(4, &[&input]).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut layer = LinearLayer::new(6, 4);
        layer.init_parameters(&WeightInit::Xavier, &mut StdRng::seed_from_u64(2));

        let input = seeded_tensor(TensorDesc::new_matrix(3, 6), 8);
        check_input_gradient(&layer, &input);
        check_parameter_gradient(&mut layer, &input, 0);
        check_parameter_gradient(&mut layer, &input, 1);
    }
}
