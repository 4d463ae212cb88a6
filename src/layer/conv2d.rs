use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::{
    dataloader::error::EngineError,
    model::weight_init::WeightInit,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::layer::{expect_inputs, Layer, LayerGradients};

#[derive(Clone)]
pub struct Conv2DLayer {
    pub in_features: usize,  // Input channels
    pub out_features: usize, // Output channels
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub padding_h: usize,
    pub padding_w: usize,
    pub bias: bool,

    // [out_channels, in_channels, kernel_h, kernel_w]
    pub weights: Tensor,
    // [out_channels], empty when bias is disabled
    pub biases: Tensor,
}

impl Conv2DLayer {
    /// 3×3 kernel, stride 1, no padding ("valid"), with bias.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::new_with(in_features, out_features, 3, 3, 1, 1, 0, 0, true)
    }

    /// 3×3 kernel, stride 1, padding 1 so the spatial size is preserved ("same").
    pub fn same(in_features: usize, out_features: usize) -> Self {
        Self::new_with(in_features, out_features, 3, 3, 1, 1, 1, 1, true)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_with(
        in_features: usize,
        out_features: usize,
        kernel_h: usize,
        kernel_w: usize,
        stride_h: usize,
        stride_w: usize,
        padding_h: usize,
        padding_w: usize,
        bias: bool,
    ) -> Self {
        let weights = Tensor::zeros(TensorDesc::new_tensor4d(out_features, in_features, kernel_h, kernel_w));
        let biases = Tensor::zeros(TensorDesc::new_vector(if bias { out_features } else { 0 }));

        Self {
            in_features,
            out_features,
            kernel_h,
            kernel_w,
            stride_h: stride_h.max(1),
            stride_w: stride_w.max(1),
            padding_h,
            padding_w,
            bias,
            weights,
            biases,
        }
    }

    fn input_dims(&self, desc: &TensorDesc) -> Result<(usize, usize, usize), EngineError> {
        match desc {
            TensorDesc::Tensor4D { batch, channels, height, width } if *channels == self.in_features => {
                Ok((*batch, *height, *width))
            }
            other => Err(EngineError::ShapeMismatch {
                layer: "Conv2D".into(),
                expected: format!("N×{}×H×W", self.in_features),
                actual: other.clone(),
            }),
        }
    }

    fn output_hw(&self, h_in: usize, w_in: usize) -> Result<(usize, usize), EngineError> {
        let padded_h = h_in + 2 * self.padding_h;
        let padded_w = w_in + 2 * self.padding_w;

        if padded_h < self.kernel_h || padded_w < self.kernel_w {
            return Err(EngineError::InvalidGraph(format!(
                "Conv2D kernel {}×{} larger than padded input {}×{}",
                self.kernel_h, self.kernel_w, padded_h, padded_w
            )));
        }

        let h_out = ((padded_h - self.kernel_h) / self.stride_h) + 1;
        let w_out = ((padded_w - self.kernel_w) / self.stride_w) + 1;
        Ok((h_out, w_out))
    }

    #[inline]
    fn weight_index(&self, oc: usize, ic: usize, ky: usize, kx: usize) -> usize {
        ((oc * self.in_features + ic) * self.kernel_h + ky) * self.kernel_w + kx
    }
}

// Input coordinate read by output position `o` at kernel offset `k`, None inside the zero padding
#[inline]
fn source_index(o: usize, k: usize, stride: usize, padding: usize, size: usize) -> Option<usize> {
    let pos = o * stride + k;
    if pos < padding {
        return None;
    }
    let i = pos - padding;
    (i < size).then_some(i)
}

impl Layer for Conv2DLayer {
    fn output_shape(&self, batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError> {
        expect_inputs("Conv2D", input_shapes.len(), 1)?;

        let (_, h_in, w_in) = self.input_dims(input_shapes[0])?;
        let (h_out, w_out) = self.output_hw(h_in, w_in)?;

        Ok(TensorDesc::new_tensor4d(batch_size, self.out_features, h_out, w_out))
    }

    fn input_requirements(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn name(&self) -> String {
        "Conv2D".to_string()
    }

    fn config_string(&self) -> Option<String> {
        Some(format!(
            "in_channels={}, out_channels={}, kernel={}×{}, stride={}×{}, padding={}×{}, bias={}",
            self.in_features, self.out_features,
            self.kernel_h, self.kernel_w,
            self.stride_h, self.stride_w,
            self.padding_h, self.padding_w,
            self.bias
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
        expect_inputs("Conv2D", inputs.len(), 1)?;

        let (batch, h, w) = self.input_dims(&inputs[0].desc)?;
        let (oh, ow) = self.output_hw(h, w)?;

        let in_plane = h * w;
        let in_sample = self.in_features * in_plane;
        let out_plane = oh * ow;
        let out_sample = self.out_features * out_plane;

        let x = &inputs[0].data;
        let k = &self.weights.data;
        let mut out = vec![0.0f32; batch * out_sample];

        out.par_chunks_mut(out_sample.max(1)).enumerate().for_each(|(n, out)| {
            let x = &x[n * in_sample..(n + 1) * in_sample];

            for oc in 0..self.out_features {
                let b = if self.bias { self.biases.data[oc] } else { 0.0 };

                for oy in 0..oh {
                    for ox in 0..ow {
                        let mut acc = b;
                        for ic in 0..self.in_features {
                            for ky in 0..self.kernel_h {
                                let Some(iy) = source_index(oy, ky, self.stride_h, self.padding_h, h) else {
                                    continue;
                                };
                                for kx in 0..self.kernel_w {
                                    let Some(ix) = source_index(ox, kx, self.stride_w, self.padding_w, w) else {
                                        continue;
                                    };
                                    acc += x[ic * in_plane + iy * w + ix] * k[self.weight_index(oc, ic, ky, kx)];
                                }
                            }
                        }
                        out[oc * out_plane + oy * ow + ox] = acc;
                    }
                }
            }
        });

        Ok(Tensor::from_vec(
            TensorDesc::new_tensor4d(batch, self.out_features, oh, ow),
            out,
        ))
    }

    fn backward(&self, inputs: &[&Tensor], _output: &Tensor, grad_output: &Tensor) -> Result<LayerGradients, EngineError> {
        expect_inputs("Conv2D", inputs.len(), 1)?;

        let (batch, h, w) = self.input_dims(&inputs[0].desc)?;
        let (oh, ow) = self.output_hw(h, w)?;

        let in_plane = h * w;
        let in_sample = self.in_features * in_plane;
        let out_plane = oh * ow;
        let out_sample = self.out_features * out_plane;

        let x = &inputs[0].data;
        let go = &grad_output.data;
        let k = &self.weights.data;
        let mut grad_input = vec![0.0f32; batch * in_sample];

        // Each sample writes its own input-gradient slice and returns partial
        // kernel/bias gradients, summed in sample order afterwards
        let partials: Vec<(Vec<f32>, Vec<f32>)> = grad_input
            .par_chunks_mut(in_sample.max(1))
            .enumerate()
            .map(|(n, gx)| {
                let x = &x[n * in_sample..(n + 1) * in_sample];
                let go = &go[n * out_sample..(n + 1) * out_sample];
                let mut gw = vec![0.0f32; k.len()];
                let mut gb = vec![0.0f32; self.out_features];

                for oc in 0..self.out_features {
                    for oy in 0..oh {
                        for ox in 0..ow {
                            let g = go[oc * out_plane + oy * ow + ox];
                            if g == 0.0 {
                                continue;
                            }
                            gb[oc] += g;

                            for ic in 0..self.in_features {
                                for ky in 0..self.kernel_h {
                                    let Some(iy) = source_index(oy, ky, self.stride_h, self.padding_h, h) else {
                                        continue;
                                    };
                                    for kx in 0..self.kernel_w {
                                        let Some(ix) = source_index(ox, kx, self.stride_w, self.padding_w, w) else {
                                            continue;
                                        };
                                        let wi = self.weight_index(oc, ic, ky, kx);
                                        let xi = ic * in_plane + iy * w + ix;
                                        gw[wi] += x[xi] * g;
                                        gx[xi] += k[wi] * g;
                                    }
                                }
                            }
                        }
                    }
                }
                (gw, gb)
            })
            .collect();

        let mut grad_weights = vec![0.0f32; k.len()];
        let mut grad_biases = vec![0.0f32; self.out_features];
        for (gw, gb) in partials {
            grad_weights.iter_mut().zip(gw).for_each(|(a, b)| *a += b);
            grad_biases.iter_mut().zip(gb).for_each(|(a, b)| *a += b);
        }

        let mut parameters = vec![Tensor::from_vec(self.weights.desc.clone(), grad_weights)];
        if self.bias {
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
    fn valid_and_same_padding_shapes() {
        let input = TensorDesc::new_tensor4d(2, 3, 28, 28);
        let valid = Conv2DLayer::new(3, 32).output_shape(2, &[&input]).unwrap();
        assert_eq!(valid, TensorDesc::new_tensor4d(2, 32, 26, 26));

        let hidden = TensorDesc::new_tensor4d(2, 32, 26, 26);
        let same = Conv2DLayer::same(32, 32).output_shape(2, &[&hidden]).unwrap();
        assert_eq!(same, hidden);
    }

    #[test]
    fn rejects_wrong_channel_count() {
        let input = TensorDesc::new_tensor4d(1, 1, 28, 28);
        assert!(matches!(
            Conv2DLayer::new(3, 8).output_shape(1, &[&input]),
            Err(EngineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn identity_kernel_copies_input() {
        let mut conv = Conv2DLayer::new_with(1, 1, 3, 3, 1, 1, 1, 1, false);
        conv.weights.data = vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];

        let input = Tensor::from_vec(
            TensorDesc::new_tensor4d(1, 1, 2, 2),
            vec![1.0, 2.0, 3.0, 4.0],
        );
        let out = conv.forward(&[&input]).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut conv = Conv2DLayer::same(2, 3);
        conv.init_parameters(&WeightInit::Xavier, &mut rng);
        conv.biases.data = vec![0.1, -0.2, 0.3];

        let input = seeded_tensor(TensorDesc::new_tensor4d(2, 2, 4, 4), 5);
        check_input_gradient(&conv, &input);
        check_parameter_gradient(&mut conv, &input, 0);
        check_parameter_gradient(&mut conv, &input, 1);
    }
}
