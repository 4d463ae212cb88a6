use rayon::prelude::*;

use crate::{
    dataloader::error::EngineError,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::layer::{expect_inputs, Layer, LayerGradients};

/// Max pooling with "valid" padding; windows that would run past the edge are dropped.
#[derive(Clone)]
pub struct MaxPool2DLayer {
    pub pool_h: usize,
    pub pool_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
}

impl MaxPool2DLayer {
    /// Square window with stride equal to the window size.
    pub fn new(pool_size: usize) -> Self {
        Self::new_with(pool_size, pool_size, pool_size, pool_size)
    }

    pub fn new_with(pool_h: usize, pool_w: usize, stride_h: usize, stride_w: usize) -> Self {
        Self {
            pool_h: pool_h.max(1),
            pool_w: pool_w.max(1),
            stride_h: stride_h.max(1),
            stride_w: stride_w.max(1),
        }
    }

    fn dims(&self, desc: &TensorDesc) -> Result<(usize, usize, usize, usize, usize, usize), EngineError> {
        match desc {
            TensorDesc::Tensor4D { batch, channels, height, width }
                if *height >= self.pool_h && *width >= self.pool_w =>
            {
                let oh = (height - self.pool_h) / self.stride_h + 1;
                let ow = (width - self.pool_w) / self.stride_w + 1;
                Ok((*batch, *channels, *height, *width, oh, ow))
            }
            other => Err(EngineError::ShapeMismatch {
                layer: "MaxPool2D".into(),
                expected: format!("N×C×H×W with H≥{} and W≥{}", self.pool_h, self.pool_w),
                actual: other.clone(),
            }),
        }
    }

    // Flat offset (within one channel plane) of the largest value in window (oy, ox).
    // Ties resolve to the first position in row-major order.
    fn argmax(&self, plane: &[f32], w: usize, oy: usize, ox: usize) -> usize {
        let mut best = oy * self.stride_h * w + ox * self.stride_w;
        for py in 0..self.pool_h {
            for px in 0..self.pool_w {
                let idx = (oy * self.stride_h + py) * w + ox * self.stride_w + px;
                if plane[idx] > plane[best] {
                    best = idx;
                }
            }
        }
        best
    }
}

impl Layer for MaxPool2DLayer {
    fn output_shape(&self, batch_size: usize, input_shapes: &[&TensorDesc]) -> Result<TensorDesc, EngineError> {
        expect_inputs("MaxPool2D", input_shapes.len(), 1)?;
        let (_, channels, _, _, oh, ow) = self.dims(input_shapes[0])?;
        Ok(TensorDesc::new_tensor4d(batch_size, channels, oh, ow))
    }

    fn input_requirements(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn name(&self) -> String {
        "MaxPool2D".to_string()
    }

    fn config_string(&self) -> Option<String> {
        Some(format!(
            "pool={}×{}, stride={}×{}",
            self.pool_h, self.pool_w, self.stride_h, self.stride_w
        ))
    }

    fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, EngineError> {
        expect_inputs("MaxPool2D", inputs.len(), 1)?;
        let (batch, channels, h, w, oh, ow) = self.dims(&inputs[0].desc)?;

        let x = &inputs[0].data;
        let mut out = vec![0.0f32; batch * channels * oh * ow];

        out.par_chunks_mut((oh * ow).max(1))
            .enumerate()
            .for_each(|(plane_idx, out)| {
                let plane = &x[plane_idx * h * w..(plane_idx + 1) * h * w];
                for oy in 0..oh {
                    for ox in 0..ow {
                        out[oy * ow + ox] = plane[self.argmax(plane, w, oy, ox)];
                    }
                }
            });

        Ok(Tensor::from_vec(TensorDesc::new_tensor4d(batch, channels, oh, ow), out))
    }

    fn backward(&self, inputs: &[&Tensor], _output: &Tensor, grad_output: &Tensor) -> Result<LayerGradients, EngineError> {
        expect_inputs("MaxPool2D", inputs.len(), 1)?;
        let (_, _, h, w, oh, ow) = self.dims(&inputs[0].desc)?;

        let x = &inputs[0].data;
        let go = &grad_output.data;
        let mut grad_input = vec![0.0f32; x.len()];

        // Only the winning position of each window receives gradient
        grad_input
            .par_chunks_mut((h * w).max(1))
            .enumerate()
            .for_each(|(plane_idx, gx)| {
                let plane = &x[plane_idx * h * w..(plane_idx + 1) * h * w];
                let go = &go[plane_idx * oh * ow..(plane_idx + 1) * oh * ow];
                for oy in 0..oh {
                    for ox in 0..ow {
                        gx[self.argmax(plane, w, oy, ox)] += go[oy * ow + ox];
                    }
                }
            });

        Ok(LayerGradients {
            inputs: vec![Tensor::from_vec(inputs[0].desc.clone(), grad_input)],
            parameters: Vec::new(),
        })
    }
}
