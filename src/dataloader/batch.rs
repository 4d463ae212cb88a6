use crate::tensor::{tensor::Tensor, tensor_desc::TensorDesc};

use super::{
    mnist::{IMAGE_COLS, IMAGE_ROWS},
    synth::{ColorFlag, SyntheticExample, CHANNELS, VALUES_PER_IMAGE},
};

/// Three aligned arrays: images `(B, 28, 28, 3)` channel last, digit labels `(B,)`, color labels `(B,)`.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub images: Vec<f32>,
    pub digits: Vec<u8>,
    pub colors: Vec<ColorFlag>,
}

impl Batch {
    pub fn with_capacity(batch_size: usize) -> Self {
        Self {
            images: Vec::with_capacity(batch_size * VALUES_PER_IMAGE),
            digits: Vec::with_capacity(batch_size),
            colors: Vec::with_capacity(batch_size),
        }
    }

    pub fn push(&mut self, example: SyntheticExample) {
        self.images.extend_from_slice(&example.image);
        self.digits.push(example.digit);
        self.colors.push(example.color);
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn image_shape(&self) -> [usize; 4] {
        [self.len(), IMAGE_ROWS, IMAGE_COLS, CHANNELS]
    }

    /// The `index`-th image, 28×28×3 channel last.
    pub fn image(&self, index: usize) -> &[f32] {
        &self.images[index * VALUES_PER_IMAGE..(index + 1) * VALUES_PER_IMAGE]
    }

    pub fn color_targets(&self) -> Vec<f32> {
        self.colors.iter().map(|c| c.target()).collect()
    }

    /// Transposes the images into the `N×C×H×W` layout the layers run on.
    pub fn to_input_tensor(&self) -> Tensor {
        let n = self.len();
        let plane = IMAGE_ROWS * IMAGE_COLS;
        let mut data = vec![0.0f32; n * VALUES_PER_IMAGE];

        for (sample, out) in data.chunks_exact_mut(VALUES_PER_IMAGE).enumerate() {
            let image = self.image(sample);
            for (p, pixel) in image.chunks_exact(CHANNELS).enumerate() {
                for (c, &value) in pixel.iter().enumerate() {
                    out[c * plane + p] = value;
                }
            }
        }

        Tensor::from_vec(TensorDesc::new_tensor4d(n, CHANNELS, IMAGE_ROWS, IMAGE_COLS), data)
    }
}
