#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TensorDesc {
    // For vectors/1D tensors (e.g., biases)
    Vector { length: usize },

    // For matrices/2D tensors (e.g., linear layer weights, flattened activations)
    Matrix { rows: usize, cols: usize },

    // For 4D tensors (e.g., conv layer weights, image batches), NCHW
    Tensor4D {
        batch: usize,
        channels: usize,
        height: usize,
        width: usize,
    },
}

impl TensorDesc {
    pub fn new_vector(length: usize) -> Self {
        Self::Vector { length }
    }

    pub fn new_matrix(rows: usize, cols: usize) -> Self {
        Self::Matrix { rows, cols }
    }

    pub fn new_tensor4d(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self::Tensor4D { batch, channels, height, width }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.num_elements() * std::mem::size_of::<f32>()
    }

    pub fn num_elements(&self) -> usize {
        match self {
            Self::Vector { length } => *length,
            Self::Matrix { rows, cols } => rows * cols,
            Self::Tensor4D { batch, channels, height, width } => batch * channels * height * width,
        }
    }

    pub fn to_dims(&self) -> Vec<usize> {
        match self {
            Self::Vector { length } => vec![*length],
            Self::Matrix { rows, cols } => vec![*rows, *cols],
            Self::Tensor4D { batch, channels, height, width } => {
                vec![*batch, *channels, *height, *width]
            }
        }
    }

    /// Leading dimension. Vectors are treated as a single sample.
    pub fn batch_size(&self) -> usize {
        match self {
            Self::Vector { .. } => 1,
            Self::Matrix { rows, .. } => *rows,
            Self::Tensor4D { batch, .. } => *batch,
        }
    }

    /// Shape with the batch dimension dropped, e.g. "32×26×26".
    pub fn sample_dims_string(&self) -> String {
        let dims = self.to_dims();
        let sample = if dims.len() > 1 { &dims[1..] } else { &dims[..] };
        sample
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("×")
    }
}
