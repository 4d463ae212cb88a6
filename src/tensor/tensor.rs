use crate::dataloader::error::EngineError;

use super::tensor_desc::TensorDesc;

/// Dense f32 tensor held in CPU memory, row-major in the order of `desc.to_dims()`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(desc: TensorDesc) -> Self {
        let data = vec![0.0; desc.num_elements()];
        Self { desc, data }
    }

    /// Caller guarantees `data.len() == desc.num_elements()`.
    pub fn from_vec(desc: TensorDesc, data: Vec<f32>) -> Self {
        debug_assert_eq!(desc.num_elements(), data.len());
        Self { desc, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element-wise `self += other`.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<(), EngineError> {
        if self.desc != other.desc || self.len() != other.len() {
            return Err(EngineError::ShapeMismatch {
                layer: "add_assign".into(),
                expected: format!("{:?}", self.desc.to_dims()),
                actual: other.desc.clone(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += *b;
        }
        Ok(())
    }

    pub fn reshaped(&self, desc: TensorDesc) -> Tensor {
        debug_assert_eq!(self.desc.num_elements(), desc.num_elements());
        Tensor {
            desc,
            data: self.data.clone(),
        }
    }

    /// Row `i` of a matrix-shaped tensor.
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.len() / self.desc.batch_size().max(1);
        &self.data[i * cols..(i + 1) * cols]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assign_rejects_other_shapes() {
        let mut a = Tensor::from_vec(TensorDesc::new_matrix(1, 2), vec![1.0, 2.0]);
        a.add_assign(&Tensor::from_vec(TensorDesc::new_matrix(1, 2), vec![0.5, 0.5])).unwrap();
        assert_eq!(a.data, vec![1.5, 2.5]);

        let longer = Tensor::zeros(TensorDesc::new_matrix(1, 3));
        assert!(matches!(a.add_assign(&longer), Err(EngineError::ShapeMismatch { .. })));
        assert_eq!(a.data, vec![1.5, 2.5]);
    }
}
