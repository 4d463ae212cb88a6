use rand::distributions::{Distribution, Uniform};
use rand::Rng;

#[derive(Clone, Debug)]
pub enum WeightInit {
    Xavier, // Glorot uniform, Keras default for Conv2D/Dense kernels
}

impl WeightInit {
    pub fn init<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> Vec<f32> {
        let total_elements: usize = shape.iter().product();

        // For Linear layers: shape is [out_features, in_features]
        let (fan_in, fan_out) = if shape.len() == 2 {
            (shape[1], shape[0])
        } else if shape.len() == 4 {
            // For Conv2D: [out_channels, in_channels, kernel_h, kernel_w]
            let kernel_size = shape[2] * shape[3];
            (shape[1] * kernel_size, shape[0] * kernel_size)
        } else {
            // For 1D tensors (like biases) or other shapes
            (1, shape.first().copied().unwrap_or(1))
        };

        match self {
            WeightInit::Xavier => {
                let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                let dist = Uniform::new_inclusive(-limit, limit);
                (0..total_elements).map(|_| dist.sample(rng)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn xavier_respects_glorot_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let values = WeightInit::Xavier.init(&[32, 3, 3, 3], &mut rng);
        let limit = (6.0f32 / (27 + 288) as f32).sqrt();

        assert_eq!(values.len(), 32 * 27);
        assert!(values.iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn same_seed_same_weights() {
        let a = WeightInit::Xavier.init(&[10, 4], &mut StdRng::seed_from_u64(3));
        let b = WeightInit::Xavier.init(&[10, 4], &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.is_finite()));
    }
}
