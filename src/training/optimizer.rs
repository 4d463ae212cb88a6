use std::collections::HashMap;

use crate::{
    dataloader::error::EngineError,
    model::graph_model::{GraphModel, LayerId, ParameterGradients},
};

/// Adam with per-parameter moment estimates, keyed by layer and parameter index.
///
/// Uses the bias-corrected step size form
/// `alpha_t = lr * sqrt(1 - beta2^t) / (1 - beta1^t)`, `p -= alpha_t * m / (sqrt(v) + epsilon)`.
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    first_moments: HashMap<(LayerId, usize), Vec<f32>>,
    second_moments: HashMap<(LayerId, usize), Vec<f32>>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            first_moments: HashMap::new(),
            second_moments: HashMap::new(),
            t: 0,
        }
    }

    pub fn iterations(&self) -> i32 {
        self.t
    }

    pub fn step(&mut self, model: &mut GraphModel, gradients: &ParameterGradients) -> Result<(), EngineError> {
        self.t += 1;
        let alpha = self.learning_rate * (1.0 - self.beta2.powi(self.t)).sqrt() / (1.0 - self.beta1.powi(self.t));
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        for (&layer_id, layer_grads) in gradients {
            let layer = model
                .layers
                .get_mut(&layer_id)
                .ok_or(EngineError::LayerNotFound(layer_id))?;
            let name = layer.name.clone();
            let params = layer.layer.parameters_mut();

            if params.len() != layer_grads.len() {
                return Err(EngineError::InvalidGraph(format!(
                    "layer '{}' has {} parameters but received {} gradients",
                    name,
                    params.len(),
                    layer_grads.len()
                )));
            }

            for (index, (param, grad)) in params.into_iter().zip(layer_grads).enumerate() {
                if param.desc != grad.desc {
                    return Err(EngineError::ShapeMismatch {
                        layer: name,
                        expected: format!("{:?}", param.desc.to_dims()),
                        actual: grad.desc.clone(),
                    });
                }

                let key = (layer_id, index);
                let m = self.first_moments.entry(key).or_insert_with(|| vec![0.0; param.len()]);
                let v = self.second_moments.entry(key).or_insert_with(|| vec![0.0; param.len()]);

                for (((p, &g), m), v) in param.data.iter_mut().zip(grad.data.iter()).zip(m.iter_mut()).zip(v.iter_mut()) {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= alpha * *m / (v.sqrt() + epsilon);
                }
            }
        }

        Ok(())
    }
}
