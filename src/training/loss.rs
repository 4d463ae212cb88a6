use crate::{
    dataloader::error::EngineError,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

// Probabilities are clipped to [EPSILON, 1 - EPSILON] before taking logs
pub const EPSILON: f32 = 1e-7;

/// Mean loss over the batch and its gradient w.r.t. the head's logits, i.e. the
/// input of the softmax/sigmoid that produced the probabilities.
pub struct LossOutput {
    pub value: f32,
    pub grad: Tensor,
}

fn matrix_dims(loss: &str, probs: &Tensor, labels: usize) -> Result<(usize, usize), EngineError> {
    match probs.desc {
        TensorDesc::Matrix { rows, cols } if rows == labels && rows > 0 => Ok((rows, cols)),
        ref other => Err(EngineError::ShapeMismatch {
            layer: loss.into(),
            expected: format!("{}×classes probabilities", labels),
            actual: other.clone(),
        }),
    }
}

fn clip(p: f32) -> f32 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

/// Cross-entropy between softmax probabilities `[B, C]` and integer class labels.
pub fn sparse_categorical_crossentropy(probs: &Tensor, labels: &[u8]) -> Result<LossOutput, EngineError> {
    let (rows, cols) = matrix_dims("sparse_categorical_crossentropy", probs, labels.len())?;
    let mut grad = Tensor::zeros(probs.desc.clone());
    let mut total = 0.0f64;

    for (i, &label) in labels.iter().enumerate() {
        let label = label as usize;
        if label >= cols {
            return Err(EngineError::InvalidConfig(format!(
                "label {} out of range for {} classes",
                label, cols
            )));
        }

        total -= (clip(probs.data[i * cols + label]) as f64).ln();

        // softmax + cross-entropy: (p - onehot) / B, finite even when p saturates
        let row = &mut grad.data[i * cols..(i + 1) * cols];
        for (class, g) in row.iter_mut().enumerate() {
            let onehot = if class == label { 1.0 } else { 0.0 };
            *g = (probs.data[i * cols + class] - onehot) / rows as f32;
        }
    }

    Ok(LossOutput {
        value: (total / rows as f64) as f32,
        grad,
    })
}

/// Binary cross-entropy between sigmoid probabilities `[B, 1]` and 0/1 targets.
pub fn binary_crossentropy(probs: &Tensor, targets: &[f32]) -> Result<LossOutput, EngineError> {
    let (rows, cols) = matrix_dims("binary_crossentropy", probs, targets.len())?;
    if cols != 1 {
        return Err(EngineError::ShapeMismatch {
            layer: "binary_crossentropy".into(),
            expected: format!("{}×1 probabilities", rows),
            actual: probs.desc.clone(),
        });
    }

    let mut grad = Tensor::zeros(probs.desc.clone());
    let mut total = 0.0f64;

    for (i, &t) in targets.iter().enumerate() {
        let p = clip(probs.data[i]);
        total -= (t * p.ln() + (1.0 - t) * (1.0 - p).ln()) as f64;
        grad.data[i] = (probs.data[i] - t) / rows as f32;
    }

    Ok(LossOutput {
        value: (total / rows as f64) as f32,
        grad,
    })
}
