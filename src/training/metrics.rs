use serde::Serialize;

use crate::{
    dataloader::{batch::Batch, synth::ColorFlag},
    model::dual_head::Predictions,
};

/// Losses and correct-prediction counts of one batch.
#[derive(Clone, Debug, Default)]
pub struct StepResult {
    pub digit_loss: f32,
    pub color_loss: f32,
    pub digit_correct: usize,
    pub color_correct: usize,
    pub samples: usize,
}

impl StepResult {
    pub fn new(predictions: &Predictions, batch: &Batch, digit_loss: f32, color_loss: f32) -> Self {
        let digit_correct = (0..batch.len())
            .filter(|&i| predictions.digit_class(i) == batch.digits[i])
            .count();
        let color_correct = (0..batch.len())
            .filter(|&i| ColorFlag::from_probability(predictions.color_probability(i)) == batch.colors[i])
            .count();

        Self {
            digit_loss,
            color_loss,
            digit_correct,
            color_correct,
            samples: batch.len(),
        }
    }

    pub fn loss(&self) -> f32 {
        self.digit_loss + self.color_loss
    }
}

/// Running means over an epoch. Losses are averaged per batch, accuracies per sample.
#[derive(Clone, Debug, Default)]
pub struct MetricsAccumulator {
    digit_loss: f64,
    color_loss: f64,
    batches: usize,
    digit_correct: usize,
    color_correct: usize,
    samples: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct HeadMetrics {
    pub loss: f32,
    pub digit_loss: f32,
    pub color_loss: f32,
    pub digit_accuracy: f32,
    pub color_accuracy: f32,
}

impl MetricsAccumulator {
    pub fn update(&mut self, step: &StepResult) {
        self.digit_loss += step.digit_loss as f64;
        self.color_loss += step.color_loss as f64;
        self.batches += 1;
        self.digit_correct += step.digit_correct;
        self.color_correct += step.color_correct;
        self.samples += step.samples;
    }

    pub fn summary(&self) -> HeadMetrics {
        let batches = self.batches.max(1) as f64;
        let samples = self.samples.max(1) as f32;
        let digit_loss = (self.digit_loss / batches) as f32;
        let color_loss = (self.color_loss / batches) as f32;

        HeadMetrics {
            loss: digit_loss + color_loss,
            digit_loss,
            color_loss,
            digit_accuracy: self.digit_correct as f32 / samples,
            color_accuracy: self.color_correct as f32 / samples,
        }
    }
}

/// Everything reported at the end of an epoch, keyed like the Keras logs dict.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochLogs {
    pub epoch: usize,
    pub loss: f32,
    pub digit_loss: f32,
    pub color_loss: f32,
    pub digit_accuracy: f32,
    pub color_accuracy: f32,
    pub val_loss: f32,
    pub val_digit_loss: f32,
    pub val_color_loss: f32,
    pub val_digit_accuracy: f32,
    pub val_color_accuracy: f32,
}

impl EpochLogs {
    pub fn new(epoch: usize, train: HeadMetrics, val: HeadMetrics) -> Self {
        Self {
            epoch,
            loss: train.loss,
            digit_loss: train.digit_loss,
            color_loss: train.color_loss,
            digit_accuracy: train.digit_accuracy,
            color_accuracy: train.color_accuracy,
            val_loss: val.loss,
            val_digit_loss: val.digit_loss,
            val_color_loss: val.color_loss,
            val_digit_accuracy: val.digit_accuracy,
            val_color_accuracy: val.color_accuracy,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct History {
    pub epochs: Vec<EpochLogs>,
}

impl History {
    pub fn last(&self) -> Option<&EpochLogs> {
        self.epochs.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataloader::synth::{SyntheticExample, VALUES_PER_IMAGE},
        tensor::{tensor::Tensor, tensor_desc::TensorDesc},
    };

    #[test]
    fn counts_correct_heads_separately() {
        let mut batch = Batch::with_capacity(2);
        for (digit, color) in [(1, ColorFlag::Green), (2, ColorFlag::Green)] {
            batch.push(SyntheticExample {
                image: vec![0.0; VALUES_PER_IMAGE],
                digit,
                color,
            });
        }

        let predictions = Predictions {
            digit: Tensor::from_vec(TensorDesc::new_matrix(2, 3), vec![0.1, 0.8, 0.1, 0.7, 0.2, 0.1]),
            color: Tensor::from_vec(TensorDesc::new_matrix(2, 1), vec![0.9, 0.6]),
        };

        let step = StepResult::new(&predictions, &batch, 0.5, 0.25);
        assert_eq!(step.digit_correct, 1);
        assert_eq!(step.color_correct, 2);
        assert_eq!(step.loss(), 0.75);
    }

    #[test]
    fn accumulator_averages() {
        let mut acc = MetricsAccumulator::default();
        acc.update(&StepResult { digit_loss: 1.0, color_loss: 0.5, digit_correct: 2, color_correct: 4, samples: 4 });
        acc.update(&StepResult { digit_loss: 3.0, color_loss: 0.5, digit_correct: 4, color_correct: 4, samples: 4 });

        let summary = acc.summary();
        assert_eq!(summary.digit_loss, 2.0);
        assert_eq!(summary.loss, 2.5);
        assert_eq!(summary.digit_accuracy, 0.75);
        assert_eq!(summary.color_accuracy, 1.0);
    }
}
