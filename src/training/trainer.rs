use std::{collections::HashMap, time::Instant};

use tracing::{debug, info};

use crate::{
    config::TrainingConfig,
    dataloader::{batch::Batch, error::EngineError},
    model::dual_head::DualHeadModel,
};

use super::{
    callbacks::Callback,
    loss::{binary_crossentropy, sparse_categorical_crossentropy},
    metrics::{EpochLogs, History, MetricsAccumulator, StepResult},
    optimizer::Adam,
};

pub struct Trainer {
    pub config: TrainingConfig,
    optimizer: Adam,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        let optimizer = Adam::new(config.learning_rate, config.beta1, config.beta2, config.epsilon);
        Self { config, optimizer }
    }

    /// Forward, both losses, backward from the two heads, one Adam update.
    pub fn train_step(&mut self, model: &mut DualHeadModel, batch: &Batch) -> Result<StepResult, EngineError> {
        let (activations, predictions) = model.forward(&batch.to_input_tensor())?;

        let digit = sparse_categorical_crossentropy(&predictions.digit, &batch.digits)?;
        let color = binary_crossentropy(&predictions.color, &batch.color_targets())?;
        let step = StepResult::new(&predictions, batch, digit.value, color.value);

        // Loss gradients are w.r.t. the logits, so the softmax/sigmoid layers are skipped
        let mut logit_grads = HashMap::new();
        logit_grads.insert(model.digit_logits, digit.grad);
        logit_grads.insert(model.color_logits, color.grad);

        let gradients = model.graph.backward(&activations, logit_grads)?;
        self.optimizer.step(&mut model.graph, &gradients)?;

        Ok(step)
    }

    pub fn evaluate_batch(&self, model: &DualHeadModel, batch: &Batch) -> Result<StepResult, EngineError> {
        let predictions = model.predict(batch)?;
        let digit = sparse_categorical_crossentropy(&predictions.digit, &batch.digits)?;
        let color = binary_crossentropy(&predictions.color, &batch.color_targets())?;
        Ok(StepResult::new(&predictions, batch, digit.value, color.value))
    }

    /// Runs `epochs` epochs of `steps_per_epoch` training batches followed by
    /// `validation_steps` validation batches, calling every callback at each epoch end.
    pub fn fit<T, V>(
        &mut self,
        model: &mut DualHeadModel,
        train_batches: &mut T,
        val_batches: &mut V,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<History, EngineError>
    where
        T: Iterator<Item = Batch> + ?Sized,
        V: Iterator<Item = Batch> + ?Sized,
    {
        let mut history = History::default();
        let mut batches_seen = 0usize;

        for callback in callbacks.iter_mut() {
            callback.on_train_begin()?;
        }

        info!(
            epochs = self.config.epochs,
            steps_per_epoch = self.config.steps_per_epoch,
            validation_steps = self.config.validation_steps,
            "training started"
        );

        for epoch in 0..self.config.epochs {
            let started = Instant::now();

            let mut train = MetricsAccumulator::default();
            for step in 0..self.config.steps_per_epoch {
                let batch = train_batches.next().ok_or(EngineError::GeneratorExhausted(batches_seen))?;
                batches_seen += 1;

                let result = self.train_step(model, &batch)?;
                train.update(&result);

                if step % 50 == 0 {
                    debug!(epoch, step, loss = result.loss(), "train step");
                }
            }

            let mut val = MetricsAccumulator::default();
            for _ in 0..self.config.validation_steps {
                let batch = val_batches.next().ok_or(EngineError::GeneratorExhausted(batches_seen))?;
                batches_seen += 1;
                val.update(&self.evaluate_batch(model, &batch)?);
            }

            let logs = EpochLogs::new(epoch, train.summary(), val.summary());
            info!(
                epoch = epoch + 1,
                loss = logs.loss,
                val_loss = logs.val_loss,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "epoch finished"
            );

            for callback in callbacks.iter_mut() {
                callback.on_epoch_end(&logs)?;
            }
            history.epochs.push(logs);
        }

        Ok(history)
    }
}
