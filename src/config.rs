use std::path::PathBuf;

use crate::dataloader::{config::GeneratorConfig, error::EngineError};

#[derive(Clone, Debug)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub validation_steps: usize,
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl TrainingConfig {
    pub fn build(self) -> Result<Self, EngineError> {
        if self.epochs == 0 || self.steps_per_epoch == 0 {
            return Err(EngineError::InvalidConfig(
                "epochs and steps_per_epoch must be at least 1".into(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(EngineError::InvalidConfig("Adam betas must lie in [0, 1)".into()));
        }

        Ok(self)
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            steps_per_epoch: 200,
            validation_steps: 100,
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

#[derive(Debug)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
    // Seeds the model weights and, offset per stream, every batch generator
    pub seed: Option<u64>,
    pub grid_tiles: usize,
    pub dashboard: bool,
    pub dashboard_cmd: String,
    pub generator: GeneratorConfig,
    pub training: TrainingConfig,
}

impl RunConfig {
    pub fn build(self) -> Result<Self, EngineError> {
        if self.grid_tiles == 0 {
            return Err(EngineError::InvalidConfig("grid_tiles must be at least 1".into()));
        }
        if self.dashboard && self.dashboard_cmd.trim().is_empty() {
            return Err(EngineError::InvalidConfig("dashboard command is empty".into()));
        }

        Ok(Self {
            generator: self.generator.build()?,
            training: self.training.build()?,
            ..self
        })
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            output_dir: PathBuf::from("output"),
            seed: None,
            grid_tiles: 16,
            dashboard: false,
            dashboard_cmd: "tensorboard".to_string(),
            generator: GeneratorConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::default().build().unwrap();
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.steps_per_epoch, 200);
        assert_eq!(config.training.validation_steps, 100);
        assert_eq!(config.generator.batch_size, 32);
        assert_eq!(config.grid_tiles, 16);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_epochs = TrainingConfig {
            epochs: 0,
            ..Default::default()
        };
        assert!(zero_epochs.build().is_err());

        let bad_lr = TrainingConfig {
            learning_rate: -1.0,
            ..Default::default()
        };
        assert!(bad_lr.build().is_err());

        let no_tiles = RunConfig {
            grid_tiles: 0,
            ..Default::default()
        };
        assert!(no_tiles.build().is_err());

        let bad_batch = RunConfig {
            generator: GeneratorConfig {
                batch_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(bad_batch.build(), Err(EngineError::InvalidConfig(_))));
    }
}
