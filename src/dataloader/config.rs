use super::error::EngineError;

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub batch_size: usize,
    // None draws a fresh seed, which is logged so a run can be repeated
    pub seed: Option<u64>,
    // Batches produced ahead of the trainer; 0 keeps generation on the calling thread
    pub prefetch_count: usize,
}

impl GeneratorConfig {
    pub fn build(self) -> Result<Self, EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig("batch_size must be at least 1".into()));
        }

        Ok(self)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            seed: None,
            prefetch_count: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_training_setup() {
        let config = GeneratorConfig::default().build().unwrap();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.prefetch_count, 4);
        assert!(config.seed.is_none());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = GeneratorConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.build(), Err(EngineError::InvalidConfig(_))));
    }
}
