use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

use super::{batch::Batch, config::GeneratorConfig, error::EngineError, mnist::MnistSplit, synth::create_example};

/// Endless stream of synthetic batches. Every example is drawn uniformly with
/// replacement from `split` and recolored on the fly, so `next()` never returns `None`.
pub struct BatchGenerator {
    split: Arc<MnistSplit>,
    batch_size: usize,
    rng: StdRng,
}

impl BatchGenerator {
    pub fn new(split: Arc<MnistSplit>, config: &GeneratorConfig) -> Result<Self, EngineError> {
        if split.is_empty() {
            return Err(EngineError::EmptyDataset);
        }
        if config.batch_size == 0 {
            return Err(EngineError::InvalidConfig("batch_size must be at least 1".into()));
        }

        let seed = match config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!(seed, "no generator seed given, drew one");
                seed
            }
        };

        Ok(Self {
            split,
            batch_size: config.batch_size,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn next_batch(&mut self) -> Batch {
        let mut batch = Batch::with_capacity(self.batch_size);
        let num_examples = self.split.len();

        for _ in 0..self.batch_size {
            let index = self.rng.gen_range(0..num_examples);
            let example = create_example(&self.split.get(index), &mut self.rng);
            batch.push(example);
        }

        batch
    }
}

impl Iterator for BatchGenerator {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::{mnist::PIXELS_PER_IMAGE, synth::ColorFlag};

    fn split(labels: &[u8]) -> Arc<MnistSplit> {
        let images = labels
            .iter()
            .flat_map(|&label| std::iter::repeat(label * 20).take(PIXELS_PER_IMAGE))
            .collect();
        Arc::new(MnistSplit::new(images, labels.to_vec()).unwrap())
    }

    fn config(batch_size: usize, seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            batch_size,
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn batches_have_expected_shapes() {
        let mut generator = BatchGenerator::new(split(&[1, 4, 9]), &config(5, 1)).unwrap();

        for batch in generator.by_ref().take(3) {
            assert_eq!(batch.image_shape(), [5, 28, 28, 3]);
            assert_eq!(batch.digits.len(), 5);
            assert_eq!(batch.colors.len(), 5);
            assert!(batch.digits.iter().all(|d| [1, 4, 9].contains(d)));
        }
        assert_eq!(generator.batch_size(), 5);
    }

    #[test]
    fn draws_with_replacement() {
        // Two examples, 10 batches of 32 -> 320 independent draws
        let mut generator = BatchGenerator::new(split(&[2, 6]), &config(32, 3)).unwrap();
        let digits: Vec<u8> = generator.by_ref().take(10).flat_map(|b| b.digits).collect();

        assert_eq!(digits.len(), 320);
        let twos = digits.iter().filter(|&&d| d == 2).count();
        assert!((100..220).contains(&twos), "{} of 320 draws hit the first example", twos);
    }

    #[test]
    fn colors_and_digits_vary_independently() {
        let mut generator = BatchGenerator::new(split(&[0, 1]), &config(64, 8)).unwrap();
        let batch = generator.next_batch();

        for digit in [0, 1] {
            let colors: Vec<ColorFlag> = batch
                .digits
                .iter()
                .zip(batch.colors.iter())
                .filter(|(d, _)| **d == digit)
                .map(|(_, c)| *c)
                .collect();
            assert!(colors.contains(&ColorFlag::Red) && colors.contains(&ColorFlag::Green));
        }
    }

    #[test]
    fn same_seed_same_batches() {
        let mut a = BatchGenerator::new(split(&[3, 5, 7]), &config(4, 42)).unwrap();
        let mut b = BatchGenerator::new(split(&[3, 5, 7]), &config(4, 42)).unwrap();

        let (x, y) = (a.next_batch(), b.next_batch());
        assert_eq!(x.digits, y.digits);
        assert_eq!(x.images, y.images);
    }

    #[test]
    fn rejects_empty_dataset_and_zero_batch() {
        let empty = Arc::new(MnistSplit::new(Vec::new(), Vec::new()).unwrap());
        assert!(matches!(
            BatchGenerator::new(empty, &config(4, 0)),
            Err(EngineError::EmptyDataset)
        ));
        assert!(BatchGenerator::new(split(&[1]), &config(0, 0)).is_err());
    }
}
