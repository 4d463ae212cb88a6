use std::path::Path;

use crate::{
    dataloader::{batch::Batch, error::EngineError, synth::ColorFlag},
    model::dual_head::DualHeadModel,
};

use super::render::save_example_png;

/// One held-out example with the model's answer for both heads.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub image: Vec<f32>,
    pub gt_digit: u8,
    pub gt_color: ColorFlag,
    pub pred_digit: u8,
    pub pred_color: ColorFlag,
    pub color_probability: f32,
}

impl Evaluation {
    pub fn is_correct(&self) -> bool {
        self.gt_digit == self.pred_digit && self.gt_color == self.pred_color
    }

    pub fn gt_caption(&self) -> String {
        format!("GT: {}, {}", self.gt_digit, self.gt_color)
    }

    pub fn pr_caption(&self) -> String {
        format!("Pr: {}, {}", self.pred_digit, self.pred_color)
    }
}

/// Evaluates every example of `batch`.
pub fn evaluate_batch(model: &DualHeadModel, batch: &Batch) -> Result<Vec<Evaluation>, EngineError> {
    let predictions = model.predict(batch)?;

    Ok((0..batch.len())
        .map(|i| {
            let color_probability = predictions.color_probability(i);
            Evaluation {
                image: batch.image(i).to_vec(),
                gt_digit: batch.digits[i],
                gt_color: batch.colors[i],
                pred_digit: predictions.digit_class(i),
                pred_color: ColorFlag::from_probability(color_probability),
                color_probability,
            }
        })
        .collect())
}

/// Pulls the next batch from `batches` and evaluates its first example.
pub fn evaluate_one<I>(model: &DualHeadModel, batches: &mut I) -> Result<Evaluation, EngineError>
where
    I: Iterator<Item = Batch> + ?Sized,
{
    let batch = batches.next().ok_or(EngineError::GeneratorExhausted(0))?;
    evaluate_batch(model, &batch)?
        .into_iter()
        .next()
        .ok_or(EngineError::EmptyDataset)
}

/// Prints ground truth and prediction, and writes the image to `path`.
pub fn show_evaluation(evaluation: &Evaluation, path: &Path) -> Result<(), EngineError> {
    println!("{}", evaluation.gt_caption());
    println!("{}", evaluation.pr_caption());
    save_example_png(&evaluation.image, path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::dataloader::{
        config::GeneratorConfig,
        generator::BatchGenerator,
        mnist::{MnistSplit, PIXELS_PER_IMAGE},
        synth::VALUES_PER_IMAGE,
    };

    fn evaluation(gt: (u8, ColorFlag), pred: (u8, ColorFlag)) -> Evaluation {
        Evaluation {
            image: vec![0.0; VALUES_PER_IMAGE],
            gt_digit: gt.0,
            gt_color: gt.1,
            pred_digit: pred.0,
            pred_color: pred.1,
            color_probability: pred.1.target(),
        }
    }

    #[test]
    fn correct_only_when_both_heads_match() {
        assert!(evaluation((3, ColorFlag::Red), (3, ColorFlag::Red)).is_correct());
        assert!(!evaluation((3, ColorFlag::Red), (3, ColorFlag::Green)).is_correct());
        assert!(!evaluation((3, ColorFlag::Red), (5, ColorFlag::Red)).is_correct());
    }

    #[test]
    fn captions() {
        let e = evaluation((7, ColorFlag::Green), (1, ColorFlag::Red));
        assert_eq!(e.gt_caption(), "GT: 7, green");
        assert_eq!(e.pr_caption(), "Pr: 1, red");
    }

    #[test]
    fn evaluate_one_draws_a_single_example() {
        let model = DualHeadModel::new(&mut StdRng::seed_from_u64(0)).unwrap();
        let split = Arc::new(MnistSplit::new(vec![90; 3 * PIXELS_PER_IMAGE], vec![2, 5, 9]).unwrap());
        let config = GeneratorConfig {
            batch_size: 1,
            seed: Some(4),
            ..Default::default()
        };
        let mut test = BatchGenerator::new(split, &config).unwrap();

        let evaluation = evaluate_one(&model, &mut test).unwrap();
        assert!([2, 5, 9].contains(&evaluation.gt_digit));
        assert!(evaluation.pred_digit < 10);
        assert_eq!(evaluation.pred_color, ColorFlag::from_probability(evaluation.color_probability));
        assert_eq!(evaluation.image.len(), VALUES_PER_IMAGE);
    }

    #[test]
    fn empty_source_is_an_error() {
        let model = DualHeadModel::new(&mut StdRng::seed_from_u64(0)).unwrap();
        let mut nothing = std::iter::empty::<Batch>();
        assert!(matches!(
            evaluate_one(&model, &mut nothing),
            Err(EngineError::GeneratorExhausted(0))
        ));
    }
}
