use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};
use tracing::info;

use crate::{
    config::RunConfig,
    dataloader::{
        batch::Batch,
        config::GeneratorConfig,
        error::EngineError,
        generator::BatchGenerator,
        info::print_dataset_info,
        mnist::{load_mnist, MnistSplit},
        par_iter::Prefetch,
        synth::create_example,
    },
    eval::{
        predict::{evaluate_one, show_evaluation, Evaluation},
        render::{save_example_png, save_grid},
    },
    model::{dual_head::DualHeadModel, print_model_stats::print_model_stats},
    training::{
        callbacks::{EpochLogger, MetricsWriter},
        metrics::History,
        trainer::Trainer,
    },
    utils::{dashboard::launch_dashboard, logging::reset_log_dir},
};

// Offsets from the run seed so every random stream is independent but reproducible
const MODEL_STREAM: u64 = 0;
const EXAMPLE_STREAM: u64 = 1;
const TRAIN_STREAM: u64 = 2;
const VALIDATION_STREAM: u64 = 3;
const TEST_STREAM: u64 = 4;
const SAMPLE_STREAM: u64 = 5;

pub struct RunOutcome {
    pub history: History,
    pub evaluation: Evaluation,
    pub grid: Vec<Evaluation>,
}

type BatchSource = Box<dyn Iterator<Item = Batch> + Send>;

fn batch_source(
    split: &Arc<MnistSplit>,
    batch_size: usize,
    seed: u64,
    prefetch_count: usize,
) -> Result<BatchSource, EngineError> {
    let config = GeneratorConfig {
        batch_size,
        seed: Some(seed),
        prefetch_count,
    }
    .build()?;
    let generator = BatchGenerator::new(Arc::clone(split), &config)?;

    if prefetch_count > 0 {
        Ok(Box::new(generator.prefetch(prefetch_count)))
    } else {
        Ok(Box::new(generator))
    }
}

/// Full run: synthesize a couple of sanity-check examples, train the two-headed
/// model, then evaluate it on held-out digits and write the plots.
pub fn run(config: &RunConfig) -> Result<RunOutcome, EngineError> {
    reset_log_dir(&config.log_dir)?;
    std::fs::create_dir_all(&config.output_dir)?;

    info!(
        cpus = num_cpus::get(),
        rayon_threads = rayon::current_num_threads(),
        "compute threads"
    );

    let seed = config.seed.or(config.generator.seed).unwrap_or_else(|| {
        let seed = rand::random::<u64>();
        info!(seed, "no seed given, drew one");
        seed
    });

    let dataset = load_mnist(&config.data_dir)?;
    print_dataset_info(&dataset, &config.generator);

    let train = Arc::new(dataset.train);
    let test = Arc::new(dataset.test);
    if train.is_empty() || test.is_empty() {
        return Err(EngineError::EmptyDataset);
    }

    // One synthesized training example
    let mut example_rng = StdRng::seed_from_u64(seed.wrapping_add(EXAMPLE_STREAM));
    let example = create_example(&train.get(0), &mut example_rng);
    println!("digit: {}, color: {}", example.digit, example.color);
    save_example_png(&example.image, &config.output_dir.join("example.png"))?;

    // One draw from a test generator
    let sample = BatchGenerator::new(
        Arc::clone(&test),
        &GeneratorConfig {
            batch_size: 1,
            seed: Some(seed.wrapping_add(SAMPLE_STREAM)),
            prefetch_count: 0,
        },
    )?
    .next_batch();
    println!("digit: {}, color: {}", sample.digits[0], sample.colors[0]);
    save_example_png(sample.image(0), &config.output_dir.join("sample.png"))?;

    let mut model = DualHeadModel::new(&mut StdRng::seed_from_u64(seed.wrapping_add(MODEL_STREAM)))?;
    print_model_stats(&model.graph)?;

    let batch_size = config.generator.batch_size;
    let prefetch = config.generator.prefetch_count;
    let mut train_batches = batch_source(&train, batch_size, seed.wrapping_add(TRAIN_STREAM), prefetch)?;
    let mut val_batches = batch_source(&test, batch_size, seed.wrapping_add(VALIDATION_STREAM), prefetch)?;

    let mut logger = EpochLogger::new();
    let mut metrics_writer = MetricsWriter::new(&config.log_dir);

    let mut trainer = Trainer::new(config.training.clone());
    let history = trainer.fit(
        &mut model,
        &mut train_batches,
        &mut val_batches,
        &mut [&mut logger, &mut metrics_writer],
    )?;
    drop(train_batches);
    drop(val_batches);

    if config.dashboard {
        // Left running after exit
        if let Some(dashboard) = launch_dashboard(&config.dashboard_cmd, &config.log_dir) {
            info!(pid = dashboard.id(), "dashboard keeps running in the background");
        }
    }

    let mut test_batches = BatchGenerator::new(
        Arc::clone(&test),
        &GeneratorConfig {
            batch_size: 1,
            seed: Some(seed.wrapping_add(TEST_STREAM)),
            prefetch_count: 0,
        },
    )?;

    let evaluation = evaluate_one(&model, &mut test_batches)?;
    show_evaluation(&evaluation, &config.output_dir.join("prediction.png"))?;

    let grid = (0..config.grid_tiles)
        .map(|_| evaluate_one(&model, &mut test_batches))
        .collect::<Result<Vec<_>, _>>()?;
    save_grid(&grid, &config.output_dir.join("predictions_grid.png"))?;

    let correct = grid.iter().filter(|e| e.is_correct()).count();
    info!(correct, tiles = grid.len(), "held-out predictions");

    Ok(RunOutcome {
        history,
        evaluation,
        grid,
    })
}
