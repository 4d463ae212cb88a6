use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::error;

use dual_head_mnist::{
    app::run,
    config::{RunConfig, TrainingConfig},
    dataloader::config::GeneratorConfig,
    utils::logging::{init_logging, LogConfig},
};

/// Train a two-headed CNN that reads both the digit and the overlay color
/// of synthetically colorized MNIST images.
#[derive(Parser, Debug)]
#[command(name = "dual_head_mnist", version, about, long_about = None)]
struct Cli {
    /// Directory holding the MNIST IDX files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Metrics log directory, cleared at startup
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Where the PNG plots are written
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    #[arg(long, default_value_t = 10)]
    epochs: usize,

    #[arg(long, default_value_t = 200)]
    steps_per_epoch: usize,

    #[arg(long, default_value_t = 100)]
    validation_steps: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    #[arg(long, default_value_t = 0.001)]
    learning_rate: f32,

    /// Seed for weights and data; random (and logged) when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Batches generated ahead on a worker thread, 0 to disable
    #[arg(long, default_value_t = 4)]
    prefetch: usize,

    /// Number of held-out predictions in the grid plot
    #[arg(long, default_value_t = 16)]
    grid_tiles: usize,

    /// Launch the metrics dashboard after training
    #[arg(long)]
    dashboard: bool,

    /// Dashboard program, invoked as `<cmd> --logdir <log_dir>`
    #[arg(long, default_value = "tensorboard")]
    dashboard_cmd: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> RunConfig {
        RunConfig {
            data_dir: self.data_dir,
            log_dir: self.log_dir,
            output_dir: self.output_dir,
            seed: self.seed,
            grid_tiles: self.grid_tiles,
            dashboard: self.dashboard,
            dashboard_cmd: self.dashboard_cmd,
            generator: GeneratorConfig {
                batch_size: self.batch_size,
                seed: self.seed,
                prefetch_count: self.prefetch,
            },
            training: TrainingConfig {
                epochs: self.epochs,
                steps_per_epoch: self.steps_per_epoch,
                validation_steps: self.validation_steps,
                learning_rate: self.learning_rate,
                ..TrainingConfig::default()
            },
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&LogConfig::from_verbosity(cli.verbose)) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let result = cli.into_config().build().and_then(|config| run(&config));

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
