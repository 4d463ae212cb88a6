use std::{fs, io, path::Path};

use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use crate::dataloader::error::EngineError;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub include_target: bool,
    pub include_thread_ids: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// `-v` switches to debug, `-vv` and above to trace with targets and thread ids.
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => Self::default(),
            1 => Self {
                level: Level::DEBUG,
                ..Self::default()
            },
            _ => Self {
                level: Level::TRACE,
                include_target: true,
                include_thread_ids: true,
                ..Self::default()
            },
        }
    }
}

pub fn init_logging(config: &LogConfig) -> Result<(), EngineError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| EngineError::InvalidConfig(format!("Failed to initialize logging: {}", e)))
}

/// Clears whatever a previous run left in `log_dir` and recreates it empty.
/// Failing to remove the old directory is not an error.
pub fn reset_log_dir(log_dir: &Path) -> Result<(), EngineError> {
    match fs::remove_dir_all(log_dir) {
        Ok(()) => debug!(path = %log_dir.display(), "removed previous log directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %log_dir.display(), error = %e, "could not remove log directory"),
    }

    fs::create_dir_all(log_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(LogConfig::from_verbosity(0).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(1).level, Level::DEBUG);
        let trace = LogConfig::from_verbosity(3);
        assert_eq!(trace.level, Level::TRACE);
        assert!(trace.include_thread_ids);
    }

    #[test]
    fn reset_clears_old_contents() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir_all(logs.join("old_run")).unwrap();
        fs::write(logs.join("metrics.jsonl"), "{}\n").unwrap();

        reset_log_dir(&logs).unwrap();
        assert!(logs.is_dir());
        assert_eq!(fs::read_dir(&logs).unwrap().count(), 0);
    }

    #[test]
    fn reset_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        reset_log_dir(&logs).unwrap();
        assert!(logs.is_dir());
    }
}
