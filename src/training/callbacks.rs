use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::debug;

use crate::dataloader::error::EngineError;

use super::metrics::EpochLogs;

pub trait Callback {
    fn on_train_begin(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs) -> Result<(), EngineError>;
}

/// Prints the per-epoch accuracy report.
pub struct EpochLogger<W: Write> {
    out: W,
}

impl EpochLogger<io::Stdout> {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for EpochLogger<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> EpochLogger<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_epoch_report(logs: &EpochLogs) -> String {
    let rule = "=".repeat(30);
    format!(
        "{} {} {}\ndigit_accuracy: {:.2}, color_accuracy: {:.2}\nval_digit_accuracy: {:.2}, val_color_accuracy: {:.2}\n",
        rule,
        logs.epoch + 1,
        rule,
        logs.digit_accuracy,
        logs.color_accuracy,
        logs.val_digit_accuracy,
        logs.val_color_accuracy
    )
}

impl<W: Write> Callback for EpochLogger<W> {
    fn on_epoch_end(&mut self, logs: &EpochLogs) -> Result<(), EngineError> {
        self.out.write_all(format_epoch_report(logs).as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value).map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

/// Appends every epoch's logs as one JSON object to `<log_dir>/metrics.jsonl`.
pub struct MetricsWriter {
    path: PathBuf,
}

impl MetricsWriter {
    pub const FILE_NAME: &'static str = "metrics.jsonl";

    pub fn new(log_dir: &Path) -> Self {
        Self {
            path: log_dir.join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Callback for MetricsWriter {
    fn on_train_begin(&mut self) -> Result<(), EngineError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs) -> Result<(), EngineError> {
        append_json_line(&self.path, logs)?;
        debug!(path = %self.path.display(), epoch = logs.epoch, "metrics appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::HeadMetrics;

    fn logs(epoch: usize) -> EpochLogs {
        let train = HeadMetrics {
            loss: 1.5,
            digit_loss: 1.0,
            color_loss: 0.5,
            digit_accuracy: 0.456,
            color_accuracy: 0.999,
        };
        let val = HeadMetrics {
            digit_accuracy: 0.5,
            color_accuracy: 1.0,
            ..train
        };
        EpochLogs::new(epoch, train, val)
    }

    #[test]
    fn report_matches_expected_layout() {
        let mut logger = EpochLogger::with_writer(Vec::new());
        logger.on_epoch_end(&logs(0)).unwrap();

        let text = String::from_utf8(logger.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], format!("{} 1 {}", "=".repeat(30), "=".repeat(30)));
        assert_eq!(lines[1], "digit_accuracy: 0.46, color_accuracy: 1.00");
        assert_eq!(lines[2], "val_digit_accuracy: 0.50, val_color_accuracy: 1.00");
    }

    #[test]
    fn metrics_writer_appends_one_line_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MetricsWriter::new(&dir.path().join("logs"));
        writer.on_train_begin().unwrap();
        writer.on_epoch_end(&logs(0)).unwrap();
        writer.on_epoch_end(&logs(1)).unwrap();

        let contents = fs::read_to_string(writer.path()).unwrap();
        let records: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["epoch"], 1);
        assert!(records[0]["val_color_accuracy"].as_f64().unwrap() > 0.99);
    }
}
