//! Experiment tracking: run parameters and metrics recorded outside the logs.
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::error::Result;

/// Sink for one training run's parameters and metrics.
///
/// Failures are returned to the caller, which logs them and carries on;
/// tracking never aborts training.
pub trait ExperimentTracker {
    fn start_run(&mut self) -> Result<()>;

    fn log_param(&mut self, key: &str, value: &str) -> Result<()>;

    /// `step` is the epoch for per-epoch metrics, `None` for final ones.
    fn log_metric(&mut self, key: &str, value: f64, step: Option<usize>) -> Result<()>;

    fn end_run(&mut self) -> Result<()>;
}

/// Tracker used when tracking is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn start_run(&mut self) -> Result<()> {
        Ok(())
    }

    fn log_param(&mut self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn log_metric(&mut self, _key: &str, _value: f64, _step: Option<usize>) -> Result<()> {
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per event to `<dir>/run-<unix-seconds>.jsonl`,
/// flushed as it is written.
#[derive(Debug)]
pub struct JsonlTracker {
    dir: PathBuf,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl JsonlTracker {
    pub fn new(dir: impl Into<PathBuf>) -> JsonlTracker {
        JsonlTracker { dir: dir.into(), path: None, writer: None }
    }

    /// File of the current run, once `start_run` succeeded.
    pub fn run_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn write_event(&mut self, mut event: Value) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        event["timestamp"] = json!(unix_seconds());
        serde_json::to_writer(&mut *writer, &event)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

impl ExperimentTracker for JsonlTracker {
    fn start_run(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("run-{}.jsonl", unix_seconds()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.writer = Some(BufWriter::new(file));
        self.path = Some(path);
        self.write_event(json!({ "event": "start_run" }))
    }

    fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        self.write_event(json!({ "event": "param", "key": key, "value": value }))
    }

    fn log_metric(&mut self, key: &str, value: f64, step: Option<usize>) -> Result<()> {
        self.write_event(json!({ "event": "metric", "key": key, "value": value, "step": step }))
    }

    fn end_run(&mut self) -> Result<()> {
        self.write_event(json!({ "event": "end_run" }))?;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_tracker_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = JsonlTracker::new(dir.path().join("runs"));
        tracker.start_run().unwrap();
        tracker.log_param("epochs", "15").unwrap();
        tracker.log_metric("loss", 0.25, Some(1)).unwrap();
        tracker.log_metric("test_accuracy", 0.98, None).unwrap();
        let path = tracker.run_path().unwrap().to_path_buf();
        tracker.end_run().unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let events: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0]["event"], "start_run");
        assert_eq!(events[1]["key"], "epochs");
        assert_eq!(events[2]["step"], 1);
        assert!(events[3]["step"].is_null());
        assert_eq!(events[4]["event"], "end_run");
    }

    #[test]
    fn events_are_on_disk_before_the_run_ends() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = JsonlTracker::new(dir.path());
        tracker.start_run().unwrap();
        tracker.log_metric("loss", 0.5, Some(1)).unwrap();

        let text = std::fs::read_to_string(tracker.run_path().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn events_before_start_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = JsonlTracker::new(dir.path());
        assert!(tracker.log_metric("loss", 1.0, None).is_ok());
        assert!(tracker.run_path().is_none());
    }
}
