//! Optional on-disk snapshot of the delay queue.
//!
//! The file holds a JSON object with the queue geometry and its
//! `QueuedMeasurement` entries, replaced atomically (write temp, fsync,
//! rename). Writes are skipped when the queue
//! has not changed since the last successful write.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SensorError;
use crate::queue::{DelayQueue, QueuedMeasurement};

#[derive(Debug)]
pub struct QueueSnapshot {
    path: PathBuf,
    written_generation: Option<u64>,
}

#[derive(Serialize)]
struct SnapshotDoc<'a> {
    measurement_delay_mm: f64,
    measurement_interval_mm: f64,
    entries: Vec<&'a QueuedMeasurement>,
}

impl QueueSnapshot {
    /// Check that the path can be created or appended to.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SensorError> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SensorError::Config(format!("dump file {}: {e}", path.display())))?;
        Ok(Self {
            path,
            written_generation: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the queue if it changed since the last write. Returns whether a
    /// write happened.
    pub fn sync(&mut self, queue: &DelayQueue) -> Result<bool, SensorError> {
        let generation = queue.generation();
        if self.written_generation == Some(generation) {
            return Ok(false);
        }
        let doc = SnapshotDoc {
            measurement_delay_mm: queue.measurement_delay_mm(),
            measurement_interval_mm: queue.measurement_interval_mm(),
            entries: queue.iter().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| SensorError::Io(format!("serialize queue: {e}")))?;
        replace_file(&self.path, &bytes)
            .map_err(|e| SensorError::Io(format!("{}: {e}", self.path.display())))?;
        self.written_generation = Some(generation);
        tracing::trace!(path = %self.path.display(), entries = doc.entries.len(), "queue snapshot written");
        Ok(true)
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("nope").join("queue.json");
        let err = QueueSnapshot::open(&bad).unwrap_err();
        assert!(matches!(err, SensorError::Config(msg) if msg.contains("dump file")));
    }

    #[test]
    fn sync_is_idempotent_per_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let mut snap = QueueSnapshot::open(&path).unwrap();
        let mut q = DelayQueue::new(50.0, 5.0);
        q.enqueue(0.0, 1.6);

        assert!(snap.sync(&q).unwrap());
        assert!(!snap.sync(&q).unwrap());

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["entries"][0]["trigger_position_mm"], 50.0);
        assert_eq!(v["entries"][0]["diameter_mm"], 1.6);

        q.clear();
        assert!(snap.sync(&q).unwrap());
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["entries"].as_array().map(Vec::len), Some(0));
    }
}
