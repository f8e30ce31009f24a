//! Background log writer
//!
//! [`DataLogger`] buffers readings on the owning context and flushes them to
//! disk on a background thread. At most one flush is in flight, and the
//! buffer is only cleared after the owning context observes the flush
//! completion through [`DataLogger::poll`], so a crash mid-flush never
//! loses the in-memory records.

use chrono::Utc;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use super::LogRecord;
use crate::task::TaskSlot;

/// Timestamp format for buffered records
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Buffers readings and flushes them to `log_<name>.log` on demand.
pub struct DataLogger {
    path: PathBuf,
    buffer: Arc<Mutex<Vec<LogRecord>>>,
    writer: TaskSlot,
    completion_tx: Sender<()>,
    completion_rx: Receiver<()>,
}

impl DataLogger {
    /// Log into `log_<name>.log` in the working directory
    pub fn new(name: &str) -> Self {
        Self::with_dir(".", name)
    }

    /// Log into `log_<name>.log` under `dir`
    pub fn with_dir(dir: impl Into<PathBuf>, name: &str) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        Self {
            path: dir.into().join(format!("log_{name}.log")),
            buffer: Arc::new(Mutex::new(Vec::new())),
            writer: TaskSlot::default(),
            completion_tx,
            completion_rx,
        }
    }

    /// Path of the log file this instance appends to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer one reading, stamped with the current UTC time.
    ///
    /// A no-op while a flush is outstanding; readings received during a
    /// flush are not recorded.
    pub fn log(&mut self, setpoint: &str, sensor: &str, pwm: &str) {
        if self.writer.is_running() {
            return;
        }

        let record = LogRecord {
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            setpoint: setpoint.to_string(),
            sensor: sensor.to_string(),
            pwm: pwm.to_string(),
        };
        self.buffer.lock().expect("log buffer poisoned").push(record);
    }

    /// Number of buffered, not yet flushed readings
    pub fn buffered(&self) -> usize {
        self.buffer.lock().expect("log buffer poisoned").len()
    }

    /// Append every buffered reading to the log file on a background
    /// thread.
    ///
    /// A no-op while the buffer is empty or a flush is already
    /// outstanding. Write failures are logged and otherwise absorbed; the
    /// flush cycle still completes so the logger does not wedge.
    pub fn write_to_file(&mut self) {
        if self.writer.is_running() || self.buffered() == 0 {
            return;
        }

        let path = self.path.clone();
        let buffer = Arc::clone(&self.buffer);
        let completion = self.completion_tx.clone();

        self.writer.launch(thread::spawn(move || {
            let records = buffer.lock().expect("log buffer poisoned").clone();
            tracing::debug!("logging {} records to {}", records.len(), path.display());
            if let Err(err) = append_records(&path, &records) {
                tracing::error!("failed to write {}: {err}", path.display());
            }
            let _ = completion.send(());
        }));
    }

    /// Owning-context completion step.
    ///
    /// Returns true when a flush finished since the last call; the buffer
    /// is cleared and the worker reclaimed here, never on the background
    /// thread.
    pub fn poll(&mut self) -> bool {
        if self.completion_rx.try_recv().is_err() {
            return false;
        }

        self.buffer.lock().expect("log buffer poisoned").clear();
        self.writer.reclaim();
        true
    }
}

fn append_records(path: &Path, records: &[LogRecord]) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        writer.write_all(record.to_line().as_bytes())?;
    }
    writer.flush()
}

impl Drop for DataLogger {
    fn drop(&mut self) {
        self.writer.reclaim();
    }
}
