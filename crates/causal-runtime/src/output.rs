//! Result sinks for completed experiments

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use causal_core::error::{ProfilerError, ProfilerResult};
use causal_core::{ExperimentRecord, CSV_HEADER};

/// Where completed experiments go
pub trait ResultSink: Send + Sync {
    fn record(&self, record: &ExperimentRecord) -> ProfilerResult<()>;

    fn flush(&self) -> ProfilerResult<()> {
        Ok(())
    }
}

/// Appends CSV rows to a file; the header is appended on every open.
pub struct CsvFileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvFileSink {
    pub fn open(path: impl AsRef<Path>) -> ProfilerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ProfilerError::Output(format!("{}: {}", path.display(), e)))?;
        writeln!(file, "{}", CSV_HEADER)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvFileSink {
    fn record(&self, record: &ExperimentRecord) -> ProfilerResult<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", record.to_csv_row())?;
        Ok(())
    }

    fn flush(&self) -> ProfilerResult<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.flush()?;
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ExperimentRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExperimentRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ResultSink for MemorySink {
    fn record(&self, record: &ExperimentRecord) -> ProfilerResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
