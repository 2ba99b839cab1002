//! Tabular export.
//!
//! One CSV per run, one row per record, stable column order regardless of
//! which optional fields were present. Batches are appended per term and
//! flushed immediately — an aborted run keeps every completed term on disk.
//! Export failures are the one thing that aborts the whole run: silent data
//! loss is worse than a crash.

use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::core::BusinessRecord;

pub const COLUMNS: &[&str] = &[
    "name",
    "rating",
    "review_count",
    "phone",
    "address",
    "category",
    "source_term",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export path unwritable: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),
}

pub struct CsvExporter {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows_written: usize,
}

impl CsvExporter {
    /// Create (truncate) the output file and write the header row.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(COLUMNS)?;
        writer.flush()?;
        Ok(Self {
            writer,
            path,
            rows_written: 0,
        })
    }

    /// Append one term's records and flush. Absent fields render as empty
    /// cells, never omitted columns.
    pub fn append(&mut self, records: &[BusinessRecord]) -> Result<(), ExportError> {
        for record in records {
            self.writer.write_record(&[
                record.name.clone(),
                record.rating.map(|r| r.to_string()).unwrap_or_default(),
                record
                    .review_count
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                record.phone.clone().unwrap_or_default(),
                record.address.clone().unwrap_or_default(),
                record.category.clone().unwrap_or_default(),
                record.source_term.clone(),
            ])?;
        }
        self.writer.flush()?;
        self.rows_written += records.len();
        if !records.is_empty() {
            info!(
                "exported {} rows to {:?} ({} total)",
                records.len(),
                self.path,
                self.rows_written
            );
        }
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
