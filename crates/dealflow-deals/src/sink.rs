//! Record persistence seam and its CSV-backed implementation

use crate::error::{DealError, Result};
use crate::record::{DealRecord, FIELDS};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Where finished deal records go
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Insert the record, or replace the stored row with the same deal id
    async fn upsert(&self, record: &DealRecord) -> Result<()>;
}

/// Appends rows to a CSV file with a fixed header
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored row, in file order
    pub async fn records(&self) -> Result<Vec<DealRecord>> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_rows(&path)).await?
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn upsert(&self, record: &DealRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let record = record.clone();
        let replaced = tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut rows = read_rows(&path)?;
            let existing = record
                .deal_id()
                .and_then(|id| rows.iter().position(|row| row.deal_id() == Some(id)));
            let replaced = existing.is_some();
            match existing {
                Some(index) => rows[index] = record,
                None => rows.push(record),
            }
            write_rows(&path, &rows)?;
            Ok(replaced)
        })
        .await??;

        if replaced {
            debug!("Replaced row in {}", self.path.display());
        } else {
            info!("Appended row to {}", self.path.display());
        }
        Ok(())
    }
}

fn read_rows(path: &Path) -> Result<Vec<DealRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<HashMap<String, String>>() {
        rows.push(DealRecord::from_fields(row?));
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[DealRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(FIELDS)?;
        for row in rows {
            writer.write_record(row.columns())?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Keeps records in memory; useful for tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySink {
    records: std::sync::Mutex<Vec<DealRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DealRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn upsert(&self, record: &DealRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| DealError::Sink(e.to_string()))?;
        let existing = record
            .deal_id()
            .and_then(|id| records.iter().position(|row| row.deal_id() == Some(id)));
        match existing {
            Some(index) => records[index] = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}
