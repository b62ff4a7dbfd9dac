use std::fs;
use std::path::{Path, PathBuf};

use harvest_core::{Batch, Flattener, HarvestOutcome};
use harvest_logging::harvest_info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::persist::{AtomicFileWriter, PersistError};

const BATCH_INDEX_FILE: &str = "batches.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub row_count: usize,
    pub columns: Vec<String>,
    pub rows_path: PathBuf,
    pub manifest_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid file stem `{0}`")]
    InvalidStem(String),
}

/// Write a finished session as `{stem}.jsonl` (one flattened row per line)
/// plus `{stem}.manifest.json` with the total, termination reason and columns.
pub fn export_rows(
    dir: &Path,
    stem: &str,
    outcome: &HarvestOutcome,
    flattener: &mut Flattener,
) -> Result<ExportSummary, ExportError> {
    if stem.is_empty() || stem == "." || stem == ".." || stem.contains(['/', '\\']) {
        return Err(ExportError::InvalidStem(stem.to_string()));
    }
    let writer = AtomicFileWriter::new(dir.to_path_buf())?;

    let rows = flattener.flatten_all(&outcome.items);
    let mut buffer = Vec::new();
    for row in &rows {
        serde_json::to_writer(&mut buffer, row)?;
        buffer.push(b'\n');
    }
    let rows_path = writer.write(&format!("{stem}.jsonl"), &buffer)?;

    let columns = flattener.columns().to_vec();
    let manifest = json!({
        "total": outcome.total,
        "reason": outcome.reason,
        "pages_fetched": outcome.pages_fetched,
        "failure": outcome.failure,
        "columns": columns,
    });
    let manifest_path = writer.write_json(&format!("{stem}.manifest.json"), &manifest)?;

    harvest_info!(
        "exported {} rows ({}) to {}",
        rows.len(),
        outcome.reason,
        rows_path.display()
    );
    Ok(ExportSummary {
        row_count: rows.len(),
        columns,
        rows_path,
        manifest_path,
    })
}

/// Write each batch to `batch_{index:04}.json` and an index of all of them to
/// `batches.json`. Returns the batch file paths in index order.
pub fn write_batches<K: Serialize>(
    dir: &Path,
    batches: &[Batch<K>],
) -> Result<Vec<PathBuf>, ExportError> {
    let writer = AtomicFileWriter::new(dir.to_path_buf())?;

    let mut paths = Vec::with_capacity(batches.len());
    let mut files = Vec::with_capacity(batches.len());
    for batch in batches {
        let filename = format!("batch_{:04}.json", batch.index);
        paths.push(writer.write_json(&filename, batch)?);
        files.push(json!({
            "batch_index": batch.index,
            "batch_size": batch.size,
            "file": filename,
        }));
    }

    let index = json!({
        "batch_count": batches.len(),
        "total_keys": batches.iter().map(|b| b.size).sum::<usize>(),
        "batches": files,
    });
    writer.write_json(BATCH_INDEX_FILE, &index)?;
    harvest_info!("wrote {} batches to {}", batches.len(), writer.dir().display());
    Ok(paths)
}

pub fn read_batch<K: DeserializeOwned>(path: &Path) -> Result<Batch<K>, ExportError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
