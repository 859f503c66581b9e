//! Reader for chunk batches produced by the ingestion pipeline.
//!
//! Each batch is a JSON Lines file with one embedded chunk per line. A
//! directory is read as one batch per `*.jsonl` file, in path order.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMetadata};

/// One line of an ingestion batch.
///
/// Records written by the handbook embedder carry `heading_context` for the
/// section label and use `section` for the owning department; both layouts
/// are accepted. Unknown keys such as the embedder's `source` name are ignored.
#[derive(Debug, Deserialize)]
struct IngestRecord {
    #[serde(alias = "id")]
    chunk_id: String,
    text: String,
    embedding: Vec<f32>,
    doc_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    section: Option<String>,
    heading_context: Option<String>,
    department: Option<String>,
    doc_type: Option<String>,
    version: Option<u32>,
    ingested_at: Option<DateTime<Utc>>,
    source_path: Option<String>,
}

impl IngestRecord {
    fn into_chunk(self) -> Result<Chunk> {
        let (section, department) = match self.heading_context {
            Some(heading) => (Some(heading), self.department.or(self.section)),
            None => (self.section, self.department),
        };
        let doc_id = self
            .doc_id
            .or(self.source_path)
            .or_else(|| self.url.clone())
            .ok_or_else(|| Error::InvalidBatch(format!("chunk '{}' has no document id", self.chunk_id)))?;
        let metadata = ChunkMetadata {
            doc_id,
            title: self.title,
            url: self.url,
            section,
            department,
            doc_type: self.doc_type,
            version: self.version.unwrap_or(1),
            ingested_at: self.ingested_at,
        };
        Ok(Chunk::new(self.chunk_id, self.text, self.embedding, metadata))
    }
}

/// Reads one JSONL batch. Blank lines are skipped.
pub fn read_batch_file(path: &Path) -> Result<Vec<Chunk>> {
    let io_err = |source| Error::Io { path: path.to_path_buf(), source };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut chunks = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let record: IngestRecord = serde_json::from_str(&line)
            .map_err(|source| Error::Parse { path: path.to_path_buf(), line: index + 1, source })?;
        chunks.push(record.into_chunk()?);
    }
    debug!(path = %path.display(), chunks = chunks.len(), "read batch file");
    Ok(chunks)
}

/// Lists the batch files under `root`: the file itself, or every `*.jsonl` below a directory.
pub fn list_batch_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    files
}

/// Position of a batch file within one ingestion run.
#[derive(Debug, Clone, Copy)]
pub struct BatchFile<'a> {
    pub path: &'a Path,
    /// 1-based.
    pub position: usize,
    pub total: usize,
}

/// Reads every batch under `root` in path order and hands each file's chunks
/// to `on_batch`. Stops at the first error. Returns the number of chunks read.
pub fn for_each_batch<F>(root: &Path, mut on_batch: F) -> Result<usize>
where
    F: FnMut(BatchFile<'_>, Vec<Chunk>) -> Result<()>,
{
    let files = list_batch_files(root);
    if files.is_empty() {
        return Err(Error::InvalidBatch(format!("no .jsonl batches found under {}", root.display())));
    }
    let mut total = 0;
    for (i, path) in files.iter().enumerate() {
        let chunks = read_batch_file(path)?;
        total += chunks.len();
        on_batch(BatchFile { path, position: i + 1, total: files.len() }, chunks)?;
    }
    info!(files = files.len(), chunks = total, "loaded ingestion batches");
    Ok(total)
}
