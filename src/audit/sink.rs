use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::AuditRecord;
use crate::errors::AuditError;

/// Append-only destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Where the configured sink writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Log,
    File(PathBuf),
}

impl SinkTarget {
    pub async fn open(&self) -> Result<Arc<dyn AuditSink>, AuditError> {
        match self {
            SinkTarget::Log => Ok(Arc::new(LogSink)),
            SinkTarget::File(path) => Ok(Arc::new(NdjsonFileSink::open(path).await?)),
        }
    }
}

/// Writes one JSON line per record to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AuditSink for LogSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)?;
        tracing::info!(target: "audit", severity = record.severity.as_str(), "{}", line);
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct ChainedLine<'a> {
    #[serde(flatten)]
    record: &'a AuditRecord,
    prev_hash: Option<&'a str>,
    hash: &'a str,
}

#[derive(Deserialize)]
struct StoredLine {
    #[serde(flatten)]
    record: AuditRecord,
    prev_hash: Option<String>,
    hash: String,
}

struct FileState {
    file: tokio::fs::File,
    last_hash: Option<String>,
}

/// Newline-delimited JSON file where every line carries the SHA-256 of the
/// previous line's hash followed by its own record, so edits and deletions
/// show up in [`verify_chain`].
pub struct NdjsonFileSink {
    path: PathBuf,
    state: tokio::sync::Mutex<FileState>,
}

impl NdjsonFileSink {
    /// Opens `path` for appending, continuing the chain of any existing lines.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };

        // A line without its newline is a write that never completed.
        let complete = contents.rfind('\n').map_or(0, |index| index + 1);
        let last_hash = match contents[..complete]
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
        {
            Some(line) => Some(serde_json::from_str::<StoredLine>(line)?.hash),
            None => None,
        };

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if complete < contents.len() {
            tracing::warn!(
                path = %path.display(),
                discarded_bytes = contents.len() - complete,
                "truncating incomplete trailing audit line"
            );
            file.set_len(complete as u64).await?;
        }

        tracing::debug!(
            path = %path.display(),
            resumed = last_hash.is_some(),
            "audit file opened"
        );

        Ok(Self {
            path,
            state: tokio::sync::Mutex::new(FileState { file, last_hash }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for NdjsonFileSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let payload = serde_json::to_string(record)?;
        let mut state = self.state.lock().await;

        let hash = chain_hash(state.last_hash.as_deref(), &payload);
        let mut line = serde_json::to_string(&ChainedLine {
            record,
            prev_hash: state.last_hash.as_deref(),
            hash: &hash,
        })?;
        line.push('\n');

        let committed = state.file.metadata().await?.len();
        let written = match state.file.write_all(line.as_bytes()).await {
            Ok(()) => state.file.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            // Leave no fragment behind for the retry to append after.
            if let Err(rollback) = state.file.set_len(committed).await {
                tracing::error!(
                    path = %self.path.display(),
                    "failed to roll back partial audit line: {}",
                    rollback
                );
            }
            return Err(err.into());
        }

        state.last_hash = Some(hash);
        Ok(())
    }
}

fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Re-reads an audit file and checks every link of its hash chain. Returns the
/// number of records on success.
pub async fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    let mut expected_prev: Option<String> = None;
    let mut count = 0;

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredLine = serde_json::from_str(line)?;
        let payload = serde_json::to_string(&stored.record)?;

        if stored.prev_hash != expected_prev
            || chain_hash(stored.prev_hash.as_deref(), &payload) != stored.hash
        {
            return Err(AuditError::BrokenChain { line: index + 1 });
        }

        expected_prev = Some(stored.hash);
        count += 1;
    }

    Ok(count)
}
