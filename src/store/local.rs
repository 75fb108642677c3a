//! File-backed collection store.
//!
//! Layout under the persistence root:
//!
//! ```text
//! <root>/<collection>/records.jsonl   one JSON-encoded VectorRecord per line
//! ```
//!
//! Records are only ever appended, and each write is synced before the call returns. Writes
//! from this process are serialized through a single lock; reads are lock-free.

use super::types::{ScoredSegment, StoreError, VectorRecord, cosine_similarity};
use super::CollectionStore;
use crate::sanitize::CollectionName;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const RECORDS_FILE: &str = "records.jsonl";

/// Collection store persisting records as JSON lines beneath a root directory.
pub struct LocalStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn records_path(&self, name: &CollectionName) -> PathBuf {
        self.root.join(name.as_str()).join(RECORDS_FILE)
    }

    async fn read_records(&self, name: &CollectionName) -> Result<Vec<VectorRecord>, StoreError> {
        let raw = match fs::read_to_string(self.records_path(name)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingCollection(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        // An unterminated last line is a write that never completed.
        let complete = match raw.rfind('\n') {
            Some(end) => &raw[..=end],
            None => "",
        };
        if complete.len() < raw.len() {
            tracing::warn!(
                collection = %name,
                bytes = raw.len() - complete.len(),
                "Skipping incomplete trailing record"
            );
        }

        complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                    collection: name.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Cut an incomplete trailing record so the next append starts on a fresh line.
    async fn drop_torn_tail(&self, name: &CollectionName) -> Result<(), StoreError> {
        let path = self.records_path(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingCollection(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        if bytes.last().is_none_or(|byte| *byte == b'\n') {
            return Ok(());
        }

        let keep = bytes
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |end| end + 1);
        let file = OpenOptions::new().write(true).open(&path).await?;
        file.set_len(keep as u64).await?;
        file.sync_all().await?;
        tracing::warn!(
            collection = %name,
            removed = bytes.len() - keep,
            "Removed incomplete trailing record"
        );
        Ok(())
    }

    fn encode(name: &CollectionName, records: &[VectorRecord]) -> Result<String, StoreError> {
        let mut buffer = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|source| StoreError::Corrupt {
                collection: name.to_string(),
                source,
            })?;
            buffer.push_str(&line);
            buffer.push('\n');
        }
        Ok(buffer)
    }

    /// Write `buffer` and sync it, truncating back to the prior length on failure.
    async fn write_lines(
        name: &CollectionName,
        file: &mut fs::File,
        buffer: &str,
    ) -> Result<(), StoreError> {
        let original_len = file.metadata().await?.len();
        if let Err(err) = Self::write_synced(file, buffer).await {
            if let Err(rollback) = file.set_len(original_len).await {
                tracing::error!(
                    collection = %name,
                    error = %rollback,
                    "Failed to roll back partial write"
                );
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn write_synced(file: &mut fs::File, buffer: &str) -> std::io::Result<()> {
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await
    }
}

#[async_trait]
impl CollectionStore for LocalStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let has_records = fs::try_exists(entry.path().join(RECORDS_FILE)).await?;
            if has_records && let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_from(
        &self,
        name: &CollectionName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        let buffer = Self::encode(name, &records)?;
        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(self.root.join(name.as_str())).await?;
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.records_path(name))
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        Self::write_lines(name, &mut file, &buffer).await?;

        tracing::debug!(collection = %name, records = records.len(), "Collection created");
        Ok(records.len())
    }

    async fn append_to(
        &self,
        name: &CollectionName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        let buffer = Self::encode(name, &records)?;
        let _guard = self.write_lock.lock().await;
        self.drop_torn_tail(name).await?;

        let mut file = match OpenOptions::new()
            .append(true)
            .open(self.records_path(name))
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingCollection(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        Self::write_lines(name, &mut file, &buffer).await?;

        tracing::debug!(collection = %name, records = records.len(), "Records appended");
        Ok(records.len())
    }

    async fn open_or_create(&self, name: &CollectionName) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(self.root.join(name.as_str())).await?;
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.records_path(name))
            .await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn search(
        &self,
        name: &CollectionName,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredSegment>, StoreError> {
        let records = self.read_records(name).await?;
        let total = records.len();
        let mut hits: Vec<ScoredSegment> = records
            .into_iter()
            .filter_map(|record| {
                let score = cosine_similarity(&record.vector, query)?;
                Some(ScoredSegment {
                    segment: record.segment(),
                    score,
                })
            })
            .collect();
        if hits.len() < total {
            tracing::warn!(
                collection = %name,
                total,
                comparable = hits.len(),
                "Some records could not be compared with the query vector"
            );
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, name: &CollectionName) -> Result<usize, StoreError> {
        Ok(self.read_records(name).await?.len())
    }
}
