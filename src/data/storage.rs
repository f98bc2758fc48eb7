// File-backed entity journal in JSON Lines format.
//
// Every mutation appends the full entity snapshot as one line. Loading
// replays the file and keeps the highest-version snapshot per key, so
// concurrent writers may append out of commit order without losing the
// newest state. The journal is both the audit trail and the recovery source
// for the in-memory store.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Trade, UserAccount};

/// Entities that can be journaled under a unique key
pub trait Keyed {
    fn key(&self) -> &str;
    /// Commit counter; a higher version is a newer snapshot
    fn version(&self) -> u64;
}

impl Keyed for Trade {
    fn key(&self) -> &str {
        &self.tx_hash
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Keyed for UserAccount {
    fn key(&self) -> &str {
        &self.username
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Append-only snapshot journal for one entity type
pub struct Journal<T> {
    /// Path to the JSON Lines file
    file_path: PathBuf,
    /// Serializes appends from concurrent tasks
    write_lock: Mutex<()>,
    _entity: PhantomData<fn() -> T>,
}

pub type TradeJournal = Journal<Trade>;
pub type AccountJournal = Journal<UserAccount>;

impl<T> Journal<T>
where
    T: Serialize + DeserializeOwned + Keyed,
{
    /// Create a new journal
    ///
    /// # Arguments
    /// * `file_path` - Path to the .jsonl file (e.g., "data/trades.jsonl")
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
            _entity: PhantomData,
        }
    }

    /// Ensure the parent directory exists
    async fn ensure_directory(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create journal directory")?;
        }
        Ok(())
    }

    /// Append one entity snapshot
    ///
    /// # Errors
    /// Returns an error if file operations or serialization fail
    pub async fn append(&self, entity: &T) -> Result<()> {
        let json = serde_json::to_string(entity).context("Failed to serialize journal entry")?;

        let _guard = self.write_lock.lock().await;
        self.ensure_directory().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await
            .context("Failed to open journal file")?;

        let mut line = json.into_bytes();
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await?;

        debug!("Journaled {} to {}", entity.key(), self.file_path.display());
        Ok(())
    }

    /// Replay the journal, keeping the newest snapshot per key
    ///
    /// The highest `version` wins; equal versions fall back to file order.
    /// Invalid lines are logged and skipped rather than causing the entire
    /// load to fail. Entities come back in order of first appearance.
    pub async fn load_latest(&self) -> Result<Vec<T>> {
        if !self.file_path.exists() {
            info!("Journal does not exist yet: {}", self.file_path.display());
            return Ok(Vec::new());
        }

        let file = File::open(&self.file_path)
            .await
            .context("Failed to open journal file")?;
        let mut lines = BufReader::new(file).lines();

        let mut entities: Vec<T> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut line_number = 0;
        let mut error_count = 0;
        let mut entry_count = 0;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(&line) {
                Ok(entity) => {
                    entry_count += 1;
                    match positions.get(entity.key()) {
                        Some(&idx) => {
                            if entity.version() >= entities[idx].version() {
                                entities[idx] = entity;
                            } else {
                                debug!(
                                    "Skipping stale snapshot of {} (v{} < v{})",
                                    entity.key(),
                                    entity.version(),
                                    entities[idx].version()
                                );
                            }
                        }
                        None => {
                            positions.insert(entity.key().to_string(), entities.len());
                            entities.push(entity);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to parse line {} in {}: {}",
                        line_number,
                        self.file_path.display(),
                        e
                    );
                    error_count += 1;
                }
            }
        }

        info!(
            "Replayed {} entries into {} entities from {} ({} parse errors)",
            entry_count,
            entities.len(),
            self.file_path.display(),
            error_count
        );

        Ok(entities)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::data::trade::fixtures::new_trade;
    use crate::data::ExecutionStatus;
    use chrono::Utc;
    use tempfile::TempDir;

    fn trade(tx_hash: &str) -> Trade {
        Trade::new(new_trade(tx_hash), &RiskConfig::default(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(temp_dir.path().join("missing.jsonl"));

        assert!(!journal.exists());
        assert!(journal.load_latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(temp_dir.path().join("nested/dir/trades.jsonl"));

        journal.append(&trade("tx1")).await.unwrap();
        assert!(journal.exists());
    }

    #[tokio::test]
    async fn test_last_snapshot_wins() {
        let temp_dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(temp_dir.path().join("trades.jsonl"));

        let first = trade("tx1");
        let mut updated = first.clone();
        updated.execution.status = ExecutionStatus::Submitted;

        journal.append(&first).await.unwrap();
        journal.append(&trade("tx2")).await.unwrap();
        journal.append(&updated).await.unwrap();

        let loaded = journal.load_latest().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].tx_hash, "tx1");
        assert_eq!(loaded[0].execution.status, ExecutionStatus::Submitted);
        assert_eq!(loaded[1].tx_hash, "tx2");
    }

    #[tokio::test]
    async fn test_higher_version_wins_over_file_order() {
        let temp_dir = TempDir::new().unwrap();
        let journal = TradeJournal::new(temp_dir.path().join("trades.jsonl"));

        let mut newer = trade("tx1");
        newer.execution.status = ExecutionStatus::Submitted;
        newer.version = 2;
        let mut older = newer.clone();
        older.execution.status = ExecutionStatus::Pending;
        older.version = 1;

        journal.append(&newer).await.unwrap();
        journal.append(&older).await.unwrap();

        let loaded = journal.load_latest().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].version, 2);
        assert_eq!(loaded[0].execution.status, ExecutionStatus::Submitted);
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trades.jsonl");
        let journal = TradeJournal::new(&path);

        journal.append(&trade("tx1")).await.unwrap();
        tokio::fs::write(
            &path,
            format!(
                "{}\n{{not json\n\n",
                tokio::fs::read_to_string(&path).await.unwrap().trim_end()
            ),
        )
        .await
        .unwrap();
        journal.append(&trade("tx2")).await.unwrap();

        let loaded = journal.load_latest().await.unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
