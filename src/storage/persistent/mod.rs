//! Durable lookup history.
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │              FileHistoryStore             │
//! │  ┌────────────────┐  ┌─────────────────┐  │
//! │  │  HistoryLog    │  │ InMemoryHistory │  │
//! │  │ (append-only)  │→ │  Store (cache)  │  │
//! │  └────────────────┘  └─────────────────┘  │
//! │            DirectoryLock (flock)          │
//! └───────────────────────────────────────────┘
//! ```
//!
//! Writes go to the log first and then to the cache; reads are served from
//! the cache. The log is rewritten from the cache once it outgrows
//! [`PersistentConfig::max_log_size`].

mod codec;
mod file_lock;
mod log;

pub use file_lock::DirectoryLock;
pub use log::{HistoryLog, LogRecord, Replay};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AnnotationResult, ConfigError};
use crate::info::LookupInfo;
use crate::storage::{HistoryEntry, HistoryStore, InMemoryHistoryStore, StorageError};

const LOG_FILE_NAME: &str = "history.log";

/// Settings for the durable history store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// fsync after every append.
    pub sync_on_write: bool,
    /// Log size (bytes) that triggers compaction.
    pub max_log_size: u64,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_log_size: 8 * 1024 * 1024,
        }
    }
}

impl PersistentConfig {
    const MIN_LOG_SIZE: u64 = 4 * 1024;

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.max_log_size < Self::MIN_LOG_SIZE {
            return Err(ConfigError::BelowMinimum {
                field: "persistent.max_log_size".to_string(),
                min: Self::MIN_LOG_SIZE,
                actual: self.max_log_size,
            });
        }
        Ok(self)
    }
}

/// [`HistoryStore`] that survives restarts.
#[derive(Debug)]
pub struct FileHistoryStore {
    cache: InMemoryHistoryStore,
    log: Mutex<HistoryLog>,
    config: PersistentConfig,
    _lock: DirectoryLock,
}

impl FileHistoryStore {
    /// Opens or creates the store in `dir`, replaying its log.
    ///
    /// # Errors
    /// - `Config` if `config` fails validation
    /// - `Storage(Locked)` if another process owns `dir`
    /// - `Storage(Io)` if the directory or log cannot be accessed
    pub fn open(
        dir: impl AsRef<Path>,
        max_rows: usize,
        config: Option<PersistentConfig>,
    ) -> AnnotationResult<Self> {
        let config = config.unwrap_or_default().validate()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(StorageError::from)?;
        let lock = DirectoryLock::acquire(dir)?;

        let (log, replay) = HistoryLog::open(&dir.join(LOG_FILE_NAME), config.sync_on_write)
            .map_err(StorageError::from)?;
        let cache = InMemoryHistoryStore::with_max_rows(max_rows);
        let replayed = replay.records.len();
        for record in replay.records {
            apply(&cache, record)?;
        }
        tracing::info!(
            dir = %dir.display(),
            replayed,
            discarded_bytes = replay.discarded_bytes,
            entries = cache.len()?,
            "opened history store"
        );

        Ok(Self {
            cache,
            log: Mutex::new(log),
            config,
            _lock: lock,
        })
    }

    /// Rewrites the log to hold only live entries.
    pub fn compact(&self) -> Result<(), StorageError> {
        let mut log = self.lock_log("history.compact")?;
        self.compact_locked(&mut log)
    }

    fn compact_locked(&self, log: &mut HistoryLog) -> Result<(), StorageError> {
        let records: Vec<LogRecord> = self
            .cache
            .entries()?
            .into_iter()
            .map(LogRecord::from)
            .collect();
        log.rewrite(&records)?;
        tracing::debug!(entries = records.len(), "compacted history log");
        Ok(())
    }

    fn lock_log(
        &self,
        context: &'static str,
    ) -> Result<std::sync::MutexGuard<'_, HistoryLog>, StorageError> {
        self.log
            .lock()
            .map_err(|_| StorageError::Backend(format!("poisoned lock: {context}")))
    }

    fn write(&self, records: Vec<LogRecord>) -> Result<(), StorageError> {
        let mut log = self.lock_log("history.write")?;
        for record in records {
            log.append(&record)?;
            apply(&self.cache, record)?;
        }
        if log.size_bytes()? > self.config.max_log_size {
            self.compact_locked(&mut log)?;
        }
        Ok(())
    }
}

fn apply(cache: &InMemoryHistoryStore, record: LogRecord) -> Result<(), StorageError> {
    match record {
        LogRecord::Put {
            normalized_number,
            info,
            last_modified,
        } => cache.put(&normalized_number, info, last_modified),
        LogRecord::Delete { normalized_numbers } => cache
            .delete_many(&normalized_numbers.into_iter().collect())
            .map(|_| ()),
        LogRecord::Clear => cache.clear(),
    }
}

impl HistoryStore for FileHistoryStore {
    fn get_many(
        &self,
        normalized_numbers: &HashSet<String>,
    ) -> Result<HashMap<String, LookupInfo>, StorageError> {
        self.cache.get_many(normalized_numbers)
    }

    fn get(&self, normalized_number: &str) -> Result<Option<HistoryEntry>, StorageError> {
        self.cache.get(normalized_number)
    }

    fn put(
        &self,
        normalized_number: &str,
        info: LookupInfo,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.write(vec![LogRecord::Put {
            normalized_number: normalized_number.to_string(),
            info,
            last_modified: timestamp,
        }])
    }

    fn put_many(
        &self,
        entries: Vec<(String, LookupInfo)>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.write(
            entries
                .into_iter()
                .map(|(normalized_number, info)| LogRecord::Put {
                    normalized_number,
                    info,
                    last_modified: timestamp,
                })
                .collect(),
        )
    }

    fn delete_many(&self, normalized_numbers: &HashSet<String>) -> Result<usize, StorageError> {
        let existing = self.cache.get_many(normalized_numbers)?.len();
        if existing > 0 {
            self.write(vec![LogRecord::Delete {
                normalized_numbers: normalized_numbers.iter().cloned().collect(),
            }])?;
        }
        Ok(existing)
    }

    fn len(&self) -> Result<usize, StorageError> {
        self.cache.len()
    }

    fn max_rows(&self) -> usize {
        self.cache.max_rows()
    }

    fn entries(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        self.cache.entries()
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.write(vec![LogRecord::Clear])
    }
}
