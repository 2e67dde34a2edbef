//! Storage contracts the refresh engine depends on.
//!
//! The engine only ever sees these narrow interfaces: a history store keyed
//! by normalized number, a read-only feed of call-log rows, and a sink that
//! commits a [`MutationSet`]. Implementations must be safe to share across
//! the refresh workers.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::info::LookupInfo;
use crate::mutation::{MutationSet, RowId};
use crate::number::CanonicalNumber;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error, including poisoned locks.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Filesystem error.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Another process holds the store.
    #[error("Store is locked by another process: {0}")]
    Locked(String),

    /// A mutation referenced a row that does not exist.
    #[error("Call log row not found: {0}")]
    RowNotFound(RowId),

    /// A mutation was rejected before anything was applied.
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Persisted snapshot of the last known lookup info for one number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Primary key, see [`CanonicalNumber::normalized`].
    pub normalized_number: String,
    pub info: LookupInfo,
    pub last_modified: DateTime<Utc>,
}

/// Capacity-bounded lookup history keyed by normalized number.
///
/// # Invariants
/// - At most one entry per normalized number.
/// - Never more than [`HistoryStore::max_rows`] entries; writes that exceed
///   the capacity evict the oldest `last_modified` entries first.
pub trait HistoryStore: Send + Sync {
    /// Batched read. Numbers without history are simply absent from the result.
    fn get_many(
        &self,
        normalized_numbers: &HashSet<String>,
    ) -> Result<HashMap<String, LookupInfo>, StorageError>;

    /// Reads a single entry.
    fn get(&self, normalized_number: &str) -> Result<Option<HistoryEntry>, StorageError>;

    /// Inserts or replaces the entry for `normalized_number`.
    fn put(
        &self,
        normalized_number: &str,
        info: LookupInfo,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Writes several entries sharing one timestamp.
    fn put_many(
        &self,
        entries: Vec<(String, LookupInfo)>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        for (normalized_number, info) in entries {
            self.put(&normalized_number, info, timestamp)?;
        }
        Ok(())
    }

    /// Removes entries. Returns how many existed.
    fn delete_many(&self, normalized_numbers: &HashSet<String>) -> Result<usize, StorageError>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize, StorageError>;

    /// Returns true if the store holds no entries.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Capacity.
    fn max_rows(&self) -> usize;

    /// All entries, oldest first.
    fn entries(&self) -> Result<Vec<HistoryEntry>, StorageError>;

    /// Removes every entry.
    fn clear(&self) -> Result<(), StorageError>;
}

/// One row of the annotated call log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogRow {
    pub row_id: RowId,
    pub number: CanonicalNumber,
}

/// Read-only feed of the current call-log rows.
pub trait CallLogRowSource: Send + Sync {
    fn rows(&self) -> Result<Vec<CallLogRow>, StorageError>;
}

/// Durable commit of a refresh cycle's mutations.
///
/// A commit either applies the whole set or nothing.
pub trait MutationSink: Send + Sync {
    fn commit(&self, mutations: &MutationSet) -> Result<(), StorageError>;
}
