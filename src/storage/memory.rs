//! In-memory storage backends.
//!
//! Thread-safe implementations of the storage traits for embedded use, tests,
//! and as the cache layer under the persistent history store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consolidator::DisplayFields;
use crate::info::LookupInfo;
use crate::mutation::{MutationSet, RowId};
use crate::number::CanonicalNumber;
use crate::storage::traits::{
    CallLogRow, CallLogRowSource, HistoryEntry, HistoryStore, MutationSink, StorageError,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Age index key: timestamp, then write sequence so equal timestamps evict in write order.
type AgeKey = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct HistoryState {
    by_number: HashMap<String, (HistoryEntry, u64)>,
    by_age: BTreeMap<AgeKey, String>,
    next_seq: u64,
}

impl HistoryState {
    fn remove(&mut self, normalized_number: &str) -> bool {
        match self.by_number.remove(normalized_number) {
            Some((entry, seq)) => {
                self.by_age.remove(&(entry.last_modified, seq));
                true
            }
            None => false,
        }
    }

    fn evict_to(&mut self, max_rows: usize) -> usize {
        let mut evicted = 0;
        while self.by_number.len() > max_rows {
            let Some((_, oldest)) = self.by_age.pop_first() else {
                break;
            };
            self.by_number.remove(&oldest);
            evicted += 1;
        }
        evicted
    }
}

/// Lookup history held in memory, evicting oldest entries beyond `max_rows`.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    state: RwLock<HistoryState>,
    max_rows: usize,
}

impl InMemoryHistoryStore {
    /// Default capacity.
    pub const DEFAULT_MAX_ROWS: usize = 999;

    /// Creates an empty store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_rows(Self::DEFAULT_MAX_ROWS)
    }

    /// Creates an empty store holding at most `max_rows` entries.
    #[must_use]
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self {
            state: RwLock::new(HistoryState::default()),
            max_rows,
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn get_many(
        &self,
        normalized_numbers: &HashSet<String>,
    ) -> Result<HashMap<String, LookupInfo>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history.get_many"))?;
        Ok(normalized_numbers
            .iter()
            .filter_map(|n| {
                state
                    .by_number
                    .get(n)
                    .map(|(entry, _)| (n.clone(), entry.info.clone()))
            })
            .collect())
    }

    fn get(&self, normalized_number: &str) -> Result<Option<HistoryEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history.get"))?;
        Ok(state
            .by_number
            .get(normalized_number)
            .map(|(entry, _)| entry.clone()))
    }

    fn put(
        &self,
        normalized_number: &str,
        info: LookupInfo,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("history.put"))?;
        state.remove(normalized_number);

        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .by_age
            .insert((timestamp, seq), normalized_number.to_string());
        state.by_number.insert(
            normalized_number.to_string(),
            (
                HistoryEntry {
                    normalized_number: normalized_number.to_string(),
                    info,
                    last_modified: timestamp,
                },
                seq,
            ),
        );

        let evicted = state.evict_to(self.max_rows);
        if evicted > 0 {
            tracing::debug!(evicted, max_rows = self.max_rows, "history capacity exceeded");
        }
        Ok(())
    }

    fn delete_many(&self, normalized_numbers: &HashSet<String>) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("history.delete_many"))?;
        Ok(normalized_numbers
            .iter()
            .filter(|n| state.remove(n))
            .count())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history.len"))?;
        Ok(state.by_number.len())
    }

    fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn entries(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history.entries"))?;
        Ok(state
            .by_age
            .values()
            .filter_map(|n| state.by_number.get(n).map(|(entry, _)| entry.clone()))
            .collect())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("history.clear"))?;
        *state = HistoryState::default();
        Ok(())
    }
}

/// A call-log row together with the display fields committed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    pub row_id: RowId,
    pub number: CanonicalNumber,
    #[serde(default)]
    pub attributes: DisplayFields,
}

/// Annotated call log held in memory.
///
/// Serves as both the row source and the commit target of a refresh cycle.
#[derive(Debug, Default)]
pub struct InMemoryCallLog {
    rows: RwLock<BTreeMap<RowId, AnnotatedRow>>,
}

impl InMemoryCallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an unannotated row.
    pub fn add_row(&self, row_id: RowId, number: CanonicalNumber) -> Result<(), StorageError> {
        let mut rows = self.rows.write().map_err(|_| lock_err("calllog.add_row"))?;
        rows.insert(
            row_id,
            AnnotatedRow {
                row_id,
                number,
                attributes: DisplayFields::default(),
            },
        );
        Ok(())
    }

    pub fn row(&self, row_id: RowId) -> Result<Option<AnnotatedRow>, StorageError> {
        let rows = self.rows.read().map_err(|_| lock_err("calllog.row"))?;
        Ok(rows.get(&row_id).cloned())
    }

    /// Every row, ordered by id.
    pub fn snapshot(&self) -> Result<Vec<AnnotatedRow>, StorageError> {
        let rows = self.rows.read().map_err(|_| lock_err("calllog.snapshot"))?;
        Ok(rows.values().cloned().collect())
    }
}

impl CallLogRowSource for InMemoryCallLog {
    fn rows(&self) -> Result<Vec<CallLogRow>, StorageError> {
        let rows = self.rows.read().map_err(|_| lock_err("calllog.rows"))?;
        Ok(rows
            .values()
            .map(|r| CallLogRow {
                row_id: r.row_id,
                number: r.number.clone(),
            })
            .collect())
    }
}

impl MutationSink for InMemoryCallLog {
    fn commit(&self, mutations: &MutationSet) -> Result<(), StorageError> {
        let mut rows = self.rows.write().map_err(|_| lock_err("calllog.commit"))?;

        // Validate everything before touching a row.
        for (row_id, patch) in mutations.inserts() {
            if patch.number.is_none() {
                return Err(StorageError::InvalidMutation(format!(
                    "insert for row {row_id} carries no number"
                )));
            }
        }
        for row_id in mutations.updates().keys() {
            if !rows.contains_key(row_id) {
                return Err(StorageError::RowNotFound(*row_id));
            }
        }

        for row_id in mutations.deletes() {
            rows.remove(row_id);
        }
        for (row_id, patch) in mutations.inserts() {
            let Some(number) = patch.number.clone() else {
                continue;
            };
            rows.insert(
                *row_id,
                AnnotatedRow {
                    row_id: *row_id,
                    number,
                    attributes: patch.attributes.clone().unwrap_or_default(),
                },
            );
        }
        for (row_id, patch) in mutations.updates() {
            if let Some(row) = rows.get_mut(row_id) {
                if let Some(number) = &patch.number {
                    row.number = number.clone();
                }
                if let Some(attributes) = &patch.attributes {
                    row.attributes = attributes.clone();
                }
            }
        }
        Ok(())
    }
}
