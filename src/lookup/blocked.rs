//! System-level blocked numbers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::info::{BlockedState, LookupInfo, SourceKind, SubRecord, SystemBlockedInfo};
use crate::lookup::{lock_failed, LookupError, PhoneLookup};
use crate::number::CanonicalNumber;
use crate::partition::PartitionedNumbers;

#[derive(Debug, Default)]
struct TableState {
    e164: HashSet<String>,
    raw: HashSet<String>,
    version: u64,
}

/// The system's blocked-number list.
///
/// Entries are keyed the way the partitioner keys numbers: E164 for valid
/// numbers without post-dial digits, the normalized form otherwise.
#[derive(Debug, Default)]
pub struct BlockedNumberTable {
    state: RwLock<TableState>,
}

impl BlockedNumberTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, number: &CanonicalNumber) -> Result<(), LookupError> {
        self.modify(number, true)
    }

    pub fn unblock(&self, number: &CanonicalNumber) -> Result<(), LookupError> {
        self.modify(number, false)
    }

    /// Increments on every change.
    pub fn version(&self) -> Result<u64, LookupError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_failed(SourceKind::SystemBlocked, "blocked.version"))?;
        Ok(state.version)
    }

    fn modify(&self, number: &CanonicalNumber, blocked: bool) -> Result<(), LookupError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_failed(SourceKind::SystemBlocked, "blocked.modify"))?;
        let partitioned = PartitionedNumbers::new([number]);
        let changed = match partitioned.valid_e164_numbers().next() {
            Some(e164) if blocked => state.e164.insert(e164.to_string()),
            Some(e164) => state.e164.remove(e164),
            None if blocked => state.raw.insert(number.normalized()),
            None => state.raw.remove(&number.normalized()),
        };
        if changed {
            state.version += 1;
        }
        Ok(())
    }
}

/// Reports [`BlockedState`] for each number from a [`BlockedNumberTable`].
#[derive(Debug)]
pub struct SystemBlockedLookup {
    table: Arc<BlockedNumberTable>,
    committed_version: Mutex<Option<u64>>,
    pending_version: Mutex<Option<u64>>,
}

impl SystemBlockedLookup {
    #[must_use]
    pub fn new(table: Arc<BlockedNumberTable>) -> Self {
        Self {
            table,
            committed_version: Mutex::new(None),
            pending_version: Mutex::new(None),
        }
    }
}

fn state_of(blocked: bool) -> SubRecord {
    SubRecord::SystemBlocked(SystemBlockedInfo {
        blocked_state: Some(if blocked {
            BlockedState::Blocked
        } else {
            BlockedState::NotBlocked
        }),
    })
}

#[async_trait]
impl PhoneLookup for SystemBlockedLookup {
    fn kind(&self) -> SourceKind {
        SourceKind::SystemBlocked
    }

    async fn is_dirty(&self, _numbers: &HashSet<CanonicalNumber>) -> Result<bool, LookupError> {
        let committed = *self
            .committed_version
            .lock()
            .map_err(|_| lock_failed(self.kind(), "blocked.committed"))?;
        Ok(committed != Some(self.table.version()?))
    }

    async fn most_recent_info(
        &self,
        existing: &HashMap<CanonicalNumber, LookupInfo>,
    ) -> Result<HashMap<CanonicalNumber, SubRecord>, LookupError> {
        let partitioned = PartitionedNumbers::new(existing.keys());
        let state = self
            .table
            .state
            .read()
            .map_err(|_| lock_failed(self.kind(), "blocked.read"))?;

        let mut results = HashMap::with_capacity(existing.len());
        for (e164, numbers) in partitioned.valid_e164_entries() {
            let blocked = state.e164.contains(e164);
            results.extend(numbers.iter().map(|n| (n.clone(), state_of(blocked))));
        }
        for (normalized, numbers) in partitioned.invalid_entries() {
            let blocked = state.raw.contains(normalized);
            results.extend(numbers.iter().map(|n| (n.clone(), state_of(blocked))));
        }

        *self
            .pending_version
            .lock()
            .map_err(|_| lock_failed(self.kind(), "blocked.pending"))? = Some(state.version);
        Ok(results)
    }

    async fn on_successful_bulk_update(&self) -> Result<(), LookupError> {
        let pending = self
            .pending_version
            .lock()
            .map_err(|_| lock_failed(self.kind(), "blocked.pending"))?
            .take();
        if pending.is_some() {
            *self
                .committed_version
                .lock()
                .map_err(|_| lock_failed(self.kind(), "blocked.committed"))? = pending;
        }
        Ok(())
    }

    async fn clear_data(&self) -> Result<(), LookupError> {
        *self
            .committed_version
            .lock()
            .map_err(|_| lock_failed(self.kind(), "blocked.committed"))? = None;
        Ok(())
    }
}
