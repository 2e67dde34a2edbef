//! The annotation refresh engine.
//!
//! A refresh cycle runs three phases strictly in order:
//!
//! 1. [`AnnotationEngine::is_dirty`]: cheap check whether any provider may
//!    have new information for the numbers in the call log.
//! 2. [`AnnotationEngine::fill`]: diff fresh provider answers against the
//!    lookup history and record row patches in a [`MutationSet`].
//! 3. [`AnnotationEngine::on_successful_fill`]: after the caller committed
//!    the mutations, persist the new answers to the history store.
//!
//! History is only written in phase 3, so a failed commit never leaves the
//! history describing data the call log does not show.

pub mod runtime;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::{AnnotationError, AnnotationResult};
use crate::info::LookupInfo;
use crate::lookup::CompositeLookup;
use crate::mutation::{MutationSet, RowId};
use crate::number::CanonicalNumber;
use crate::storage::{CallLogRowSource, HistoryStore};

/// History writes computed by `fill`, applied by `on_successful_fill`.
#[derive(Debug, Default)]
struct PendingHistory {
    rows_to_update: HashMap<String, LookupInfo>,
    rows_to_delete: HashSet<String>,
}

/// What one `fill` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillSummary {
    /// Distinct numbers looked up.
    pub numbers_examined: usize,
    /// Numbers whose info changed since the last committed cycle.
    pub numbers_changed: usize,
    /// Pending inserts pre-filled from history.
    pub inserts_prepopulated: usize,
    /// Row patches written from fresh info.
    pub rows_patched: usize,
    /// History rows scheduled for deletion.
    pub history_deletes: usize,
}

/// Keeps call-log annotations in sync with the lookup providers.
///
/// The engine holds no lock across a cycle; callers run one cycle at a time.
pub struct AnnotationEngine {
    lookup: CompositeLookup,
    history: Arc<dyn HistoryStore>,
    rows: Arc<dyn CallLogRowSource>,
    pending: Mutex<PendingHistory>,
}

impl std::fmt::Debug for AnnotationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationEngine")
            .field("lookup", &self.lookup)
            .field("history_max_rows", &self.history.max_rows())
            .finish_non_exhaustive()
    }
}

impl AnnotationEngine {
    #[must_use]
    pub fn new(
        lookup: CompositeLookup,
        history: Arc<dyn HistoryStore>,
        rows: Arc<dyn CallLogRowSource>,
    ) -> Self {
        Self {
            lookup,
            history,
            rows,
            pending: Mutex::new(PendingHistory::default()),
        }
    }

    #[must_use]
    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Returns true if any provider may have new information for a number in the call log.
    pub async fn is_dirty(&self) -> AnnotationResult<bool> {
        let numbers: HashSet<CanonicalNumber> = self
            .current_rows()
            .into_iter()
            .map(|(_, number)| number)
            .filter(|n| !n.is_empty())
            .collect();
        Ok(self.lookup.is_dirty(&numbers).await?)
    }

    /// Computes row patches for every number whose info changed.
    ///
    /// `mutations` may already hold inserts for rows added this cycle; those
    /// are first filled from history and then corrected with fresh info.
    /// On error `mutations` is left exactly as it was passed in.
    pub async fn fill(&self, mutations: &mut MutationSet) -> AnnotationResult<FillSummary> {
        // Never carry writes over from a cycle whose commit did not happen.
        *self.lock_pending()? = PendingHistory::default();

        let mut staged = mutations.clone();
        let summary = self.fill_staged(&mut staged).await?;
        *mutations = staged;
        Ok(summary)
    }

    async fn fill_staged(&self, mutations: &mut MutationSet) -> AnnotationResult<FillSummary> {
        let ids_by_number = self.ids_by_number(mutations);
        let normalized: HashMap<&CanonicalNumber, String> = ids_by_number
            .keys()
            .map(|n| (n, n.normalized()))
            .collect();
        let old_info = self.read_history(&normalized);

        let mut summary = FillSummary {
            numbers_examined: ids_by_number.len(),
            ..FillSummary::default()
        };

        // Inserts get the last known info before fresh info is requested, so a
        // new row shows something even if its number did not change.
        for (number, ids) in &ids_by_number {
            for id in ids {
                if let Some(patch) = mutations.insert_patch_mut(*id) {
                    patch.apply_lookup_info(&old_info[number]);
                    summary.inserts_prepopulated += 1;
                }
            }
        }

        let rows_to_delete = history_rows_to_delete(&ids_by_number, &normalized, mutations);
        summary.history_deletes = rows_to_delete.len();

        let new_info = self.lookup.bulk_update(&old_info).await?;
        if new_info.len() != old_info.len() {
            return Err(AnnotationError::internal(format!(
                "lookup returned {} entries for {} numbers",
                new_info.len(),
                old_info.len()
            )));
        }

        let mut rows_to_update: BTreeMap<RowId, &LookupInfo> = BTreeMap::new();
        let mut history_updates = HashMap::new();
        for (number, fresh) in &new_info {
            if old_info.get(number) == Some(fresh) {
                continue;
            }
            summary.numbers_changed += 1;
            if let Some(ids) = ids_by_number.get(number) {
                rows_to_update.extend(ids.iter().map(|id| (*id, fresh)));
            }
            if let Some(key) = normalized.get(number) {
                history_updates.insert(key.clone(), fresh.clone());
            }
        }

        for (id, info) in rows_to_update {
            if mutations.deletes().contains(&id) {
                continue;
            }
            mutations.amend_with_info(id, info);
            summary.rows_patched += 1;
        }

        {
            let mut pending = self.lock_pending()?;
            pending.rows_to_update = history_updates;
            pending.rows_to_delete = rows_to_delete;
        }

        tracing::debug!(
            numbers = summary.numbers_examined,
            changed = summary.numbers_changed,
            prepopulated = summary.inserts_prepopulated,
            patched = summary.rows_patched,
            history_deletes = summary.history_deletes,
            "fill complete"
        );
        Ok(summary)
    }

    /// Persists the history computed by the last `fill`.
    ///
    /// Call only after the mutations from that `fill` were committed.
    pub async fn on_successful_fill(&self) -> AnnotationResult<()> {
        let pending = std::mem::take(&mut *self.lock_pending()?);

        let updated = pending.rows_to_update.len();
        if updated > 0 {
            self.history
                .put_many(pending.rows_to_update.into_iter().collect(), Utc::now())?;
        }
        let deleted = if pending.rows_to_delete.is_empty() {
            0
        } else {
            self.history.delete_many(&pending.rows_to_delete)?
        };
        tracing::debug!(updated, deleted, "history written");

        self.lookup.on_successful_bulk_update().await?;
        Ok(())
    }

    /// Drops the lookup history and every provider's state.
    pub async fn clear_data(&self) -> AnnotationResult<()> {
        *self.lock_pending()? = PendingHistory::default();
        self.history.clear()?;
        self.lookup.clear_data().await?;
        tracing::info!("annotation data cleared");
        Ok(())
    }

    fn lock_pending(&self) -> AnnotationResult<std::sync::MutexGuard<'_, PendingHistory>> {
        self.pending
            .lock()
            .map_err(|_| AnnotationError::internal("pending history lock poisoned"))
    }

    /// Rows from the row source; a failed read is logged and treated as empty.
    fn current_rows(&self) -> Vec<(RowId, CanonicalNumber)> {
        match self.rows.rows() {
            Ok(rows) => rows.into_iter().map(|r| (r.row_id, r.number)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "call log rows unavailable, skipping");
                Vec::new()
            }
        }
    }

    /// Row ids per number, pending inserts included.
    fn ids_by_number(&self, mutations: &MutationSet) -> HashMap<CanonicalNumber, BTreeSet<RowId>> {
        let inserted = mutations
            .inserts()
            .iter()
            .filter_map(|(id, patch)| patch.number.clone().map(|n| (*id, n)));

        let mut ids_by_number: HashMap<CanonicalNumber, BTreeSet<RowId>> = HashMap::new();
        for (id, number) in inserted.chain(self.current_rows()) {
            if number.is_empty() {
                continue;
            }
            ids_by_number.entry(number).or_default().insert(id);
        }
        ids_by_number
    }

    /// Last known info for every number; missing history means empty info.
    fn read_history(
        &self,
        normalized: &HashMap<&CanonicalNumber, String>,
    ) -> HashMap<CanonicalNumber, LookupInfo> {
        let keys: HashSet<String> = normalized.values().cloned().collect();
        let stored = match self.history.get_many(&keys) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "lookup history unavailable, using empty info");
                HashMap::new()
            }
        };

        normalized
            .iter()
            .map(|(number, key)| {
                let info = stored.get(key).cloned().unwrap_or_default();
                ((*number).clone(), info)
            })
            .collect()
    }
}

/// Normalized numbers whose every row is being deleted this cycle.
fn history_rows_to_delete(
    ids_by_number: &HashMap<CanonicalNumber, BTreeSet<RowId>>,
    normalized: &HashMap<&CanonicalNumber, String>,
    mutations: &MutationSet,
) -> HashSet<String> {
    if mutations.deletes().is_empty() {
        return HashSet::new();
    }

    let mut ids_by_key: HashMap<&str, BTreeSet<RowId>> = HashMap::new();
    for (number, ids) in ids_by_number {
        if let Some(key) = normalized.get(number) {
            ids_by_key.entry(key.as_str()).or_default().extend(ids);
        }
    }
    ids_by_key
        .into_iter()
        .filter(|(_, ids)| ids.iter().all(|id| mutations.deletes().contains(id)))
        .map(|(key, _)| key.to_string())
        .collect()
}
