//! Pending call-log row mutations produced by one refresh cycle.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::consolidator::{Consolidator, DisplayFields};
use crate::info::LookupInfo;
use crate::number::CanonicalNumber;

/// Call-log row identifier.
pub type RowId = i64;

/// Column values to write to one call-log row.
///
/// `None` leaves the column untouched when the patch is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPatch {
    pub number: Option<CanonicalNumber>,
    pub attributes: Option<DisplayFields>,
}

impl FieldPatch {
    /// Patch for a new row that only carries its number.
    #[must_use]
    pub fn for_number(number: CanonicalNumber) -> Self {
        Self {
            number: Some(number),
            attributes: None,
        }
    }

    /// Overwrites the display attributes with the ones derived from `info`.
    pub fn apply_lookup_info(&mut self, info: &LookupInfo) {
        self.attributes = Some(Consolidator::new(info).display_fields());
    }

    /// Displayed name carried by this patch, if it sets attributes.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attributes.as_ref().map(|a| a.name.as_str())
    }
}

/// Where an amended patch ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    Insert,
    Update,
    NewUpdate,
}

/// Inserts, updates and deletes for one cycle.
///
/// A row id is never in both `inserts` and `updates`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationSet {
    inserts: BTreeMap<RowId, FieldPatch>,
    updates: BTreeMap<RowId, FieldPatch>,
    deletes: BTreeSet<RowId>,
}

impl MutationSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn inserts(&self) -> &BTreeMap<RowId, FieldPatch> {
        &self.inserts
    }

    #[must_use]
    pub const fn updates(&self) -> &BTreeMap<RowId, FieldPatch> {
        &self.updates
    }

    #[must_use]
    pub const fn deletes(&self) -> &BTreeSet<RowId> {
        &self.deletes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Schedules a new row. Any pending update for the same id is folded in.
    pub fn insert(&mut self, row_id: RowId, mut patch: FieldPatch) {
        if let Some(pending) = self.updates.remove(&row_id) {
            merge_into(&mut patch, pending);
        }
        self.deletes.remove(&row_id);
        self.inserts.insert(row_id, patch);
    }

    /// Schedules an update. Lands in the insert patch if the row is new this cycle.
    pub fn update(&mut self, row_id: RowId, patch: FieldPatch) {
        if let Some(pending) = self.inserts.get_mut(&row_id) {
            merge_into(pending, patch);
            return;
        }
        match self.updates.get_mut(&row_id) {
            Some(pending) => merge_into(pending, patch),
            None => {
                self.updates.insert(row_id, patch);
            }
        }
    }

    /// Schedules a delete, dropping any pending insert or update for the row.
    pub fn delete(&mut self, row_id: RowId) {
        self.inserts.remove(&row_id);
        self.updates.remove(&row_id);
        self.deletes.insert(row_id);
    }

    /// Mutable access to the pending insert patch for `row_id`.
    pub fn insert_patch_mut(&mut self, row_id: RowId) -> Option<&mut FieldPatch> {
        self.inserts.get_mut(&row_id)
    }

    /// Writes the display fields for `info` to `row_id`.
    ///
    /// Amends a pending insert first, then a pending update, and only
    /// otherwise creates a new update.
    pub fn amend_with_info(&mut self, row_id: RowId, info: &LookupInfo) -> PatchTarget {
        if let Some(patch) = self.inserts.get_mut(&row_id) {
            patch.apply_lookup_info(info);
            return PatchTarget::Insert;
        }
        if let Some(patch) = self.updates.get_mut(&row_id) {
            patch.apply_lookup_info(info);
            return PatchTarget::Update;
        }
        let mut patch = FieldPatch::default();
        patch.apply_lookup_info(info);
        self.updates.insert(row_id, patch);
        PatchTarget::NewUpdate
    }
}

fn merge_into(target: &mut FieldPatch, newer: FieldPatch) {
    if newer.number.is_some() {
        target.number = newer.number;
    }
    if newer.attributes.is_some() {
        target.attributes = newer.attributes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{CnapInfo, SubRecord};

    fn named(name: &str) -> LookupInfo {
        LookupInfo::with(SubRecord::Cnap(CnapInfo { name: name.into() }))
    }

    #[test]
    fn update_of_new_row_merges_into_insert() {
        let number = CanonicalNumber::parse("+14085550101", "US");
        let mut set = MutationSet::new();
        set.insert(1, FieldPatch::for_number(number.clone()));

        let mut patch = FieldPatch::default();
        patch.apply_lookup_info(&named("Robert"));
        set.update(1, patch);

        assert!(set.updates().is_empty());
        let insert = &set.inserts()[&1];
        assert_eq!(insert.number.as_ref(), Some(&number));
        assert_eq!(insert.name(), Some("Robert"));
    }

    #[test]
    fn insert_absorbs_pending_update() {
        let mut set = MutationSet::new();
        set.amend_with_info(2, &named("Bob"));
        set.insert(2, FieldPatch::for_number(CanonicalNumber::parse("123", "")));

        assert!(set.updates().is_empty());
        assert_eq!(set.inserts()[&2].name(), Some("Bob"));
    }

    #[test]
    fn amend_priority() {
        let mut set = MutationSet::new();
        set.insert(1, FieldPatch::default());
        set.update(2, FieldPatch::default());

        assert_eq!(set.amend_with_info(1, &named("A")), PatchTarget::Insert);
        assert_eq!(set.amend_with_info(2, &named("B")), PatchTarget::Update);
        assert_eq!(set.amend_with_info(3, &named("C")), PatchTarget::NewUpdate);
        assert_eq!(set.inserts().len(), 1);
        assert_eq!(set.updates().len(), 2);
    }

    #[test]
    fn delete_clears_pending_patches() {
        let mut set = MutationSet::new();
        set.insert(1, FieldPatch::default());
        set.update(2, FieldPatch::default());
        set.delete(1);
        set.delete(2);

        assert!(set.inserts().is_empty());
        assert!(set.updates().is_empty());
        assert_eq!(set.deletes().len(), 2);
        assert!(!set.is_empty());
    }
}
