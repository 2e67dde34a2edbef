//! Provider answering from an in-process table.
//!
//! Serves sources whose data is pushed into the process rather than queried,
//! such as caller-ID results or network-supplied names. Records are keyed by
//! normalized number.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::info::{LookupInfo, SourceKind, SubRecord};
use crate::lookup::{lock_failed, LookupError, PhoneLookup};
use crate::number::CanonicalNumber;

#[derive(Debug, Default)]
struct Table {
    records: HashMap<String, SubRecord>,
    /// Normalized numbers changed since the last committed update, with the
    /// table version of their latest change.
    changed: HashMap<String, u64>,
    version: u64,
}

impl Table {
    fn mark_changed(&mut self, key: String) {
        self.version += 1;
        self.changed.insert(key, self.version);
    }
}

#[derive(Debug)]
pub struct TableLookup {
    kind: SourceKind,
    table: RwLock<Table>,
    /// Changes covered by the last `most_recent_info`, committed on success.
    /// A key is only cleared if it was not changed again in between.
    pending: Mutex<HashMap<String, u64>>,
}

impl TableLookup {
    #[must_use]
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            table: RwLock::new(Table::default()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the answer for `number`.
    pub fn set(&self, number: &CanonicalNumber, record: SubRecord) -> Result<(), LookupError> {
        if record.kind() != self.kind {
            return Err(LookupError::WrongSourceKind {
                source_name: self.kind.as_str().to_string(),
                expected: self.kind,
                actual: record.kind(),
            });
        }
        let key = number.normalized();
        let mut table = self
            .table
            .write()
            .map_err(|_| lock_failed(self.kind, "table.set"))?;
        if table.records.get(&key) != Some(&record) {
            table.records.insert(key.clone(), record);
            table.mark_changed(key);
        }
        Ok(())
    }

    /// Forgets the answer for `number`.
    pub fn remove(&self, number: &CanonicalNumber) -> Result<(), LookupError> {
        let key = number.normalized();
        let mut table = self
            .table
            .write()
            .map_err(|_| lock_failed(self.kind, "table.remove"))?;
        if table.records.remove(&key).is_some() {
            table.mark_changed(key);
        }
        Ok(())
    }
}

#[async_trait]
impl PhoneLookup for TableLookup {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn is_dirty(&self, numbers: &HashSet<CanonicalNumber>) -> Result<bool, LookupError> {
        let table = self
            .table
            .read()
            .map_err(|_| lock_failed(self.kind, "table.is_dirty"))?;
        Ok(numbers.iter().any(|n| table.changed.contains_key(&n.normalized())))
    }

    async fn most_recent_info(
        &self,
        existing: &HashMap<CanonicalNumber, LookupInfo>,
    ) -> Result<HashMap<CanonicalNumber, SubRecord>, LookupError> {
        let table = self
            .table
            .read()
            .map_err(|_| lock_failed(self.kind, "table.read"))?;
        let results = existing
            .keys()
            .map(|number| {
                let record = table
                    .records
                    .get(&number.normalized())
                    .cloned()
                    .unwrap_or_else(|| SubRecord::empty(self.kind));
                (number.clone(), record)
            })
            .collect();

        *self
            .pending
            .lock()
            .map_err(|_| lock_failed(self.kind, "table.pending"))? = table.changed.clone();
        Ok(results)
    }

    async fn on_successful_bulk_update(&self) -> Result<(), LookupError> {
        let pending = std::mem::take(
            &mut *self
                .pending
                .lock()
                .map_err(|_| lock_failed(self.kind, "table.pending"))?,
        );
        let mut table = self
            .table
            .write()
            .map_err(|_| lock_failed(self.kind, "table.commit"))?;
        table
            .changed
            .retain(|key, version| pending.get(key) != Some(version));
        Ok(())
    }

    async fn clear_data(&self) -> Result<(), LookupError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| lock_failed(self.kind, "table.clear"))?;
        let keys: Vec<String> = table.records.keys().cloned().collect();
        for key in keys {
            table.mark_changed(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{CallerIdInfo, CnapInfo};

    fn caller_id(name: &str) -> SubRecord {
        SubRecord::CallerId(CallerIdInfo {
            name: name.to_string(),
            ..CallerIdInfo::default()
        })
    }

    #[test]
    fn rejects_records_of_other_kinds() {
        let lookup = TableLookup::new(SourceKind::CallerId);
        let n = CanonicalNumber::parse("+14085550101", "US");
        assert!(lookup.set(&n, SubRecord::Cnap(CnapInfo::default())).is_err());
        assert!(lookup.set(&n, caller_id("Pizza")).is_ok());
    }

    #[tokio::test]
    async fn unknown_numbers_get_empty_records() {
        let lookup = TableLookup::new(SourceKind::CallerId);
        let known = CanonicalNumber::parse("+14085550101", "US");
        let unknown = CanonicalNumber::parse("+14085550102", "US");
        lookup.set(&known, caller_id("Pizza")).unwrap();

        let existing: HashMap<_, _> = [
            (known.clone(), LookupInfo::default()),
            (unknown.clone(), LookupInfo::default()),
        ]
        .into();
        let results = lookup.most_recent_info(&existing).await.unwrap();
        assert_eq!(results[&known], caller_id("Pizza"));
        assert_eq!(results[&unknown], SubRecord::empty(SourceKind::CallerId));
    }

    #[tokio::test]
    async fn changes_stay_dirty_until_committed() {
        let lookup = TableLookup::new(SourceKind::CallerId);
        let n = CanonicalNumber::parse("+14085550101", "US");
        let numbers: HashSet<_> = [n.clone()].into();
        let existing: HashMap<_, _> = [(n.clone(), LookupInfo::default())].into();

        assert!(!lookup.is_dirty(&numbers).await.unwrap());
        lookup.set(&n, caller_id("Pizza")).unwrap();
        assert!(lookup.is_dirty(&numbers).await.unwrap());

        lookup.most_recent_info(&existing).await.unwrap();
        assert!(lookup.is_dirty(&numbers).await.unwrap());
        lookup.on_successful_bulk_update().await.unwrap();
        assert!(!lookup.is_dirty(&numbers).await.unwrap());

        // Same value again is not a change.
        lookup.set(&n, caller_id("Pizza")).unwrap();
        assert!(!lookup.is_dirty(&numbers).await.unwrap());
    }

    #[tokio::test]
    async fn change_after_read_survives_commit() {
        let lookup = TableLookup::new(SourceKind::CallerId);
        let n = CanonicalNumber::parse("+14085550101", "US");
        let numbers: HashSet<_> = [n.clone()].into();
        let existing: HashMap<_, _> = [(n.clone(), LookupInfo::default())].into();

        lookup.set(&n, caller_id("Pizza")).unwrap();
        let seen = lookup.most_recent_info(&existing).await.unwrap();
        assert_eq!(seen[&n], caller_id("Pizza"));

        lookup.set(&n, caller_id("Pasta")).unwrap();
        lookup.on_successful_bulk_update().await.unwrap();
        assert!(lookup.is_dirty(&numbers).await.unwrap());

        // The next cycle delivers Pasta and clears it.
        let seen = lookup.most_recent_info(&existing).await.unwrap();
        assert_eq!(seen[&n], caller_id("Pasta"));
        lookup.on_successful_bulk_update().await.unwrap();
        assert!(!lookup.is_dirty(&numbers).await.unwrap());
    }
}
