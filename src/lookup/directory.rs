//! Contact directory lookups.
//!
//! Valid numbers are queried in one batch keyed by E164. Invalid numbers
//! need one query each, so only a bounded number of them is looked up per
//! cycle; the rest come back empty and flagged incomplete.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::info::{ContactInfo, DirectoryInfo, LookupInfo, SourceKind, SubRecord};
use crate::lookup::{lock_failed, LookupError, PhoneLookup};
use crate::number::{exact_match, CanonicalNumber};
use crate::partition::PartitionedNumbers;

/// A phone entry on a directory contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryPhone {
    pub number: CanonicalNumber,
    #[serde(default)]
    pub label: String,
}

/// A contact as stored in a [`ContactDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryContact {
    pub contact_id: i64,
    pub name: String,
    pub phones: Vec<DirectoryPhone>,
    #[serde(default)]
    pub photo_uri: String,
    #[serde(default)]
    pub photo_thumbnail_uri: String,
    #[serde(default)]
    pub photo_id: i64,
    #[serde(default)]
    pub lookup_uri: String,
    #[serde(default)]
    pub can_support_carrier_video_call: bool,
}

impl DirectoryContact {
    fn info_for(&self, phone: &DirectoryPhone) -> ContactInfo {
        ContactInfo {
            contact_id: self.contact_id,
            name: self.name.clone(),
            photo_thumbnail_uri: self.photo_thumbnail_uri.clone(),
            photo_uri: self.photo_uri.clone(),
            photo_id: self.photo_id,
            lookup_uri: self.lookup_uri.clone(),
            label: phone.label.clone(),
            can_support_carrier_video_call: self.can_support_carrier_video_call,
        }
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    contacts: BTreeMap<i64, (DirectoryContact, DateTime<Utc>)>,
    deletions: Vec<(i64, DateTime<Utc>)>,
}

/// In-process contact directory with change tracking.
#[derive(Debug, Default)]
pub struct ContactDirectory {
    state: RwLock<DirectoryState>,
}

fn batch_key(number: &CanonicalNumber) -> Option<&str> {
    if number.is_valid() && number.post_dial_portion().is_empty() {
        number.parsed_e164()
    } else {
        None
    }
}

impl ContactDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
        source: SourceKind,
    ) -> Result<std::sync::RwLockReadGuard<'_, DirectoryState>, LookupError> {
        self.state.read().map_err(|_| lock_failed(source, "directory.read"))
    }

    fn write(
        &self,
        source: SourceKind,
    ) -> Result<std::sync::RwLockWriteGuard<'_, DirectoryState>, LookupError> {
        self.state.write().map_err(|_| lock_failed(source, "directory.write"))
    }

    /// Adds or replaces a contact, stamping it as changed at `at`.
    pub fn upsert_at(
        &self,
        contact: DirectoryContact,
        at: DateTime<Utc>,
    ) -> Result<(), LookupError> {
        let mut state = self.write(SourceKind::DefaultDirectory)?;
        state.contacts.insert(contact.contact_id, (contact, at));
        Ok(())
    }

    /// Adds or replaces a contact, changed now.
    pub fn upsert(&self, contact: DirectoryContact) -> Result<(), LookupError> {
        self.upsert_at(contact, Utc::now())
    }

    /// Removes a contact. Returns false if it did not exist.
    pub fn delete(&self, contact_id: i64) -> Result<bool, LookupError> {
        let mut state = self.write(SourceKind::DefaultDirectory)?;
        let existed = state.contacts.remove(&contact_id).is_some();
        if existed {
            state.deletions.push((contact_id, Utc::now()));
        }
        Ok(existed)
    }

    pub fn len(&self) -> Result<usize, LookupError> {
        Ok(self.read(SourceKind::DefaultDirectory)?.contacts.len())
    }

    pub fn is_empty(&self) -> Result<bool, LookupError> {
        Ok(self.len()? == 0)
    }

    /// Contacts for each E164 key, in one pass.
    fn contacts_for_e164(
        &self,
        source: SourceKind,
        keys: &HashSet<&str>,
    ) -> Result<HashMap<String, Vec<ContactInfo>>, LookupError> {
        let state = self.read(source)?;
        let mut found: HashMap<String, Vec<ContactInfo>> = HashMap::new();
        for (contact, _) in state.contacts.values() {
            for phone in &contact.phones {
                if let Some(key) = batch_key(&phone.number).filter(|k| keys.contains(k)) {
                    found
                        .entry(key.to_string())
                        .or_default()
                        .push(contact.info_for(phone));
                }
            }
        }
        Ok(found)
    }

    /// Contacts matching a single number.
    fn contacts_matching(
        &self,
        source: SourceKind,
        number: &CanonicalNumber,
    ) -> Result<Vec<ContactInfo>, LookupError> {
        let state = self.read(source)?;
        Ok(state
            .contacts
            .values()
            .flat_map(|(contact, _)| {
                contact
                    .phones
                    .iter()
                    .filter(move |phone| {
                        exact_match(&phone.number, number)
                            || phone.number.normalized() == number.normalized()
                    })
                    .map(move |phone| contact.info_for(phone))
            })
            .collect())
    }

    fn deleted_since(&self, source: SourceKind, since: DateTime<Utc>) -> Result<bool, LookupError> {
        Ok(self.read(source)?.deletions.iter().any(|(_, at)| *at > since))
    }

    fn updated_since(
        &self,
        source: SourceKind,
        since: DateTime<Utc>,
        partitioned: &PartitionedNumbers,
    ) -> Result<bool, LookupError> {
        let keys: HashSet<&str> = partitioned.valid_e164_numbers().collect();
        let state = self.read(source)?;
        Ok(state
            .contacts
            .values()
            .filter(|(_, changed)| *changed > since)
            .flat_map(|(contact, _)| contact.phones.iter())
            .any(|phone| match batch_key(&phone.number) {
                Some(key) if keys.contains(key) => true,
                _ => partitioned
                    .invalid_entries()
                    .flat_map(|(_, numbers)| numbers.iter())
                    .any(|n| exact_match(&phone.number, n)),
            }))
    }
}

/// Directory-backed provider for the default or extended directory slot.
#[derive(Debug)]
pub struct DirectoryLookup {
    kind: SourceKind,
    directory: Arc<ContactDirectory>,
    max_supported_invalid_numbers: usize,
    last_processed: Mutex<Option<DateTime<Utc>>>,
    pending_processed: Mutex<Option<DateTime<Utc>>>,
}

impl DirectoryLookup {
    /// Default invalid-number budget.
    pub const DEFAULT_MAX_SUPPORTED_INVALID_NUMBERS: usize = 5;

    /// Provider for the default directory slot.
    #[must_use]
    pub fn default_directory(
        directory: Arc<ContactDirectory>,
        max_supported_invalid_numbers: usize,
    ) -> Self {
        Self::new(SourceKind::DefaultDirectory, directory, max_supported_invalid_numbers)
    }

    /// Provider for the extended directory slot.
    #[must_use]
    pub fn extended_directory(
        directory: Arc<ContactDirectory>,
        max_supported_invalid_numbers: usize,
    ) -> Self {
        Self::new(SourceKind::ExtendedDirectory, directory, max_supported_invalid_numbers)
    }

    fn new(
        kind: SourceKind,
        directory: Arc<ContactDirectory>,
        max_supported_invalid_numbers: usize,
    ) -> Self {
        Self {
            kind,
            directory,
            max_supported_invalid_numbers,
            last_processed: Mutex::new(None),
            pending_processed: Mutex::new(None),
        }
    }

    /// Time of the last committed bulk update, if any.
    pub fn last_processed(&self) -> Result<Option<DateTime<Utc>>, LookupError> {
        self.last_processed
            .lock()
            .map(|g| *g)
            .map_err(|_| lock_failed(self.kind, "directory.last_processed"))
    }

    fn wrap(&self, info: DirectoryInfo) -> SubRecord {
        match self.kind {
            SourceKind::ExtendedDirectory => SubRecord::ExtendedDirectory(info),
            _ => SubRecord::DefaultDirectory(info),
        }
    }
}

#[async_trait]
impl PhoneLookup for DirectoryLookup {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn is_dirty(&self, numbers: &HashSet<CanonicalNumber>) -> Result<bool, LookupError> {
        let partitioned = PartitionedNumbers::new(numbers);
        if partitioned.invalid_count() > self.max_supported_invalid_numbers {
            // Too many single-number queries to check cheaply.
            return Ok(true);
        }

        let since = self.last_processed()?.unwrap_or(DateTime::<Utc>::MIN_UTC);
        if self.directory.deleted_since(self.kind, since)? {
            return Ok(true);
        }
        self.directory.updated_since(self.kind, since, &partitioned)
    }

    async fn most_recent_info(
        &self,
        existing: &HashMap<CanonicalNumber, LookupInfo>,
    ) -> Result<HashMap<CanonicalNumber, SubRecord>, LookupError> {
        let started = Utc::now();
        let partitioned = PartitionedNumbers::new(existing.keys());
        let mut results = HashMap::with_capacity(existing.len());

        let keys: HashSet<&str> = partitioned.valid_e164_numbers().collect();
        let mut by_e164 = self.directory.contacts_for_e164(self.kind, &keys)?;
        for (key, numbers) in partitioned.valid_e164_entries() {
            let contacts = by_e164.remove(key).unwrap_or_default();
            for number in numbers {
                results.insert(
                    number.clone(),
                    self.wrap(DirectoryInfo {
                        contacts: contacts.clone(),
                        is_incomplete: false,
                    }),
                );
            }
        }

        let skip_invalid = partitioned.invalid_count() > self.max_supported_invalid_numbers;
        if skip_invalid {
            tracing::debug!(
                source = %self.kind,
                invalid = partitioned.invalid_count(),
                max = self.max_supported_invalid_numbers,
                "too many invalid numbers, marking them incomplete"
            );
        }
        for (_, numbers) in partitioned.invalid_entries() {
            for number in numbers {
                let info = if skip_invalid {
                    DirectoryInfo {
                        contacts: Vec::new(),
                        is_incomplete: true,
                    }
                } else {
                    DirectoryInfo {
                        contacts: self.directory.contacts_matching(self.kind, number)?,
                        is_incomplete: false,
                    }
                };
                results.insert(number.clone(), self.wrap(info));
            }
        }

        *self
            .pending_processed
            .lock()
            .map_err(|_| lock_failed(self.kind, "directory.pending"))? = Some(started);
        Ok(results)
    }

    async fn on_successful_bulk_update(&self) -> Result<(), LookupError> {
        let pending = self
            .pending_processed
            .lock()
            .map_err(|_| lock_failed(self.kind, "directory.pending"))?
            .take();
        if let Some(at) = pending {
            *self
                .last_processed
                .lock()
                .map_err(|_| lock_failed(self.kind, "directory.last_processed"))? = Some(at);
        }
        Ok(())
    }

    async fn clear_data(&self) -> Result<(), LookupError> {
        *self
            .last_processed
            .lock()
            .map_err(|_| lock_failed(self.kind, "directory.last_processed"))? = None;
        Ok(())
    }
}
