//! Per-number lookup records.
//!
//! A [`LookupInfo`] holds at most one sub-record per source kind. For the
//! name-bearing kinds `None` means the source never answered, which is not the
//! same as an answer with no data. Spam, emergency and blocked-state records
//! are always present.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed, closed set of sources a lookup record aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The device's own contact directory.
    DefaultDirectory,
    /// Enterprise or other secondary directories.
    ExtendedDirectory,
    /// Remote people directory.
    RemotePerson,
    /// Third-party caller-ID provider.
    CallerId,
    /// Network-supplied caller name.
    Cnap,
    /// Entries migrated from the legacy cache.
    Migrated,
    /// Spam classification.
    Spam,
    /// Emergency number detection.
    Emergency,
    /// System-level blocked numbers.
    SystemBlocked,
}

impl SourceKind {
    /// Every source kind.
    pub const ALL: [Self; 9] = [
        Self::DefaultDirectory,
        Self::ExtendedDirectory,
        Self::RemotePerson,
        Self::CallerId,
        Self::Cnap,
        Self::Migrated,
        Self::Spam,
        Self::Emergency,
        Self::SystemBlocked,
    ];

    /// Stable lowercase name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DefaultDirectory => "default_directory",
            Self::ExtendedDirectory => "extended_directory",
            Self::RemotePerson => "remote_person",
            Self::CallerId => "caller_id",
            Self::Cnap => "cnap",
            Self::Migrated => "migrated",
            Self::Spam => "spam",
            Self::Emergency => "emergency",
            Self::SystemBlocked => "system_blocked",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the displayed information came from, as recorded on a call-log row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSourceType {
    #[default]
    Unknown,
    Directory,
    ExtendedDirectory,
    /// Remote person that is a known contact profile.
    Profile,
    /// Remote person that is a business listing.
    Places,
    RemoteOther,
    CallerId,
    Cnap,
}

/// A single contact matching a number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    pub contact_id: i64,
    pub name: String,
    pub photo_thumbnail_uri: String,
    pub photo_uri: String,
    pub photo_id: i64,
    pub lookup_uri: String,
    /// Label of the matching phone entry, e.g. "Mobile".
    pub label: String,
    pub can_support_carrier_video_call: bool,
}

/// Directory answer for one number. `contacts` is ordered best match first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryInfo {
    pub contacts: Vec<ContactInfo>,
    /// Set when the directory skipped this number and the answer may be missing contacts.
    pub is_incomplete: bool,
}

impl DirectoryInfo {
    /// The best matching contact, if any.
    #[must_use]
    pub fn first_contact(&self) -> Option<&ContactInfo> {
        self.contacts.first()
    }
}

/// Kind of record a remote people directory returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteInfoType {
    #[default]
    Unknown,
    Contact,
    NearbyBusiness,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePersonInfo {
    pub display_name: String,
    /// Kept for history; not shown on the row.
    pub photo_uri: String,
    pub lookup_uri: String,
    pub person_id: String,
    pub info_type: RemoteInfoType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerIdInfo {
    pub name: String,
    pub photo_uri: String,
    pub geolocation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CnapInfo {
    pub name: String,
}

/// Snapshot carried over from the legacy annotation cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratedInfo {
    pub name: String,
    pub photo_uri: String,
    pub photo_thumbnail_uri: String,
    pub label: String,
    pub is_business: bool,
    pub source_type: ContactSourceType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamInfo {
    pub is_spam: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyInfo {
    pub is_emergency_number: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedState {
    Blocked,
    NotBlocked,
}

/// System blocked-number state. `None` means the system has no opinion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemBlockedInfo {
    pub blocked_state: Option<BlockedState>,
}

/// Everything known about one number, one slot per source kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupInfo {
    pub default_directory: Option<DirectoryInfo>,
    pub extended_directory: Option<DirectoryInfo>,
    pub remote_person: Option<RemotePersonInfo>,
    pub caller_id: Option<CallerIdInfo>,
    pub cnap: Option<CnapInfo>,
    pub migrated: Option<MigratedInfo>,
    pub spam: SpamInfo,
    pub emergency: EmergencyInfo,
    pub system_blocked: SystemBlockedInfo,
}

/// One provider's answer for one number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum SubRecord {
    DefaultDirectory(DirectoryInfo),
    ExtendedDirectory(DirectoryInfo),
    RemotePerson(RemotePersonInfo),
    CallerId(CallerIdInfo),
    Cnap(CnapInfo),
    Migrated(MigratedInfo),
    Spam(SpamInfo),
    Emergency(EmergencyInfo),
    SystemBlocked(SystemBlockedInfo),
}

impl SubRecord {
    /// An answer carrying no data for `kind`.
    #[must_use]
    pub fn empty(kind: SourceKind) -> Self {
        match kind {
            SourceKind::DefaultDirectory => Self::DefaultDirectory(DirectoryInfo::default()),
            SourceKind::ExtendedDirectory => Self::ExtendedDirectory(DirectoryInfo::default()),
            SourceKind::RemotePerson => Self::RemotePerson(RemotePersonInfo::default()),
            SourceKind::CallerId => Self::CallerId(CallerIdInfo::default()),
            SourceKind::Cnap => Self::Cnap(CnapInfo::default()),
            SourceKind::Migrated => Self::Migrated(MigratedInfo::default()),
            SourceKind::Spam => Self::Spam(SpamInfo::default()),
            SourceKind::Emergency => Self::Emergency(EmergencyInfo::default()),
            SourceKind::SystemBlocked => Self::SystemBlocked(SystemBlockedInfo::default()),
        }
    }

    /// The source kind this record belongs to.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::DefaultDirectory(_) => SourceKind::DefaultDirectory,
            Self::ExtendedDirectory(_) => SourceKind::ExtendedDirectory,
            Self::RemotePerson(_) => SourceKind::RemotePerson,
            Self::CallerId(_) => SourceKind::CallerId,
            Self::Cnap(_) => SourceKind::Cnap,
            Self::Migrated(_) => SourceKind::Migrated,
            Self::Spam(_) => SourceKind::Spam,
            Self::Emergency(_) => SourceKind::Emergency,
            Self::SystemBlocked(_) => SourceKind::SystemBlocked,
        }
    }
}

impl LookupInfo {
    /// Stores `record` in its slot, replacing whatever was there.
    pub fn set(&mut self, record: SubRecord) {
        match record {
            SubRecord::DefaultDirectory(r) => self.default_directory = Some(r),
            SubRecord::ExtendedDirectory(r) => self.extended_directory = Some(r),
            SubRecord::RemotePerson(r) => self.remote_person = Some(r),
            SubRecord::CallerId(r) => self.caller_id = Some(r),
            SubRecord::Cnap(r) => self.cnap = Some(r),
            SubRecord::Migrated(r) => self.migrated = Some(r),
            SubRecord::Spam(r) => self.spam = r,
            SubRecord::Emergency(r) => self.emergency = r,
            SubRecord::SystemBlocked(r) => self.system_blocked = r,
        }
    }

    /// Returns the record for `kind`, or `None` if that slot is absent.
    ///
    /// Always-present kinds always return `Some`.
    #[must_use]
    pub fn sub_record(&self, kind: SourceKind) -> Option<SubRecord> {
        match kind {
            SourceKind::DefaultDirectory => {
                self.default_directory.clone().map(SubRecord::DefaultDirectory)
            }
            SourceKind::ExtendedDirectory => {
                self.extended_directory.clone().map(SubRecord::ExtendedDirectory)
            }
            SourceKind::RemotePerson => self.remote_person.clone().map(SubRecord::RemotePerson),
            SourceKind::CallerId => self.caller_id.clone().map(SubRecord::CallerId),
            SourceKind::Cnap => self.cnap.clone().map(SubRecord::Cnap),
            SourceKind::Migrated => self.migrated.clone().map(SubRecord::Migrated),
            SourceKind::Spam => Some(SubRecord::Spam(self.spam)),
            SourceKind::Emergency => Some(SubRecord::Emergency(self.emergency)),
            SourceKind::SystemBlocked => Some(SubRecord::SystemBlocked(self.system_blocked)),
        }
    }

    /// Builds a record from a single sub-record.
    #[must_use]
    pub fn with(record: SubRecord) -> Self {
        let mut info = Self::default();
        info.set(record);
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_differs_from_empty() {
        let absent = LookupInfo::default();
        let empty = LookupInfo::with(SubRecord::DefaultDirectory(DirectoryInfo::default()));
        assert_ne!(absent, empty);
        assert!(absent.sub_record(SourceKind::DefaultDirectory).is_none());
        assert!(empty.sub_record(SourceKind::DefaultDirectory).is_some());
    }

    #[test]
    fn always_present_kinds_have_records() {
        let info = LookupInfo::default();
        for kind in [SourceKind::Spam, SourceKind::Emergency, SourceKind::SystemBlocked] {
            assert_eq!(info.sub_record(kind).map(|r| r.kind()), Some(kind));
        }
    }

    #[test]
    fn set_then_read_back() {
        let mut info = LookupInfo::default();
        for record in [
            SubRecord::Cnap(CnapInfo { name: "ACME".into() }),
            SubRecord::Spam(SpamInfo { is_spam: true }),
        ] {
            let kind = record.kind();
            info.set(record.clone());
            assert_eq!(info.sub_record(kind), Some(record));
        }
    }

    #[test]
    fn serializes_sparse_json() {
        let info = LookupInfo::with(SubRecord::CallerId(CallerIdInfo {
            name: "Pizza".into(),
            ..CallerIdInfo::default()
        }));
        let json = serde_json::to_string(&info).unwrap();
        let parsed: LookupInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, info);

        let minimal: LookupInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(minimal, LookupInfo::default());
    }

    #[test]
    fn source_kind_names_are_unique() {
        let names: std::collections::HashSet<_> =
            SourceKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), SourceKind::ALL.len());
    }
}
