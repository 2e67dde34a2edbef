//! Turns a [`LookupInfo`] into display fields.
//!
//! Exactly one name-bearing source wins, chosen by walking
//! [`NAME_SOURCES_IN_PRIORITY_ORDER`]. Every display field is then read from
//! that source alone. A field the winner cannot supply comes back empty and
//! is never filled in from a lower-priority source, so a row never shows one
//! source's name next to another source's photo.

use serde::{Deserialize, Serialize};

use crate::info::{
    BlockedState, ContactInfo, ContactSourceType, LookupInfo, RemoteInfoType, SourceKind,
};

/// Source kinds that can supply a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    DefaultDirectory,
    ExtendedDirectory,
    RemotePerson,
    CallerId,
    Cnap,
    Migrated,
}

impl NameSource {
    const fn ordinal(self) -> u32 {
        match self {
            Self::DefaultDirectory => 0,
            Self::ExtendedDirectory => 1,
            Self::RemotePerson => 2,
            Self::CallerId => 3,
            Self::Cnap => 4,
            Self::Migrated => 5,
        }
    }

    const VARIANT_COUNT: u32 = Self::Migrated.ordinal() + 1;

    /// The lookup slot this name source reads from.
    #[must_use]
    pub const fn source_kind(self) -> SourceKind {
        match self {
            Self::DefaultDirectory => SourceKind::DefaultDirectory,
            Self::ExtendedDirectory => SourceKind::ExtendedDirectory,
            Self::RemotePerson => SourceKind::RemotePerson,
            Self::CallerId => SourceKind::CallerId,
            Self::Cnap => SourceKind::Cnap,
            Self::Migrated => SourceKind::Migrated,
        }
    }
}

/// Highest priority first.
pub const NAME_SOURCES_IN_PRIORITY_ORDER: [NameSource; 6] = [
    NameSource::DefaultDirectory,
    NameSource::ExtendedDirectory,
    NameSource::RemotePerson,
    NameSource::CallerId,
    NameSource::Cnap,
    NameSource::Migrated,
];

const fn lists_every_name_source_once(order: &[NameSource]) -> bool {
    if order.len() != NameSource::VARIANT_COUNT as usize {
        return false;
    }
    let mut seen = 0u32;
    let mut i = 0;
    while i < order.len() {
        let bit = 1u32 << order[i].ordinal();
        if seen & bit != 0 {
            return false;
        }
        seen |= bit;
        i += 1;
    }
    seen == (1u32 << NameSource::VARIANT_COUNT) - 1
}

const _: () = assert!(
    lists_every_name_source_once(&NAME_SOURCES_IN_PRIORITY_ORDER),
    "name source priority list must contain every name source exactly once"
);

/// Everything a call-log row displays for its number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayFields {
    pub name: String,
    pub photo_uri: String,
    pub photo_thumbnail_uri: String,
    pub photo_id: i64,
    pub lookup_uri: String,
    pub number_label: String,
    pub geolocation: String,
    pub is_business: bool,
    pub can_report_as_invalid_number: bool,
    pub can_support_carrier_video_call: bool,
    pub contact_source: ContactSourceType,
    pub is_blocked: bool,
    pub is_spam: bool,
    pub is_emergency_number: bool,
    pub is_default_directory_incomplete: bool,
}

/// Read-only view over one number's [`LookupInfo`] with the winning source resolved.
#[derive(Debug, Clone, Copy)]
pub struct Consolidator<'a> {
    info: &'a LookupInfo,
    name_source: Option<NameSource>,
}

impl<'a> Consolidator<'a> {
    /// Resolves the winning name source for `info`.
    #[must_use]
    pub fn new(info: &'a LookupInfo) -> Self {
        let name_source = NAME_SOURCES_IN_PRIORITY_ORDER
            .into_iter()
            .find(|source| name_from(info, *source).is_some_and(|name| !name.is_empty()));
        Self { info, name_source }
    }

    /// The winning source, or `None` if no source has a name.
    #[must_use]
    pub const fn name_source(&self) -> Option<NameSource> {
        self.name_source
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name_source
            .and_then(|source| name_from(self.info, source))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn photo_thumbnail_uri(&self) -> &'a str {
        match self.name_source {
            Some(NameSource::DefaultDirectory | NameSource::ExtendedDirectory) => {
                self.contact().map_or("", |c| c.photo_thumbnail_uri.as_str())
            }
            Some(NameSource::Migrated) => self
                .info
                .migrated
                .as_ref()
                .map_or("", |m| m.photo_thumbnail_uri.as_str()),
            _ => "",
        }
    }

    /// Remote people results never supply the displayed photo.
    #[must_use]
    pub fn photo_uri(&self) -> &'a str {
        match self.name_source {
            Some(NameSource::DefaultDirectory | NameSource::ExtendedDirectory) => {
                self.contact().map_or("", |c| c.photo_uri.as_str())
            }
            Some(NameSource::CallerId) => self
                .info
                .caller_id
                .as_ref()
                .map_or("", |c| c.photo_uri.as_str()),
            Some(NameSource::Migrated) => {
                self.info.migrated.as_ref().map_or("", |m| m.photo_uri.as_str())
            }
            _ => "",
        }
    }

    /// Photo row id, only from directory sources. Never negative.
    #[must_use]
    pub fn photo_id(&self) -> i64 {
        match self.name_source {
            Some(NameSource::DefaultDirectory | NameSource::ExtendedDirectory) => {
                self.contact().map_or(0, |c| c.photo_id.max(0))
            }
            _ => 0,
        }
    }

    #[must_use]
    pub fn lookup_uri(&self) -> &'a str {
        match self.name_source {
            Some(NameSource::DefaultDirectory | NameSource::ExtendedDirectory) => {
                self.contact().map_or("", |c| c.lookup_uri.as_str())
            }
            Some(NameSource::RemotePerson) => self
                .info
                .remote_person
                .as_ref()
                .map_or("", |p| p.lookup_uri.as_str()),
            _ => "",
        }
    }

    #[must_use]
    pub fn number_label(&self) -> &'a str {
        match self.name_source {
            Some(NameSource::DefaultDirectory | NameSource::ExtendedDirectory) => {
                self.contact().map_or("", |c| c.label.as_str())
            }
            Some(NameSource::Migrated) => {
                self.info.migrated.as_ref().map_or("", |m| m.label.as_str())
            }
            _ => "",
        }
    }

    #[must_use]
    pub fn geolocation(&self) -> &'a str {
        match self.name_source {
            Some(NameSource::CallerId) => self
                .info
                .caller_id
                .as_ref()
                .map_or("", |c| c.geolocation.as_str()),
            _ => "",
        }
    }

    #[must_use]
    pub fn is_business(&self) -> bool {
        match self.name_source {
            Some(NameSource::RemotePerson) => self
                .info
                .remote_person
                .as_ref()
                .is_some_and(|p| p.info_type == RemoteInfoType::NearbyBusiness),
            Some(NameSource::Migrated) => {
                self.info.migrated.as_ref().is_some_and(|m| m.is_business)
            }
            _ => false,
        }
    }

    /// True when the winning remote record can be flagged as a wrong number.
    #[must_use]
    pub fn can_report_as_invalid_number(&self) -> bool {
        match self.name_source {
            Some(NameSource::RemotePerson) => self.info.remote_person.as_ref().is_some_and(|p| {
                p.info_type != RemoteInfoType::Unknown && !p.person_id.is_empty()
            }),
            _ => false,
        }
    }

    #[must_use]
    pub fn can_support_carrier_video_call(&self) -> bool {
        match self.name_source {
            Some(NameSource::DefaultDirectory) => {
                self.contact().is_some_and(|c| c.can_support_carrier_video_call)
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn contact_source(&self) -> ContactSourceType {
        match self.name_source {
            None => ContactSourceType::Unknown,
            Some(NameSource::DefaultDirectory) => ContactSourceType::Directory,
            Some(NameSource::ExtendedDirectory) => ContactSourceType::ExtendedDirectory,
            Some(NameSource::RemotePerson) => {
                match self.info.remote_person.as_ref().map(|p| p.info_type) {
                    Some(RemoteInfoType::Contact) => ContactSourceType::Profile,
                    Some(RemoteInfoType::NearbyBusiness) => ContactSourceType::Places,
                    _ => ContactSourceType::RemoteOther,
                }
            }
            Some(NameSource::CallerId) => ContactSourceType::CallerId,
            Some(NameSource::Cnap) => ContactSourceType::Cnap,
            Some(NameSource::Migrated) => self
                .info
                .migrated
                .as_ref()
                .map_or(ContactSourceType::Unknown, |m| m.source_type),
        }
    }

    /// Blocked only when the system blocked-state record says so.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.info.system_blocked.blocked_state == Some(BlockedState::Blocked)
    }

    #[must_use]
    pub fn is_spam(&self) -> bool {
        self.info.spam.is_spam
    }

    #[must_use]
    pub fn is_emergency_number(&self) -> bool {
        self.info.emergency.is_emergency_number
    }

    #[must_use]
    pub fn is_default_directory_incomplete(&self) -> bool {
        self.info
            .default_directory
            .as_ref()
            .is_some_and(|d| d.is_incomplete)
    }

    /// Snapshot of every display field.
    #[must_use]
    pub fn display_fields(&self) -> DisplayFields {
        DisplayFields {
            name: self.name().to_string(),
            photo_uri: self.photo_uri().to_string(),
            photo_thumbnail_uri: self.photo_thumbnail_uri().to_string(),
            photo_id: self.photo_id(),
            lookup_uri: self.lookup_uri().to_string(),
            number_label: self.number_label().to_string(),
            geolocation: self.geolocation().to_string(),
            is_business: self.is_business(),
            can_report_as_invalid_number: self.can_report_as_invalid_number(),
            can_support_carrier_video_call: self.can_support_carrier_video_call(),
            contact_source: self.contact_source(),
            is_blocked: self.is_blocked(),
            is_spam: self.is_spam(),
            is_emergency_number: self.is_emergency_number(),
            is_default_directory_incomplete: self.is_default_directory_incomplete(),
        }
    }

    /// First contact of the winning directory source.
    fn contact(&self) -> Option<&'a ContactInfo> {
        let directory = match self.name_source? {
            NameSource::DefaultDirectory => self.info.default_directory.as_ref(),
            NameSource::ExtendedDirectory => self.info.extended_directory.as_ref(),
            _ => None,
        };
        directory.and_then(|d| d.first_contact())
    }
}

fn name_from(info: &LookupInfo, source: NameSource) -> Option<&str> {
    match source {
        NameSource::DefaultDirectory => info
            .default_directory
            .as_ref()
            .and_then(|d| d.first_contact())
            .map(|c| c.name.as_str()),
        NameSource::ExtendedDirectory => info
            .extended_directory
            .as_ref()
            .and_then(|d| d.first_contact())
            .map(|c| c.name.as_str()),
        NameSource::RemotePerson => info.remote_person.as_ref().map(|p| p.display_name.as_str()),
        NameSource::CallerId => info.caller_id.as_ref().map(|c| c.name.as_str()),
        NameSource::Cnap => info.cnap.as_ref().map(|c| c.name.as_str()),
        NameSource::Migrated => info.migrated.as_ref().map(|m| m.name.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{
        CallerIdInfo, CnapInfo, DirectoryInfo, MigratedInfo, RemotePersonInfo, SpamInfo,
        SystemBlockedInfo,
    };

    fn directory(name: &str) -> DirectoryInfo {
        DirectoryInfo {
            contacts: vec![ContactInfo {
                name: name.to_string(),
                ..ContactInfo::default()
            }],
            is_incomplete: false,
        }
    }

    fn remote(name: &str, photo: &str) -> RemotePersonInfo {
        RemotePersonInfo {
            display_name: name.to_string(),
            photo_uri: photo.to_string(),
            person_id: "p-1".to_string(),
            info_type: RemoteInfoType::Contact,
            ..RemotePersonInfo::default()
        }
    }

    #[test]
    fn priority_list_is_complete() {
        assert!(lists_every_name_source_once(&NAME_SOURCES_IN_PRIORITY_ORDER));
        assert!(!lists_every_name_source_once(&NAME_SOURCES_IN_PRIORITY_ORDER[..5]));
        let mut duplicated = NAME_SOURCES_IN_PRIORITY_ORDER;
        duplicated[5] = NameSource::DefaultDirectory;
        assert!(!lists_every_name_source_once(&duplicated));
    }

    #[test]
    fn higher_priority_name_wins_without_backfilling_photo() {
        let info = LookupInfo {
            default_directory: Some(directory("Alice")),
            remote_person: Some(remote("Alice Remote", "content://remote/photo")),
            ..LookupInfo::default()
        };
        let c = Consolidator::new(&info);

        assert_eq!(c.name_source(), Some(NameSource::DefaultDirectory));
        assert_eq!(c.name(), "Alice");
        assert_eq!(c.photo_uri(), "");
        assert!(!c.can_report_as_invalid_number());
        assert_eq!(c.contact_source(), ContactSourceType::Directory);
    }

    #[test]
    fn empty_names_are_skipped() {
        let info = LookupInfo {
            default_directory: Some(DirectoryInfo::default()),
            extended_directory: Some(directory("")),
            caller_id: Some(CallerIdInfo {
                name: "Pizza Place".into(),
                photo_uri: "content://cid/photo".into(),
                geolocation: "Mountain View, CA".into(),
            }),
            cnap: Some(CnapInfo { name: "PIZZA".into() }),
            ..LookupInfo::default()
        };
        let c = Consolidator::new(&info);

        assert_eq!(c.name_source(), Some(NameSource::CallerId));
        assert_eq!(c.name(), "Pizza Place");
        assert_eq!(c.photo_uri(), "content://cid/photo");
        assert_eq!(c.geolocation(), "Mountain View, CA");
        assert_eq!(c.lookup_uri(), "");
    }

    #[test]
    fn no_name_means_no_source() {
        let info = LookupInfo {
            spam: SpamInfo { is_spam: true },
            ..LookupInfo::default()
        };
        let c = Consolidator::new(&info);
        assert_eq!(c.name_source(), None);
        assert_eq!(c.name(), "");
        assert_eq!(c.contact_source(), ContactSourceType::Unknown);
        assert!(c.is_spam());
    }

    #[test]
    fn remote_business_fields() {
        let info = LookupInfo {
            remote_person: Some(RemotePersonInfo {
                display_name: "Corner Cafe".into(),
                photo_uri: "content://remote/cafe.png".into(),
                lookup_uri: "content://remote/lookup".into(),
                person_id: "biz-9".into(),
                info_type: RemoteInfoType::NearbyBusiness,
                ..RemotePersonInfo::default()
            }),
            ..LookupInfo::default()
        };
        let c = Consolidator::new(&info);
        assert!(c.is_business());
        assert!(c.can_report_as_invalid_number());
        assert_eq!(c.contact_source(), ContactSourceType::Places);
        assert_eq!(c.lookup_uri(), "content://remote/lookup");
        assert_eq!(c.photo_uri(), "");
        assert_eq!(c.display_fields().photo_uri, "");
    }

    #[test]
    fn directory_fields_and_photo_id_floor() {
        let info = LookupInfo {
            default_directory: Some(DirectoryInfo {
                contacts: vec![ContactInfo {
                    name: "Bob".into(),
                    photo_id: -4,
                    label: "Mobile".into(),
                    can_support_carrier_video_call: true,
                    ..ContactInfo::default()
                }],
                is_incomplete: true,
            }),
            ..LookupInfo::default()
        };
        let fields = Consolidator::new(&info).display_fields();
        assert_eq!(fields.name, "Bob");
        assert_eq!(fields.photo_id, 0);
        assert_eq!(fields.number_label, "Mobile");
        assert!(fields.can_support_carrier_video_call);
        assert!(fields.is_default_directory_incomplete);
    }

    #[test]
    fn migrated_entry_reports_recorded_source() {
        let info = LookupInfo {
            migrated: Some(MigratedInfo {
                name: "Old Cache".into(),
                is_business: true,
                source_type: ContactSourceType::CallerId,
                ..MigratedInfo::default()
            }),
            ..LookupInfo::default()
        };
        let c = Consolidator::new(&info);
        assert_eq!(c.contact_source(), ContactSourceType::CallerId);
        assert!(c.is_business());
    }

    #[test]
    fn blocked_requires_system_record() {
        let mut info = LookupInfo::default();
        assert!(!Consolidator::new(&info).is_blocked());

        info.system_blocked = SystemBlockedInfo {
            blocked_state: Some(BlockedState::NotBlocked),
        };
        assert!(!Consolidator::new(&info).is_blocked());

        info.system_blocked.blocked_state = Some(BlockedState::Blocked);
        assert!(Consolidator::new(&info).is_blocked());
    }
}
