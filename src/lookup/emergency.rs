//! Emergency number detection.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::info::{EmergencyInfo, LookupInfo, SourceKind, SubRecord};
use crate::lookup::{LookupError, PhoneLookup};
use crate::number::metadata::{self, FALLBACK_EMERGENCY_NUMBERS};
use crate::number::CanonicalNumber;

/// Flags numbers whose network portion is an emergency short code of their region.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmergencyLookup;

impl EmergencyLookup {
    #[must_use]
    pub fn is_emergency_number(number: &CanonicalNumber) -> bool {
        if number.raw_text().starts_with('+') {
            return false;
        }
        let digits = number.network_digits();
        match metadata::for_region(number.region()) {
            Some(meta) => meta.is_emergency_number(&digits),
            None => FALLBACK_EMERGENCY_NUMBERS.contains(&digits.as_str()),
        }
    }
}

#[async_trait]
impl PhoneLookup for EmergencyLookup {
    fn kind(&self) -> SourceKind {
        SourceKind::Emergency
    }

    async fn is_dirty(&self, _numbers: &HashSet<CanonicalNumber>) -> Result<bool, LookupError> {
        Ok(false)
    }

    async fn most_recent_info(
        &self,
        existing: &HashMap<CanonicalNumber, LookupInfo>,
    ) -> Result<HashMap<CanonicalNumber, SubRecord>, LookupError> {
        Ok(existing
            .keys()
            .map(|number| {
                let record = SubRecord::Emergency(EmergencyInfo {
                    is_emergency_number: Self::is_emergency_number(number),
                });
                (number.clone(), record)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regional_short_codes() {
        assert!(EmergencyLookup::is_emergency_number(&CanonicalNumber::parse("911", "US")));
        assert!(EmergencyLookup::is_emergency_number(&CanonicalNumber::parse("999", "GB")));
        assert!(!EmergencyLookup::is_emergency_number(&CanonicalNumber::parse("999", "US")));
        assert!(EmergencyLookup::is_emergency_number(&CanonicalNumber::parse("112", "")));
    }

    #[test]
    fn full_numbers_are_not_emergency() {
        assert!(!EmergencyLookup::is_emergency_number(&CanonicalNumber::parse(
            "+14085550911",
            "US"
        )));
        assert!(!EmergencyLookup::is_emergency_number(&CanonicalNumber::parse("+1911", "US")));
    }

    #[tokio::test]
    async fn answers_every_number_and_is_never_dirty() {
        let lookup = EmergencyLookup;
        let existing: HashMap<_, _> = [
            (CanonicalNumber::parse("911", "US"), LookupInfo::default()),
            (CanonicalNumber::parse("+14085550101", "US"), LookupInfo::default()),
        ]
        .into();
        let results = lookup.most_recent_info(&existing).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[&CanonicalNumber::parse("911", "US")],
            SubRecord::Emergency(EmergencyInfo { is_emergency_number: true })
        );
        let numbers: HashSet<_> = existing.into_keys().collect();
        assert!(!lookup.is_dirty(&numbers).await.unwrap());
    }
}
