//! Splits numbers into batch-queryable buckets.
//!
//! Providers query valid numbers in one batch keyed by E164 and fall back to
//! per-number matching for everything else. Post-dial digits cannot be stored
//! in an E164 column, so a number carrying them is always treated as invalid
//! even when its network portion parses cleanly.

use std::collections::{HashMap, HashSet};

use crate::number::CanonicalNumber;

/// Numbers grouped into valid-E164 and invalid buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedNumbers {
    valid_e164: HashMap<String, HashSet<CanonicalNumber>>,
    invalid: HashMap<String, HashSet<CanonicalNumber>>,
}

impl PartitionedNumbers {
    /// Partitions `numbers`. Every input lands under exactly one key.
    pub fn new<'a>(numbers: impl IntoIterator<Item = &'a CanonicalNumber>) -> Self {
        let mut valid_e164: HashMap<String, HashSet<CanonicalNumber>> = HashMap::new();
        let mut invalid: HashMap<String, HashSet<CanonicalNumber>> = HashMap::new();

        for number in numbers {
            match valid_e164_key(number) {
                Some(e164) => {
                    valid_e164
                        .entry(e164.to_string())
                        .or_default()
                        .insert(number.clone());
                }
                None => {
                    invalid
                        .entry(number.normalized())
                        .or_default()
                        .insert(number.clone());
                }
            }
        }

        Self { valid_e164, invalid }
    }

    /// E164 keys of the valid bucket.
    pub fn valid_e164_numbers(&self) -> impl Iterator<Item = &str> {
        self.valid_e164.keys().map(String::as_str)
    }

    /// Normalized keys of the invalid bucket.
    pub fn invalid_numbers(&self) -> impl Iterator<Item = &str> {
        self.invalid.keys().map(String::as_str)
    }

    /// Number of distinct valid E164 keys.
    #[must_use]
    pub fn valid_e164_count(&self) -> usize {
        self.valid_e164.len()
    }

    /// Number of distinct invalid keys.
    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.invalid.len()
    }

    /// The inputs that produced `e164`; empty if no input did.
    #[must_use]
    pub fn numbers_for_valid_e164(&self, e164: &str) -> HashSet<CanonicalNumber> {
        self.valid_e164.get(e164).cloned().unwrap_or_default()
    }

    /// The inputs that produced invalid key `normalized`; empty if no input did.
    #[must_use]
    pub fn numbers_for_invalid(&self, normalized: &str) -> HashSet<CanonicalNumber> {
        self.invalid.get(normalized).cloned().unwrap_or_default()
    }

    /// Iterates the valid bucket as (key, numbers).
    pub fn valid_e164_entries(&self) -> impl Iterator<Item = (&str, &HashSet<CanonicalNumber>)> {
        self.valid_e164.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates the invalid bucket as (key, numbers).
    pub fn invalid_entries(&self) -> impl Iterator<Item = (&str, &HashSet<CanonicalNumber>)> {
        self.invalid.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn valid_e164_key(number: &CanonicalNumber) -> Option<&str> {
    if !number.is_valid() || !number.post_dial_portion().is_empty() {
        return None;
    }
    number.parsed_e164()
}
