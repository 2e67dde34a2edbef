//! Static region metadata used by the number normalizer.
//!
//! Country calling codes are prefix-free, so an E164 string can always be
//! split back into (country code, national number) by trying 1-3 digit
//! prefixes against this table.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Dialing metadata for a single region.
#[derive(Debug)]
pub(crate) struct RegionMetadata {
    /// ISO 3166-1 alpha-2 region code.
    pub region: &'static str,
    /// Country calling code.
    pub country_code: u16,
    /// National trunk prefix, stripped from nationally-formatted input.
    pub trunk_prefix: Option<&'static str>,
    /// Prefix used to dial out internationally from this region.
    pub international_prefix: &'static str,
    /// Anchored pattern every valid national significant number matches.
    pub national_pattern: &'static str,
    /// Short codes that reach emergency services.
    pub emergency_numbers: &'static [&'static str],
}

impl RegionMetadata {
    /// Returns true if the national significant number is valid for this region.
    pub fn is_valid_national_number(&self, national_number: &str) -> bool {
        compiled_patterns()
            .get(self.national_pattern)
            .is_some_and(|re| re.is_match(national_number))
    }

    /// Returns true if `digits` is one of this region's emergency short codes.
    pub fn is_emergency_number(&self, digits: &str) -> bool {
        self.emergency_numbers.iter().any(|n| *n == digits)
    }
}

const NANP_PATTERN: &str = r"^[2-9]\d{2}[2-9]\d{6}$";

static REGIONS: &[RegionMetadata] = &[
    RegionMetadata {
        region: "US",
        country_code: 1,
        trunk_prefix: Some("1"),
        international_prefix: "011",
        national_pattern: NANP_PATTERN,
        emergency_numbers: &["911", "112"],
    },
    RegionMetadata {
        region: "CA",
        country_code: 1,
        trunk_prefix: Some("1"),
        international_prefix: "011",
        national_pattern: NANP_PATTERN,
        emergency_numbers: &["911", "112"],
    },
    RegionMetadata {
        region: "GB",
        country_code: 44,
        trunk_prefix: Some("0"),
        international_prefix: "00",
        national_pattern: r"^[1-9]\d{8,9}$",
        emergency_numbers: &["999", "112"],
    },
    RegionMetadata {
        region: "DE",
        country_code: 49,
        trunk_prefix: Some("0"),
        international_prefix: "00",
        national_pattern: r"^[1-9]\d{5,12}$",
        emergency_numbers: &["112", "110"],
    },
    RegionMetadata {
        region: "FR",
        country_code: 33,
        trunk_prefix: Some("0"),
        international_prefix: "00",
        national_pattern: r"^[1-9]\d{8}$",
        emergency_numbers: &["112", "15", "17", "18"],
    },
    RegionMetadata {
        region: "ES",
        country_code: 34,
        trunk_prefix: None,
        international_prefix: "00",
        national_pattern: r"^[6-9]\d{8}$",
        emergency_numbers: &["112"],
    },
    RegionMetadata {
        region: "CH",
        country_code: 41,
        trunk_prefix: Some("0"),
        international_prefix: "00",
        national_pattern: r"^[1-9]\d{8}$",
        emergency_numbers: &["112", "117", "118", "144"],
    },
    RegionMetadata {
        region: "MX",
        country_code: 52,
        trunk_prefix: None,
        international_prefix: "00",
        national_pattern: r"^[1-9]\d{9}$",
        emergency_numbers: &["911"],
    },
    RegionMetadata {
        region: "BR",
        country_code: 55,
        trunk_prefix: Some("0"),
        international_prefix: "00",
        national_pattern: r"^[1-9]{2}\d{8,9}$",
        emergency_numbers: &["190", "192", "193"],
    },
    RegionMetadata {
        region: "AU",
        country_code: 61,
        trunk_prefix: Some("0"),
        international_prefix: "0011",
        national_pattern: r"^[2-478]\d{8}$",
        emergency_numbers: &["000", "112"],
    },
    RegionMetadata {
        region: "JP",
        country_code: 81,
        trunk_prefix: Some("0"),
        international_prefix: "010",
        national_pattern: r"^[1-9]\d{8,9}$",
        emergency_numbers: &["110", "119"],
    },
    RegionMetadata {
        region: "IN",
        country_code: 91,
        trunk_prefix: Some("0"),
        international_prefix: "00",
        national_pattern: r"^[1-9]\d{9}$",
        emergency_numbers: &["112", "100", "101", "102"],
    },
];

/// Emergency codes recognised when the region is unknown.
pub(crate) const FALLBACK_EMERGENCY_NUMBERS: &[&str] = &["112", "911"];

fn compiled_patterns() -> &'static HashMap<&'static str, Regex> {
    static PATTERNS: OnceLock<HashMap<&'static str, Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        REGIONS
            .iter()
            .filter_map(|meta| {
                Regex::new(meta.national_pattern)
                    .ok()
                    .map(|re| (meta.national_pattern, re))
            })
            .collect()
    })
}

/// Looks up metadata by (case-insensitive) region code.
pub(crate) fn for_region(region: &str) -> Option<&'static RegionMetadata> {
    REGIONS
        .iter()
        .find(|meta| meta.region.eq_ignore_ascii_case(region))
}

/// Returns true if some region uses `country_code`.
pub(crate) fn is_known_country_code(country_code: u16) -> bool {
    REGIONS.iter().any(|meta| meta.country_code == country_code)
}

/// All regions sharing `country_code` (e.g. US and CA for 1).
pub(crate) fn for_country_code(country_code: u16) -> impl Iterator<Item = &'static RegionMetadata> {
    REGIONS
        .iter()
        .filter(move |meta| meta.country_code == country_code)
}

/// Splits a leading country calling code off an international digit string.
pub(crate) fn split_country_code(digits: &str) -> Option<(u16, &str)> {
    (1..=3usize).find_map(|len| {
        let prefix = digits.get(..len)?;
        let code: u16 = prefix.parse().ok()?;
        is_known_country_code(code).then(|| (code, &digits[len..]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_national_pattern_compiles() {
        for meta in REGIONS {
            assert!(
                compiled_patterns().contains_key(meta.national_pattern),
                "pattern for {} failed to compile",
                meta.region
            );
        }
    }

    #[test]
    fn region_lookup_is_case_insensitive() {
        assert_eq!(for_region("us").map(|m| m.country_code), Some(1));
        assert_eq!(for_region("Gb").map(|m| m.country_code), Some(44));
        assert!(for_region("ZZ").is_none());
    }

    #[test]
    fn split_country_code_prefers_known_prefixes() {
        assert_eq!(split_country_code("14085550101"), Some((1, "4085550101")));
        assert_eq!(split_country_code("442071838750"), Some((44, "2071838750")));
        assert_eq!(split_country_code("919876543210"), Some((91, "9876543210")));
        assert_eq!(split_country_code("999123"), None);
    }

    #[test]
    fn nanp_validity() {
        let us = for_region("US").unwrap();
        assert!(us.is_valid_national_number("4085550101"));
        assert!(!us.is_valid_national_number("1085550101"));
        assert!(!us.is_valid_national_number("408555010"));
    }
}
