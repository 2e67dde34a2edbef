//! Phone number normalization and matching.
//!
//! Parsing is total: any input, including garbage, produces a
//! [`CanonicalNumber`]. Input that cannot be resolved to a country calling
//! code keeps its raw text and is marked invalid.

pub(crate) mod metadata;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters that start the post-dial portion of a number (pause, wait).
const POST_DIAL_SEPARATORS: [char; 2] = [',', ';'];

/// Longest national significant number accepted by the parser.
const MAX_NATIONAL_NUMBER_LEN: usize = 17;

/// Normalized, comparable representation of a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalNumber {
    raw_text: String,
    region: String,
    parsed_e164: Option<String>,
    is_valid: bool,
    post_dial_portion: String,
}

impl CanonicalNumber {
    /// Parses `raw_text` using `region` for nationally-formatted input.
    ///
    /// Never fails; see [`parse`].
    #[must_use]
    pub fn parse(raw_text: &str, region: &str) -> Self {
        parse(raw_text, region)
    }

    /// The input text (trimmed).
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Upper-cased region code supplied at parse time. May be empty.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// E164 form of the network portion, when a country calling code could be resolved.
    #[must_use]
    pub fn parsed_e164(&self) -> Option<&str> {
        self.parsed_e164.as_deref()
    }

    /// True when the parsed form passes the region's validity rules.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Digits dialed after the call connects (starting at the first pause or wait).
    #[must_use]
    pub fn post_dial_portion(&self) -> &str {
        &self.post_dial_portion
    }

    /// Returns true for feature codes such as `*67` or `#31#`.
    #[must_use]
    pub fn is_service_number(&self) -> bool {
        is_service_number(&self.raw_text)
    }

    /// Returns true if there is nothing to look up.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }

    /// The key used for this number in the lookup history.
    ///
    /// Service numbers keep their raw text, valid numbers become E164 plus
    /// post-dial digits, and anything else is the dialable network portion
    /// plus post-dial digits.
    #[must_use]
    pub fn normalized(&self) -> String {
        if self.is_service_number() {
            return self.raw_text.clone();
        }
        match (&self.parsed_e164, self.is_valid) {
            (Some(e164), true) => format!("{e164}{}", self.post_dial_portion),
            _ => {
                let (network, post_dial) = split_post_dial(&self.raw_text);
                format!("{network}{post_dial}")
            }
        }
    }

    /// Returns true if both numbers denote the same line (see [`exact_match`]).
    #[must_use]
    pub fn exact_match(&self, other: &Self) -> bool {
        exact_match(self, other)
    }

    /// Network digits used for short-code checks (no `+`, no post-dial digits).
    pub(crate) fn network_digits(&self) -> String {
        let (network, _) = split_post_dial(&self.raw_text);
        network.chars().filter(char::is_ascii_digit).collect()
    }

    fn unparsed(raw_text: &str, region: String, post_dial_portion: String) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            region,
            parsed_e164: None,
            is_valid: false,
            post_dial_portion,
        }
    }
}

impl fmt::Display for CanonicalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", sanitize_for_log(&self.normalized()))
    }
}

/// How closely two parsed numbers agree, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchGrade {
    /// Different numbers.
    NoMatch,
    /// Same country; one national number is a suffix of the other.
    ShortNsnMatch,
    /// Same country and national number, different post-dial digits.
    NsnMatch,
    /// Same country, national number and post-dial digits.
    ExactMatch,
}

/// Parses `raw_text` into a [`CanonicalNumber`].
///
/// Total: unparsable input yields `is_valid == false` with the raw text and
/// region preserved.
#[must_use]
pub fn parse(raw_text: &str, region: &str) -> CanonicalNumber {
    let raw = raw_text.trim();
    let region = region.trim().to_ascii_uppercase();

    // "#123" and "123" must not collapse into the same number.
    if raw.is_empty() || is_service_number(raw) {
        return CanonicalNumber::unparsed(raw, region, String::new());
    }

    let (network, post_dial) = split_post_dial(raw);
    let Some((country_code, national_number)) = parse_network_portion(&network, &region) else {
        return CanonicalNumber::unparsed(raw, region, post_dial);
    };

    let is_valid = metadata::for_country_code(country_code)
        .any(|meta| meta.is_valid_national_number(&national_number));

    CanonicalNumber {
        raw_text: raw.to_string(),
        region,
        parsed_e164: Some(format!("+{country_code}{national_number}")),
        is_valid,
        post_dial_portion: post_dial,
    }
}

/// Returns true if `a` and `b` are the same number.
///
/// When both sides have a parsed form the strict [`MatchGrade::ExactMatch`]
/// grade is required; otherwise `(raw_text, region)` must be equal.
#[must_use]
pub fn exact_match(a: &CanonicalNumber, b: &CanonicalNumber) -> bool {
    match_grade(a, b) == MatchGrade::ExactMatch
}

/// Grades how closely two numbers match.
///
/// Numbers lacking a parsed form only ever grade as exact (structurally equal
/// raw text and region) or no match.
#[must_use]
pub fn match_grade(a: &CanonicalNumber, b: &CanonicalNumber) -> MatchGrade {
    let (Some(e164_a), Some(e164_b)) = (a.parsed_e164(), b.parsed_e164()) else {
        return if a.raw_text == b.raw_text && a.region == b.region {
            MatchGrade::ExactMatch
        } else {
            MatchGrade::NoMatch
        };
    };

    let (Some((cc_a, nsn_a)), Some((cc_b, nsn_b))) = (
        metadata::split_country_code(e164_a.trim_start_matches('+')),
        metadata::split_country_code(e164_b.trim_start_matches('+')),
    ) else {
        return MatchGrade::NoMatch;
    };

    if cc_a != cc_b {
        return MatchGrade::NoMatch;
    }
    if nsn_a == nsn_b {
        return if a.post_dial_portion == b.post_dial_portion {
            MatchGrade::ExactMatch
        } else {
            MatchGrade::NsnMatch
        };
    }
    if nsn_a.ends_with(nsn_b) || nsn_b.ends_with(nsn_a) {
        return MatchGrade::ShortNsnMatch;
    }
    MatchGrade::NoMatch
}

/// Masks all but the last two digits of `text` for log output.
#[must_use]
pub fn sanitize_for_log(text: &str) -> String {
    let total_digits = text.chars().filter(char::is_ascii_digit).count();
    let mut seen = 0usize;
    text.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen += 1;
                if seen + 2 <= total_digits {
                    return 'x';
                }
            }
            c
        })
        .collect()
}

fn is_service_number(raw: &str) -> bool {
    raw.contains('#') || raw.starts_with('*')
}

/// Splits raw input into (dialable network portion, post-dial portion).
fn split_post_dial(raw: &str) -> (String, String) {
    let (network_raw, post_dial_raw) = match raw.find(&POST_DIAL_SEPARATORS[..]) {
        Some(idx) => raw.split_at(idx),
        None => (raw, ""),
    };

    let mut network = String::with_capacity(network_raw.len());
    for c in network_raw.chars() {
        match c {
            '0'..='9' | '*' | '#' => network.push(c),
            '+' if network.is_empty() => network.push(c),
            _ => {}
        }
    }

    let post_dial = post_dial_raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | ';' | '*' | '#'))
        .collect();

    (network, post_dial)
}

/// Resolves the network portion to (country calling code, national number).
fn parse_network_portion(network: &str, region: &str) -> Option<(u16, String)> {
    let digits: String = network.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    if network.starts_with('+') {
        return parse_international(&digits);
    }

    let meta = metadata::for_region(region)?;
    if let Some(rest) = digits.strip_prefix(meta.international_prefix) {
        if !rest.is_empty() {
            return parse_international(rest);
        }
    }

    let national = match meta.trunk_prefix {
        // NANP only carries the trunk "1" on full eleven-digit input.
        Some("1") if meta.country_code == 1 => {
            if digits.len() == 11 {
                digits.strip_prefix('1').unwrap_or(&digits)
            } else {
                &digits
            }
        }
        Some(prefix) => digits.strip_prefix(prefix).unwrap_or(&digits),
        None => &digits,
    };

    national_number_in_bounds(national).then(|| (meta.country_code, national.to_string()))
}

fn parse_international(digits: &str) -> Option<(u16, String)> {
    let (country_code, national) = metadata::split_country_code(digits)?;
    national_number_in_bounds(national).then(|| (country_code, national.to_string()))
}

fn national_number_in_bounds(national: &str) -> bool {
    (2..=MAX_NATIONAL_NUMBER_LEN).contains(&national.len())
}
