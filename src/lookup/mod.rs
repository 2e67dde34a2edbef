//! Lookup providers.
//!
//! Each provider answers for exactly one [`SourceKind`]. The engine only ever
//! talks to a [`CompositeLookup`], which fans every call out to its providers
//! and assembles their answers into one [`LookupInfo`] per number.

mod blocked;
mod composite;
mod directory;
mod emergency;
mod table;

pub use blocked::{BlockedNumberTable, SystemBlockedLookup};
pub use composite::CompositeLookup;
pub use directory::{ContactDirectory, DirectoryContact, DirectoryLookup, DirectoryPhone};
pub use emergency::EmergencyLookup;
pub use table::TableLookup;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::info::{LookupInfo, SourceKind, SubRecord};
use crate::number::CanonicalNumber;

/// Errors raised by lookup providers.
///
/// Any of these aborts the refresh cycle that triggered it.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The provider's backend failed.
    #[error("Lookup '{source_name}' failed: {message}")]
    Failed {
        source_name: String,
        message: String,
    },

    /// The provider's wait was cancelled or interrupted.
    #[error("Lookup '{source_name}' was interrupted")]
    Interrupted {
        source_name: String,
    },

    /// The provider did not answer for a requested number.
    #[error("Lookup '{source_name}' returned no result for {number}")]
    MissingResult {
        source_name: String,
        /// Sanitized number.
        number: String,
    },

    /// The provider answered with a record for a different source.
    #[error("Lookup '{source_name}' returned a {actual} record, expected {expected}")]
    WrongSourceKind {
        source_name: String,
        expected: SourceKind,
        actual: SourceKind,
    },
}

impl LookupError {
    /// Creates a `Failed` error for `source`.
    #[must_use]
    pub fn failed(source: SourceKind, message: impl Into<String>) -> Self {
        Self::Failed {
            source_name: source.as_str().to_string(),
            message: message.into(),
        }
    }
}

/// A provider of one kind of per-number information.
///
/// # Contract
/// - `most_recent_info` returns a record for every number in `existing`,
///   substituting an empty record for numbers it knows nothing about.
/// - State needed to answer `is_dirty` cheaply is only advanced in
///   `on_successful_bulk_update`, after the caller has committed.
#[async_trait]
pub trait PhoneLookup: Send + Sync {
    /// The slot this provider fills.
    fn kind(&self) -> SourceKind;

    /// Returns true if the provider's answer for any of `numbers` may have changed.
    async fn is_dirty(&self, numbers: &HashSet<CanonicalNumber>) -> Result<bool, LookupError>;

    /// Fresh answers for every key of `existing`, which holds the last persisted info.
    async fn most_recent_info(
        &self,
        existing: &HashMap<CanonicalNumber, LookupInfo>,
    ) -> Result<HashMap<CanonicalNumber, SubRecord>, LookupError>;

    /// Called once the results of the last `most_recent_info` have been committed.
    async fn on_successful_bulk_update(&self) -> Result<(), LookupError> {
        Ok(())
    }

    /// Drops any provider-owned state.
    async fn clear_data(&self) -> Result<(), LookupError> {
        Ok(())
    }
}

pub(crate) fn lock_failed(source: SourceKind, context: &'static str) -> LookupError {
    LookupError::failed(source, format!("poisoned lock: {context}"))
}
