//! # annotated-calllog
//!
//! Keeps call-log rows annotated with what the phone knows about each number:
//! the contact name and photo, caller-ID results, spam and emergency flags,
//! block state. Annotations are kept in sync incrementally, so a refresh only
//! touches rows whose number has new information.
//!
//! ## Core Concepts
//!
//! - **CanonicalNumber**: a number as dialed plus the region it was dialed in
//! - **LookupInfo**: everything every provider knows about one number
//! - **Consolidator**: picks the single source that supplies a row's name and photo
//! - **AnnotationEngine**: dirty-check, fill, and post-commit phases of a refresh
//! - **HistoryStore**: the last committed `LookupInfo` per normalized number
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use annotated_calllog::{
//!     AnnotationEngine, CanonicalNumber, CompositeLookup, EmergencyLookup, InMemoryCallLog,
//!     InMemoryHistoryStore, RefreshRequest, RefreshRuntime, RuntimeConfig,
//! };
//!
//! let calllog = Arc::new(InMemoryCallLog::new());
//! calllog.add_row(1, CanonicalNumber::parse("911", "US"))?;
//!
//! let engine = AnnotationEngine::new(
//!     CompositeLookup::default().with(Arc::new(EmergencyLookup)),
//!     Arc::new(InMemoryHistoryStore::new()),
//!     calllog.clone(),
//! );
//! let runtime = RefreshRuntime::new(engine, calllog.clone(), &RuntimeConfig::default())?;
//! runtime.refresh(RefreshRequest::new().forced())?;
//! assert!(calllog.row(1)?.unwrap().attributes.is_emergency_number);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod info;
pub mod number;
pub mod partition;

// Derivation and providers
pub mod consolidator;
pub mod lookup;
pub mod mutation;

// Storage and refresh
pub mod engine;
pub mod storage;

pub use config::{AnnotationConfig, HistoryConfig, LookupConfig, RuntimeConfig};
pub use consolidator::{Consolidator, DisplayFields, NameSource, NAME_SOURCES_IN_PRIORITY_ORDER};
pub use error::{AnnotationError, AnnotationResult, ConfigError, ExecutionError};
pub use info::{
    BlockedState, CallerIdInfo, CnapInfo, ContactInfo, ContactSourceType, DirectoryInfo,
    EmergencyInfo, LookupInfo, MigratedInfo, RemoteInfoType, RemotePersonInfo, SourceKind,
    SpamInfo, SubRecord, SystemBlockedInfo,
};
pub use number::{sanitize_for_log, CanonicalNumber, MatchGrade};
pub use partition::PartitionedNumbers;

pub use engine::runtime::{CycleId, RefreshHandle, RefreshOutcome, RefreshRequest, RefreshRuntime};
pub use engine::{AnnotationEngine, FillSummary};
pub use lookup::{
    BlockedNumberTable, CompositeLookup, ContactDirectory, DirectoryContact, DirectoryLookup,
    DirectoryPhone, EmergencyLookup, LookupError, PhoneLookup, SystemBlockedLookup, TableLookup,
};
pub use mutation::{FieldPatch, MutationSet, PatchTarget, RowId};
pub use storage::{
    AnnotatedRow, CallLogRow, CallLogRowSource, HistoryEntry, HistoryStore, InMemoryCallLog,
    InMemoryHistoryStore, MutationSink, StorageError,
};

#[cfg(feature = "persistent")]
pub use storage::persistent::{FileHistoryStore, PersistentConfig};
