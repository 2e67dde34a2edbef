//! Storage contracts and backends.
//!
//! [`traits`] defines what the refresh engine consumes and produces; the
//! in-memory backends serve embedded use and tests, and the optional
//! persistent backend keeps lookup history across restarts.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::{AnnotatedRow, InMemoryCallLog, InMemoryHistoryStore};
pub use traits::{
    CallLogRow, CallLogRowSource, HistoryEntry, HistoryStore, MutationSink, StorageError,
};
