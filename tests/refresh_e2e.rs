//! End-to-end refresh cycles over the in-memory call log.
//!
//! These tests drive the full pipeline (runtime, engine, built-in providers,
//! history store and row sink) and check what ends up in the call log and in
//! the history.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use annotated_calllog::{
    AnnotationEngine, BlockedNumberTable, CallerIdInfo, CanonicalNumber, CompositeLookup,
    ContactDirectory, ContactSourceType, DirectoryContact, DirectoryLookup, DirectoryPhone,
    EmergencyLookup, FieldPatch, HistoryStore, InMemoryCallLog, InMemoryHistoryStore, LookupError,
    LookupInfo, MutationSet, MutationSink, PhoneLookup, RefreshRequest, RefreshRuntime,
    RuntimeConfig, SourceKind, StorageError, SubRecord, SystemBlockedLookup, TableLookup,
};

const BOB: &str = "+16505550123";
const PIZZA: &str = "+16505550199";

fn parse(text: &str) -> CanonicalNumber {
    CanonicalNumber::parse(text, "US")
}

fn contact(id: i64, name: &str, number: &str) -> DirectoryContact {
    DirectoryContact {
        contact_id: id,
        name: name.to_string(),
        phones: vec![DirectoryPhone {
            number: parse(number),
            label: "mobile".to_string(),
        }],
        photo_uri: format!("content://photo/{id}"),
        photo_thumbnail_uri: String::new(),
        photo_id: id,
        lookup_uri: format!("content://lookup/{id}"),
        can_support_carrier_video_call: false,
    }
}

struct Harness {
    directory: Arc<ContactDirectory>,
    caller_id: Arc<TableLookup>,
    blocked: Arc<BlockedNumberTable>,
    history: Arc<InMemoryHistoryStore>,
    calllog: Arc<InMemoryCallLog>,
    runtime: RefreshRuntime,
}

fn harness_with(
    extra: Vec<Arc<dyn PhoneLookup>>,
    sink: Option<Arc<dyn MutationSink>>,
) -> Harness {
    let directory = Arc::new(ContactDirectory::new());
    let caller_id = Arc::new(TableLookup::new(SourceKind::CallerId));
    let blocked = Arc::new(BlockedNumberTable::new());
    let history = Arc::new(InMemoryHistoryStore::new());
    let calllog = Arc::new(InMemoryCallLog::new());

    let mut lookups: Vec<Arc<dyn PhoneLookup>> = vec![
        Arc::new(DirectoryLookup::default_directory(
            directory.clone(),
            DirectoryLookup::DEFAULT_MAX_SUPPORTED_INVALID_NUMBERS,
        )),
        caller_id.clone(),
        Arc::new(EmergencyLookup),
        Arc::new(SystemBlockedLookup::new(blocked.clone())),
    ];
    lookups.extend(extra);

    let engine = AnnotationEngine::new(
        CompositeLookup::new(lookups),
        history.clone(),
        calllog.clone(),
    );
    let sink = sink.unwrap_or_else(|| calllog.clone() as Arc<dyn MutationSink>);
    let runtime = RefreshRuntime::new(engine, sink, &RuntimeConfig::default()).unwrap();

    Harness {
        directory,
        caller_id,
        blocked,
        history,
        calllog,
        runtime,
    }
}

fn harness() -> Harness {
    harness_with(Vec::new(), None)
}

impl Harness {
    fn name(&self, row_id: i64) -> String {
        self.calllog.row(row_id).unwrap().unwrap().attributes.name
    }

    fn history_info(&self, number: &str) -> Option<LookupInfo> {
        self.history
            .get(&parse(number).normalized())
            .unwrap()
            .map(|entry| entry.info)
    }
}

fn new_call(row_id: i64, number: &str) -> RefreshRequest {
    let mut mutations = MutationSet::new();
    mutations.insert(row_id, FieldPatch::for_number(parse(number)));
    RefreshRequest::with_mutations(mutations)
}

#[test]
fn renamed_contact_corrects_prepopulated_insert() {
    let h = harness();
    h.directory.upsert(contact(1, "Bob", BOB)).unwrap();
    h.calllog.add_row(1, parse(BOB)).unwrap();

    let first = h.runtime.refresh(RefreshRequest::new()).unwrap();
    assert!(!first.skipped);
    assert_eq!(h.name(1), "Bob");

    // Rename, then a new call arrives from the same number.
    h.directory
        .upsert_at(contact(1, "Robert", BOB), Utc::now() + Duration::seconds(1))
        .unwrap();
    let second = h.runtime.refresh(new_call(2, BOB)).unwrap();

    let summary = second.summary.unwrap();
    assert_eq!(summary.inserts_prepopulated, 1);
    assert_eq!(summary.numbers_changed, 1);
    assert_eq!(second.mutations.inserts()[&2].name(), Some("Robert"));
    assert_eq!(second.mutations.updates()[&1].name(), Some("Robert"));

    assert_eq!(h.name(1), "Robert");
    assert_eq!(h.name(2), "Robert");
    let info = h.history_info(BOB).unwrap();
    assert_eq!(
        info.default_directory.unwrap().first_contact().unwrap().name,
        "Robert"
    );
}

#[test]
fn new_call_from_known_number_starts_from_history() {
    let h = harness();
    h.directory.upsert(contact(1, "Bob", BOB)).unwrap();
    h.calllog.add_row(1, parse(BOB)).unwrap();
    h.runtime.refresh(RefreshRequest::new()).unwrap();

    let outcome = h.runtime.refresh(new_call(2, BOB)).unwrap();
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.inserts_prepopulated, 1);
    assert_eq!(summary.numbers_changed, 0);
    assert!(outcome.mutations.updates().is_empty());
    assert_eq!(h.name(2), "Bob");
}

#[test]
fn repeated_refresh_is_a_no_op() {
    let h = harness();
    h.directory.upsert(contact(1, "Bob", BOB)).unwrap();
    h.calllog.add_row(1, parse(BOB)).unwrap();
    h.calllog.add_row(2, parse(PIZZA)).unwrap();
    h.runtime.refresh(RefreshRequest::new()).unwrap();

    let skipped = h.runtime.refresh(RefreshRequest::new()).unwrap();
    assert!(skipped.skipped);

    let forced = h.runtime.refresh(RefreshRequest::new().forced()).unwrap();
    assert!(forced.mutations.is_empty());
    assert_eq!(forced.summary.unwrap().numbers_changed, 0);
}

#[test]
fn directory_name_outranks_caller_id() {
    let h = harness();
    h.directory.upsert(contact(1, "Bob", BOB)).unwrap();
    for number in [BOB, PIZZA] {
        h.caller_id
            .set(
                &parse(number),
                SubRecord::CallerId(CallerIdInfo {
                    name: "Business".to_string(),
                    photo_uri: "https://example.com/logo.png".to_string(),
                    geolocation: "Mountain View, CA".to_string(),
                }),
            )
            .unwrap();
    }
    h.calllog.add_row(1, parse(BOB)).unwrap();
    h.calllog.add_row(2, parse(PIZZA)).unwrap();

    h.runtime.refresh(RefreshRequest::new()).unwrap();

    let bob = h.calllog.row(1).unwrap().unwrap().attributes;
    assert_eq!(bob.name, "Bob");
    assert_eq!(bob.photo_uri, "content://photo/1");
    assert_eq!(bob.geolocation, "");
    assert_eq!(bob.contact_source, ContactSourceType::Directory);

    let pizza = h.calllog.row(2).unwrap().unwrap().attributes;
    assert_eq!(pizza.name, "Business");
    assert_eq!(pizza.geolocation, "Mountain View, CA");
    assert_eq!(pizza.contact_source, ContactSourceType::CallerId);
}

#[test]
fn emergency_and_blocked_flags_are_annotated() {
    let h = harness();
    h.calllog.add_row(1, parse("911")).unwrap();
    h.calllog.add_row(2, parse(PIZZA)).unwrap();
    h.blocked.block(&parse(PIZZA)).unwrap();

    h.runtime.refresh(RefreshRequest::new()).unwrap();

    let emergency = h.calllog.row(1).unwrap().unwrap().attributes;
    assert!(emergency.is_emergency_number);
    assert!(!emergency.is_blocked);
    let blocked = h.calllog.row(2).unwrap().unwrap().attributes;
    assert!(blocked.is_blocked);

    h.blocked.unblock(&parse(PIZZA)).unwrap();
    let outcome = h.runtime.refresh(RefreshRequest::new()).unwrap();
    assert!(!outcome.skipped);
    assert!(!h.calllog.row(2).unwrap().unwrap().attributes.is_blocked);
}

#[test]
fn deleting_every_row_of_a_number_drops_its_history() {
    let h = harness();
    h.directory.upsert(contact(1, "Bob", BOB)).unwrap();
    h.calllog.add_row(1, parse(BOB)).unwrap();
    h.calllog.add_row(2, parse("(650) 555-0123")).unwrap();
    h.runtime.refresh(RefreshRequest::new()).unwrap();
    assert!(h.history_info(BOB).is_some());

    let mut mutations = MutationSet::new();
    mutations.delete(1);
    let outcome = h
        .runtime
        .refresh(RefreshRequest::with_mutations(mutations))
        .unwrap();
    assert_eq!(outcome.summary.unwrap().history_deletes, 0);
    assert!(h.history_info(BOB).is_some());

    let mut mutations = MutationSet::new();
    mutations.delete(2);
    let outcome = h
        .runtime
        .refresh(RefreshRequest::with_mutations(mutations))
        .unwrap();
    assert_eq!(outcome.summary.unwrap().history_deletes, 1);
    assert!(h.history_info(BOB).is_none());
    assert!(h.calllog.snapshot().unwrap().is_empty());
}

/// Spam provider whose backend can be switched off.
struct Outage {
    down: AtomicBool,
}

#[async_trait]
impl PhoneLookup for Outage {
    fn kind(&self) -> SourceKind {
        SourceKind::Spam
    }

    async fn is_dirty(&self, _numbers: &HashSet<CanonicalNumber>) -> Result<bool, LookupError> {
        Ok(false)
    }

    async fn most_recent_info(
        &self,
        existing: &HashMap<CanonicalNumber, LookupInfo>,
    ) -> Result<HashMap<CanonicalNumber, SubRecord>, LookupError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(LookupError::Interrupted {
                source_name: "spam".to_string(),
            });
        }
        Ok(existing
            .keys()
            .map(|n| (n.clone(), SubRecord::empty(SourceKind::Spam)))
            .collect())
    }
}

#[test]
fn provider_failure_aborts_the_cycle() {
    let outage = Arc::new(Outage {
        down: AtomicBool::new(true),
    });
    let h = harness_with(vec![outage.clone() as Arc<dyn PhoneLookup>], None);
    h.directory.upsert(contact(1, "Bob", BOB)).unwrap();
    h.calllog.add_row(1, parse(BOB)).unwrap();

    let err = h.runtime.refresh(RefreshRequest::new()).unwrap_err();
    assert!(err.is_lookup());
    assert!(err.is_retryable());
    assert_eq!(h.name(1), "");
    assert!(h.history.is_empty().unwrap());

    // Nothing was committed, so the directory is still dirty.
    outage.down.store(false, Ordering::SeqCst);
    let outcome = h.runtime.refresh(RefreshRequest::new()).unwrap();
    assert!(!outcome.skipped);
    assert_eq!(h.name(1), "Bob");
}

/// Sink that rejects the first commit.
struct FailOnce {
    inner: Arc<InMemoryCallLog>,
    failed: AtomicBool,
}

impl MutationSink for FailOnce {
    fn commit(&self, mutations: &MutationSet) -> Result<(), StorageError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Io("disk full".to_string()));
        }
        self.inner.commit(mutations)
    }
}

#[test]
fn failed_commit_is_retried_on_the_next_trigger() {
    let calllog = Arc::new(InMemoryCallLog::new());
    let sink = Arc::new(FailOnce {
        inner: calllog.clone(),
        failed: AtomicBool::new(false),
    });
    let h = harness_with(Vec::new(), Some(sink as Arc<dyn MutationSink>));
    // Rows live in the harness call log; the sink writes to its own.
    h.directory.upsert(contact(1, "Bob", BOB)).unwrap();
    h.calllog.add_row(1, parse(BOB)).unwrap();
    calllog.add_row(1, parse(BOB)).unwrap();

    let err = h.runtime.refresh(RefreshRequest::new()).unwrap_err();
    assert!(err.is_storage());
    assert!(h.history.is_empty().unwrap());

    let outcome = h.runtime.refresh(RefreshRequest::new()).unwrap();
    assert!(!outcome.skipped);
    assert_eq!(calllog.row(1).unwrap().unwrap().attributes.name, "Bob");
    assert!(h.history_info(BOB).is_some());
}
