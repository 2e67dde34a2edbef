//! Call-log refresh driver
//!
//! Loads a call log and provider data from a JSON fixture, runs one refresh
//! cycle and prints the annotated rows.
//!
//! **Usage:**
//! ```bash
//! calllog-refresh fixture.json [--config annotation.json] [--force]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use annotated_calllog::{
    AnnotationConfig, AnnotationEngine, BlockedNumberTable, CallerIdInfo, CanonicalNumber,
    CnapInfo, CompositeLookup, ContactDirectory, DirectoryContact, DirectoryLookup,
    DirectoryPhone, EmergencyLookup, FieldPatch, HistoryStore, InMemoryCallLog,
    InMemoryHistoryStore, MutationSet, PhoneLookup, RefreshRequest, RefreshRuntime, SourceKind,
    SpamInfo, SubRecord, SystemBlockedLookup, TableLookup,
};

/// Run one call-log annotation refresh over a fixture
#[derive(Parser, Debug)]
#[clap(name = "calllog-refresh")]
#[clap(about = "Annotate a fixture call log and print the result as JSON")]
struct Args {
    /// Fixture describing rows and provider data
    #[clap(value_name = "FIXTURE")]
    fixture: PathBuf,

    /// Annotation config (JSON)
    #[clap(long, value_name = "FILE", env = "CALLLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Fill even if no provider reports dirty
    #[clap(long)]
    force: bool,

    /// Keep lookup history in this directory across runs
    #[cfg(feature = "persistent")]
    #[clap(long, value_name = "DIR")]
    history_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct FixtureRow {
    row_id: i64,
    number: String,
}

#[derive(Debug, Deserialize)]
struct FixturePhone {
    number: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct FixtureContact {
    contact_id: i64,
    name: String,
    phones: Vec<FixturePhone>,
    #[serde(default)]
    photo_uri: String,
    #[serde(default)]
    photo_thumbnail_uri: String,
    #[serde(default)]
    photo_id: i64,
    #[serde(default)]
    lookup_uri: String,
}

#[derive(Debug, Deserialize)]
struct FixtureName {
    number: String,
    name: String,
    #[serde(default)]
    geolocation: String,
}

/// Call log plus provider data. Numbers are parsed with `region`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    region: String,
    rows: Vec<FixtureRow>,
    new_rows: Vec<FixtureRow>,
    deleted_rows: Vec<i64>,
    contacts: Vec<FixtureContact>,
    extended_contacts: Vec<FixtureContact>,
    caller_id: Vec<FixtureName>,
    cnap: Vec<FixtureName>,
    spam: Vec<String>,
    blocked: Vec<String>,
}

impl Fixture {
    fn parse(&self, number: &str) -> CanonicalNumber {
        CanonicalNumber::parse(number, &self.region)
    }

    fn directory(&self, contacts: &[FixtureContact]) -> Result<Arc<ContactDirectory>> {
        let directory = Arc::new(ContactDirectory::new());
        for c in contacts {
            directory.upsert(DirectoryContact {
                contact_id: c.contact_id,
                name: c.name.clone(),
                phones: c
                    .phones
                    .iter()
                    .map(|p| DirectoryPhone {
                        number: self.parse(&p.number),
                        label: p.label.clone(),
                    })
                    .collect(),
                photo_uri: c.photo_uri.clone(),
                photo_thumbnail_uri: c.photo_thumbnail_uri.clone(),
                photo_id: c.photo_id,
                lookup_uri: c.lookup_uri.clone(),
                can_support_carrier_video_call: false,
            })?;
        }
        Ok(directory)
    }

    fn lookups(&self, config: &AnnotationConfig) -> Result<CompositeLookup> {
        let budget = config.lookup.max_supported_invalid_numbers;

        let caller_id = TableLookup::new(SourceKind::CallerId);
        for entry in &self.caller_id {
            caller_id.set(
                &self.parse(&entry.number),
                SubRecord::CallerId(CallerIdInfo {
                    name: entry.name.clone(),
                    photo_uri: String::new(),
                    geolocation: entry.geolocation.clone(),
                }),
            )?;
        }
        let cnap = TableLookup::new(SourceKind::Cnap);
        for entry in &self.cnap {
            cnap.set(
                &self.parse(&entry.number),
                SubRecord::Cnap(CnapInfo {
                    name: entry.name.clone(),
                }),
            )?;
        }
        let spam = TableLookup::new(SourceKind::Spam);
        for number in &self.spam {
            spam.set(&self.parse(number), SubRecord::Spam(SpamInfo { is_spam: true }))?;
        }
        let blocked = Arc::new(BlockedNumberTable::new());
        for number in &self.blocked {
            blocked.block(&self.parse(number))?;
        }

        let lookups: Vec<Arc<dyn PhoneLookup>> = vec![
            Arc::new(DirectoryLookup::default_directory(self.directory(&self.contacts)?, budget)),
            Arc::new(DirectoryLookup::extended_directory(
                self.directory(&self.extended_contacts)?,
                budget,
            )),
            Arc::new(caller_id),
            Arc::new(cnap),
            Arc::new(spam),
            Arc::new(EmergencyLookup),
            Arc::new(SystemBlockedLookup::new(blocked)),
        ];
        Ok(CompositeLookup::new(lookups))
    }

    fn mutations(&self) -> MutationSet {
        let mut mutations = MutationSet::new();
        for row in &self.new_rows {
            mutations.insert(row.row_id, FieldPatch::for_number(self.parse(&row.number)));
        }
        for row_id in &self.deleted_rows {
            mutations.delete(*row_id);
        }
        mutations
    }
}

#[cfg(feature = "persistent")]
fn durable_history(
    args: &Args,
    config: &AnnotationConfig,
) -> Result<Option<Arc<dyn HistoryStore>>> {
    let Some(dir) = &args.history_dir else {
        return Ok(None);
    };
    let store = annotated_calllog::FileHistoryStore::open(dir, config.history.max_rows, None)
        .with_context(|| format!("opening history in {}", dir.display()))?;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "persistent"))]
fn durable_history(
    _args: &Args,
    _config: &AnnotationConfig,
) -> Result<Option<Arc<dyn HistoryStore>>> {
    Ok(None)
}

fn history_store(args: &Args, config: &AnnotationConfig) -> Result<Arc<dyn HistoryStore>> {
    match durable_history(args, config)? {
        Some(store) => Ok(store),
        None => Ok(Arc::new(InMemoryHistoryStore::with_max_rows(config.history.max_rows))),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnnotationConfig::load(path)?,
        None => AnnotationConfig::default(),
    };
    let json = std::fs::read_to_string(&args.fixture)
        .with_context(|| format!("reading fixture {}", args.fixture.display()))?;
    let fixture: Fixture = serde_json::from_str(&json).context("parsing fixture")?;

    let calllog = Arc::new(InMemoryCallLog::new());
    for row in &fixture.rows {
        calllog.add_row(row.row_id, fixture.parse(&row.number))?;
    }

    let engine = AnnotationEngine::new(
        fixture.lookups(&config)?,
        history_store(&args, &config)?,
        calllog.clone(),
    );
    let runtime = RefreshRuntime::new(engine, calllog.clone(), &config.runtime)?;

    let mut request = RefreshRequest::with_mutations(fixture.mutations());
    request.force = args.force;
    let outcome = runtime.refresh(request)?;
    info!(
        cycle_id = %outcome.cycle_id,
        skipped = outcome.skipped,
        "refresh finished"
    );

    let rows = calllog.snapshot()?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
