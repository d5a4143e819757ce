use std::sync::Arc;
use parking_lot::Mutex;
use tracing::info;
use crate::analysis::Tokenize;
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::Etag;
use crate::mvcc::controller::SegmentArena;
use crate::query::ast::Query;
use crate::query::parser;
use crate::reader::term_reader::TermReader;
use crate::search::facet::FacetResults;
use crate::search::facet_setup::{FacetSetup, FacetSetupStore, FacetSource};
use crate::search::searcher::Searcher;
use crate::storage::commit_point::{CommitPoint, CommitPointStore};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::recovery::{DocumentSource, RecoveryManager, RecoveryReport};
use crate::storage::segment_writer::SegmentWriter;
use crate::writer::batch::Batch;
use crate::writer::index_writer::{ApplyOutcome, FlushOutcome, IndexWriter};

/// One index directory, opened for reading and writing
///
/// Opening takes the directory lock and runs recovery; the index serves
/// nothing until recovery reached `Ready`.
pub struct Index {
    config: Config,
    layout: StorageLayout,
    arena: Arc<SegmentArena>,
    writer: Mutex<IndexWriter>,
    commit_points: CommitPointStore,
    facet_setups: FacetSetupStore,
    tokenize: Tokenize,
    recovery: RecoveryReport,
    _lock: FileLock,
}

impl Index {
    pub fn open(config: Config, tokenize: Tokenize, source: &dyn DocumentSource) -> Result<Self> {
        Self::open_with_clock(config, tokenize, Arc::new(SystemClock), source)
    }

    pub fn open_with_clock(
        config: Config,
        tokenize: Tokenize,
        clock: Arc<dyn Clock>,
        source: &dyn DocumentSource,
    ) -> Result<Self> {
        let layout = StorageLayout::new(config.storage_path.clone())?;
        let lock = FileLock::acquire(&layout)?;
        info!(path = %layout.base_dir.display(), "Opening index");

        let mut recovery = RecoveryManager::new(layout.clone());
        let segment = recovery.restore()?;

        let arena = Arc::new(SegmentArena::new(layout.clone(), segment));
        let commit_points = CommitPointStore::open(
            layout.clone(),
            arena.clone(),
            clock.clone(),
            config.max_stored_commit_points,
        )?;
        arena.sweep_unreferenced()?;

        let mut writer = IndexWriter::new(
            config.clone(),
            arena.clone(),
            commit_points.clone(),
            SegmentWriter::new(layout.clone()),
            tokenize.clone(),
            clock,
        )?;
        writer.raise_generation_floor(recovery.highest_generation());
        recovery.replay(&mut writer, source, config.replay_batch_size)?;
        let report = recovery.finish();

        info!(
            generation = arena.generation(),
            etag = writer.last_etag(),
            restored = report.restored(),
            replayed = report.replayed_changes,
            "Index ready"
        );

        Ok(Index {
            facet_setups: FacetSetupStore::new(&layout),
            tokenize,
            config,
            layout,
            arena,
            writer: Mutex::new(writer),
            commit_points,
            recovery: report,
            _lock: lock,
        })
    }

    pub fn apply(&self, batch: Batch, source_etag: Etag) -> Result<ApplyOutcome> {
        self.writer.lock().apply(batch, source_etag)
    }

    pub fn flush(&self) -> Result<FlushOutcome> {
        self.writer.lock().flush()
    }

    /// Run the time-driven commit point policy
    pub fn maintain(&self) -> Result<Option<CommitPoint>> {
        self.writer.lock().maintain()
    }

    pub fn compact(&self) -> Result<FlushOutcome> {
        self.writer.lock().compact()
    }

    /// Searcher pinned to the newest flushed generation
    pub fn searcher(&self) -> Searcher {
        Searcher::new(self.arena.acquire_reader())
    }

    pub fn term_reader(&self) -> TermReader {
        TermReader::new(self.arena.acquire_reader(), self.config.max_entries_for_debug_read)
    }

    /// Run a query as given: values must equal indexed terms exactly
    pub fn query(&self, query: &Query, max_results: usize) -> Result<Vec<String>> {
        self.searcher().search(query, max_results)
    }

    /// Parse and run a text query such as `Name:arek OR Name:oren`. Values
    /// go through the index analyzer first, so `Name:Arek` finds a name
    /// indexed as `arek`.
    pub fn query_text(&self, text: &str, max_results: usize) -> Result<Vec<String>> {
        let query = parser::parse(text)?.analyze(&self.tokenize)?;
        self.query(&query, max_results)
    }

    pub fn aggregate(&self, query: &Query, facets: FacetSource) -> Result<FacetResults> {
        let definitions = self.facet_setups.resolve(facets)?;
        self.searcher().aggregate(query, &definitions)
    }

    pub fn save_facet_setup(&self, setup: &FacetSetup) -> Result<()> {
        self.facet_setups.save(setup)
    }

    pub fn facet_setups(&self) -> &FacetSetupStore {
        &self.facet_setups
    }

    /// Stored commit points, newest last
    pub fn commit_points(&self) -> Result<Vec<CommitPoint>> {
        self.commit_points.list()
    }

    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Newest flushed generation
    pub fn generation(&self) -> u64 {
        self.arena.generation()
    }

    /// Highest etag applied, including changes not yet flushed
    pub fn last_processed_etag(&self) -> Etag {
        self.writer.lock().last_etag()
    }

    /// Highest etag reflected by the newest flushed generation
    pub fn durable_etag(&self) -> Etag {
        self.arena.current().last_etag
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
