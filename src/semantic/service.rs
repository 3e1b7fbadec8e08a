//! Similarity search service: owns the index lifecycle.
//!
//! # Concurrency
//!
//! The published generation sits in an [`ArcSwapOption`]. Searches take a
//! cheap `Arc` handle to whatever generation is current and scan it without
//! holding any lock, so readers never wait on each other or on a running
//! build. A new generation becomes visible only once it is fully built.
//!
//! Builds run under `flight`, a mutex that serializes them. Lazy builds are
//! single-flight: a caller that finds no index records how many builds have
//! completed, takes the lock, and if a build finished while it waited it
//! adopts that outcome (the new index, or the shared error) instead of
//! starting another one.
//!
//! A build that outlives its timeout keeps running on its worker thread. Its
//! handle stays in `flight`, and the next build waits for it first, so at most
//! one build is ever embedding. A late success is published like any other.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::ProductStore;
use crate::error::{BuildError, QueryResult, SearchError};
use crate::semantic::{RecommendedProduct, ResultMapper, SearchResult};
use crate::vector::{
    BuildWait, DEFAULT_BATCH_SIZE, EmbeddingGenerator, IndexBuilder, IndexMetadata,
    PendingBuild, ProductId, VectorIndex,
};

/// Build failure shared by every caller that waited on the same build.
pub type SharedBuildError = Arc<BuildError>;

/// Lifecycle state of the service's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No generation has been published.
    Empty,
    /// A build is running. A previous generation may still be serving.
    Building,
    /// A generation is published and no build is running.
    Ready,
}

/// Tunables for index builds.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Descriptions per embedding call
    pub batch_size: usize,

    /// Upper bound on one build; `None` waits indefinitely
    pub build_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            build_timeout: None,
        }
    }
}

#[derive(Debug, Default)]
struct FlightState {
    last_failure: Option<SharedBuildError>,
    generation: u64,
    /// Worker of a build that timed out and has not been reaped yet
    straggler: Option<PendingBuild>,
}

/// Why a build was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildTrigger {
    /// No index is published; any complete index will do.
    Lazy,
    /// The caller wants an index of the current catalog.
    Refresh,
}

/// Resets the building flag on every exit path of a build.
struct BuildingGuard<'a>(&'a AtomicBool);

impl<'a> BuildingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Nearest-neighbor product search over an in-memory index.
///
/// Construct one per process and share it (it is `Send + Sync`). The index is
/// built lazily on the first search, or eagerly with
/// [`initialize`](Self::initialize), and rebuilt wholesale with
/// [`refresh`](Self::refresh).
pub struct SimilaritySearchService {
    store: Arc<dyn ProductStore>,
    embedder: Arc<dyn EmbeddingGenerator>,
    builder: IndexBuilder,
    build_timeout: Option<Duration>,

    current: ArcSwapOption<VectorIndex>,
    flight: Mutex<FlightState>,
    building: AtomicBool,

    /// Running flag of a timed-out worker, readable without the build lock
    straggler_running: ArcSwapOption<AtomicBool>,

    /// Builds that have finished, successfully or not
    completed_builds: AtomicU64,

    /// Builds that have started
    builds_executed: AtomicU64,
}

impl std::fmt::Debug for SimilaritySearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilaritySearchService")
            .field("state", &self.state())
            .field("entries", &self.entry_count())
            .field("model", &self.embedder.model_name())
            .field("build_timeout", &self.build_timeout)
            .finish()
    }
}

impl SimilaritySearchService {
    /// Create a service with default build settings.
    pub fn new(store: Arc<dyn ProductStore>, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self::with_config(store, embedder, ServiceConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ProductStore>,
        embedder: Arc<dyn EmbeddingGenerator>,
        config: ServiceConfig,
    ) -> Self {
        let builder = IndexBuilder::new(Arc::clone(&embedder)).with_batch_size(config.batch_size);
        Self {
            store,
            embedder,
            builder,
            build_timeout: config.build_timeout,
            current: ArcSwapOption::empty(),
            flight: Mutex::new(FlightState::default()),
            building: AtomicBool::new(false),
            straggler_running: ArcSwapOption::empty(),
            completed_builds: AtomicU64::new(0),
            builds_executed: AtomicU64::new(0),
        }
    }

    /// Builds the index if none is published.
    ///
    /// If another caller is already building, waits for that build and returns
    /// its outcome. On failure the service stays `Empty` and a later call may
    /// retry.
    pub fn initialize(&self) -> Result<(), SharedBuildError> {
        self.ensure_ready().map(|_| ())
    }

    /// Rebuilds the index from the current catalog.
    ///
    /// On success the new generation replaces the old one atomically. On
    /// failure the old generation, if any, keeps serving and the error is
    /// returned.
    pub fn refresh(&self) -> Result<(), SharedBuildError> {
        let mut flight = self.flight.lock();
        self.run_build(&mut flight, BuildTrigger::Refresh).map(|_| ())
    }

    /// Returns up to `top_k` products most similar to `query`.
    ///
    /// Builds the index first if none is published. `top_k <= 0` yields no
    /// results; larger values are clamped to the number of indexed products.
    ///
    /// # Errors
    /// - [`SearchError::InvalidQuery`] for blank queries, before any build
    /// - [`SearchError::IndexUnavailable`] if the triggered build failed
    /// - [`SearchError::Embedding`] if the query cannot be embedded
    pub fn search(&self, query: &str, top_k: i64) -> QueryResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery);
        }

        let index = self
            .ensure_ready()
            .map_err(|source| SearchError::IndexUnavailable { source })?;

        if top_k <= 0 {
            return Ok(Vec::new());
        }
        let k = usize::try_from(top_k).unwrap_or(usize::MAX).min(index.len());

        let query_vector = self.embedder.embed(query)?;
        let hits = index.search(&query_vector, k)?;

        debug!(
            generation = index.generation(),
            top_k = k,
            hits = hits.len(),
            "search completed"
        );
        Ok(ResultMapper::map(hits))
    }

    /// Like [`search`](Self::search), dropping results scoring below
    /// `min_score`.
    pub fn search_with_threshold(
        &self,
        query: &str,
        top_k: i64,
        min_score: f32,
    ) -> QueryResult<Vec<SearchResult>> {
        let results = self.search(query, top_k)?;
        Ok(results
            .into_iter()
            .filter(|result| result.score >= min_score)
            .collect())
    }

    /// Searches and joins each hit with its catalog record.
    pub fn recommend(&self, query: &str, top_k: i64) -> QueryResult<Vec<RecommendedProduct>> {
        let results = self.search(query, top_k)?;
        self.resolve(&results)
    }

    /// Joins search results with their catalog records, skipping products
    /// removed since the index was built.
    pub fn resolve(&self, results: &[SearchResult]) -> QueryResult<Vec<RecommendedProduct>> {
        Ok(ResultMapper::resolve(results, self.store.as_ref())?)
    }

    /// Products most similar to the product with `id`, excluding itself.
    ///
    /// The product's own description is used as the query.
    pub fn similar_to_product(&self, id: ProductId, top_k: i64) -> QueryResult<Vec<SearchResult>> {
        let product = self
            .store
            .find_product(id)?
            .ok_or(SearchError::ProductNotFound { id })?;

        if top_k <= 0 {
            return Ok(Vec::new());
        }

        let results = self.search(&product.description, top_k.saturating_add(1))?;
        Ok(results
            .into_iter()
            .filter(|result| result.id != id)
            .take(usize::try_from(top_k).unwrap_or(usize::MAX))
            .collect())
    }

    /// Unpublishes the current generation and returns to `Empty`.
    ///
    /// Searches already holding the old generation finish against it; its
    /// memory is freed when the last of them drops its handle.
    pub fn teardown(&self) {
        let mut flight = self.flight.lock();
        if let Some(index) = self.current.swap(None) {
            info!(generation = index.generation(), "index torn down");
        }
        flight.last_failure = None;
    }

    pub fn state(&self) -> IndexState {
        let straggling = self
            .straggler_running
            .load()
            .as_ref()
            .is_some_and(|running| running.load(Ordering::Acquire));

        if straggling || self.building.load(Ordering::Acquire) {
            IndexState::Building
        } else if self.current.load().is_some() {
            IndexState::Ready
        } else {
            IndexState::Empty
        }
    }

    /// Metadata of the published generation.
    pub fn metadata(&self) -> Option<IndexMetadata> {
        self.current
            .load()
            .as_ref()
            .map(|index| index.metadata().clone())
    }

    /// Number of products in the published generation, 0 when `Empty`.
    pub fn entry_count(&self) -> usize {
        self.current.load().as_ref().map_or(0, |index| index.len())
    }

    /// Number of builds started since the service was created.
    pub fn build_count(&self) -> u64 {
        self.builds_executed.load(Ordering::Acquire)
    }

    /// Handle to the published generation, if any.
    pub fn current_index(&self) -> Option<Arc<VectorIndex>> {
        self.current.load_full()
    }

    fn ensure_ready(&self) -> Result<Arc<VectorIndex>, SharedBuildError> {
        let observed = self.completed_builds.load(Ordering::Acquire);
        if let Some(index) = self.current.load_full() {
            return Ok(index);
        }

        let mut flight = self.flight.lock();

        if let Some(index) = self.current.load_full() {
            debug!(generation = index.generation(), "adopted index built by another caller");
            return Ok(index);
        }
        if self.completed_builds.load(Ordering::Acquire) != observed {
            if let Some(error) = &flight.last_failure {
                debug!(error = %error, "adopted failed build from another caller");
                return Err(Arc::clone(error));
            }
        }

        self.run_build(&mut flight, BuildTrigger::Lazy)
    }

    /// Runs one build. The caller holds the build lock.
    fn run_build(
        &self,
        flight: &mut FlightState,
        trigger: BuildTrigger,
    ) -> Result<Arc<VectorIndex>, SharedBuildError> {
        let _building = BuildingGuard::enter(&self.building);

        if let Some(pending) = flight.straggler.take() {
            match self.wait_for_straggler(pending) {
                BuildWait::Running(pending) => {
                    self.park_straggler(flight, pending);
                    let timeout = self.build_timeout.unwrap_or_default();
                    return self.conclude(flight, Err(BuildError::Timeout { timeout }));
                }
                BuildWait::Finished(Ok(index)) => {
                    self.straggler_running.store(None);
                    info!("timed-out build finished late");
                    let published = self.publish(flight, index);
                    if trigger == BuildTrigger::Lazy {
                        self.completed_builds.fetch_add(1, Ordering::AcqRel);
                        return Ok(published);
                    }
                }
                BuildWait::Finished(Err(error)) => {
                    self.straggler_running.store(None);
                    debug!(error = %error, "timed-out build failed late, discarding");
                }
            }
        }

        self.builds_executed.fetch_add(1, Ordering::AcqRel);
        info!(model = self.embedder.model_name(), "building similarity index");

        let result = self
            .store
            .list_products()
            .map_err(BuildError::from)
            .and_then(|corpus| match self.build_timeout {
                Some(timeout) => match self.builder.spawn(corpus)?.wait(timeout) {
                    BuildWait::Finished(result) => result,
                    BuildWait::Running(pending) => {
                        warn!(timeout_ms = timeout.as_millis() as u64, "index build timed out");
                        self.park_straggler(flight, pending);
                        Err(BuildError::Timeout { timeout })
                    }
                },
                None => self.builder.build(corpus),
            });

        self.conclude(flight, result)
    }

    fn wait_for_straggler(&self, pending: PendingBuild) -> BuildWait {
        debug!("waiting for timed-out build to finish");
        match self.build_timeout {
            Some(timeout) => pending.wait(timeout),
            None => BuildWait::Finished(pending.join()),
        }
    }

    fn park_straggler(&self, flight: &mut FlightState, pending: PendingBuild) {
        self.straggler_running.store(Some(pending.running_flag()));
        flight.straggler = Some(pending);
    }

    /// Publishes a successful build or records a failure, then counts the
    /// build as completed.
    fn conclude(
        &self,
        flight: &mut FlightState,
        result: Result<VectorIndex, BuildError>,
    ) -> Result<Arc<VectorIndex>, SharedBuildError> {
        let outcome = match result {
            Ok(index) => Ok(self.publish(flight, index)),
            Err(error) => {
                let error = Arc::new(error);
                match self.current.load().as_ref() {
                    Some(previous) => warn!(
                        error = %error,
                        generation = previous.generation(),
                        "index build failed, keeping previous generation"
                    ),
                    None => warn!(error = %error, "index build failed"),
                }
                flight.last_failure = Some(Arc::clone(&error));
                Err(error)
            }
        };

        self.completed_builds.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    fn publish(&self, flight: &mut FlightState, index: VectorIndex) -> Arc<VectorIndex> {
        flight.generation += 1;
        let index = Arc::new(index.with_generation(flight.generation));
        self.current.store(Some(Arc::clone(&index)));
        flight.last_failure = None;

        let metadata = index.metadata();
        info!(
            generation = metadata.generation,
            entries = metadata.entry_count,
            dimension = metadata.dimension,
            elapsed_ms = metadata.build_millis,
            "published similarity index"
        );
        index
    }
}
