//! Builds index generations from a product catalog snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::catalog::ProductRecord;
use crate::error::{BuildError, BuildResult};
use crate::vector::{EmbeddingGenerator, IndexEntry, VectorError, VectorIndex};

/// Default number of descriptions sent to the embedding model per call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Turns `(id, description)` records into a [`VectorIndex`].
///
/// The builder holds no state besides its embedder handle; each call to
/// [`build`](Self::build) works on the snapshot it is given and nothing else.
#[derive(Clone)]
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingGenerator>,
    batch_size: usize,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("model", &self.embedder.model_name())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the embedding batch size. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embeds every description and assembles a new index.
    ///
    /// # Errors
    /// - [`BuildError::EmptyCorpus`] for an empty snapshot
    /// - [`BuildError::DuplicateId`] if an id repeats
    /// - [`BuildError::DimensionMismatch`] if the model changes output size
    /// - [`BuildError::Embedding`] for model failures, passed through unchanged
    pub fn build(&self, corpus: Vec<ProductRecord>) -> BuildResult<VectorIndex> {
        if corpus.is_empty() {
            return Err(BuildError::EmptyCorpus);
        }

        let started = Instant::now();
        let mut entries = Vec::with_capacity(corpus.len());

        for chunk in corpus.chunks(self.batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|p| p.description.as_str()).collect();
            let embeddings = self.embedder.generate_embeddings(&texts)?;

            if embeddings.len() != chunk.len() {
                return Err(BuildError::Embedding(VectorError::EmbeddingFailed(format!(
                    "model returned {} embeddings for {} texts",
                    embeddings.len(),
                    chunk.len()
                ))));
            }

            entries.extend(
                chunk
                    .iter()
                    .zip(embeddings)
                    .map(|(product, vector)| IndexEntry::new(product.id, vector)),
            );
            debug!(embedded = entries.len(), total = corpus.len(), "embedded batch");
        }

        VectorIndex::from_entries(entries, self.embedder.model_name(), started.elapsed())
    }

    /// Starts [`build`](Self::build) on a worker thread named `index-build`.
    pub fn spawn(&self, corpus: Vec<ProductRecord>) -> BuildResult<PendingBuild> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let builder = self.clone();
        let flag = Arc::clone(&running);

        thread::Builder::new()
            .name("index-build".to_string())
            .spawn(move || {
                let running = ClearOnDrop(flag);
                let result = builder.build(corpus);
                drop(running);
                // The receiver may already be gone if the service was dropped.
                let _ = tx.send(result);
            })
            .map_err(|e| {
                warn!(error = %e, "failed to spawn index build worker");
                BuildError::WorkerLost
            })?;

        Ok(PendingBuild {
            receiver: rx,
            running,
        })
    }

    /// Runs [`build`](Self::build) on a worker thread and gives up after
    /// `timeout`.
    ///
    /// On timeout the worker is left to finish on its own and its result is
    /// dropped. Use [`spawn`](Self::spawn) to keep hold of a slow build.
    pub fn build_with_timeout(
        &self,
        corpus: Vec<ProductRecord>,
        timeout: Duration,
    ) -> BuildResult<VectorIndex> {
        match self.spawn(corpus)?.wait(timeout) {
            BuildWait::Finished(result) => result,
            BuildWait::Running(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "index build timed out");
                Err(BuildError::Timeout { timeout })
            }
        }
    }
}

/// Clears the running flag even if the build panics.
struct ClearOnDrop(Arc<AtomicBool>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome of waiting on a [`PendingBuild`].
#[derive(Debug)]
pub enum BuildWait {
    Finished(BuildResult<VectorIndex>),
    /// The worker is still embedding; the handle is returned so it can be
    /// waited on again.
    Running(PendingBuild),
}

/// Handle to a build running on a worker thread.
#[derive(Debug)]
pub struct PendingBuild {
    receiver: Receiver<BuildResult<VectorIndex>>,
    running: Arc<AtomicBool>,
}

impl PendingBuild {
    /// Waits at most `timeout` for the worker's result.
    pub fn wait(self, timeout: Duration) -> BuildWait {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => BuildWait::Finished(result),
            Err(RecvTimeoutError::Timeout) => BuildWait::Running(self),
            Err(RecvTimeoutError::Disconnected) => {
                BuildWait::Finished(Err(BuildError::WorkerLost))
            }
        }
    }

    /// Blocks until the worker reports.
    pub fn join(self) -> BuildResult<VectorIndex> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(BuildError::WorkerLost))
    }

    /// Flag cleared by the worker once its build returns.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
