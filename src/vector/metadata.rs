//! Metadata describing one index generation.
//!
//! Generations are never persisted, so this is purely descriptive: it lets
//! callers see which model built the published index, how large it is and
//! when it was swapped in.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Metadata for a built index generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Name of the embedding model used
    pub model_name: String,

    /// Dimension of embeddings
    pub dimension: usize,

    /// Number of products indexed
    pub entry_count: usize,

    /// Monotonic generation number, assigned when the index is published
    pub generation: u64,

    /// Unix timestamp when the build finished
    pub built_at: u64,

    /// Wall time spent embedding and assembling the index
    pub build_millis: u64,
}

impl IndexMetadata {
    /// Create metadata stamped with the current time
    pub fn new(
        model_name: impl Into<String>,
        dimension: usize,
        entry_count: usize,
        build_time: Duration,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
            entry_count,
            generation: 0,
            built_at: unix_timestamp(),
            build_millis: build_time.as_millis() as u64,
        }
    }
}

/// Seconds since the Unix epoch, or 0 if the clock is before it.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
