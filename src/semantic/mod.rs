//! Similarity search over product descriptions
//!
//! This module is the public entry point: [`SimilaritySearchService`] owns the
//! index lifecycle and [`ResultMapper`] turns raw hits into result records.

mod mapper;
mod service;

pub use mapper::{RecommendedProduct, ResultMapper, SearchResult};
pub use service::{IndexState, ServiceConfig, SharedBuildError, SimilaritySearchService};

/// Similarity threshold recommendations for AllMiniLML6V2
pub mod thresholds {
    /// Threshold for very similar products (same item, different wording)
    pub const VERY_SIMILAR: f32 = 0.75;

    /// Threshold for similar products (same category or purpose)
    pub const SIMILAR: f32 = 0.60;

    /// Threshold for somewhat related products
    pub const RELATED: f32 = 0.40;

    /// Default threshold: keep every result
    pub const DEFAULT: f32 = -1.0;
}
