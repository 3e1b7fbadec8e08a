//! Product recommendations by nearest-neighbor search over description
//! embeddings.
//!
//! The entry point is [`SimilaritySearchService`]: give it a [`ProductStore`]
//! and an [`EmbeddingGenerator`], then call `search` or `similar_to_product`.
//! The index is built on first use and rebuilt wholesale by `refresh`.

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod semantic;
pub mod vector;

// Explicit exports for better API clarity
pub use catalog::{InMemoryProductStore, JsonCatalog, ProductRecord, ProductStore};
pub use config::Settings;
pub use error::{
    BuildError, BuildResult, CatalogError, CatalogResult, QueryResult, SearchError,
};
pub use semantic::{
    IndexState, RecommendedProduct, ResultMapper, SearchResult, ServiceConfig, SharedBuildError,
    SimilaritySearchService,
};
pub use vector::{
    EmbeddingGenerator, FastEmbedGenerator, HashingEmbedder, IndexBuilder, IndexMetadata,
    ProductId, VectorDimension, VectorError, VectorIndex,
};
