//! Vector embedding and exact nearest-neighbor search.
//!
//! Product descriptions are embedded, L2-normalized and stored in a flat
//! identifier-mapped index. Queries are scored by inner product, which equals
//! cosine similarity because both sides are unit length.

mod builder;
mod embedding;
mod index;
mod math;
mod metadata;
mod types;

pub use builder::{BuildWait, DEFAULT_BATCH_SIZE, IndexBuilder, PendingBuild};
#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{
    EmbeddingGenerator, FASTEMBED_MODEL_NAME, FastEmbedGenerator, HASHING_MODEL_NAME,
    HashingEmbedder, create_generator,
};
pub use index::{IndexEntry, VectorIndex};
pub use math::{cosine_similarity, dot_product, l2_normalize};
pub use metadata::{IndexMetadata, unix_timestamp};
pub use types::{ProductId, VECTOR_DIMENSION_384, VectorDimension, VectorError};
