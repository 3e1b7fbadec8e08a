//! Exact inner-product index over normalized product embeddings.
//!
//! A [`VectorIndex`] is a flat index: every query scans all stored vectors.
//! Vectors are kept in one contiguous buffer (`entry_count * dimension`
//! floats) next to a parallel id column, and an `id -> slot` map gives direct
//! access to any entry by product id.
//!
//! The index is immutable once constructed. Replacing it means building a new
//! one, which is how the search service publishes new generations.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BuildError, BuildResult};
use crate::vector::{
    IndexMetadata, ProductId, VectorDimension, VectorError, dot_product, l2_normalize,
};

/// One stored vector tagged with its product id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: ProductId,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn new(id: ProductId, vector: Vec<f32>) -> Self {
        Self { id, vector }
    }
}

/// Identifier-mapped flat index.
#[derive(Debug)]
pub struct VectorIndex {
    ids: Vec<ProductId>,
    slots: HashMap<ProductId, usize>,
    vectors: Vec<f32>,
    dimension: VectorDimension,
    metadata: IndexMetadata,
}

impl VectorIndex {
    /// Assembles an index from raw embeddings.
    ///
    /// Every vector is L2-normalized before storage. The first entry fixes the
    /// dimension; any later entry with a different length, any repeated id and
    /// any zero vector fails the whole construction.
    pub fn from_entries(
        entries: Vec<IndexEntry>,
        model_name: &str,
        build_time: Duration,
    ) -> BuildResult<Self> {
        let first = entries.first().ok_or(BuildError::EmptyCorpus)?;
        let dimension = VectorDimension::new(first.vector.len())?;

        let mut ids = Vec::with_capacity(entries.len());
        let mut slots = HashMap::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len() * dimension.get());

        for entry in entries {
            if entry.vector.len() != dimension.get() {
                return Err(BuildError::DimensionMismatch {
                    id: entry.id,
                    expected: dimension.get(),
                    actual: entry.vector.len(),
                });
            }
            if slots.insert(entry.id, ids.len()).is_some() {
                return Err(BuildError::DuplicateId { id: entry.id });
            }
            vectors.extend(l2_normalize(&entry.vector)?);
            ids.push(entry.id);
        }

        let metadata = IndexMetadata::new(model_name, dimension.get(), ids.len(), build_time);

        Ok(Self {
            ids,
            slots,
            vectors,
            dimension,
            metadata,
        })
    }

    /// Stamps the generation number the index is published under.
    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.metadata.generation = generation;
        self
    }

    /// Returns the `k` stored entries with the highest inner product against
    /// `query`.
    ///
    /// The query is normalized here, so the scores are cosine similarities.
    /// `k` is clamped to the entry count. Results are ordered by descending
    /// score, ties by ascending product id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ProductId, f32)>, VectorError> {
        self.dimension.validate_vector(query)?;
        let query = l2_normalize(query)?;

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(ProductId, f32)> = self
            .ids
            .iter()
            .zip(self.vectors.chunks_exact(self.dimension.get()))
            .map(|(id, vector)| (*id, dot_product(vector, &query)))
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_unstable_by(rank_order);

        Ok(hits)
    }

    /// The normalized vector stored for `id`.
    #[must_use]
    pub fn get_vector(&self, id: ProductId) -> Option<&[f32]> {
        let slot = *self.slots.get(&id)?;
        let dim = self.dimension.get();
        self.vectors.get(slot * dim..(slot + 1) * dim)
    }

    #[must_use]
    pub fn contains(&self, id: ProductId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Product ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[ProductId] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.metadata.generation
    }
}

/// Descending score, then ascending id.
fn rank_order(a: &(ProductId, f32), b: &(ProductId, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}
