//! Converts raw index hits into result records.

use serde::Serialize;
use tracing::debug;

use crate::catalog::{ProductRecord, ProductStore};
use crate::error::CatalogResult;
use crate::vector::ProductId;

/// One ranked hit: a product id and its cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: ProductId,
    pub score: f32,
}

/// A search result joined with its catalog record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedProduct {
    #[serde(flatten)]
    pub product: ProductRecord,
    pub score: f32,
}

pub struct ResultMapper;

impl ResultMapper {
    /// Maps `(id, score)` hits to [`SearchResult`]s, keeping their order.
    ///
    /// Scores are clamped to `[-1, 1]`; normalized inner products can land a
    /// rounding error outside that range.
    pub fn map(hits: Vec<(ProductId, f32)>) -> Vec<SearchResult> {
        hits.into_iter()
            .map(|(id, score)| SearchResult {
                id,
                score: score.clamp(-1.0, 1.0),
            })
            .collect()
    }

    /// Attaches catalog records to results by direct id lookup.
    ///
    /// Products deleted from the catalog since the index was built are skipped.
    pub fn resolve(
        results: &[SearchResult],
        store: &dyn ProductStore,
    ) -> CatalogResult<Vec<RecommendedProduct>> {
        let mut resolved = Vec::with_capacity(results.len());
        for result in results {
            match store.find_product(result.id)? {
                Some(product) => resolved.push(RecommendedProduct {
                    product,
                    score: result.score,
                }),
                None => debug!(id = %result.id, "indexed product no longer in catalog"),
            }
        }
        Ok(resolved)
    }
}
