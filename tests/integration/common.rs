//! Shared fixtures for the integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use prodsim::{
    CatalogError, CatalogResult, EmbeddingGenerator, HashingEmbedder, InMemoryProductStore,
    ProductId, ProductRecord, ProductStore, VectorDimension, VectorError,
};

/// Embeds text onto fixed keyword axes so expected rankings are easy to
/// derive by hand.
///
/// Axis 0 is "red", axis 1 is "blue", axis 2 is footwear, axis 3 is car
/// parts. Every component starts at 0.1 so no text embeds to zero.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    const AXES: &'static [(&'static [&'static str], usize)] = &[
        (&["red"], 0),
        (&["blue"], 1),
        (&["shoes", "sneakers", "boots"], 2),
        (&["car", "tires", "wheels"], 3),
    ];
}

impl EmbeddingGenerator for KeywordEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut embedding = vec![0.1; 6];
                for word in text.to_lowercase().split_whitespace() {
                    for (words, axis) in Self::AXES {
                        if words.contains(&word) {
                            embedding[*axis] += 1.0;
                        }
                    }
                }
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(6).unwrap()
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

/// Wraps another embedder and sleeps before every batch.
pub struct SlowEmbedder<E> {
    pub inner: E,
    pub delay: Duration,
}

impl<E: EmbeddingGenerator> EmbeddingGenerator for SlowEmbedder<E> {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        std::thread::sleep(self.delay);
        self.inner.generate_embeddings(texts)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Slow embedder that records how many calls overlap.
pub struct OverlapTrackingEmbedder {
    pub inner: HashingEmbedder,
    pub delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl OverlapTrackingEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: HashingEmbedder::default(),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Largest number of embedding calls seen running at once.
    pub fn max_overlap(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl EmbeddingGenerator for OverlapTrackingEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.generate_embeddings(texts)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Embedder whose model is broken: every call fails after `delay`.
pub struct FailingEmbedder {
    pub delay: Duration,
}

impl EmbeddingGenerator for FailingEmbedder {
    fn generate_embeddings(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        std::thread::sleep(self.delay);
        Err(VectorError::EmbeddingFailed("model unavailable".to_string()))
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(6).unwrap()
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Catalog wrapper that counts snapshots and can be switched into failure.
#[derive(Default)]
pub struct ScriptedStore {
    pub inner: InMemoryProductStore,
    pub list_calls: AtomicUsize,
    pub failing: AtomicBool,
}

impl ScriptedStore {
    pub fn with_products(products: Vec<ProductRecord>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryProductStore::from_products(products).unwrap(),
            ..Self::default()
        })
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ProductStore for ScriptedStore {
    fn list_products(&self) -> CatalogResult<Vec<ProductRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Backend("catalog offline".to_string()));
        }
        self.inner.list_products()
    }

    fn find_product(&self, id: ProductId) -> CatalogResult<Option<ProductRecord>> {
        self.inner.find_product(id)
    }
}

/// The three-product catalog used by the worked example.
pub fn shoe_catalog() -> Vec<ProductRecord> {
    vec![
        ProductRecord::new(1, "red shoes").with_name("Red Shoes"),
        ProductRecord::new(2, "blue shoes").with_name("Blue Shoes"),
        ProductRecord::new(3, "car tires").with_name("Car Tires"),
    ]
}

/// A catalog with distinct wording for the hashing embedder.
pub fn mixed_catalog() -> Vec<ProductRecord> {
    vec![
        ProductRecord::new(10, "Lightweight trail running shoes with grippy soles"),
        ProductRecord::new(11, "Waterproof leather hiking boots"),
        ProductRecord::new(12, "All-season radial car tires"),
        ProductRecord::new(13, "Noise cancelling over-ear headphones"),
        ProductRecord::new(14, "Paperback strategy guide for chess openings"),
        ProductRecord::new(15, "Stainless steel insulated water bottle"),
        ProductRecord::new(16, "Cotton crew neck t-shirt in navy"),
    ]
}
