//! Product catalog collaborator.
//!
//! The search service never owns product data. It reads a snapshot through
//! [`ProductStore::list_products`] once per build and resolves individual
//! products through [`ProductStore::find_product`].

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CatalogError, CatalogResult};
use crate::vector::ProductId;

/// A product as seen by the similarity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,

    /// Free text that gets embedded
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Comma separated tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl ProductRecord {
    pub fn new(id: impl Into<ProductId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            name: None,
            category: None,
            tags: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Read access to the product catalog.
pub trait ProductStore: Send + Sync {
    /// Snapshot of every product currently in the catalog.
    fn list_products(&self) -> CatalogResult<Vec<ProductRecord>>;

    /// Look up one product by id.
    fn find_product(&self, id: ProductId) -> CatalogResult<Option<ProductRecord>>;
}

/// Thread-safe in-memory catalog keyed by product id.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    products: RwLock<BTreeMap<ProductId, ProductRecord>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from a list, rejecting repeated ids.
    pub fn from_products(products: Vec<ProductRecord>) -> CatalogResult<Self> {
        let store = Self::new();
        store.replace_all(products)?;
        Ok(store)
    }

    /// Inserts or replaces one product, returning the previous record.
    pub fn upsert(&self, product: ProductRecord) -> Option<ProductRecord> {
        self.products.write().insert(product.id, product)
    }

    pub fn remove(&self, id: ProductId) -> Option<ProductRecord> {
        self.products.write().remove(&id)
    }

    /// Replaces the whole catalog. On a duplicate id nothing changes.
    pub fn replace_all(&self, products: Vec<ProductRecord>) -> CatalogResult<()> {
        let mut next = BTreeMap::new();
        for product in products {
            let id = product.id;
            if next.insert(id, product).is_some() {
                return Err(CatalogError::DuplicateId { id });
            }
        }
        *self.products.write() = next;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }
}

impl ProductStore for InMemoryProductStore {
    fn list_products(&self) -> CatalogResult<Vec<ProductRecord>> {
        Ok(self.products.read().values().cloned().collect())
    }

    fn find_product(&self, id: ProductId) -> CatalogResult<Option<ProductRecord>> {
        Ok(self.products.read().get(&id).cloned())
    }
}

/// Loader for catalogs stored as a JSON array of product objects.
///
/// ```json
/// [
///   {"id": 1, "name": "Trail Runner", "description": "Lightweight trail running shoes"},
///   {"id": 2, "description": "All-season car tires"}
/// ]
/// ```
pub struct JsonCatalog;

impl JsonCatalog {
    /// Reads and parses a catalog file into an in-memory store.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<InMemoryProductStore> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let products: Vec<ProductRecord> =
            serde_json::from_str(&json).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        info!(path = %path.display(), products = products.len(), "loaded product catalog");
        InMemoryProductStore::from_products(products)
    }

    /// Writes a catalog file in the format [`load`](Self::load) reads.
    pub fn save(path: impl AsRef<Path>, products: &[ProductRecord]) -> CatalogResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(products).map_err(|source| {
            CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        std::fs::write(path, json).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
