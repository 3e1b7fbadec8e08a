//! Error types for the product similarity service
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::vector::{ProductId, VectorError};

/// Errors raised while building a new index generation
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Cannot build an index from an empty product catalog\nSuggestion: Load products into the catalog before searching")]
    EmptyCorpus,

    #[error("Product {id} appears more than once in the catalog snapshot")]
    DuplicateId { id: ProductId },

    #[error(
        "Embedding for product {id} has dimension {actual}, expected {expected}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch {
        id: ProductId,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to embed product descriptions: {0}")]
    Embedding(#[from] VectorError),

    #[error("Failed to read the product catalog: {0}")]
    Store(#[from] CatalogError),

    #[error("Index build did not finish within {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },

    #[error("Index build worker exited without reporting a result")]
    WorkerLost,
}

impl BuildError {
    /// Get a stable status code for this error type.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::EmptyCorpus => "EMPTY_CORPUS",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Timeout { .. } => "BUILD_TIMEOUT",
            Self::WorkerLost => "BUILD_WORKER_LOST",
        }
    }

    /// Whether retrying the same build later may succeed.
    ///
    /// Catalog contents and model behaviour can change between attempts, so
    /// only contract violations inside one snapshot are treated as permanent.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::DuplicateId { .. })
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::EmptyCorpus => vec![
                "Check that the catalog path points at a non-empty product list",
                "Retry once products have been loaded",
            ],
            Self::DuplicateId { .. } => {
                vec!["Remove or renumber the duplicated product in the catalog"]
            }
            Self::DimensionMismatch { .. } => vec![
                "The embedding model returned vectors of different sizes",
                "Check the embedding model configuration",
            ],
            Self::Timeout { .. } => vec![
                "Increase search.build_timeout_ms",
                "Reduce embedding.batch_size or the catalog size",
            ],
            Self::Embedding(_) => vec!["Verify the embedding model is downloaded and loadable"],
            Self::Store(_) | Self::WorkerLost => vec!["Try the operation again"],
        }
    }
}

/// Errors returned by search operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search query cannot be empty")]
    InvalidQuery,

    #[error("Search index is unavailable: {source}")]
    IndexUnavailable {
        #[source]
        source: Arc<BuildError>,
    },

    #[error("Failed to embed search query: {0}")]
    Embedding(#[from] VectorError),

    #[error("Product {id} not found in the catalog")]
    ProductNotFound { id: ProductId },

    #[error("Failed to read the product catalog: {0}")]
    Store(#[from] CatalogError),
}

impl SearchError {
    /// Get a stable status code for this error type.
    ///
    /// Callers exposing the service over a network map these onto their own
    /// response classes.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "BAD_REQUEST",
            Self::IndexUnavailable { .. } | Self::Store(_) => "SERVICE_UNAVAILABLE",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::ProductNotFound { .. } => "NOT_FOUND",
        }
    }

    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::IndexUnavailable { source } => source.is_retryable(),
            Self::Store(_) => true,
            Self::InvalidQuery | Self::Embedding(_) | Self::ProductNotFound { .. } => false,
        }
    }

    /// The build failure behind an unavailable index, if any.
    pub fn build_error(&self) -> Option<&BuildError> {
        match self {
            Self::IndexUnavailable { source } => Some(source),
            _ => None,
        }
    }
}

/// Errors from the product catalog collaborator
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse catalog file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Product {id} is defined more than once in the catalog")]
    DuplicateId { id: ProductId },

    #[error("Catalog backend error: {0}")]
    Backend(String),
}

/// Result type alias for build operations
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type alias for search operations
pub type QueryResult<T> = Result<T, SearchError>;

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
