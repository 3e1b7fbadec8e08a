//! Configuration for the product similarity service.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PS_` and use double underscores
//! to separate nested levels:
//! - `PS_EMBEDDING__MODEL=hashing` sets `embedding.model`
//! - `PS_SEARCH__BUILD_TIMEOUT_MS=5000` sets `search.build_timeout_ms`
//! - `PS_LOGGING__LEVEL=debug` sets `logging.level`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::semantic::ServiceConfig;
use crate::vector::{DEFAULT_BATCH_SIZE, FASTEMBED_MODEL_NAME, VECTOR_DIMENSION_384};

/// Directory holding the settings file and the model cache.
pub const CONFIG_DIR: &str = ".prodsim";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PS_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Search and index build settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Product catalog location
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Model to use: "AllMiniLML6V2" or "hashing"
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Output dimension of the hashing embedder
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Descriptions per embedding call during a build
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Where downloaded model files are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Show a progress bar while downloading the model
    #[serde(default = "default_false")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Results returned when the caller does not ask for a count
    #[serde(default = "default_top_k")]
    pub default_top_k: i64,

    /// Minimum similarity for returned results
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,

    /// Upper bound on one index build in milliseconds, 0 disables the bound
    #[serde(default = "default_build_timeout_ms")]
    pub build_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CatalogConfig {
    /// JSON file with the product list
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include module targets in log lines
    #[serde(default = "default_false")]
    pub show_target: bool,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    FASTEMBED_MODEL_NAME.to_string()
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_384
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("models")
}
fn default_top_k() -> i64 {
    5
}
fn default_similarity_threshold() -> f32 {
    crate::semantic::thresholds::DEFAULT
}
fn default_build_timeout_ms() -> u64 {
    120_000
}
fn default_catalog_path() -> PathBuf {
    PathBuf::from("products.json")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            catalog: CatalogConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            cache_dir: default_cache_dir(),
            show_download_progress: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            threshold: default_similarity_threshold(),
            build_timeout_ms: default_build_timeout_ms(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_target: false,
        }
    }
}

impl SearchConfig {
    /// Build timeout, `None` when disabled.
    pub fn build_timeout(&self) -> Option<Duration> {
        (self.build_timeout_ms > 0).then(|| Duration::from_millis(self.build_timeout_ms))
    }
}

impl Settings {
    /// Load configuration from all sources
    ///
    /// Looks for `.prodsim/settings.toml` in the current directory and its
    /// ancestors; a missing file just means defaults plus environment.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscores
            // stay part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.prodsim` directory from the
    /// current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Build settings for the search service.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            batch_size: self.embedding.batch_size,
            build_timeout: self.search.build_timeout(),
        }
    }
}
