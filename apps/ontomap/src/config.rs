//! # Deployment Configuration
//!
//! `ontomap.toml` layout:
//!
//! ```toml
//! [service]
//! base_namespace = "http://localhost/ontomap/"
//! default_page_size = 20
//! max_uri_attempts = 1000
//! # query_timeout_ms = 30000
//!
//! [triple_store]
//! backend = "embedded"
//! path = "ontomap-triples.redb"
//! # backend = "rdf4j"
//! # url = "http://localhost:8080/rdf4j-server"
//! # repository = "ontomap"
//!
//! [document_store]
//! path = "ontomap-documents.redb"
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use ontomap_core::{
    OntomapError, RedbDocumentStore, RedbTripleStore, Rdf4jConnection, ServiceConfig,
    SparqlService, StoreConnection, StoreError,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Maximum size of a config file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Written by `ontomap init`.
pub const DEFAULT_CONFIG: &str = r#"[service]
base_namespace = "http://localhost/ontomap/"
default_page_size = 20
max_uri_attempts = 1000

[triple_store]
backend = "embedded"
path = "ontomap-triples.redb"

[document_store]
path = "ontomap-documents.redb"
"#;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error on '{path}': {message}")]
    Io { path: PathBuf, message: String },

    #[error("Invalid configuration '{path}': {message}")]
    Config { path: PathBuf, message: String },

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Service(#[from] OntomapError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Document store error: {0}")]
    Document(#[from] ontomap_core::DocumentError),
}

impl AppError {
    pub fn io(path: &Path, error: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

// =============================================================================
// CONFIG TABLES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum TripleStoreConfig {
    Embedded { path: PathBuf },
    Rdf4j { url: String, repository: String },
}

impl Default for TripleStoreConfig {
    fn default() -> Self {
        Self::Embedded {
            path: PathBuf::from("ontomap-triples.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentStoreConfig {
    pub path: PathBuf,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ontomap-documents.redb"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub triple_store: TripleStoreConfig,
    pub document_store: DocumentStoreConfig,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub root: PathBuf,
}

/// The configured triple store, keeping the concrete type for `status`.
#[derive(Debug, Clone)]
pub enum Backend {
    Embedded(Arc<RedbTripleStore>),
    Rdf4j(Arc<Rdf4jConnection>),
}

impl Backend {
    pub fn connection(&self) -> Arc<dyn StoreConnection> {
        match self {
            Self::Embedded(store) => Arc::clone(store) as Arc<dyn StoreConnection>,
            Self::Rdf4j(connection) => Arc::clone(connection) as Arc<dyn StoreConnection>,
        }
    }
}

impl AppConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let metadata = std::fs::metadata(path).map_err(|e| AppError::Config {
            path: path.to_path_buf(),
            message: format!("{e} (run `ontomap init` to create one)"),
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(AppError::Config {
                path: path.to_path_buf(),
                message: format!("file exceeds {MAX_CONFIG_FILE_SIZE} bytes"),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&text, root).map_err(|message| AppError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    fn parse(text: &str, root: PathBuf) -> Result<Self, String> {
        let mut config: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        config.service.validate().map_err(|e| e.to_string())?;
        config.root = root;
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn triple_store_path(&self) -> Option<PathBuf> {
        match &self.triple_store {
            TripleStoreConfig::Embedded { path } => Some(self.resolve(path)),
            TripleStoreConfig::Rdf4j { .. } => None,
        }
    }

    pub fn document_store_path(&self) -> PathBuf {
        self.resolve(&self.document_store.path)
    }

    /// Open (or create) the configured triple store.
    pub fn backend(&self) -> Result<Backend, AppError> {
        let timeout = self.service.query_timeout();
        match &self.triple_store {
            TripleStoreConfig::Embedded { path } => {
                let store = RedbTripleStore::open(self.resolve(path))?.with_timeout(timeout);
                Ok(Backend::Embedded(Arc::new(store)))
            }
            TripleStoreConfig::Rdf4j { url, repository } => Ok(Backend::Rdf4j(Arc::new(
                Rdf4jConnection::new(url, repository, timeout)?,
            ))),
        }
    }

    pub fn service(&self, backend: &Backend) -> Result<SparqlService, AppError> {
        Ok(SparqlService::new(
            backend.connection(),
            self.service.clone(),
        )?)
    }

    pub fn documents(&self) -> Result<RedbDocumentStore, AppError> {
        Ok(RedbDocumentStore::open(self.document_store_path())?)
    }
}
