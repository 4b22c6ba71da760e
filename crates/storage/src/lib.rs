//! Storage backends for the collected service catalogue.
//!
//! The pipeline targets the [`Storage`] trait only. Both shipped backends, a
//! local directory tree and an S3-compatible bucket, share one store
//! implementation over a minimal [`vfs::Vfs`] capability set, since they use
//! the same file-based storage model.

use std::collections::BTreeMap;
use std::sync::Arc;

use models::Subsystem;

mod catalogue;
mod cleanup;
pub mod docstore;
pub mod fs;
pub mod history;
pub mod s3;
mod store;
pub mod vfs;

pub use docstore::HashIndex;
pub use store::Store;

/// Timestamp format shared by report names, history entries and status files.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const HISTORY_FILE_NAME: &str = "history.json";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("object store error: {0}")]
    ObjectStore(String),
    #[error("{0}")]
    Invalid(String),
}

/// The two document families a subsystem directory holds. Each has its own
/// sidecar hash index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    Wsdl,
    Openapi,
}

impl DocType {
    pub fn sidecar(&self) -> &'static str {
        match self {
            DocType::Wsdl => "_wsdl_hashes",
            DocType::Openapi => "_openapi_hashes",
        }
    }
}

/// Extension of a stored document. OpenAPI descriptions keep the extension of
/// the format they were served in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocExt {
    Wsdl,
    Yaml,
    Json,
}

impl DocExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocExt::Wsdl => "wsdl",
            DocExt::Yaml => "yaml",
            DocExt::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocExt::Wsdl => "text/xml",
            DocExt::Yaml => "text/yaml",
            DocExt::Json => "application/json",
        }
    }
}

/// Retention tunables used by the catalogue writer and cleanup.
#[derive(Debug, Clone)]
pub struct Retention {
    pub filtered_hours: i64,
    pub filtered_days: i64,
    pub filtered_months: i32,
    pub cleanup_interval: i64,
    pub days_to_keep: i64,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            filtered_hours: 24,
            filtered_days: 30,
            filtered_months: 12,
            cleanup_interval: 7,
            days_to_keep: 30,
        }
    }
}

/// The storage contract the pipeline consumes.
///
/// Any failing operation is logged, deactivates the backend and propagates
/// the error, so the caller can abort its subsystem while the remaining
/// workers drain the queue without doing further work.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Whether the backend is healthy.
    fn active(&self) -> bool;

    /// Mark the backend as usable.
    fn activate(&self);

    /// Mark the backend as failed. Idempotent.
    fn deactivate(&self);

    /// Ensure the subsystem directory exists and return its address together
    /// with the current filename-to-hash map for `doc_type`.
    async fn subsystem_state(
        &self,
        subsystem_path: &str,
        doc_type: DocType,
    ) -> Result<(String, HashIndex), Error>;

    /// Save a service description document unless an identical one is already
    /// stored. Returns the document filename and its hash; `hashes` is
    /// updated in place when a new file is written.
    async fn save_doc(
        &self,
        path: &str,
        hashes: &mut HashIndex,
        doc: &[u8],
        ext: DocExt,
        service_name: Option<&str>,
    ) -> Result<(String, String), Error>;

    /// Persist the sidecar hash index for `doc_type`.
    async fn save_subsystem_state(
        &self,
        path: &str,
        hashes: &HashIndex,
        doc_type: DocType,
    ) -> Result<(), Error>;

    /// Serialize a catalogue snapshot, update the history files and trigger
    /// cleanup when it is due.
    async fn save_catalogue(&self, results: &BTreeMap<String, Subsystem>) -> Result<(), Error>;
}

/// Instantiate the backend selected by `storage_plugin`. The whole
/// configuration mapping is passed through so each backend can read its own
/// keys.
pub async fn load(plugin: &str, config: &serde_yaml::Value) -> Result<Arc<dyn Storage>, Error> {
    tracing::info!(plugin, "loading storage backend");
    let storage: Arc<dyn Storage> = match plugin {
        "fs" => Arc::new(fs::open(config)?),
        "minio" | "s3" => Arc::new(s3::open(config).await?),
        other => {
            return Err(Error::Config(format!(
                "storage backend {other:?} is not available"
            )))
        }
    };
    storage.activate();
    tracing::info!(plugin, "storage backend ready");
    Ok(storage)
}
