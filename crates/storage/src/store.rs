//! Generic store implementing the [`Storage`] contract over a [`Vfs`].
//! Both concrete backends use the same file-based storage model; everything
//! except raw I/O lives here.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use models::Subsystem;
use serde::Serialize;

use crate::docstore::{self, HashIndex, Placement};
use crate::vfs::{join, Vfs};
use crate::{catalogue, DocExt, DocType, Error, Retention, Storage};

pub struct Store<V> {
    pub(crate) vfs: V,
    pub(crate) instance: String,
    pub(crate) retention: Retention,
    active: AtomicBool,
}

impl<V: Vfs> Store<V> {
    pub fn new(vfs: V, instance: String, retention: Retention) -> Self {
        Self {
            vfs,
            instance,
            retention,
            active: AtomicBool::new(false),
        }
    }

    /// Log the failure, mark the backend inactive and pass the error on.
    fn fail(&self, err: Error) -> Error {
        tracing::warn!(error = %err, "storage backend failed");
        self.deactivate();
        err
    }

    pub(crate) async fn write_json<T: Serialize>(&self, path: &str, data: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(data).map_err(|source| Error::Json {
            path: path.to_string(),
            source,
        })?;
        self.vfs.put(path, &bytes, "application/json").await
    }

    /// Read the sidecar hash index; a missing or unreadable sidecar is
    /// rebuilt by rescanning the directory, a malformed one is an error.
    async fn load_hashes(&self, path: &str, doc_type: DocType) -> Result<HashIndex, Error> {
        let sidecar = join(path, doc_type.sidecar());
        match self.vfs.get(&sidecar).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| Error::Json {
                path: sidecar,
                source,
            }),
            Err(_) => self.hash_docs(path, doc_type).await,
        }
    }

    /// Hash every document of `doc_type` in the directory.
    pub(crate) async fn hash_docs(&self, path: &str, doc_type: DocType) -> Result<HashIndex, Error> {
        let mut hashes = HashIndex::new();
        for file_name in self.vfs.list(path).await? {
            if !docstore::matches_doc(&file_name, doc_type) {
                continue;
            }
            let doc = self.vfs.get(&join(path, &file_name)).await?;
            hashes.insert(file_name, docstore::md5_hex(&doc));
        }
        Ok(hashes)
    }

    async fn subsystem_state_inner(
        &self,
        subsystem_path: &str,
        doc_type: DocType,
    ) -> Result<(String, HashIndex), Error> {
        self.vfs.ensure_dir(subsystem_path).await?;
        let hashes = self.load_hashes(subsystem_path, doc_type).await?;
        Ok((subsystem_path.to_string(), hashes))
    }

    async fn save_doc_inner(
        &self,
        path: &str,
        hashes: &mut HashIndex,
        doc: &[u8],
        ext: DocExt,
        service_name: Option<&str>,
    ) -> Result<(String, String), Error> {
        let doc_hash = docstore::md5_hex(doc);
        match docstore::place(hashes, &doc_hash, ext, service_name)? {
            Placement::Existing(file_name) => Ok((file_name, doc_hash)),
            Placement::New(file_name) => {
                self.vfs
                    .put(&join(path, &file_name), doc, ext.content_type())
                    .await?;
                hashes.insert(file_name.clone(), doc_hash.clone());
                Ok((file_name, doc_hash))
            }
        }
    }

    async fn save_subsystem_state_inner(
        &self,
        path: &str,
        hashes: &HashIndex,
        doc_type: DocType,
    ) -> Result<(), Error> {
        self.write_json(&join(path, doc_type.sidecar()), hashes).await
    }
}

#[async_trait::async_trait]
impl<V: Vfs> Storage for Store<V> {
    fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn activate(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    async fn subsystem_state(
        &self,
        subsystem_path: &str,
        doc_type: DocType,
    ) -> Result<(String, HashIndex), Error> {
        self.subsystem_state_inner(subsystem_path, doc_type)
            .await
            .map_err(|err| self.fail(err))
    }

    async fn save_doc(
        &self,
        path: &str,
        hashes: &mut HashIndex,
        doc: &[u8],
        ext: DocExt,
        service_name: Option<&str>,
    ) -> Result<(String, String), Error> {
        self.save_doc_inner(path, hashes, doc, ext, service_name)
            .await
            .map_err(|err| self.fail(err))
    }

    async fn save_subsystem_state(
        &self,
        path: &str,
        hashes: &HashIndex,
        doc_type: DocType,
    ) -> Result<(), Error> {
        self.save_subsystem_state_inner(path, hashes, doc_type)
            .await
            .map_err(|err| self.fail(err))
    }

    async fn save_catalogue(&self, results: &BTreeMap<String, Subsystem>) -> Result<(), Error> {
        catalogue::save(self, results)
            .await
            .map_err(|err| self.fail(err))
    }
}
