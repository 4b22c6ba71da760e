//! Minimal virtual-filesystem capability set shared by the storage backends.
//!
//! Paths are `/`-separated and relative to the store root; the backend maps
//! them onto its own addressing (directory tree or object keys).

use crate::Error;

/// Join two relative path components, tolerating empty prefixes.
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

#[async_trait::async_trait]
pub trait Vfs: Send + Sync + 'static {
    /// Names of the files directly under `prefix`, relative to `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error>;

    /// Paths of all files under `prefix`, recursively, relative to the store
    /// root. A missing prefix yields an empty list.
    async fn list_recursive(&self, prefix: &str) -> Result<Vec<String>, Error>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, Error>;

    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), Error>;

    async fn delete(&self, path: &str) -> Result<(), Error>;

    /// Replace `dst` with the content of `src`.
    async fn copy(&self, src: &str, dst: &str) -> Result<(), Error>;

    /// Create the directory for backends with real directories; a no-op for
    /// object stores.
    async fn ensure_dir(&self, path: &str) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::join;

    #[test]
    fn join_handles_empty_base() {
        assert_eq!(join("", "index.json"), "index.json");
        assert_eq!(join("XTEE/GOV", "0.wsdl"), "XTEE/GOV/0.wsdl");
        assert_eq!(join("XTEE/GOV/", "0.wsdl"), "XTEE/GOV/0.wsdl");
    }
}
