//! Local-filesystem backend, rooted at `output_path`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::store::Store;
use crate::vfs::Vfs;
use crate::{Error, Retention};

#[derive(Debug, Deserialize)]
struct FsConfig {
    output_path: Option<String>,
    // Instance is required for document cleanup.
    instance: Option<String>,
    filtered_hours: Option<i64>,
    filtered_days: Option<i64>,
    filtered_months: Option<i32>,
    cleanup_interval: Option<i64>,
    days_to_keep: Option<i64>,
}

/// Build the filesystem backend from the configuration mapping.
pub fn open(config: &serde_yaml::Value) -> Result<Store<LocalFs>, Error> {
    let config: FsConfig = serde_yaml::from_value(config.clone())
        .map_err(|err| Error::Config(format!("invalid storage configuration: {err}")))?;

    let output_path = match config.output_path {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => {
            return Err(Error::Config(
                "\"output_path\" is not configured".to_string(),
            ))
        }
    };
    let instance = match config.instance {
        Some(instance) if !instance.is_empty() => instance,
        _ => return Err(Error::Config("\"instance\" is not configured".to_string())),
    };
    let retention = retention_from(
        config.filtered_hours,
        config.filtered_days,
        config.filtered_months,
        config.cleanup_interval,
        config.days_to_keep,
    );

    let vfs = LocalFs::new(output_path)?;
    tracing::info!(root = %vfs.root.display(), %instance, "filesystem storage configured");
    Ok(Store::new(vfs, instance, retention))
}

/// Apply configured retention values over the defaults, ignoring values that
/// are not positive.
pub(crate) fn retention_from(
    filtered_hours: Option<i64>,
    filtered_days: Option<i64>,
    filtered_months: Option<i32>,
    cleanup_interval: Option<i64>,
    days_to_keep: Option<i64>,
) -> Retention {
    let mut retention = Retention::default();
    if let Some(hours) = filtered_hours.filter(|v| *v > 0) {
        retention.filtered_hours = hours;
    }
    if let Some(days) = filtered_days.filter(|v| *v > 0) {
        retention.filtered_days = days;
    }
    if let Some(months) = filtered_months.filter(|v| *v > 0) {
        retention.filtered_months = months;
    }
    if let Some(interval) = cleanup_interval.filter(|v| *v > 0) {
        retention.cleanup_interval = interval;
    }
    if let Some(days) = days_to_keep.filter(|v| *v > 0) {
        retention.days_to_keep = days;
    }
    retention
}

pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[async_trait::async_trait]
impl Vfs for LocalFs {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(prefix))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn list_recursive(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let root = self.resolve(prefix);
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(root) {
            let entry = entry.map_err(|err| {
                Error::Io(err.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
                }))
            })?;
            if entry.file_type().is_file() {
                paths.push(self.relative(entry.path()));
            }
        }
        Ok(paths)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, Error> {
        // Raw bytes, avoiding any line ending conversion.
        Ok(fs::read(self.resolve(path))?)
    }

    async fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), Error> {
        Ok(fs::write(self.resolve(path), bytes)?)
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        Ok(fs::remove_file(self.resolve(path))?)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), Error> {
        // Copy through a temporary name so readers of `dst` see either the
        // old or the new content, never a partial write.
        let tmp = self.resolve(&format!("{dst}.tmp"));
        fs::copy(self.resolve(src), &tmp)?;
        fs::rename(&tmp, self.resolve(dst))?;
        Ok(())
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), Error> {
        Ok(fs::create_dir_all(self.resolve(path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = LocalFs::new(dir.path()).unwrap();

        vfs.ensure_dir("XTEE/GOV/123/sub").await.unwrap();
        vfs.put("XTEE/GOV/123/sub/0.wsdl", b"<wsdl/>", "text/xml")
            .await
            .unwrap();
        vfs.put("index.json", b"[]", "application/json").await.unwrap();

        assert_eq!(vfs.get("XTEE/GOV/123/sub/0.wsdl").await.unwrap(), b"<wsdl/>");
        assert_eq!(vfs.list("").await.unwrap(), vec!["index.json".to_string()]);
        assert_eq!(
            vfs.list_recursive("XTEE").await.unwrap(),
            vec!["XTEE/GOV/123/sub/0.wsdl".to_string()]
        );
        // A prefix that was never written is just empty.
        assert!(vfs.list_recursive("NOPE").await.unwrap().is_empty());

        vfs.copy("index.json", "copy.json").await.unwrap();
        assert_eq!(vfs.get("copy.json").await.unwrap(), b"[]");

        vfs.delete("index.json").await.unwrap();
        assert!(vfs.get("index.json").await.is_err());
    }

    #[test]
    fn retention_ignores_non_positive_values() {
        let retention = retention_from(Some(0), Some(-1), None, Some(3), Some(60));
        assert_eq!(retention.filtered_hours, 24);
        assert_eq!(retention.filtered_days, 30);
        assert_eq!(retention.filtered_months, 12);
        assert_eq!(retention.cleanup_interval, 3);
        assert_eq!(retention.days_to_keep, 60);
    }
}
