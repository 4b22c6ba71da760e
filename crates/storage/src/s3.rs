//! S3-compatible backend against a MinIO-style endpoint.
//!
//! Objects live under the `minio_path` key prefix, using the same layout as
//! the filesystem backend with `/` as the separator.

use std::fmt;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;

use crate::store::Store;
use crate::vfs::Vfs;
use crate::Error;

#[derive(Deserialize)]
struct S3Config {
    minio_url: Option<String>,
    minio_access_key: Option<String>,
    minio_secret_key: Option<String>,
    minio_secure: Option<bool>,
    minio_ca_certs: Option<String>,
    minio_bucket: Option<String>,
    minio_path: Option<String>,
    // Instance is required for document cleanup.
    instance: Option<String>,
    filtered_hours: Option<i64>,
    filtered_days: Option<i64>,
    filtered_months: Option<i32>,
    cleanup_interval: Option<i64>,
    days_to_keep: Option<i64>,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("minio_url", &self.minio_url)
            .field("minio_access_key", &self.minio_access_key)
            .field("minio_secret_key", &self.minio_secret_key.as_ref().map(|_| "<hidden>"))
            .field("minio_secure", &self.minio_secure)
            .field("minio_ca_certs", &self.minio_ca_certs)
            .field("minio_bucket", &self.minio_bucket)
            .field("minio_path", &self.minio_path)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

/// Normalize the configured key prefix: no leading slash, exactly one
/// trailing slash when non-empty.
fn canonical_prefix(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Build the object-store backend from the configuration mapping.
pub async fn open(config: &serde_yaml::Value) -> Result<Store<ObjectStore>, Error> {
    let config: S3Config = serde_yaml::from_value(config.clone())
        .map_err(|err| Error::Config(format!("invalid storage configuration: {err}")))?;
    tracing::info!(?config, "object storage configured");

    let url = match &config.minio_url {
        Some(url) if !url.is_empty() => url.clone(),
        _ => return Err(Error::Config("\"minio_url\" is not configured".to_string())),
    };
    let secure = config.minio_secure.unwrap_or(true);
    let endpoint = if url.contains("://") {
        url
    } else if secure {
        format!("https://{url}")
    } else {
        format!("http://{url}")
    };

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        // MinIO does not care about the region, but the SDK requires one.
        .region(Region::new("us-east-1"))
        .endpoint_url(endpoint);
    if let (Some(access_key), Some(secret_key)) =
        (&config.minio_access_key, &config.minio_secret_key)
    {
        loader = loader.credentials_provider(Credentials::new(
            access_key.as_str(),
            secret_key.as_str(),
            None,
            None,
            "configuration",
        ));
    }
    if let Some(ca_certs) = config.minio_ca_certs.as_deref().filter(|s| !s.is_empty()) {
        // Trust the configured PEM bundle instead of the platform roots.
        use aws_smithy_http_client::tls;

        let pem = std::fs::read(ca_certs)?;
        let tls_context = tls::TlsContext::builder()
            .with_trust_store(tls::TrustStore::empty().with_pem_certificate(pem.as_slice()))
            .build()
            .map_err(|err| Error::Config(format!("invalid CA bundle {ca_certs:?}: {err}")))?;
        let http_client = aws_smithy_http_client::Builder::new()
            .tls_provider(tls::Provider::Rustls(
                tls::rustls_provider::CryptoMode::AwsLc,
            ))
            .tls_context(tls_context)
            .build_https();
        loader = loader.http_client(http_client);
    }
    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();

    let vfs = ObjectStore {
        client: aws_sdk_s3::Client::from_conf(s3_config),
        bucket: config
            .minio_bucket
            .filter(|bucket| !bucket.is_empty())
            .unwrap_or_else(|| "catalogue".to_string()),
        prefix: canonical_prefix(config.minio_path.as_deref().unwrap_or("")),
    };
    let retention = crate::fs::retention_from(
        config.filtered_hours,
        config.filtered_days,
        config.filtered_months,
        config.cleanup_interval,
        config.days_to_keep,
    );

    Ok(Store::new(vfs, config.instance.unwrap_or_default(), retention))
}

pub struct ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl ObjectStore {
    fn key(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    /// Listing prefix for a subfolder: empty, or ending with `/`.
    fn dir_key(&self, path: &str) -> String {
        if path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}{}/", self.prefix, path.trim_matches('/'))
        }
    }

    async fn list_keys(&self, prefix: String, recursive: bool) -> Result<Vec<String>, Error> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix);
            if !recursive {
                request = request.delimiter("/");
            }
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|err| Error::ObjectStore(err.to_string()))?;
            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl Vfs for ObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let dir = self.dir_key(prefix);
        let keys = self.list_keys(dir.clone(), false).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&dir).map(str::to_string))
            .filter(|name| !name.is_empty())
            .collect())
    }

    async fn list_recursive(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let dir = self.dir_key(prefix);
        let keys = self.list_keys(dir, true).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, Error> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|err| Error::ObjectStore(err.to_string()))?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|err| Error::ObjectStore(err.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), Error> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|err| Error::ObjectStore(err.to_string()))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|err| Error::ObjectStore(err.to_string()))?;
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), Error> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, self.key(src)))
            .key(self.key(dst))
            .send()
            .await
            .map_err(|err| Error::ObjectStore(err.to_string()))?;
        Ok(())
    }

    async fn ensure_dir(&self, _path: &str) -> Result<(), Error> {
        // Object stores have no directories.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_prefix;

    #[test]
    fn prefix_is_canonicalized() {
        assert_eq!(canonical_prefix(""), "");
        assert_eq!(canonical_prefix("/"), "");
        assert_eq!(canonical_prefix("catalogue"), "catalogue/");
        assert_eq!(canonical_prefix("/v1/catalogue/"), "v1/catalogue/");
    }
}
