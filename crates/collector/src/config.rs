//! Collector configuration, loaded from a YAML file (JSON is accepted as a
//! YAML subset). The same file carries the storage backend configuration,
//! which the selected backend reads on its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use models::ClientId;
use regex::Regex;
use serde::Deserialize;

use crate::logging::LogConfig;

/// Default timeout for HTTP requests.
const DEFAULT_TIMEOUT: f64 = 5.0;

/// Do not use concurrent workers by default.
const DEFAULT_THREAD_COUNT: usize = 1;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerCert {
    Flag(bool),
    Bundle(PathBuf),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    storage_plugin: Option<String>,
    server_url: Option<String>,
    client: Option<Vec<String>>,
    instance: Option<String>,
    timeout: Option<f64>,
    server_cert: Option<ServerCert>,
    client_cert: Option<PathBuf>,
    client_key: Option<PathBuf>,
    thread_count: Option<usize>,
    wsdl_replaces: Option<Vec<(String, String)>>,
    excluded_member_codes: Option<Vec<String>>,
    excluded_subsystem_codes: Option<Vec<(String, String)>>,
    #[serde(rename = "logging-config")]
    logging_config: Option<LogConfig>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_plugin: String,
    pub server_url: String,
    pub client: ClientId,
    pub instance: Option<String>,
    pub timeout: Duration,
    pub verify: xroad::Verify,
    pub identity: Option<(PathBuf, PathBuf)>,
    pub thread_count: usize,
    pub wsdl_replaces: Vec<(Regex, String)>,
    pub excluded_member_codes: Vec<String>,
    pub excluded_subsystem_codes: Vec<(String, String)>,
    pub logging: LogConfig,
}

/// Read and parse the configuration file.
pub fn load_file(path: &Path) -> anyhow::Result<serde_yaml::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot load configuration file {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("invalid configuration file {}", path.display()))
}

/// The logging section of a parsed configuration, for subscriber setup
/// before the rest of the configuration is validated.
pub fn logging_section(config: &serde_yaml::Value) -> LogConfig {
    config
        .get("logging-config")
        .and_then(|section| serde_yaml::from_value(section.clone()).ok())
        .unwrap_or_default()
}

impl Config {
    pub fn from_value(value: &serde_yaml::Value) -> anyhow::Result<Self> {
        let raw: RawConfig = serde_yaml::from_value(value.clone())
            .context("invalid configuration structure")?;

        let storage_plugin = raw
            .storage_plugin
            .filter(|plugin| !plugin.is_empty())
            .context("configuration error: storage plugin is not configured")?;
        let server_url = raw
            .server_url
            .context("configuration error: local Security Server URL is not provided")?;
        let client = raw
            .client
            .as_deref()
            .and_then(|segments| ClientId::from_segments(segments).ok())
            .context(
                "configuration error: client identifier is incorrect, \
                 expecting a list of 3 or 4 identifiers",
            )?;

        let timeout = match raw.timeout {
            Some(timeout) if timeout > 0.0 => timeout,
            _ => DEFAULT_TIMEOUT,
        };
        let thread_count = match raw.thread_count {
            Some(count) if count > 0 => count,
            _ => DEFAULT_THREAD_COUNT,
        };

        let verify = match raw.server_cert {
            None => xroad::Verify::Default,
            Some(ServerCert::Flag(true)) => xroad::Verify::Default,
            Some(ServerCert::Flag(false)) => xroad::Verify::Disabled,
            Some(ServerCert::Bundle(path)) => xroad::Verify::CaBundle(path),
        };
        let identity = match (raw.client_cert, raw.client_key) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        };

        let mut wsdl_replaces = Vec::new();
        for (pattern, replacement) in raw.wsdl_replaces.unwrap_or_default() {
            let regex = Regex::new(&pattern).with_context(|| {
                format!("configuration error: invalid wsdl_replaces pattern {pattern:?}")
            })?;
            wsdl_replaces.push((regex, replacement));
        }

        Ok(Self {
            storage_plugin,
            server_url,
            client,
            instance: raw.instance.filter(|instance| !instance.is_empty()),
            timeout: Duration::from_secs_f64(timeout),
            verify,
            identity,
            thread_count,
            wsdl_replaces,
            excluded_member_codes: raw.excluded_member_codes.unwrap_or_default(),
            excluded_subsystem_codes: raw.excluded_subsystem_codes.unwrap_or_default(),
            logging: raw.logging_config.unwrap_or_default(),
        })
    }

    pub fn client_options(&self) -> xroad::ClientOptions {
        xroad::ClientOptions {
            server_url: self.server_url.clone(),
            client: self.client.clone(),
            instance: self.instance.clone(),
            timeout: self.timeout,
            verify: self.verify.clone(),
            identity: self.identity.clone(),
        }
    }
}
