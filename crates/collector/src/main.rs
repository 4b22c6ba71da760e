use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use collector::{config, logging, Config};

/// Collect WSDL and OpenAPI service descriptions from X-Road members.
#[derive(Debug, Parser)]
#[command(name = "xrd-collector", version, about)]
struct Cli {
    /// Configuration file (YAML or JSON).
    #[arg(value_name = "CONFIG_FILE")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The subscriber can only be installed once, so the logging section is
    // pulled out before the rest of the configuration is validated.
    let raw = config::load_file(&cli.config);
    let log_config = raw
        .as_ref()
        .map(config::logging_section)
        .unwrap_or_default();
    logging::init_logging(&log_config);

    match run(raw).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "collection failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(raw: anyhow::Result<serde_yaml::Value>) -> anyhow::Result<()> {
    let raw = raw?;
    let config = Config::from_value(&raw)?;
    tracing::info!(?config, "configuration loaded");

    let storage = storage::load(&config.storage_plugin, &raw)
        .await
        .map_err(|err| anyhow::anyhow!("cannot initialize storage backend: {err}"))?;
    let api: Arc<dyn xroad::Api> = Arc::new(xroad::Client::new(config.client_options())?);

    let result = collector::collect(&config, storage.clone(), api).await;
    if result.is_err() && storage.active() {
        storage.deactivate();
    }
    result
}
