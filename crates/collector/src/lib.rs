//! Collector of WSDL and OpenAPI service descriptions from the members of an
//! X-Road federation. One run enumerates the registered subsystems from the
//! global configuration, fans them out to a worker pool and writes a
//! versioned catalogue snapshot into the configured storage backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use models::Subsystem;
use storage::Storage;
use xroad::Api;

pub mod config;
pub mod logging;
pub mod pool;
pub mod processor;

pub use config::Config;

/// Every subsystem failed its methods phase. An entirely failed run usually
/// means the Security Server is down, and publishing a snapshot of it would
/// wipe the catalogue.
fn all_results_failed(results: &BTreeMap<String, Subsystem>) -> bool {
    results
        .values()
        .all(|subsystem| !subsystem.methods_status.is_ok())
}

/// Run one collection: fetch the global configuration, process every
/// registered subsystem and save the catalogue snapshot.
pub async fn collect(
    config: &Config,
    storage: Arc<dyn Storage>,
    api: Arc<dyn Api>,
) -> anyhow::Result<()> {
    let shared_params = api
        .shared_params()
        .await
        .map_err(|err| anyhow!("cannot download global configuration: {err}"))?;
    let registered = xroad::registered_subsystems(&shared_params)
        .map_err(|err| anyhow!("cannot process global configuration: {err}"))?;

    let mut subsystems = Vec::new();
    for subsystem in registered {
        if config.excluded_member_codes.contains(&subsystem.member_code) {
            tracing::info!(subsystem = %subsystem.path(), "skipping excluded member");
            continue;
        }
        if config.excluded_subsystem_codes.iter().any(|(member, code)| {
            *member == subsystem.member_code && *code == subsystem.subsystem_code
        }) {
            tracing::info!(subsystem = %subsystem.path(), "skipping excluded subsystem");
            continue;
        }
        subsystems.push(subsystem);
    }

    let processor = processor::Processor::new(api, storage.clone(), config.wsdl_replaces.clone());
    let coordinator = pool::Coordinator::new(storage.clone(), processor, config.thread_count);
    let results = coordinator.run(subsystems).await?;

    if !storage.active() {
        anyhow::bail!("storage backend failed, skipping this catalogue version");
    }
    if all_results_failed(&results) {
        anyhow::bail!("all subsystems failed, skipping this catalogue version");
    }

    storage
        .save_catalogue(&results)
        .await
        .map_err(|err| anyhow!("cannot save catalogue: {err}"))
}
