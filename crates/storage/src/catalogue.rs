//! Catalogue snapshot writer: serializes one run's results, maintains the
//! history files and hands over to cleanup.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use models::Subsystem;
use serde_json::json;

use crate::history::{self, HistoryEntry};
use crate::store::Store;
use crate::vfs::Vfs;
use crate::{cleanup, Error, DATE_FORMAT, HISTORY_FILE_NAME};

pub(crate) async fn save<V: Vfs>(
    store: &Store<V>,
    results: &BTreeMap<String, Subsystem>,
) -> Result<(), Error> {
    save_at(store, results, Local::now().naive_local()).await
}

pub(crate) async fn save_at<V: Vfs>(
    store: &Store<V>,
    results: &BTreeMap<String, Subsystem>,
    report_time: NaiveDateTime,
) -> Result<(), Error> {
    let entries = models::snapshot(results);

    let formatted_time = report_time.format(DATE_FORMAT).to_string();
    let report_path = format!("index_{}.json", report_time.format("%Y%m%d%H%M%S"));

    store.write_json(&report_path, &entries).await?;

    let mut json_history: Vec<HistoryEntry> = match store.vfs.get(HISTORY_FILE_NAME).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| Error::Json {
            path: HISTORY_FILE_NAME.to_string(),
            source,
        })?,
        Err(_) => {
            tracing::info!("history file {} not found", HISTORY_FILE_NAME);
            Vec::new()
        }
    };
    json_history.push(HistoryEntry {
        report_time: formatted_time.clone(),
        report_path: report_path.clone(),
    });
    json_history.sort_by(|a, b| b.report_time.cmp(&a.report_time));

    store.write_json(HISTORY_FILE_NAME, &json_history).await?;
    store
        .write_json(
            "filtered_history.json",
            &history::filtered_history(&json_history, &store.retention, report_time)?,
        )
        .await?;

    // Replace index.json with the latest report.
    store.vfs.copy(&report_path, "index.json").await?;

    store
        .write_json("status.json", &json!({ "lastReport": formatted_time }))
        .await?;

    cleanup::run(store, report_time).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use crate::{DocExt, DocType, Retention, Storage};
    use models::{Method, Status, SubsystemId};
    use pretty_assertions::assert_eq;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn store(dir: &tempfile::TempDir) -> Store<LocalFs> {
        let store = Store::new(
            LocalFs::new(dir.path()).unwrap(),
            "XTEE".to_string(),
            Retention::default(),
        );
        store.activate();
        store
    }

    /// One subsystem offering a single SOAP method, with its WSDL stored the
    /// way the pipeline would store it.
    async fn results(store: &Store<LocalFs>) -> BTreeMap<String, Subsystem> {
        let id = SubsystemId::new("XTEE", "GOV", "123", "sub");
        let (path, mut hashes) = store.subsystem_state(&id.path(), DocType::Wsdl).await.unwrap();
        let (doc_name, doc_hash) = store
            .save_doc(&path, &mut hashes, b"<wsdl/>", DocExt::Wsdl, None)
            .await
            .unwrap();
        store
            .save_subsystem_state(&path, &hashes, DocType::Wsdl)
            .await
            .unwrap();

        let subsystem = Subsystem::new(
            &id,
            Status::Ok,
            vec![Method {
                service_code: "getData".to_string(),
                service_version: "v1".to_string(),
                status: Status::Ok,
                wsdl: doc_name,
                hash: doc_hash,
            }],
            Status::Ok,
            vec![],
        );
        let mut results = BTreeMap::new();
        results.insert(subsystem.path.clone(), subsystem);
        results
    }

    fn read(dir: &tempfile::TempDir, name: &str) -> Vec<u8> {
        std::fs::read(dir.path().join(name)).unwrap()
    }

    fn read_json(dir: &tempfile::TempDir, name: &str) -> serde_json::Value {
        serde_json::from_slice(&read(dir, name)).unwrap()
    }

    #[tokio::test]
    async fn fresh_run_writes_snapshot_history_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let results = results(&store).await;

        save_at(&store, &results, at("2024-03-15 12:00:00")).await.unwrap();

        let snapshot = read_json(&dir, "index_20240315120000.json");
        assert_eq!(snapshot[0]["subsystemStatus"], "OK");
        assert_eq!(snapshot[0]["methods"][0]["wsdl"], "XTEE/GOV/123/sub/0.wsdl");

        // index.json is a byte-identical copy of the latest report.
        assert_eq!(read(&dir, "index.json"), read(&dir, "index_20240315120000.json"));

        let history = read_json(&dir, "history.json");
        assert_eq!(
            history,
            serde_json::json!([
                { "reportTime": "2024-03-15 12:00:00", "reportPath": "index_20240315120000.json" }
            ])
        );
        let filtered = read_json(&dir, "filtered_history.json");
        assert_eq!(filtered[0]["reportTime"], "2024-03-15 12:00:00");

        assert_eq!(
            read_json(&dir, "status.json"),
            serde_json::json!({ "lastReport": "2024-03-15 12:00:00" })
        );
        // The first run has no cleanup status, so cleanup ran and stamped it.
        assert_eq!(
            read_json(&dir, "cleanup_status.json"),
            serde_json::json!({ "lastCleanup": "2024-03-15 12:00:00" })
        );
        // The referenced document survived cleanup.
        assert_eq!(read(&dir, "XTEE/GOV/123/sub/0.wsdl"), b"<wsdl/>");
    }

    #[tokio::test]
    async fn rerun_without_changes_reuses_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let first = results(&store).await;
        save_at(&store, &first, at("2024-03-15 12:00:00")).await.unwrap();

        // The second run fetches identical upstream data.
        let second = results(&store).await;
        assert_eq!(first, second);
        save_at(&store, &second, at("2024-03-15 12:30:00")).await.unwrap();

        // No new document files; one WSDL plus its sidecar.
        let subsystem_files: Vec<String> = std::fs::read_dir(dir.path().join("XTEE/GOV/123/sub"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        let mut subsystem_files = subsystem_files;
        subsystem_files.sort();
        assert_eq!(subsystem_files, vec!["0.wsdl", "_wsdl_hashes"]);

        let history = read_json(&dir, "history.json");
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert_eq!(history[0]["reportTime"], "2024-03-15 12:30:00");
        assert_eq!(read(&dir, "index.json"), read(&dir, "index_20240315123000.json"));
    }
}
