//! Retention over catalogue snapshots and stored documents.
//!
//! Runs at the end of a report when at least `cleanup_interval` days have
//! passed since the previous cleanup. Old snapshots thin out to the earliest
//! one per calendar day, the history file is rebuilt from the survivors, and
//! documents no longer referenced by any surviving snapshot are removed.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;

use crate::history::{self, Report};
use crate::store::Store;
use crate::vfs::{join, Vfs};
use crate::{docstore, DocType, Error, DATE_FORMAT, HISTORY_FILE_NAME};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CleanupStatus {
    last_cleanup: String,
}

pub(crate) async fn run<V: Vfs>(store: &Store<V>, now: NaiveDateTime) -> Result<(), Error> {
    let last_cleanup = match store.vfs.get("cleanup_status.json").await {
        Ok(bytes) => serde_json::from_slice::<CleanupStatus>(&bytes)
            .ok()
            .and_then(|status| {
                NaiveDateTime::parse_from_str(&status.last_cleanup, DATE_FORMAT).ok()
            }),
        Err(_) => None,
    };
    if last_cleanup.is_none() {
        tracing::info!("cleanup status not found");
    }

    if let Some(last_cleanup) = last_cleanup {
        if now - Duration::days(store.retention.cleanup_interval) < history::day_start(last_cleanup)
        {
            tracing::info!("cleanup interval has not passed yet");
            return Ok(());
        }
    }

    tracing::info!("starting cleanup");

    remove_old_reports(store, now).await?;
    remove_unused_docs(store).await?;

    store
        .write_json(
            "cleanup_status.json",
            &json!({ "lastCleanup": now.format(DATE_FORMAT).to_string() }),
        )
        .await
}

/// All snapshot files at the catalogue root, newest first.
async fn catalogue_reports<V: Vfs>(store: &Store<V>) -> Result<Vec<Report>, Error> {
    let mut reports: Vec<Report> = store
        .vfs
        .list("")
        .await?
        .iter()
        .filter_map(|name| history::report(name))
        .collect();
    reports.sort_by(|a, b| b.time.cmp(&a.time));
    Ok(reports)
}

async fn remove_old_reports<V: Vfs>(store: &Store<V>, now: NaiveDateTime) -> Result<(), Error> {
    let all_reports = catalogue_reports(store).await?;
    let fresh_time = history::day_start(now) - Duration::days(store.retention.days_to_keep);
    let keep = history::reports_to_keep(&all_reports, fresh_time);

    let mut old_reports: Vec<&str> = all_reports
        .iter()
        .filter(|report| !keep.contains(&report.path))
        .map(|report| report.path.as_str())
        .collect();
    old_reports.sort_unstable();

    if old_reports.is_empty() {
        tracing::info!("no old catalogue reports found");
        return Ok(());
    }

    tracing::info!("removing {} old catalogue report(s)", old_reports.len());
    for report_path in old_reports {
        tracing::info!(path = report_path, "removing report");
        store.vfs.delete(report_path).await?;
    }

    // Recreate history.json from the surviving snapshot files.
    let mut entries: Vec<_> = store
        .vfs
        .list("")
        .await?
        .iter()
        .filter_map(|name| history::history_entry(name))
        .collect();
    entries.sort_by(|a, b| b.report_time.cmp(&a.report_time));
    if !entries.is_empty() {
        tracing::info!("writing {} report(s) to {}", entries.len(), HISTORY_FILE_NAME);
        store.write_json(HISTORY_FILE_NAME, &entries).await?;
    }
    Ok(())
}

/// Document paths referenced by one snapshot, relative to the catalogue root.
async fn docs_in_report<V: Vfs>(
    store: &Store<V>,
    report_file: &str,
) -> Result<BTreeSet<String>, Error> {
    let bytes = store.vfs.get(report_file).await?;
    let report: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|source| Error::Json {
            path: report_file.to_string(),
            source,
        })?;

    let mut used = BTreeSet::new();
    for system in report.as_array().into_iter().flatten() {
        for method in system["methods"].as_array().into_iter().flatten() {
            match method["wsdl"].as_str() {
                Some(wsdl) if !wsdl.is_empty() => {
                    used.insert(wsdl.to_string());
                }
                _ => {}
            }
        }
        for service in system["services"].as_array().into_iter().flatten() {
            match service["openapi"].as_str() {
                Some(openapi) if !openapi.is_empty() => {
                    used.insert(openapi.to_string());
                }
                _ => {}
            }
        }
    }
    Ok(used)
}

async fn unused_docs<V: Vfs>(store: &Store<V>) -> Result<BTreeSet<String>, Error> {
    let reports = catalogue_reports(store).await?;
    if reports.is_empty() {
        tracing::warn!("did not find any reports");
        return Ok(BTreeSet::new());
    }

    let mut used: BTreeSet<String> = BTreeSet::new();
    for report in &reports {
        used.append(&mut docs_in_report(store, &report.path).await?);
    }
    if used.is_empty() {
        tracing::info!("did not find any documents in reports, this might be an error");
        return Ok(BTreeSet::new());
    }

    let available: BTreeSet<String> = store
        .vfs
        .list_recursive(&store.instance)
        .await?
        .into_iter()
        .filter(|path| {
            let file_name = path.rsplit('/').next().unwrap_or(path);
            docstore::matches_doc(file_name, DocType::Wsdl)
                || docstore::matches_doc(file_name, DocType::Openapi)
        })
        .collect();

    Ok(available.difference(&used).cloned().collect())
}

async fn remove_unused_docs<V: Vfs>(store: &Store<V>) -> Result<(), Error> {
    let unused = unused_docs(store).await?;
    if unused.is_empty() {
        tracing::info!("no unused documents found");
        return Ok(());
    }

    let mut changed_dirs: BTreeSet<String> = BTreeSet::new();
    tracing::info!("removing {} unused document(s)", unused.len());
    for doc_path in &unused {
        tracing::info!(path = %doc_path, "removing document");
        store.vfs.delete(doc_path).await?;
        if let Some((dir, _)) = doc_path.rsplit_once('/') {
            changed_dirs.insert(dir.to_string());
        }
    }

    // Recreate the hash caches of every directory that lost documents.
    for dir in changed_dirs {
        tracing::info!(path = %dir, "recreating WSDL hashes cache");
        let hashes = store.hash_docs(&dir, DocType::Wsdl).await?;
        store
            .write_json(&join(&dir, DocType::Wsdl.sidecar()), &hashes)
            .await?;
        tracing::info!(path = %dir, "recreating OpenAPI hashes cache");
        let hashes = store.hash_docs(&dir, DocType::Openapi).await?;
        store
            .write_json(&join(&dir, DocType::Openapi.sidecar()), &hashes)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::fs::LocalFs;
    use crate::{Retention, Storage, DATE_FORMAT};
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

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) {
        let path = dir.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn exists(dir: &tempfile::TempDir, name: &str) -> bool {
        dir.path().join(name).exists()
    }

    /// A minimal snapshot referencing the given WSDL path.
    fn snapshot_body(wsdl: &str) -> String {
        serde_json::json!([{
            "xRoadInstance": "XTEE",
            "memberClass": "GOV",
            "memberCode": "123",
            "subsystemCode": "sub",
            "subsystemStatus": "OK",
            "servicesStatus": "OK",
            "methods": [
                { "serviceCode": "getData", "serviceVersion": "v1", "methodStatus": "OK", "wsdl": wsdl }
            ],
            "services": [],
        }])
        .to_string()
    }

    #[tokio::test]
    async fn old_reports_thin_out_to_first_of_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let now = at("2024-03-15 12:00:00");

        // One fresh snapshot, two snapshots 40 days back on the same day, one
        // 41 days back, and two on one day more than a year back.
        let body = snapshot_body("XTEE/GOV/123/sub/0.wsdl");
        for name in [
            "index_20240315120000.json",
            "index_20240204150000.json",
            "index_20240204090000.json",
            "index_20240203100000.json",
            "index_20230103170000.json",
            "index_20230103080000.json",
        ] {
            write(&dir, name, &body);
        }
        write(&dir, "XTEE/GOV/123/sub/0.wsdl", "<wsdl/>");

        run(&store, now).await.unwrap();

        assert!(exists(&dir, "index_20240315120000.json"));
        assert!(exists(&dir, "index_20240204090000.json"));
        assert!(exists(&dir, "index_20240203100000.json"));
        assert!(exists(&dir, "index_20230103080000.json"));
        // The later same-day duplicates are removed.
        assert!(!exists(&dir, "index_20240204150000.json"));
        assert!(!exists(&dir, "index_20230103170000.json"));

        // history.json was rebuilt from the surviving files.
        let history: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("history.json")).unwrap())
                .unwrap();
        let paths: Vec<&str> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["reportPath"].as_str().unwrap())
            .collect();
        assert_eq!(
            paths,
            vec![
                "index_20240315120000.json",
                "index_20240204090000.json",
                "index_20240203100000.json",
                "index_20230103080000.json",
            ]
        );

        let status: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("cleanup_status.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(status["lastCleanup"], "2024-03-15 12:00:00");
    }

    #[tokio::test]
    async fn unreferenced_documents_are_removed_and_caches_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let now = at("2024-03-15 12:00:00");

        write(&dir, "index_20240315120000.json", &snapshot_body("XTEE/GOV/123/sub/1.wsdl"));
        write(&dir, "XTEE/GOV/123/sub/0.wsdl", "<wsdl>old</wsdl>");
        write(&dir, "XTEE/GOV/123/sub/1.wsdl", "<wsdl>current</wsdl>");
        write(&dir, "XTEE/GOV/123/sub/pets_0.json", "{}");

        run(&store, now).await.unwrap();

        assert!(!exists(&dir, "XTEE/GOV/123/sub/0.wsdl"));
        assert!(!exists(&dir, "XTEE/GOV/123/sub/pets_0.json"));
        assert!(exists(&dir, "XTEE/GOV/123/sub/1.wsdl"));

        let hashes: HashMap<String, String> = serde_json::from_slice(
            &std::fs::read(dir.path().join("XTEE/GOV/123/sub/_wsdl_hashes")).unwrap(),
        )
        .unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(
            hashes["1.wsdl"],
            crate::docstore::md5_hex(b"<wsdl>current</wsdl>")
        );
        let openapi_hashes: HashMap<String, String> = serde_json::from_slice(
            &std::fs::read(dir.path().join("XTEE/GOV/123/sub/_openapi_hashes")).unwrap(),
        )
        .unwrap();
        assert!(openapi_hashes.is_empty());
    }

    #[tokio::test]
    async fn cleanup_waits_for_its_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        write(
            &dir,
            "cleanup_status.json",
            &serde_json::json!({ "lastCleanup": "2024-03-14 23:00:00" }).to_string(),
        );
        write(&dir, "index_20240322100000.json", &snapshot_body(""));
        write(&dir, "index_20230101000000.json", &snapshot_body(""));
        write(&dir, "index_20230101120000.json", &snapshot_body(""));

        // Less than cleanup_interval days since the last cleanup's day.
        run(&store, at("2024-03-15 12:00:00")).await.unwrap();
        assert!(exists(&dir, "index_20230101120000.json"));

        // Once the interval has passed, the duplicate day is thinned.
        run(&store, at("2024-03-22 12:00:00")).await.unwrap();
        assert!(exists(&dir, "index_20240322100000.json"));
        assert!(exists(&dir, "index_20230101000000.json"));
        assert!(!exists(&dir, "index_20230101120000.json"));
    }
}
