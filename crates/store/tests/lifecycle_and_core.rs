//! Soft-delete visibility, status reporting and core self-update.

mod common;

use std::sync::Arc;

use common::{Harness, StubCatalog, StubFetcher, slug, zip_bytes};
use modhost_registry::{ModuleUpdate, RegistryStore};
use modhost_store::{ApiResponse, CoreUpdater, ModuleError};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_soft_deleted_records_only_listed_on_request() {
    let h = Harness::new(StubCatalog::new(json!([])), Vec::new()).await;
    h.registry.upsert(&slug("kept"), ModuleUpdate::new()).await.unwrap();
    h.registry.upsert(&slug("gone"), ModuleUpdate::new()).await.unwrap();

    assert!(h.service.delete("gone").await.is_success());

    let active: Vec<_> = h
        .view()
        .list_all(false)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.record.slug.to_string())
        .collect();
    assert_eq!(active, vec!["kept"]);

    let all = h.view().list_all(true).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|v| v.record.slug.as_str() == "gone" && v.record.is_deleted()));

    assert!(h.service.restore("gone").await.is_success());
    assert_eq!(h.view().list_all(false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_deleting_unknown_module_fails() {
    let h = Harness::new(StubCatalog::new(json!([])), Vec::new()).await;
    let ApiResponse::Error { error, .. } = h.service.delete("ghost").await else {
        panic!("expected failure payload");
    };
    assert_eq!(error.error_code, "MODHOST_REGISTRY_01");
}

#[tokio::test]
async fn test_list_modules_survives_catalog_outage() {
    let mut catalog = StubCatalog::new(json!([]));
    catalog.unreachable = true;
    let h = Harness::new(catalog, Vec::new()).await;
    h.registry.upsert(&slug("local"), ModuleUpdate::new()).await.unwrap();

    let ApiResponse::Success { data: Some(data), .. } = h.service.list_modules(false).await else {
        panic!("expected success payload");
    };
    assert_eq!(data["installed"][0]["slug"], "local");
    assert_eq!(data["installed"][0]["folder_exists"], false);
    assert_eq!(data["available"], json!([]));
}

#[tokio::test]
async fn test_status_without_token_skips_catalog() {
    let h = Harness::new(StubCatalog::new(json!([])), Vec::new()).await;
    let report = h.service.status_report().await.unwrap();

    assert!(!report.token_present);
    assert!(!report.catalog_reachable);
    assert_eq!(report.core_version, "dev");
    assert!(!report.update_available);
    assert_eq!(report.module_count, 0);
}

fn core_updater(dir: &TempDir, archive: Vec<u8>) -> (CoreUpdater, Arc<StubFetcher>) {
    let fetcher = Arc::new(StubFetcher::new(archive));
    let updater = CoreUpdater::new(
        fetcher.clone(),
        dir.path().join("core"),
        "core-main",
        dir.path().join("tmp"),
    );
    (updater, fetcher)
}

#[tokio::test]
async fn test_core_update_replaces_live_tree() {
    let dir = TempDir::new().unwrap();
    let live = dir.path().join("core");
    std::fs::create_dir_all(&live).unwrap();
    std::fs::write(live.join("stale.txt"), "old").unwrap();

    let archive = zip_bytes(&[
        ("core-main/", ""),
        ("core-main/module.json", r#"{"version": "2.0.0"}"#),
        ("core-main/src/lib.txt", "new core"),
    ]);
    let (updater, _) = core_updater(&dir, archive);

    let outcome = updater
        .update_core("https://releases.example.test/core.zip")
        .await
        .unwrap();
    assert_eq!(outcome.path, live);
    assert_eq!(outcome.files, 2);
    assert!(!live.join("stale.txt").exists());
    assert_eq!(
        std::fs::read_to_string(live.join("src/lib.txt")).unwrap(),
        "new core"
    );
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_core_update_without_expected_folder_keeps_live_tree() {
    let dir = TempDir::new().unwrap();
    let live = dir.path().join("core");
    std::fs::create_dir_all(&live).unwrap();
    std::fs::write(live.join("current.txt"), "still here").unwrap();

    let archive = zip_bytes(&[("something-else/readme.txt", "wrong layout")]);
    let (updater, _) = core_updater(&dir, archive);

    let err = updater
        .update_core("https://releases.example.test/core.zip")
        .await
        .unwrap_err();
    assert!(matches!(err, ModuleError::MissingExpectedFolder { ref folder } if folder == "core-main"));
    assert_eq!(
        std::fs::read_to_string(live.join("current.txt")).unwrap(),
        "still here"
    );
}

#[tokio::test]
async fn test_core_update_rejects_bad_urls_without_fetching() {
    let dir = TempDir::new().unwrap();
    let (updater, fetcher) = core_updater(&dir, Vec::new());

    for url in ["not a url", "ftp://releases.example.test/core.zip", "/tmp/core.zip"] {
        let err = updater.update_core(url).await.unwrap_err();
        assert!(matches!(err, ModuleError::InvalidSourceUrl { .. }), "{url}");
    }
    assert_eq!(fetcher.count(), 0);
}
