//! The real catalog client and archive fetcher against a local HTTP server.

use modhost_store::{
    ArchiveFetcher, Catalog, CatalogConfig, HttpCatalog, HttpFetcher, InstalledReport,
    ModuleError, Slug,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "catalog-secret";

fn config(server: &MockServer) -> CatalogConfig {
    CatalogConfig {
        base_url: format!("{}/api", server.uri()),
        token: Some(TOKEN.to_string()),
        timeout_secs: 5,
        max_archive_bytes: 16,
    }
}

fn catalog(server: &MockServer) -> HttpCatalog {
    HttpCatalog::new(&config(server)).unwrap()
}

fn fetcher(server: &MockServer) -> HttpFetcher {
    HttpFetcher::from_config(&config(server)).unwrap()
}

fn archive_url(server: &MockServer, name: &str) -> Url {
    Url::parse(&format!("{}/files/{name}", server.uri())).unwrap()
}

#[tokio::test]
async fn test_listing_is_fetched_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/modules"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"slug": "widgets", "repository": "https://x.test/w.zip", "version": "2.1.0"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let entries = catalog(&server).list_modules().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].slug, "widgets");
    assert_eq!(entries[0].version.as_deref(), Some("2.1.0"));
}

#[tokio::test]
async fn test_listing_error_status_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/modules"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = catalog(&server).list_modules().await.unwrap_err();
    assert!(matches!(err, ModuleError::CatalogUnreachable { .. }), "{err:?}");
}

#[tokio::test]
async fn test_listing_that_is_not_json_is_invalid_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/modules"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = catalog(&server).list_modules().await.unwrap_err();
    assert!(matches!(err, ModuleError::CatalogDataInvalid { .. }), "{err:?}");
}

#[tokio::test]
async fn test_find_module_picks_the_matching_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/modules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "modules": [{"slug": "blog"}, {"slug": "shop"}]
        })))
        .mount(&server)
        .await;

    let catalog = catalog(&server);
    let shop = Slug::parse("shop").unwrap();
    let ghost = Slug::parse("ghost").unwrap();
    assert_eq!(catalog.find_module(&shop).await.unwrap().unwrap().slug, "shop");
    assert!(catalog.find_module(&ghost).await.unwrap().is_none());
}

#[tokio::test]
async fn test_license_verdicts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/verify-license"))
        .and(body_json(json!({"slug": "good", "license": "LIC-1234567890"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"valid": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/verify-license"))
        .and(body_json(json!({"slug": "rejected", "license": "LIC-1234567890"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"valid": false})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/verify-license"))
        .and(body_json(json!({"slug": "forbidden", "license": "LIC-1234567890"})))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let catalog = catalog(&server);
    assert!(verdict(&catalog, "good").await);
    assert!(!verdict(&catalog, "rejected").await);
    assert!(!verdict(&catalog, "forbidden").await);
}

async fn verdict(catalog: &HttpCatalog, slug: &str) -> bool {
    let slug = Slug::parse(slug).unwrap();
    catalog.verify_license(&slug, "LIC-1234567890").await.unwrap()
}

#[tokio::test]
async fn test_token_check_follows_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/verify-token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(!catalog(&server).verify_token().await.unwrap());
}

#[tokio::test]
async fn test_installed_report_is_posted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/installed"))
        .and(body_json(json!({"slug": "widgets", "version": "2.1.0"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = InstalledReport {
        slug: "widgets".to_string(),
        version: "2.1.0".to_string(),
    };
    catalog(&server).report_installed(&report).await.unwrap();
}

#[tokio::test]
async fn test_sync_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sync-modules"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = catalog(&server).sync_modules(&[]).await.unwrap_err();
    assert!(matches!(err, ModuleError::CatalogUnreachable { .. }));
}

#[tokio::test]
async fn test_fetch_returns_archive_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/small.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04tiny".to_vec()))
        .mount(&server)
        .await;

    let bytes = fetcher(&server)
        .fetch(&archive_url(&server, "small.zip"))
        .await
        .unwrap();
    assert_eq!(bytes, b"PK\x03\x04tiny");
}

#[tokio::test]
async fn test_fetch_error_status_is_download_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/missing.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch(&archive_url(&server, "missing.zip"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModuleError::DownloadFailed { ref reason, .. } if reason.contains("404")));
}

#[tokio::test]
async fn test_fetch_refuses_oversized_archive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/huge.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch(&archive_url(&server, "huge.zip"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModuleError::ArchiveTooLarge { limit: 16, .. }), "{err:?}");
}
