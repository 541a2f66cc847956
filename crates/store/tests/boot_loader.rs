//! Boot-time activation: registry/disk intersection, drift and isolation.

mod common;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::slug;
use modhost_registry::{FilesystemRegistry, ModuleUpdate, RegistryStore};
use modhost_store::{ModuleContext, ModuleHost, ModuleLoader, ModuleProvider, ProviderTable};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Host that keeps the provider keys it was asked to register.
#[derive(Default)]
struct RecordingHost {
    registered: Vec<String>,
}

impl ModuleHost for RecordingHost {
    fn register_provider(
        &mut self,
        module: &ModuleContext,
        provider: Arc<dyn ModuleProvider>,
    ) -> eyre::Result<()> {
        provider.register(module)?;
        self.registered.push(module.provider_key.clone());
        Ok(())
    }
}

fn counting_provider(counter: Arc<AtomicUsize>) -> Arc<dyn ModuleProvider> {
    Arc::new(move |_: &ModuleContext| -> eyre::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn make_dirs(root: &std::path::Path, names: &[&str]) {
    for name in names {
        std::fs::create_dir_all(root.join(name)).unwrap();
    }
}

async fn registry_with(dir: &TempDir, enabled: &[&str], disabled: &[&str]) -> Arc<FilesystemRegistry> {
    let registry = Arc::new(FilesystemRegistry::open(dir.path().join("registry")).await.unwrap());
    for name in enabled {
        registry.upsert(&slug(name), ModuleUpdate::new()).await.unwrap();
    }
    for name in disabled {
        registry
            .upsert(&slug(name), ModuleUpdate::new().enabled(false))
            .await
            .unwrap();
    }
    registry
}

#[tokio::test]
async fn test_drift_excluded_and_warned_exactly_once() {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("modules");
    make_dirs(&root, &["shop"]);
    let registry = registry_with(&dir, &["shop", "ghost"], &[]).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let providers = ProviderTable::new().with("shop/providers/module", counting_provider(calls.clone()));
    let loader = ModuleLoader::new(registry, Arc::new(providers), &root, false);

    let mut host = RecordingHost::default();
    let report = loader.load_enabled_modules(&mut host).await;

    assert_eq!(report.activated, vec!["shop"]);
    assert_eq!(report.drifted, vec!["ghost"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let logs = buffer.contents();
    let ghost_lines: Vec<_> = logs.lines().filter(|l| l.contains("ghost")).collect();
    assert_eq!(ghost_lines.len(), 1, "{logs}");
    assert!(ghost_lines[0].contains("WARN"));
}

#[tokio::test]
async fn test_dev_mode_activates_every_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("modules");
    make_dirs(&root, &["a", "b", "c"]);
    let registry = Arc::new(FilesystemRegistry::new(dir.path().join("registry")));

    let loader = ModuleLoader::new(registry, Arc::new(ProviderTable::new()), &root, true);
    let plan = loader.plan().await;

    assert_eq!(plan.activation_slugs(), vec!["a", "b", "c"]);
    assert!(plan.drifted.is_empty());
}

#[tokio::test]
async fn test_missing_registry_means_nothing_enabled() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("modules");
    make_dirs(&root, &["a", "b"]);
    let registry = Arc::new(FilesystemRegistry::new(dir.path().join("never-created")));

    let loader = ModuleLoader::new(registry.clone(), Arc::new(ProviderTable::new()), &root, false);
    let report = loader.load_enabled_modules(&mut RecordingHost::default()).await;

    assert!(report.activated.is_empty());
    assert!(report.drifted.is_empty());
    assert!(!registry.is_initialized().await.unwrap());
}

#[tokio::test]
async fn test_disabled_modules_stay_inactive() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("modules");
    make_dirs(&root, &["on", "off"]);
    let registry = registry_with(&dir, &["on"], &["off"]).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let providers = ProviderTable::new()
        .with("on/providers/module", counting_provider(calls.clone()))
        .with("off/providers/module", counting_provider(calls.clone()));
    let loader = ModuleLoader::new(registry, Arc::new(providers), &root, false);

    let report = loader.load_enabled_modules(&mut RecordingHost::default()).await;
    assert_eq!(report.activated, vec!["on"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_broken_modules_do_not_stop_the_boot() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("modules");
    make_dirs(&root, &["a-panics", "b-works", "c-errors", "d-unresolved"]);
    let registry = registry_with(&dir, &["a-panics", "b-works", "c-errors", "d-unresolved"], &[]).await;

    let panicking: Arc<dyn ModuleProvider> =
        Arc::new(|_: &ModuleContext| -> eyre::Result<()> { panic!("provider exploded") });
    let erroring: Arc<dyn ModuleProvider> =
        Arc::new(|_: &ModuleContext| -> eyre::Result<()> { Err(eyre::eyre!("missing config")) });
    let calls = Arc::new(AtomicUsize::new(0));
    let providers = ProviderTable::new()
        .with("a-panics/providers/module", panicking)
        .with("b-works/providers/module", counting_provider(calls.clone()))
        .with("c-errors/providers/module", erroring);
    let loader = ModuleLoader::new(registry, Arc::new(providers), &root, false);

    let mut host = RecordingHost::default();
    let report = loader.load_enabled_modules(&mut host).await;

    assert_eq!(report.activated, vec!["b-works"]);
    assert_eq!(host.registered, vec!["b-works/providers/module"]);
    let failed: Vec<_> = report.failed.iter().map(|f| f.slug.as_str()).collect();
    assert_eq!(failed, vec!["a-panics", "c-errors"]);
    assert!(report.failed[0].error.contains("provider exploded"));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].slug, "d-unresolved");
}

#[tokio::test]
async fn test_manifest_entry_and_directory_casing_pick_the_provider() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("modules");
    make_dirs(&root, &["Billing", "reports"]);
    std::fs::write(
        root.join("reports/module.json"),
        r#"{"entry": "reports.provider"}"#,
    )
    .unwrap();
    let registry = registry_with(&dir, &["billing", "reports"], &[]).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let providers = ProviderTable::new()
        .with("Billing/providers/module", counting_provider(calls.clone()))
        .with("reports.provider", counting_provider(calls.clone()));
    let loader = ModuleLoader::new(registry, Arc::new(providers), &root, false);

    let mut host = RecordingHost::default();
    let report = loader.load_enabled_modules(&mut host).await;

    assert_eq!(report.activated, vec!["billing", "reports"]);
    assert_eq!(
        host.registered,
        vec!["Billing/providers/module", "reports.provider"]
    );
}
