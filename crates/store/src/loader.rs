//! Boot-time activation of installed modules.
//!
//! The loader never fails the host: every anomaly degrades to "module not
//! activated" plus a log line, and one broken module never keeps the rest
//! from loading.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use modhost_registry::{RegistryStore, Slug};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::discovery::{DiscoveredModule, discover};
use crate::manifest::ModuleManifest;
use crate::provider::{ModuleContext, ModuleHost, ProviderTable};

/// Which modules a boot would activate, and why the rest would not.
#[derive(Debug, Clone, Default)]
pub struct ActivationPlan {
    pub dev_mode: bool,
    pub discovered: Vec<DiscoveredModule>,
    /// Deduplicated by slug, in discovery order.
    pub activation: Vec<DiscoveredModule>,
    /// Enabled in the registry but absent from disk.
    pub drifted: Vec<String>,
}

impl ActivationPlan {
    pub fn activation_slugs(&self) -> Vec<&str> {
        self.activation.iter().map(|m| m.slug.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedModule {
    pub slug: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedModule {
    pub slug: String,
    pub error: String,
}

/// Outcome of [`ModuleLoader::load_enabled_modules`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub activated: Vec<String>,
    pub skipped: Vec<SkippedModule>,
    pub failed: Vec<FailedModule>,
    pub drifted: Vec<String>,
}

/// Compute the activation set.
///
/// `enabled` is ignored in dev mode. Returns the modules to activate and the
/// enabled slugs that have no directory.
pub fn activation_set(
    dev_mode: bool,
    enabled: &[Slug],
    discovered: &[DiscoveredModule],
) -> (Vec<DiscoveredModule>, Vec<String>) {
    let on_disk: HashSet<&str> = discovered.iter().map(|m| m.slug.as_str()).collect();
    let wanted: HashSet<&str> = enabled.iter().map(Slug::as_str).collect();

    let mut drifted: Vec<String> = if dev_mode {
        Vec::new()
    } else {
        wanted
            .iter()
            .filter(|slug| !on_disk.contains(*slug))
            .map(|slug| slug.to_string())
            .collect()
    };
    drifted.sort();

    let mut seen = HashSet::new();
    let activation = discovered
        .iter()
        .filter(|m| dev_mode || wanted.contains(m.slug.as_str()))
        .filter(|m| seen.insert(m.slug.clone()))
        .cloned()
        .collect();

    (activation, drifted)
}

pub struct ModuleLoader {
    registry: Arc<dyn RegistryStore>,
    providers: Arc<ProviderTable>,
    modules_root: PathBuf,
    dev_mode: bool,
}

impl ModuleLoader {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        providers: Arc<ProviderTable>,
        modules_root: impl Into<PathBuf>,
        dev_mode: bool,
    ) -> Self {
        Self {
            registry,
            providers,
            modules_root: modules_root.into(),
            dev_mode,
        }
    }

    async fn enabled_slugs(&self) -> Vec<Slug> {
        match self.registry.is_initialized().await {
            Ok(true) => {}
            Ok(false) => {
                info!("Module registry not initialized; no modules enabled");
                return Vec::new();
            }
            Err(e) => {
                warn!("Cannot check module registry: {}", e);
                return Vec::new();
            }
        }

        self.registry.enabled_slugs().await.unwrap_or_else(|e| {
            warn!("Cannot read enabled modules: {}", e);
            Vec::new()
        })
    }

    /// Work out the activation set without registering anything.
    ///
    /// Emits one warning per drifted slug.
    pub async fn plan(&self) -> ActivationPlan {
        let enabled = if self.dev_mode {
            Vec::new()
        } else {
            self.enabled_slugs().await
        };
        let discovered = discover(&self.modules_root).await;
        let (activation, drifted) = activation_set(self.dev_mode, &enabled, &discovered);

        for slug in &drifted {
            warn!(
                slug = %slug,
                root = %self.modules_root.display(),
                "Module is enabled in the registry but its directory is missing"
            );
        }

        ActivationPlan {
            dev_mode: self.dev_mode,
            discovered,
            activation,
            drifted,
        }
    }

    /// Register every module in the activation set with `host`.
    pub async fn load_enabled_modules(&self, host: &mut dyn ModuleHost) -> LoadReport {
        let plan = self.plan().await;
        let mut report = LoadReport {
            drifted: plan.drifted.clone(),
            ..LoadReport::default()
        };

        if plan.dev_mode {
            info!(count = plan.activation.len(), "Dev mode: loading every discovered module");
        }

        for module in plan.activation {
            let manifest = match ModuleManifest::load(&module.path).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(slug = %module.slug, "Skipping module with unreadable manifest: {}", e);
                    report.skipped.push(SkippedModule {
                        slug: module.slug,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let provider_key = ModuleManifest::provider_key(manifest.as_ref(), &module.dir_name);
            let Some(provider) = self.providers.resolve(&provider_key) else {
                warn!(slug = %module.slug, key = %provider_key, "No provider registered for module");
                report.skipped.push(SkippedModule {
                    slug: module.slug,
                    reason: format!("provider '{provider_key}' not found"),
                });
                continue;
            };

            let context = ModuleContext {
                slug: module.slug.clone(),
                dir_name: module.dir_name,
                path: module.path,
                provider_key,
                manifest,
            };

            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                host.register_provider(&context, provider)
            }));

            match outcome {
                Ok(Ok(())) => {
                    debug!(slug = %context.slug, key = %context.provider_key, "Module registered");
                    report.activated.push(context.slug);
                }
                Ok(Err(e)) => {
                    error!(slug = %context.slug, "Module registration failed: {:#}", e);
                    report.failed.push(FailedModule {
                        slug: context.slug,
                        error: format!("{e:#}"),
                    });
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(slug = %context.slug, "Module registration panicked: {}", message);
                    report.failed.push(FailedModule {
                        slug: context.slug,
                        error: format!("panicked: {message}"),
                    });
                }
            }
        }

        info!(
            activated = report.activated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            drifted = report.drifted.len(),
            "Module loading finished"
        );
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
