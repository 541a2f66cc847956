//! Module entry points and the table the loader resolves them through.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::manifest::ModuleManifest;

/// What a module gets to see of itself when it is registered.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub slug: String,
    pub dir_name: String,
    pub path: PathBuf,
    pub provider_key: String,
    pub manifest: Option<ModuleManifest>,
}

/// A module's entry point.
pub trait ModuleProvider: Send + Sync {
    fn register(&self, module: &ModuleContext) -> eyre::Result<()>;
}

impl<F> ModuleProvider for F
where
    F: Fn(&ModuleContext) -> eyre::Result<()> + Send + Sync,
{
    fn register(&self, module: &ModuleContext) -> eyre::Result<()> {
        self(module)
    }
}

/// The application modules are loaded into.
pub trait ModuleHost {
    /// Register one module's provider. The default just runs the provider.
    fn register_provider(
        &mut self,
        module: &ModuleContext,
        provider: Arc<dyn ModuleProvider>,
    ) -> eyre::Result<()> {
        provider.register(module)
    }
}

/// Capability lookup table from provider key to entry point.
///
/// Keys are matched exactly, so directory casing is significant.
#[derive(Default, Clone)]
pub struct ProviderTable {
    providers: HashMap<String, Arc<dyn ModuleProvider>>,
}

impl ProviderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, provider: Arc<dyn ModuleProvider>) {
        self.providers.insert(key.into(), provider);
    }

    pub fn with(mut self, key: impl Into<String>, provider: Arc<dyn ModuleProvider>) -> Self {
        self.register(key, provider);
        self
    }

    pub fn resolve(&self, key: &str) -> Option<Arc<dyn ModuleProvider>> {
        self.providers.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.providers.keys().collect();
        keys.sort();
        f.debug_struct("ProviderTable").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_keys_only() {
        let provider: Arc<dyn ModuleProvider> =
            Arc::new(|_: &ModuleContext| -> eyre::Result<()> { Ok(()) });
        let table = ProviderTable::new().with("Billing/providers/module", provider);

        assert!(table.contains("Billing/providers/module"));
        assert!(table.resolve("billing/providers/module").is_none());
        assert_eq!(table.len(), 1);
    }
}
