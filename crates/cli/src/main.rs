mod cli;
mod commands;
mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use modhost_registry::{FilesystemRegistry, RegistryStore};
use modhost_store::{ModuleService, ProviderTable, ServiceParts};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::Commands;
use crate::commands::{handle_config_command, handle_module_command};
use crate::config::Config;

const TOKEN_ENV: &str = "MODHOST_CATALOG_TOKEN";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = cli::Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = match cli.command {
        Commands::Config { command } => return handle_config_command(command).await,
        command => command,
    };

    let mut config = Config::load().await?;
    if let Ok(token) = std::env::var(TOKEN_ENV)
        && !token.is_empty()
    {
        config.modules.catalog.token = Some(token);
    }

    let registry = open_registry(&config).await?;
    let modules = config.modules;
    let parts = ServiceParts::http(&modules, registry, Arc::new(ProviderTable::new()))?;
    let service = ModuleService::new(modules, parts);

    let result = handle_module_command(command, &service).await;

    if let Some(stats) = service.shutdown(SHUTDOWN_GRACE).await {
        tracing::debug!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            "Catalog reports drained"
        );
    }

    let response = result?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn open_registry(config: &Config) -> eyre::Result<Arc<dyn RegistryStore>> {
    #[cfg(feature = "postgres")]
    if let Some(url) = &config.database_url {
        let registry = modhost_registry::PostgresRegistry::connect(url).await?;
        registry.initialize().await?;
        tracing::debug!("Using PostgreSQL module registry");
        return Ok(Arc::new(registry));
    }

    #[cfg(not(feature = "postgres"))]
    if config.database_url.is_some() {
        tracing::warn!("database_url is set but this build has no postgres support; using the file registry");
    }

    let registry = FilesystemRegistry::open(config.modules.paths().registry_dir).await?;
    Ok(Arc::new(registry))
}
