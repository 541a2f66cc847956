use std::path::Path;

use eyre::Result;
use modhost_store::{ApiResponse, ModuleService};
use serde_json::json;
use tokio::fs;

use crate::cli::{Commands, LicenseCommands};

/// Run one module operation and hand back the payload to print.
pub async fn handle_module_command(cmd: Commands, service: &ModuleService) -> Result<ApiResponse> {
    let response = match cmd {
        Commands::Install { slug, license } => service.install(&slug, license.as_deref()).await,
        Commands::Toggle { slug } => service.toggle(&slug).await,
        Commands::License {
            command: LicenseCommands::Save { slug, license },
        } => service.save_license(&slug, &license).await,
        Commands::Download {
            slug,
            license,
            output: Some(output),
        } => handle_download_to(service, &slug, &license, &output).await?,
        Commands::Download {
            slug,
            license,
            output: None,
        } => service.download(&slug, &license).await,
        Commands::List { with_deleted } => service.list_modules(with_deleted).await,
        Commands::Status => service.status().await,
        Commands::UpdateCore { url } => service.update_core(&url).await,
        Commands::Delete { slug } => service.delete(&slug).await,
        Commands::Restore { slug } => service.restore(&slug).await,
        Commands::Plan => service.plan_response().await,
        Commands::Config { .. } => {
            return Err(eyre::eyre!("config commands do not touch the module service"));
        }
    };

    Ok(response)
}

async fn handle_download_to(
    service: &ModuleService,
    slug: &str,
    license: &str,
    output: &Path,
) -> Result<ApiResponse> {
    let response = service.download(slug, license).await;
    let ApiResponse::Success { data: Some(data), .. } = &response else {
        return Ok(response);
    };
    let Some(source) = data["path"].as_str() else {
        return Ok(response);
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let bytes = fs::copy(source, output).await?;
    tracing::info!(slug, bytes, output = %output.display(), "Archive copied");

    Ok(ApiResponse::success_with(
        "Archive copied.",
        json!({
            "slug": slug,
            "path": output,
            "bytes": bytes,
        }),
    ))
}
