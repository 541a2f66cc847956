use eyre::Result;
use std::io::{self, Write};

use crate::cli::ConfigCommands;
use crate::config::Config;

pub async fn handle_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => handle_set_config(key, value).await,
        ConfigCommands::Get { key } => handle_get_config(key).await,
        ConfigCommands::Show => handle_show_config().await,
        ConfigCommands::Reset { force } => handle_reset_config(force).await,
    }
}

async fn handle_set_config(key: String, value: String) -> Result<()> {
    let mut config = Config::load().await?;

    match config.set_value(&key, &value) {
        Ok(_) => {
            config.save().await?;
            let shown = if key == "catalog.token" {
                config.get_value(&key)?
            } else {
                value
            };
            println!("✅ Configuration updated: {} = {}", key, shown);
        }
        Err(e) => {
            println!("❌ Failed to set configuration: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

async fn handle_get_config(key: String) -> Result<()> {
    let config = Config::load().await?;

    match config.get_value(&key) {
        Ok(value) => {
            println!("{}: {}", key, value);
        }
        Err(e) => {
            println!("❌ Failed to get configuration: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

async fn handle_show_config() -> Result<()> {
    let config = Config::load().await?;
    println!("{}", config.show_all());
    println!("\nConfig file: {}", Config::get_config_path().display());
    Ok(())
}

async fn handle_reset_config(force: bool) -> Result<()> {
    if !force {
        print!("Are you sure you want to reset all configuration? (y/N): ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().to_lowercase().starts_with('y') {
            println!("❌ Cancelled");
            return Ok(());
        }
    }

    Config::reset().await?;
    println!("✅ Configuration reset to defaults");
    Ok(())
}
