use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[clap(name = "modhost", about = "Install, toggle and inspect host application modules")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Install a module from the catalog
    Install {
        slug: String,
        /// License key for paid modules
        #[clap(long)]
        license: Option<String>,
    },
    /// Flip a module between enabled and disabled
    Toggle { slug: String },
    /// Manage stored license keys
    License {
        #[clap(subcommand)]
        command: LicenseCommands,
    },
    /// Fetch the cached archive of an installed module
    Download {
        slug: String,
        #[clap(long)]
        license: String,
        /// Copy the archive to this path
        #[clap(long, short)]
        output: Option<PathBuf>,
    },
    /// List installed modules and what the catalog offers
    List {
        /// Include soft-deleted records
        #[clap(long)]
        with_deleted: bool,
    },
    /// Show token, catalog, core and module status
    Status,
    /// Replace the core tree from a release archive
    UpdateCore { url: String },
    /// Soft-delete a module record
    Delete { slug: String },
    /// Restore a soft-deleted module record
    Restore { slug: String },
    /// Show which modules the next boot would activate
    Plan,
    /// Manage configuration
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum LicenseCommands {
    /// Store a license key for a module
    Save { slug: String, license: String },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set { key: String, value: String },
    /// Get a configuration value
    Get { key: String },
    /// Show all configuration
    Show,
    /// Reset configuration to defaults
    Reset {
        #[clap(long)]
        force: bool,
    },
}
