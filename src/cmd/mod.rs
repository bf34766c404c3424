pub mod blocklist;
pub mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Recursive, caching, privacy-preserving DNS resolver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        default_value = "/etc/redoubt/redoubt.toml",
        env = "CONFIG_PATH"
    )]
    config_path: PathBuf,
    #[command(subcommand)]
    inner: Commands,
}

impl Args {
    pub async fn run(self) {
        let config = crate::config::Config::load(&self.config_path);
        match self.inner {
            Commands::Blocklist(inner) => inner.run(config).await,
            Commands::Serve(inner) => inner.run(config).await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Blocklist(blocklist::Command),
    Serve(serve::Command),
}
