//! Kiln - An incremental static site builder.

mod build;
mod cache;
mod cli;
mod config;
mod event;
mod ext;
mod judge;
mod logger;
mod page;
mod processor;
mod render;
mod serve;
mod utils;
mod watch;

use anyhow::Result;
use build::Builder;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_site;
use std::path::Path;
use watch::watch_until_interrupted;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut builder = Builder::new(config)?;
    ext::load_extensions(&mut builder)?;

    match &cli.command {
        Commands::Build { watch, .. } => {
            builder.build_all()?;
            if *watch {
                watch_until_interrupted(&mut builder)?;
            }
            Ok(())
        }
        Commands::Serve { .. } => {
            builder.build_all()?;
            serve_site(&mut builder)
        }
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = SiteConfig::load(&config_path, cli.require_config)?;
    config.update_with_cli(cli);
    config.validate()?;

    Ok(config)
}
