//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kiln incremental static site builder CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Site root every folder is resolved against (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to the root (default: kiln.toml)
    #[arg(short = 'C', long = "config-file", default_value = "kiln.toml")]
    pub config: PathBuf,

    /// Fail instead of falling back to defaults when the config file is missing
    #[arg(long)]
    pub require_config: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build every stale page and include, then remove orphaned outputs
    Build {
        /// Keep running and rebuild on file changes
        #[arg(short, long)]
        watch: bool,

        /// Ignore timestamps and rebuild everything
        #[arg(short, long)]
        force: bool,
    },

    /// Build, then serve the output folder and rebuild on change
    Serve {
        /// Address to bind on (overrides `serve.interface`)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// Ignore timestamps and rebuild everything
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from(["kiln", "build", "--watch"]);
        assert_eq!(cli.config, PathBuf::from("kiln.toml"));
        assert!(!cli.require_config);
        assert!(matches!(
            cli.command,
            Commands::Build {
                watch: true,
                force: false
            }
        ));
    }

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::parse_from([
            "kiln",
            "--config-file",
            "site.toml",
            "--require-config",
            "serve",
            "--port",
            "3000",
            "--host",
            "0.0.0.0",
        ]);
        assert_eq!(cli.config, PathBuf::from("site.toml"));
        assert!(cli.require_config);
        match cli.command {
            Commands::Serve { host, port, .. } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(3000));
            }
            Commands::Build { .. } => panic!("expected serve"),
        }
    }
}
