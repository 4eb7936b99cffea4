//! Site configuration management for `kiln.toml`.
//!
//! # Keys
//!
//! | Key               | Purpose                                          |
//! |-------------------|--------------------------------------------------|
//! | `*_folder`        | Folder roles (layout, include, input, output, script) |
//! | `default_layout`  | Layout used by pages, relative to the site root  |
//! | `caches_file`     | Where the build cache is persisted               |
//! | `input_ext`       | Accepted page extensions                         |
//! | `output_ext`      | Extension of rendered pages                      |
//! | `debug_mode`      | Print full cause chains for failures             |
//! | `force_build`     | Ignore timestamps and rebuild everything         |
//! | `extensions`      | Built-in extensions to load at startup           |
//! | `[metadata]`      | Free-form values exposed to every page           |
//! | `[serve]`         | Development server (interface, port)             |
//!
//! # Example
//!
//! ```toml
//! input_folder = "inputs"
//! output_folder = "outputs"
//! input_ext = ["md", "markdown"]
//! extensions = ["dates"]
//!
//! [metadata]
//! site_name = "My Notes"
//!
//! [serve]
//! port = 8000
//! ```

pub mod defaults;
mod error;
mod serve;

pub use error::ConfigError;
use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use crate::utils::category::FolderMap;
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing kiln.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Working root every folder is resolved against (set after loading)
    #[serde(skip)]
    #[educe(Default = defaults::root())]
    pub root: PathBuf,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Folder holding layout templates.
    #[serde(default = "defaults::layout_folder")]
    #[educe(Default = defaults::layout_folder())]
    pub layout_folder: PathBuf,

    /// Folder whose files are copied verbatim to the output.
    #[serde(default = "defaults::include_folder")]
    #[educe(Default = defaults::include_folder())]
    pub include_folder: PathBuf,

    /// Folder holding the pages of the site.
    #[serde(default = "defaults::input_folder")]
    #[educe(Default = defaults::input_folder())]
    pub input_folder: PathBuf,

    /// Destination folder.
    #[serde(default = "defaults::output_folder")]
    #[educe(Default = defaults::output_folder())]
    pub output_folder: PathBuf,

    /// Folder reserved for site scripts. Never built, never a cleanup target.
    #[serde(default = "defaults::script_folder")]
    #[educe(Default = defaults::script_folder())]
    pub script_folder: PathBuf,

    /// Layout used by every page unless an extension picks another one.
    #[serde(default = "defaults::default_layout")]
    #[educe(Default = defaults::default_layout())]
    pub default_layout: PathBuf,

    /// Cache file, relative to the root.
    #[serde(default = "defaults::caches_file")]
    #[educe(Default = defaults::caches_file())]
    pub caches_file: PathBuf,

    /// Extensions of files rendered as pages.
    #[serde(default = "defaults::input_ext")]
    #[educe(Default = defaults::input_ext())]
    pub input_ext: Vec<String>,

    /// Extension of rendered pages.
    #[serde(default = "defaults::output_ext")]
    #[educe(Default = defaults::output_ext())]
    pub output_ext: String,

    /// Show the whole cause chain when a file fails.
    #[serde(default)]
    pub debug_mode: bool,

    /// Rebuild everything regardless of timestamps.
    #[serde(default)]
    pub force_build: bool,

    /// Built-in extensions to load, by name.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Values exposed to every page's template context.
    #[serde(default)]
    pub metadata: HashMap<String, toml::Value>,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let mut config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        config.normalize_extensions();
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)
            .with_context(|| format!("failed to load {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// With `require` set, a missing file is an error instead.
    pub fn load(path: &Path, require: bool) -> Result<Self> {
        match (path.exists(), require) {
            (true, _) => Self::from_path(path),
            (false, true) => bail!(ConfigError::Missing(path.to_path_buf())),
            (false, false) => Ok(Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            }),
        }
    }

    /// Folder roles and extensions as a path mapper.
    pub fn folders(&self) -> FolderMap {
        FolderMap::from_config(self)
    }

    /// Absolute location of the cache file.
    pub fn caches_path(&self) -> PathBuf {
        self.root.join(&self.caches_file)
    }

    /// `[metadata]` converted into a template context.
    pub fn metadata_context(&self) -> serde_json::Map<String, serde_json::Value> {
        self.metadata
            .iter()
            .filter_map(|(key, value)| {
                serde_json::to_value(value)
                    .ok()
                    .map(|value| (key.clone(), value))
            })
            .collect()
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli.root.clone().unwrap_or_else(defaults::root);
        self.root = Self::normalize_path(&root);

        match &cli.command {
            Commands::Build { force, .. } => {
                self.force_build |= *force;
            }
            Commands::Serve { host, port, force } => {
                Self::update_option(&mut self.serve.interface, host.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                self.force_build |= *force;
            }
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Extensions are written without the leading dot.
    fn normalize_extensions(&mut self) {
        for ext in &mut self.input_ext {
            *ext = ext.trim_start_matches('.').to_string();
        }
        self.output_ext = self.output_ext.trim_start_matches('.').to_string();
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate folder roles and extensions.
    pub fn validate(&self) -> Result<()> {
        let folders = [
            ("layout_folder", &self.layout_folder),
            ("include_folder", &self.include_folder),
            ("input_folder", &self.input_folder),
            ("output_folder", &self.output_folder),
            ("script_folder", &self.script_folder),
        ];

        for (index, (name, folder)) in folders.iter().enumerate() {
            if folder.as_os_str().is_empty() {
                bail!(ConfigError::Validation(format!("[{name}] must not be empty")));
            }
            if folder.is_absolute() {
                bail!(ConfigError::Validation(format!(
                    "[{name}] must be relative to the site root"
                )));
            }
            if let Some((other, _)) = folders[..index].iter().find(|(_, f)| f == folder) {
                bail!(ConfigError::Validation(format!(
                    "[{name}] and [{other}] point to the same folder"
                )));
            }
        }

        if self.input_ext.is_empty() || self.input_ext.iter().any(String::is_empty) {
            bail!(ConfigError::Validation(
                "[input_ext] must list at least one extension".into()
            ));
        }
        if self.output_ext.is_empty() {
            bail!(ConfigError::Validation("[output_ext] must not be empty".into()));
        }
        if self.default_layout.as_os_str().is_empty() {
            bail!(ConfigError::Validation("[default_layout] must not be empty".into()));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
