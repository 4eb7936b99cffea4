//! Folder roles and path mapping between them.
//!
//! Every file of a site lives under one of a fixed set of folders. The folder a
//! path starts with decides what happens to it:
//!
//! | Role      | On change              | Example files              |
//! |-----------|------------------------|----------------------------|
//! | `layout`  | Full rebuild           | `layouts/layout.html`      |
//! | `include` | Copied individually    | `includes/style.css`       |
//! | `input`   | Rendered individually  | `inputs/index.md`          |
//! | `output`  | Never a source         | `outputs/index.html`       |
//! | `script`  | Ignored                | `scripts/*`                |
//!
//! All mapping here is pure path arithmetic: nothing touches the filesystem.
//! Paths handed to [`FolderMap`] are relative to the site root.

use crate::config::SiteConfig;
use std::path::{Path, PathBuf};

/// Role of a top-level site folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Layout,
    Include,
    Input,
    Output,
    Script,
}

impl Role {
    pub const ALL: [Self; 5] = [
        Self::Layout,
        Self::Include,
        Self::Input,
        Self::Output,
        Self::Script,
    ];

    /// Get the short name for this role (used in logs)
    pub const fn name(self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Include => "include",
            Self::Input => "input",
            Self::Output => "output",
            Self::Script => "script",
        }
    }
}

/// Folder roots, accepted input extensions and the output extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMap {
    root: PathBuf,
    layout: PathBuf,
    include: PathBuf,
    input: PathBuf,
    output: PathBuf,
    script: PathBuf,
    input_ext: Vec<String>,
    output_ext: String,
}

impl FolderMap {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            root: config.root.clone(),
            layout: config.layout_folder.clone(),
            include: config.include_folder.clone(),
            input: config.input_folder.clone(),
            output: config.output_folder.clone(),
            script: config.script_folder.clone(),
            input_ext: config.input_ext.clone(),
            output_ext: config.output_ext.clone(),
        }
    }

    /// Site root all folders are relative to.
    pub fn site_root(&self) -> &Path {
        &self.root
    }

    /// Folder bound to `role`, relative to the site root.
    pub fn folder(&self, role: Role) -> &Path {
        match role {
            Role::Layout => &self.layout,
            Role::Include => &self.include,
            Role::Input => &self.input,
            Role::Output => &self.output,
            Role::Script => &self.script,
        }
    }

    pub fn input_exts(&self) -> &[String] {
        &self.input_ext
    }

    pub fn output_ext(&self) -> &str {
        &self.output_ext
    }

    /// Site-relative path to an absolute one.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Site-relative form of `path`. Relative paths pass through.
    ///
    /// Returns `None` for absolute paths outside the site root.
    pub fn relativize(&self, path: &Path) -> Option<PathBuf> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path.strip_prefix(&self.root).unwrap_or(path)
        };
        Some(strip_cur_dir(rel).to_path_buf())
    }

    /// Determine which folder a site-relative path belongs to.
    ///
    /// The path must lie strictly below the folder: a folder itself, a path
    /// too shallow to contain a role segment, or a foreign path yields `None`.
    /// The deepest matching folder wins when folders nest.
    pub fn classify(&self, path: &Path) -> Option<Role> {
        let path = strip_cur_dir(path);
        Role::ALL
            .into_iter()
            .filter(|role| {
                let folder = self.folder(*role);
                path.starts_with(folder) && path != folder
            })
            .max_by_key(|role| self.folder(*role).components().count())
    }

    /// Whether the file extension is one of the accepted input extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.accepts_ext(ext))
    }

    pub fn accepts_ext(&self, ext: &str) -> bool {
        self.input_ext.iter().any(|accepted| accepted == ext)
    }

    /// Move `path` from one folder to another.
    ///
    /// `from` defaults to the folder `path` is classified under. When
    /// `extension` is given the trailing extension is replaced as well.
    /// Returns `None` if `path` does not lie in the `from` folder.
    pub fn swap_root(
        &self,
        path: &Path,
        from: Option<Role>,
        to: Role,
        extension: Option<&str>,
    ) -> Option<PathBuf> {
        let from = from.or_else(|| self.classify(path))?;
        let rest = strip_cur_dir(path).strip_prefix(self.folder(from)).ok()?;
        let swapped = self.folder(to).join(rest);

        Some(match extension {
            Some(ext) => exchange_extension(&swapped, ext),
            None => swapped,
        })
    }
}

/// Replace the extension of `path`. Paths without one are left unchanged.
pub fn exchange_extension(path: &Path, extension: &str) -> PathBuf {
    if path.extension().is_some() {
        path.with_extension(extension)
    } else {
        path.to_path_buf()
    }
}

/// Canonical cache key of a site-relative path: `/`-separated components.
pub fn cache_key(path: &Path) -> String {
    strip_cur_dir(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_cur_dir(path: &Path) -> &Path {
    path.strip_prefix(".").unwrap_or(path)
}
