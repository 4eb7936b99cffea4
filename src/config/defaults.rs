//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

use std::path::PathBuf;

// ============================================================================
// Folder Defaults
// ============================================================================

pub fn root() -> PathBuf {
    "./".into()
}

pub fn layout_folder() -> PathBuf {
    "layouts".into()
}

pub fn include_folder() -> PathBuf {
    "includes".into()
}

pub fn input_folder() -> PathBuf {
    "inputs".into()
}

pub fn output_folder() -> PathBuf {
    "outputs".into()
}

pub fn script_folder() -> PathBuf {
    "scripts".into()
}

// ============================================================================
// Build Defaults
// ============================================================================

pub fn default_layout() -> PathBuf {
    "layouts/layout.html".into()
}

pub fn caches_file() -> PathBuf {
    ".kiln_caches.json".into()
}

pub fn input_ext() -> Vec<String> {
    vec!["md".into()]
}

pub fn output_ext() -> String {
    "html".into()
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        8000
    }
}
