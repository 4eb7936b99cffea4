//! Filesystem helpers shared by the build and cleanup passes.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use walkdir::WalkDir;

/// Files to ignore during directory traversal
pub const IGNORED_FILES: &[&str] = &[".DS_Store"];

fn is_ignored(name: &std::ffi::OsStr) -> bool {
    let name = name.to_str().unwrap_or_default();
    IGNORED_FILES.contains(&name)
}

/// Collect all files from a directory recursively
pub fn collect_all_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !is_ignored(e.file_name()))
        .map(|e| e.into_path())
        .collect()
}

/// Collect files grouped by the directory directly containing them.
///
/// Directories come in walk order (parents before children), each with its
/// own files sorted by name. Empty directories are kept so that directory
/// events still fire for them.
pub fn collect_files_by_dir(dir: &Path) -> Vec<(PathBuf, Vec<PathBuf>)> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| {
            let files = WalkDir::new(e.path())
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|f| f.ok())
                .filter(|f| f.file_type().is_file())
                .filter(|f| !is_ignored(f.file_name()))
                .map(|f| f.into_path())
                .collect();
            (e.into_path(), files)
        })
        .collect()
}

/// Modification time as float seconds since the Unix epoch.
pub fn mtime(path: &Path) -> io::Result<f64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(epoch_seconds(modified))
}

pub fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Remove a file, then its parent directory if that left it empty.
///
/// `keep` is never pruned, so the output root survives its last file.
pub fn remove_file_and_prune(path: &Path, keep: &Path) -> io::Result<()> {
    fs::remove_file(path)?;
    if let Some(parent) = path.parent().filter(|p| *p != keep) {
        // Fails on non-empty directories, which is what we want.
        let _ = fs::remove_dir(parent);
    }
    Ok(())
}
