//! File system watcher for incremental rebuilds.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────────┐   ┌─────────────────┐
//! │  notify  │──▶│    channel    │──▶│ WatchDispatcher  │──▶│ Builder         │
//! │  thread  │   │ (WatchMessage)│   │ classify/debounce│   │ build() / clean()│
//! └──────────┘   └───────▲───────┘   └──────────────────┘   └─────────────────┘
//!                        │ Shutdown
//!                   Ctrl+C handler
//! ```
//!
//! The loop owning the builder is the only consumer of the channel, so every
//! build and cleanup runs one at a time.
//!
//! | Change              | Action                                             |
//! |---------------------|----------------------------------------------------|
//! | created / modified  | `build(path)` for files                            |
//! | deleted             | `clean(path, output counterpart)` (input, include) |
//! | deleted layout      | `forget(path)`: drop its cache entry               |
//! | moved               | deleted at source, then created at destination     |

use crate::{
    build::{Builder, Triggered},
    log, logger,
    processor::Outcome,
    utils::category::{FolderMap, Role},
};
use anyhow::{Context, Result};
use notify::{
    Event, EventKind, RecursiveMode, Watcher,
    event::{ModifyKind, RemoveKind, RenameMode},
};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{Receiver, Sender, channel},
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;

const WATCHED_ROLES: &[Role] = &[Role::Layout, Role::Include, Role::Input];

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Log a failed watch action with its cause.
fn log_watch_error(action: &str, path: &Path, err: &anyhow::Error) {
    log!("watch"; "{action} failed ({})", path.display());
    log!("watch"; "{err:#}");
}

// =============================================================================
// Changes
// =============================================================================

/// A filesystem change, reduced to what the dispatcher acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    Created(PathBuf),
    Modified(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
    Deleted { path: PathBuf, is_directory: bool },
}

/// Translate a raw notification into changes.
pub fn changes_from_event(event: Event) -> Vec<FsChange> {
    let Event { kind, mut paths, .. } = event;

    match kind {
        EventKind::Create(_) => paths.into_iter().map(FsChange::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let to = paths.remove(1);
            let from = paths.remove(0);
            vec![FsChange::Moved { from, to }]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .into_iter()
            .map(|path| FsChange::Deleted {
                path,
                is_directory: false,
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(FsChange::Created).collect()
        }
        // Platforms that cannot tell which side of a rename a path is on.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    FsChange::Created(path)
                } else {
                    FsChange::Deleted {
                        path,
                        is_directory: false,
                    }
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.into_iter().map(FsChange::Modified).collect(),
        EventKind::Remove(kind) => paths
            .into_iter()
            .map(|path| FsChange::Deleted {
                path,
                is_directory: kind == RemoveKind::Folder,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Debounce State
// =============================================================================

/// Drops repeats of the last accepted path inside the debounce window.
struct Debouncer {
    last: Option<(PathBuf, Instant)>,
    window: Duration,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self { last: None, window }
    }

    fn accept(&mut self, path: &Path, now: Instant) -> bool {
        if let Some((last, at)) = &self.last
            && last == path
            && now.saturating_duration_since(*at) < self.window
        {
            return false;
        }
        self.last = Some((path.to_path_buf(), now));
        true
    }

    /// A deleted path must not swallow its re-creation.
    fn forget(&mut self, path: &Path) {
        if self.last.as_ref().is_some_and(|(last, _)| last == path) {
            self.last = None;
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// What the dispatcher drives. Implemented by [`Builder`].
pub trait BuildTarget {
    fn folders(&self) -> &FolderMap;
    fn build(&mut self, path: &Path, force: bool) -> Result<Triggered>;
    fn clean(&mut self, input: Option<&Path>, output: &Path, is_directory: bool) -> Result<()>;
    /// Drop what is remembered about a deleted source that has no output.
    fn forget(&mut self, input: &Path, is_directory: bool);
}

impl BuildTarget for Builder {
    fn folders(&self) -> &FolderMap {
        Builder::folders(self)
    }

    fn build(&mut self, path: &Path, force: bool) -> Result<Triggered> {
        Builder::build(self, path, force)
    }

    fn clean(&mut self, input: Option<&Path>, output: &Path, is_directory: bool) -> Result<()> {
        Builder::clean(self, input, output, is_directory)
    }

    fn forget(&mut self, input: &Path, is_directory: bool) {
        Builder::forget(self, input, is_directory);
    }
}

/// Turns changes into targeted builds and cleanups.
pub struct WatchDispatcher {
    debouncer: Debouncer,
}

impl Default for WatchDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchDispatcher {
    pub fn new() -> Self {
        Self {
            debouncer: Debouncer::new(Duration::from_millis(DEBOUNCE_MS)),
        }
    }

    pub fn handle(&mut self, target: &mut impl BuildTarget, change: FsChange, now: Instant) {
        match change {
            FsChange::Created(path) | FsChange::Modified(path) => {
                self.on_changed(target, &path, now);
            }
            FsChange::Deleted { path, is_directory } => {
                self.on_deleted(target, &path, is_directory);
            }
            FsChange::Moved { from, to } => {
                let is_directory = to.is_dir();
                self.on_deleted(target, &from, is_directory);
                self.on_changed(target, &to, now);
            }
        }
    }

    /// Site-relative path and role, or `None` for paths we never act on.
    fn resolve(target: &impl BuildTarget, path: &Path) -> Option<(PathBuf, Role)> {
        if is_temp_file(path) {
            return None;
        }
        let folders = target.folders();
        let rel = folders.relativize(path)?;
        let role = folders.classify(&rel)?;
        Some((rel, role))
    }

    fn on_changed(&mut self, target: &mut impl BuildTarget, path: &Path, now: Instant) {
        let Some((rel, _)) = Self::resolve(target, path) else {
            return;
        };
        if !self.debouncer.accept(&rel, now) {
            return;
        }
        if !target.folders().absolute(&rel).is_file() {
            return;
        }

        log!("watch"; "[{}] {} changed", logger::now(), rel.display());
        match target.build(&rel, false) {
            Ok(Triggered::FullBuild(counters)) => {
                log!("watch"; "layout changed, {} files rebuilt", counters.processed());
            }
            Ok(Triggered::Job(Outcome::Failed)) => {
                log!("watch"; "{} still has errors", rel.display());
            }
            Ok(Triggered::Job(_) | Triggered::Ignored) => {}
            Err(err) => log_watch_error("build", &rel, &err),
        }
    }

    fn on_deleted(&mut self, target: &mut impl BuildTarget, path: &Path, is_directory: bool) {
        let Some((rel, role)) = Self::resolve(target, path) else {
            return;
        };
        self.debouncer.forget(&rel);

        let folders = target.folders();
        let output = match role {
            Role::Input => {
                if rel.extension().is_some() && !folders.accepts(&rel) {
                    return;
                }
                let extension = (!is_directory).then(|| folders.output_ext());
                folders.swap_root(&rel, Some(Role::Input), Role::Output, extension)
            }
            Role::Include => folders.swap_root(&rel, Some(Role::Include), Role::Output, None),
            Role::Layout => {
                log!("watch"; "[{}] {} deleted", logger::now(), rel.display());
                target.forget(&rel, is_directory);
                return;
            }
            Role::Output | Role::Script => None,
        };
        let Some(output) = output else {
            return;
        };

        log!("watch"; "[{}] {} deleted", logger::now(), rel.display());
        if let Err(err) = target.clean(Some(&rel), &output, is_directory) {
            log_watch_error("clean", &rel, &err);
        }
    }
}

// =============================================================================
// Watch Loop
// =============================================================================

/// Messages consumed by the watch loop.
#[derive(Debug)]
pub enum WatchMessage {
    Fs(notify::Result<Event>),
    Shutdown,
}

fn setup_watchers(watcher: &mut impl Watcher, folders: &FolderMap) -> Result<()> {
    let mut watched = Vec::new();

    for &role in WATCHED_ROLES {
        let path = folders.absolute(folders.folder(role));
        if path.is_dir() {
            watcher
                .watch(&path, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}: {}", role.name(), path.display()))?;
            watched.push(format!("{}/", folders.folder(role).display()));
        }
    }

    if !watched.is_empty() {
        log!("watch"; "watching {}", watched.join(", "));
    }
    Ok(())
}

/// Consume filesystem events until a [`WatchMessage::Shutdown`] arrives.
///
/// The cache is saved on the way out.
pub fn watch_blocking(
    builder: &mut Builder,
    tx: &Sender<WatchMessage>,
    rx: &Receiver<WatchMessage>,
) -> Result<()> {
    let fs_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res| {
        // The loop is gone once it stopped receiving; nothing left to do.
        let _ = fs_tx.send(WatchMessage::Fs(res));
    })
    .context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, builder.folders())?;

    let mut dispatcher = WatchDispatcher::new();

    while let Ok(message) = rx.recv() {
        match message {
            WatchMessage::Fs(Ok(event)) => {
                for change in changes_from_event(event) {
                    dispatcher.handle(builder, change, Instant::now());
                }
            }
            WatchMessage::Fs(Err(e)) => log!("watch"; "error: {e}"),
            WatchMessage::Shutdown => break,
        }
    }

    drop(watcher);
    builder.save_cache()
}

/// Watch until Ctrl+C, for `build --watch`.
pub fn watch_until_interrupted(builder: &mut Builder) -> Result<()> {
    let (tx, rx) = channel();

    let tx_for_signal = tx.clone();
    ctrlc::set_handler(move || {
        log!("watch"; "shutting down...");
        let _ = tx_for_signal.send(WatchMessage::Shutdown);
    })
    .context("Failed to set Ctrl+C handler")?;

    watch_blocking(builder, &tx, &rx)
}
