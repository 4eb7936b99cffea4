//! Staleness decisions.
//!
//! Change detection is purely timestamp based. Two modes exist:
//!
//! - **Tracked**: the input's mtime is compared against the cache. Used for
//!   layouts, which have no output of their own to compare with.
//! - **Direct**: the input's mtime is compared against its output's mtime.

use crate::{
    cache::{CacheEntry, CacheStore},
    utils::{
        category::{FolderMap, Role, cache_key},
        fs::mtime,
    },
};
use anyhow::{Context, Result};
use std::path::Path;

/// What to do with one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Never built before.
    Fresh,
    /// Built before but out of date.
    Stale,
    /// Up to date; nothing to do.
    Skip,
}

impl Decision {
    pub const fn is_skip(self) -> bool {
        matches!(self, Self::Skip)
    }
}

/// Input/output pair to judge. Paths are site-relative.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub input: &'a Path,
    pub output: Option<&'a Path>,
    /// Rebuild even when timestamps say otherwise.
    pub force: bool,
    /// Compare against the cache instead of the output.
    pub tracked: bool,
}

impl<'a> Subject<'a> {
    pub fn direct(input: &'a Path, output: &'a Path, force: bool) -> Self {
        Self {
            input,
            output: Some(output),
            force,
            tracked: false,
        }
    }

    pub fn tracked(input: &'a Path) -> Self {
        Self {
            input,
            output: None,
            force: false,
            tracked: true,
        }
    }
}

/// Staleness strategy handed to the builder at construction.
pub trait Judge: Send {
    fn judge(
        &self,
        folders: &FolderMap,
        cache: &mut CacheStore,
        subject: Subject<'_>,
    ) -> Result<Decision>;
}

/// Modification-time based judge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtimeJudge {
    /// Global force flag: never consult the cache.
    pub force_build: bool,
}

impl MtimeJudge {
    pub const fn new(force_build: bool) -> Self {
        Self { force_build }
    }
}

impl Judge for MtimeJudge {
    fn judge(
        &self,
        folders: &FolderMap,
        cache: &mut CacheStore,
        subject: Subject<'_>,
    ) -> Result<Decision> {
        let output = subject.output.map(|out| folders.absolute(out));

        if self.force_build {
            return Ok(match output {
                Some(out) if out.exists() => Decision::Stale,
                _ => Decision::Fresh,
            });
        }

        let input = folders.absolute(subject.input);
        let modified = mtime(&input)
            .with_context(|| format!("failed to read mtime of {}", subject.input.display()))?;

        let tracked =
            subject.tracked || folders.classify(subject.input) == Some(Role::Layout);
        if tracked {
            let key = cache_key(subject.input);
            return Ok(match cache.get_mut(&key) {
                None => {
                    let output_path = subject.output.map(cache_key);
                    cache.set(key, CacheEntry::new(modified, output_path));
                    Decision::Fresh
                }
                Some(entry) if entry.last_update >= modified && !subject.force => Decision::Skip,
                Some(entry) => {
                    entry.last_update = entry.last_update.max(modified);
                    Decision::Stale
                }
            });
        }

        let Some(output) = output.filter(|out| out.exists()) else {
            return Ok(Decision::Fresh);
        };
        let built = mtime(&output)
            .with_context(|| format!("failed to read mtime of {}", output.display()))?;

        Ok(if built >= modified && !subject.force {
            Decision::Skip
        } else {
            Decision::Stale
        })
    }
}
