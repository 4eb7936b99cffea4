//! Build orchestration.
//!
//! # Architecture
//!
//! ```text
//! build_all()
//!     │
//!     ├── BeforeBuildAll
//!     ├── run_tree::<RenderProcessor>()   inputs/   ──render──▶ outputs/
//!     ├── run_tree::<IncludeProcessor>()  includes/ ──copy────▶ outputs/
//!     ├── cleanup()                       remove outputs whose source is gone
//!     ├── save cache
//!     └── AfterBuildAll
//! ```
//!
//! The watcher drives the same machinery one file at a time through
//! [`Builder::build`] and [`Builder::clean`].

use crate::{
    cache::{CacheEntry, CacheStore},
    config::SiteConfig,
    event::{Dispatcher, Event, rebuild_requests},
    judge::{Decision, Judge, MtimeJudge, Subject},
    log,
    logger::report_error,
    page::{Page, PageFactory},
    processor::{IncludeProcessor, Job, Outcome, Processor, RenderProcessor},
    render::Renderers,
    utils::{
        category::{FolderMap, Role, cache_key},
        fs::{collect_all_files, collect_files_by_dir, mtime, remove_file_and_prune},
    },
};
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Instant,
};

/// Per-build success and failure counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildCounters {
    pub ok: usize,
    pub error: usize,
}

impl BuildCounters {
    pub const fn processed(&self) -> usize {
        self.ok + self.error
    }
}

/// What a single-path build ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triggered {
    /// A layout changed; everything was rebuilt.
    FullBuild(BuildCounters),
    Job(Outcome),
    /// The path belongs to no buildable folder.
    Ignored,
}

pub struct Builder {
    config: SiteConfig,
    folders: FolderMap,
    cache: CacheStore,
    pub events: Dispatcher,
    pub(crate) counters: BuildCounters,
    /// Layouts found stale during the current full build.
    pub(crate) updated_layouts: FxHashSet<PathBuf>,
    /// Inputs listeners asked to have force-rebuilt.
    pending_rebuilds: Vec<PathBuf>,
    judge: Box<dyn Judge>,
    page_factory: PageFactory,
    pub(crate) renderers: Renderers,
}

impl Builder {
    /// Create a builder, loading (or creating) the cache file.
    pub fn new(config: SiteConfig) -> Result<Self> {
        let cache = CacheStore::load(&config.caches_path())?;

        Ok(Self {
            folders: config.folders(),
            judge: Box::new(MtimeJudge::new(config.force_build)),
            config,
            cache,
            events: Dispatcher::new(),
            counters: BuildCounters::default(),
            updated_layouts: FxHashSet::default(),
            pending_rebuilds: Vec::new(),
            page_factory: Page::default_factory(),
            renderers: Renderers::default(),
        })
    }

    #[allow(dead_code)] // Reserved API
    pub fn with_judge(mut self, judge: impl Judge + 'static) -> Self {
        self.judge = Box::new(judge);
        self
    }

    #[allow(dead_code)] // Reserved API
    pub fn with_page_factory(mut self, factory: PageFactory) -> Self {
        self.page_factory = factory;
        self
    }

    #[allow(dead_code)] // Reserved API
    pub fn with_renderers(mut self, renderers: Renderers) -> Self {
        self.renderers = renderers;
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn folders(&self) -> &FolderMap {
        &self.folders
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    // ========================================================================
    // Full build
    // ========================================================================

    /// Build every stale page and include, remove orphans, save the cache.
    pub fn build_all(&mut self) -> Result<BuildCounters> {
        let started = Instant::now();
        self.events.dispatch(&mut Event::BeforeBuildAll);

        let output = self.folders.absolute(self.folders.folder(Role::Output));
        fs::create_dir_all(&output)
            .with_context(|| format!("failed to create output folder {}", output.display()))?;

        self.counters = BuildCounters::default();
        self.updated_layouts.clear();

        self.run_tree::<RenderProcessor>();
        self.run_tree::<IncludeProcessor>();

        let counters = self.counters;
        log!(
            "build";
            "{} files were processed in {:.2?}",
            counters.processed(),
            started.elapsed()
        );
        if counters.error > 0 {
            log!("build"; "{} ok, {} failed", counters.ok, counters.error);
        }

        self.cleanup()?;
        self.save_cache()?;

        self.events.dispatch(&mut Event::AfterBuildAll { counters });
        Ok(counters)
    }

    /// Run `P` over every file of its folder, directory by directory.
    fn run_tree<P: Processor>(&mut self) {
        let root = self.folders.absolute(self.folders.folder(P::ROLE));
        if !root.is_dir() {
            return;
        }

        for (dir, files) in collect_files_by_dir(&root) {
            let Some(input_dir) = self.folders.relativize(&dir) else {
                continue;
            };
            let Some(output_dir) =
                self.folders
                    .swap_root(&input_dir, Some(P::ROLE), Role::Output, None)
            else {
                continue;
            };

            self.emit(&mut Event::BeforeBuildDirectory {
                input: &input_dir,
                output: &output_dir,
            });

            for file in files {
                if let Some(input) = self.folders.relativize(&file) {
                    self.run_job::<P>(Job::new(input, output_dir.clone(), false));
                }
            }

            self.emit(&mut Event::AfterBuildDirectory {
                input: &input_dir,
                output: &output_dir,
            });
            self.run_rebuilds();
        }
    }

    fn run_job<P: Processor>(&mut self, job: Job) -> Outcome {
        P::new(job).start(self)
    }

    // ========================================================================
    // Single path
    // ========================================================================

    /// Build one path. Layout changes rebuild the whole site.
    pub fn build(&mut self, path: &Path, force: bool) -> Result<Triggered> {
        let Some(path) = self.folders.relativize(path) else {
            return Ok(Triggered::Ignored);
        };

        let outcome = match self.folders.classify(&path) {
            Some(Role::Layout) => return self.build_all().map(Triggered::FullBuild),
            Some(Role::Input) => self.build_one::<RenderProcessor>(path, force),
            Some(Role::Include) => self.build_one::<IncludeProcessor>(path, force),
            _ => return Ok(Triggered::Ignored),
        };
        self.run_rebuilds();
        Ok(Triggered::Job(outcome))
    }

    fn build_one<P: Processor>(&mut self, input: PathBuf, force: bool) -> Outcome {
        let output_dir = input
            .parent()
            .and_then(|dir| {
                self.folders
                    .swap_root(dir, Some(P::ROLE), Role::Output, None)
            })
            .unwrap_or_else(|| self.folders.folder(Role::Output).to_path_buf());
        self.run_job::<P>(Job::new(input, output_dir, force))
    }

    /// Force-rebuild what listeners asked for, until nothing new is asked.
    fn run_rebuilds(&mut self) {
        let mut done = FxHashSet::default();
        loop {
            let batch = std::mem::take(&mut self.pending_rebuilds);
            if batch.is_empty() {
                break;
            }

            for input in batch {
                if !done.insert(input.clone()) || !self.folders.absolute(&input).is_file() {
                    continue;
                }
                match self.folders.classify(&input) {
                    Some(Role::Input) => {
                        self.build_one::<RenderProcessor>(input, true);
                    }
                    Some(Role::Include) => {
                        self.build_one::<IncludeProcessor>(input, true);
                    }
                    _ => {}
                }
            }
        }
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Forget `input` and remove `output`. A missing target is not an error.
    pub fn clean(&mut self, input: Option<&Path>, output: &Path, is_directory: bool) -> Result<()> {
        let input = input.and_then(|p| self.folders.relativize(p));
        let output = self
            .folders
            .relativize(output)
            .with_context(|| format!("{} is outside the site root", output.display()))?;

        let target = self.folders.absolute(&output);
        let is_directory = is_directory || target.is_dir();

        if let Some(input) = &input {
            self.forget_entries(input, is_directory);
        }

        let output_root = self.folders.absolute(self.folders.folder(Role::Output));
        let removed = if is_directory {
            fs::remove_dir_all(&target)
        } else {
            remove_file_and_prune(&target, &output_root)
        };
        match removed {
            Ok(()) => log!("clean"; "removed {}", output.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to remove {}", output.display()));
            }
        }

        self.emit(&mut Event::Clean {
            input: input.as_deref(),
            output: &output,
            is_directory,
        });
        self.run_rebuilds();
        Ok(())
    }

    /// Drop cache entries of a deleted source that has no output, like a layout.
    pub fn forget(&mut self, input: &Path, is_directory: bool) -> usize {
        let Some(input) = self.folders.relativize(input) else {
            return 0;
        };
        let is_directory = is_directory || self.folders.absolute(&input).is_dir();

        let dropped = self.forget_entries(&input, is_directory);
        if dropped > 0 {
            log!("cache"; "forgot {}", input.display());
        }
        dropped
    }

    fn forget_entries(&mut self, input: &Path, is_directory: bool) -> usize {
        let key = cache_key(input);
        if is_directory {
            self.cache.delete_prefix(&key)
        } else {
            usize::from(self.cache.delete(&key).is_some())
        }
    }

    /// Remove outputs whose source no longer exists, then forget cache
    /// entries whose input is gone. Returns how many outputs went.
    pub fn cleanup(&mut self) -> Result<usize> {
        let removed = self.remove_orphans()?;
        self.prune_cache();
        self.run_rebuilds();
        Ok(removed)
    }

    fn remove_orphans(&mut self) -> Result<usize> {
        let output_root = self.folders.absolute(self.folders.folder(Role::Output));
        if !output_root.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for file in collect_all_files(&output_root) {
            let Some(output) = self.folders.relativize(&file) else {
                continue;
            };

            let candidates = self.source_candidates(&output);
            if candidates
                .iter()
                .any(|c| self.folders.absolute(c).exists())
            {
                continue;
            }

            match remove_file_and_prune(&file, &output_root) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    let err = anyhow::Error::new(err).context("failed to remove orphan");
                    self.report_failure(&output, &err);
                    continue;
                }
            }

            let mut known = None;
            for candidate in candidates {
                if self.cache.delete(&cache_key(&candidate)).is_some() && known.is_none() {
                    known = Some(candidate);
                }
            }

            log!("clean"; "removed {}", output.display());
            self.emit(&mut Event::Clean {
                input: known.as_deref(),
                output: &output,
                is_directory: false,
            });
            removed += 1;
        }

        Ok(removed)
    }

    /// Forget every cache entry whose input no longer exists on disk.
    fn prune_cache(&mut self) -> usize {
        let gone: Vec<String> = self
            .cache
            .keys()
            .filter(|key| !self.folders.absolute(Path::new(key)).exists())
            .cloned()
            .collect();

        for key in &gone {
            self.cache.delete(key);
            log!("cache"; "forgot {key}");
        }
        gone.len()
    }

    /// Every path the output file could have been produced from.
    fn source_candidates(&self, output: &Path) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for role in Role::ALL.into_iter().filter(|r| *r != Role::Output) {
            if role == Role::Input {
                candidates.extend(self.folders.input_exts().iter().filter_map(|ext| {
                    self.folders
                        .swap_root(output, Some(Role::Output), role, Some(ext))
                }));
            } else if let Some(path) =
                self.folders.swap_root(output, Some(Role::Output), role, None)
            {
                candidates.push(path);
            }
        }
        candidates
    }

    // ========================================================================
    // Job plumbing
    // ========================================================================

    /// Dispatch `event`, queueing the rebuilds its listeners ask for.
    pub(crate) fn emit(&mut self, event: &mut Event<'_>) {
        let results = self.events.dispatch_collect(event);
        self.pending_rebuilds.extend(rebuild_requests(&results));
    }

    pub(crate) fn new_page(&mut self, input: &Path) -> Result<Page> {
        let mut page = (self.page_factory)(input, &self.config);
        page.load_front_matter(self.folders.site_root())?;
        self.emit(&mut Event::InitPage(&mut page));
        Ok(page)
    }

    pub(crate) fn judge(&mut self, subject: Subject<'_>) -> Result<Decision> {
        self.judge.judge(&self.folders, &mut self.cache, subject)
    }

    pub(crate) fn prepare_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(self.folders.absolute(dir))
            .with_context(|| format!("failed to create {}", dir.display()))
    }

    /// Record a successful job in the cache.
    pub(crate) fn record(&mut self, job: &Job) -> Result<()> {
        let modified = mtime(&self.folders.absolute(&job.input))
            .with_context(|| format!("failed to read mtime of {}", job.input.display()))?;

        let key = cache_key(&job.input);
        let last_update = self
            .cache
            .get(&key)
            .map_or(modified, |entry| entry.last_update.max(modified));
        let output_path = job.output.as_deref().map(cache_key);

        self.cache.set(key, CacheEntry::new(last_update, output_path));
        Ok(())
    }

    pub(crate) fn report_failure(&self, path: &Path, err: &anyhow::Error) {
        report_error(&path.display().to_string(), err, self.config.debug_mode);
    }

    /// Drop an output left behind by a failed job.
    pub(crate) fn remove_partial(&self, output: &Path) {
        let target = self.folders.absolute(output);
        if target.is_file() && fs::remove_file(&target).is_ok() {
            log!("clean"; "removed partial {}", output.display());
        }
    }

    pub fn save_cache(&self) -> Result<()> {
        self.cache.save(&self.config.caches_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::EventKind,
        render::{CmarkRenderer, Templates},
    };
    use parking_lot::Mutex;
    use serde_json::{Map, Value};
    use std::{
        fs::File,
        sync::Arc,
        time::{Duration, UNIX_EPOCH},
    };

    struct Site {
        dir: tempfile::TempDir,
    }

    impl Site {
        fn new() -> Self {
            let site = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            site.write("layouts/layout.html", "<html>{{ content }}</html>", 100);
            site
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn write(&self, rel: &str, content: &str, secs: u64) {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            self.touch(rel, secs);
        }

        fn touch(&self, rel: &str, secs: u64) {
            let file = File::options().write(true).open(self.path(rel)).unwrap();
            file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
                .unwrap();
        }

        fn config(&self) -> SiteConfig {
            SiteConfig {
                root: self.dir.path().to_path_buf(),
                ..SiteConfig::default()
            }
        }

        fn builder(&self) -> Builder {
            self.builder_with(self.config())
        }

        fn builder_with(&self, config: SiteConfig) -> Builder {
            Builder::new(config).unwrap()
        }
    }

    /// Templates strategy counting renders of page inputs.
    struct CountingTemplates {
        renders: Arc<Mutex<usize>>,
        fail_on: Option<&'static str>,
    }

    impl Templates for CountingTemplates {
        fn render_file(&self, root: &Path, path: &Path, vars: &Map<String, Value>) -> Result<String> {
            if path.starts_with("inputs") {
                *self.renders.lock() += 1;
            }
            if self.fail_on.is_some_and(|name| path.ends_with(name)) {
                anyhow::bail!("broken template");
            }
            crate::render::JinjaTemplates.render_file(root, path, vars)
        }
    }

    fn counting(builder: Builder, fail_on: Option<&'static str>) -> (Builder, Arc<Mutex<usize>>) {
        let renders = Arc::new(Mutex::new(0));
        let builder = builder.with_renderers(Renderers {
            markdown: Box::new(CmarkRenderer),
            templates: Box::new(CountingTemplates {
                renders: Arc::clone(&renders),
                fail_on,
            }),
        });
        (builder, renders)
    }

    #[test]
    fn test_concrete_scenario() {
        let site = Site::new();
        site.write("inputs/index.md", "# Hello", 1_000);

        let mut builder = site.builder();
        let counters = builder.build_all().unwrap();
        assert_eq!(counters, BuildCounters { ok: 1, error: 0 });

        let html = fs::read_to_string(site.path("outputs/index.html")).unwrap();
        assert_eq!(html, "<html><h1>Hello</h1>\n</html>");

        let entry = builder.cache().get("inputs/index.md").unwrap();
        assert_eq!(entry.output_path.as_deref(), Some("outputs/index.html"));
        assert_eq!(entry.last_update, 1_000.0);

        // Persisted in the cache file as well.
        let saved = CacheStore::load(&site.path(".kiln_caches.json")).unwrap();
        assert_eq!(&saved, builder.cache());

        let before = builder.cache().clone();
        let counters = builder.build_all().unwrap();
        assert_eq!(counters.processed(), 0);
        assert_eq!(builder.cache(), &before);
    }

    #[test]
    fn test_idempotent_across_builders() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        site.write("inputs/blog/b.md", "b", 100);
        site.write("includes/style.css", "body {}", 100);

        let (mut builder, renders) = counting(site.builder(), None);
        assert_eq!(builder.build_all().unwrap().ok, 3);
        assert_eq!(*renders.lock(), 2);
        let cache = builder.cache().clone();

        let (mut builder, renders) = counting(site.builder(), None);
        assert_eq!(builder.build_all().unwrap().processed(), 0);
        assert_eq!(*renders.lock(), 0);
        assert_eq!(builder.cache(), &cache);
        assert!(site.path("outputs/style.css").exists());
        assert!(site.path("outputs/blog/b.html").exists());
    }

    #[test]
    fn test_staleness_monotonic() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        site.write("inputs/b.md", "b", 100);

        let (mut builder, renders) = counting(site.builder(), None);
        builder.build_all().unwrap();
        *renders.lock() = 0;

        // Advance the input past both its cache entry and its output.
        site.touch("inputs/a.md", 200);
        site.touch("outputs/a.html", 150);
        assert_eq!(builder.build_all().unwrap().ok, 1);
        assert_eq!(*renders.lock(), 1);
        assert_eq!(builder.cache().get("inputs/a.md").unwrap().last_update, 200.0);

        assert_eq!(builder.build_all().unwrap().processed(), 0);
        assert_eq!(*renders.lock(), 1);
    }

    #[test]
    fn test_layout_propagation() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        site.write("inputs/sub/b.md", "b", 100);

        let (mut builder, renders) = counting(site.builder(), None);
        builder.build_all().unwrap();
        *renders.lock() = 0;

        site.touch("layouts/layout.html", 200);
        assert_eq!(builder.build_all().unwrap().ok, 2);
        assert_eq!(*renders.lock(), 2);
        assert_eq!(
            builder.cache().get("layouts/layout.html").unwrap().last_update,
            200.0
        );

        // Propagation lasts only for the build that saw the change.
        assert_eq!(builder.build_all().unwrap().processed(), 0);
    }

    #[test]
    fn test_first_layout_entry_does_not_propagate() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        site.write("inputs/sub/b.md", "b", 100);

        let (mut builder, renders) = counting(site.builder(), None);
        builder.build_all().unwrap();
        *renders.lock() = 0;

        // The layout is seen for the first time; outputs are newer than inputs.
        builder.cache.delete("layouts/layout.html");
        assert_eq!(builder.build_all().unwrap().processed(), 0);
        assert_eq!(*renders.lock(), 0);
        assert_eq!(
            builder.cache().get("layouts/layout.html").unwrap().last_update,
            100.0
        );

        // Later changes do propagate.
        site.touch("layouts/layout.html", 200);
        assert_eq!(builder.build_all().unwrap().ok, 2);
        assert_eq!(*renders.lock(), 2);
    }

    #[test]
    fn test_orphan_cleanup() {
        let site = Site::new();
        site.write("inputs/x.md", "x", 100);
        site.write("inputs/keep.md", "keep", 100);

        let mut builder = site.builder();
        builder.build_all().unwrap();
        assert!(site.path("outputs/x.html").exists());

        fs::remove_file(site.path("inputs/x.md")).unwrap();
        builder.build_all().unwrap();

        assert!(!site.path("outputs/x.html").exists());
        assert!(builder.cache().get("inputs/x.md").is_none());
        assert!(site.path("outputs/keep.html").exists());
        assert!(builder.cache().get("inputs/keep.md").is_some());
    }

    #[test]
    fn test_cleanup_forgets_sources_without_outputs() {
        let site = Site::new();
        site.write("inputs/x.md", "x", 100);
        site.write("inputs/keep.md", "keep", 100);

        let mut builder = site.builder();
        builder.build_all().unwrap();

        // Output already gone, so the orphan walk never sees it.
        fs::remove_file(site.path("outputs/x.html")).unwrap();
        fs::remove_file(site.path("inputs/x.md")).unwrap();
        builder.build_all().unwrap();

        assert!(builder.cache().get("inputs/x.md").is_none());
        assert!(builder.cache().get("inputs/keep.md").is_some());
        let saved = CacheStore::load(&site.path(".kiln_caches.json")).unwrap();
        assert!(saved.get("inputs/x.md").is_none());
    }

    #[test]
    fn test_cleanup_forgets_deleted_layout() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);

        let mut builder = site.builder();
        builder.build_all().unwrap();
        assert!(builder.cache().get("layouts/layout.html").is_some());

        fs::remove_file(site.path("inputs/a.md")).unwrap();
        fs::remove_file(site.path("layouts/layout.html")).unwrap();
        builder.build_all().unwrap();

        assert!(builder.cache().is_empty());
        let saved = CacheStore::load(&site.path(".kiln_caches.json")).unwrap();
        assert!(saved.is_empty());
    }

    #[test]
    fn test_forget_file_and_directory() {
        let site = Site::new();
        site.write("inputs/blog/a.md", "a", 100);
        site.write("inputs/blog/b.md", "b", 100);

        let mut builder = site.builder();
        builder.build_all().unwrap();

        assert_eq!(builder.forget(Path::new("layouts/layout.html"), false), 1);
        assert_eq!(builder.forget(Path::new("layouts/layout.html"), false), 0);
        assert_eq!(builder.forget(&site.path("inputs/blog"), true), 2);
        assert!(builder.cache().is_empty());
        // Outputs are untouched.
        assert!(site.path("outputs/blog/a.html").exists());
    }

    #[test]
    fn test_orphan_without_cache_entry() {
        let site = Site::new();
        site.write("outputs/stray/old.html", "old", 100);

        let mut builder = site.builder();
        assert_eq!(builder.cleanup().unwrap(), 1);
        assert!(!site.path("outputs/stray").exists());
        assert!(site.path("outputs").exists());
    }

    #[test]
    fn test_candidate_extension_safety() {
        let site = Site::new();
        site.write("inputs/y.markdown", "y", 100);

        let config = SiteConfig {
            input_ext: vec!["md".into(), "markdown".into()],
            ..site.config()
        };
        let mut builder = site.builder_with(config);
        builder.build_all().unwrap();
        assert!(site.path("outputs/y.html").exists());

        assert_eq!(builder.cleanup().unwrap(), 0);
        assert!(site.path("outputs/y.html").exists());
    }

    #[test]
    fn test_failure_is_isolated() {
        let site = Site::new();
        site.write("inputs/bad.md", "bad", 100);
        site.write("inputs/good.md", "good", 100);
        // A stale output that the failed render must not leave behind.
        site.write("outputs/bad.html", "old", 50);

        let (mut builder, _) = counting(site.builder(), Some("bad.md"));
        let counters = builder.build_all().unwrap();

        assert_eq!(counters, BuildCounters { ok: 1, error: 1 });
        assert!(site.path("outputs/good.html").exists());
        assert!(!site.path("outputs/bad.html").exists());
        assert!(builder.cache().get("inputs/bad.md").is_none());
    }

    #[test]
    fn test_missing_layout_fails_page() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        fs::remove_file(site.path("layouts/layout.html")).unwrap();

        let mut builder = site.builder();
        let counters = builder.build_all().unwrap();
        assert_eq!(counters, BuildCounters { ok: 0, error: 1 });
        assert!(!site.path("outputs/a.html").exists());
    }

    #[test]
    fn test_skips_other_extensions() {
        let site = Site::new();
        site.write("inputs/notes.txt", "txt", 100);

        let mut builder = site.builder();
        assert_eq!(builder.build_all().unwrap().processed(), 0);
        assert!(!site.path("outputs/notes.html").exists());
        assert!(!site.path("outputs/notes.txt").exists());
    }

    #[test]
    fn test_build_single_paths() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        site.write("includes/app.js", "js", 100);
        site.write("scripts/tool.py", "", 100);

        let mut builder = site.builder();
        assert_eq!(
            builder.build(&site.path("inputs/a.md"), false).unwrap(),
            Triggered::Job(Outcome::Done)
        );
        assert_eq!(
            builder.build(Path::new("includes/app.js"), false).unwrap(),
            Triggered::Job(Outcome::Done)
        );
        assert_eq!(
            builder.build(Path::new("inputs/a.md"), false).unwrap(),
            Triggered::Job(Outcome::Abandoned)
        );
        assert_eq!(
            builder.build(Path::new("inputs/a.md"), true).unwrap(),
            Triggered::Job(Outcome::Done)
        );
        assert_eq!(
            builder.build(Path::new("scripts/tool.py"), false).unwrap(),
            Triggered::Ignored
        );
        assert!(matches!(
            builder.build(Path::new("layouts/layout.html"), false).unwrap(),
            Triggered::FullBuild(_)
        ));
    }

    #[test]
    fn test_clean_file_and_directory() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        site.write("inputs/blog/b.md", "b", 100);
        site.write("inputs/blog/c.md", "c", 100);

        let mut builder = site.builder();
        builder.build_all().unwrap();

        builder
            .clean(Some(Path::new("inputs/a.md")), Path::new("outputs/a.html"), false)
            .unwrap();
        assert!(!site.path("outputs/a.html").exists());
        assert!(builder.cache().get("inputs/a.md").is_none());

        builder
            .clean(Some(Path::new("inputs/blog")), Path::new("outputs/blog"), true)
            .unwrap();
        assert!(!site.path("outputs/blog").exists());
        assert!(builder.cache().get("inputs/blog/b.md").is_none());
        assert!(builder.cache().get("inputs/blog/c.md").is_none());

        // Already gone.
        builder
            .clean(Some(Path::new("inputs/a.md")), Path::new("outputs/a.html"), false)
            .unwrap();
    }

    #[test]
    fn test_force_build_rebuilds_everything() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);

        site.builder().build_all().unwrap();

        let config = SiteConfig {
            force_build: true,
            ..site.config()
        };
        let (mut builder, renders) = counting(site.builder_with(config), None);
        assert_eq!(builder.build_all().unwrap().ok, 1);
        assert_eq!(*renders.lock(), 1);
    }

    #[test]
    fn test_events_fire_in_order() {
        let site = Site::new();
        site.write("inputs/a.md", "a", 100);
        site.write("inputs/orphan.md", "o", 100);

        let mut builder = site.builder();
        builder.build_all().unwrap();
        fs::remove_file(site.path("inputs/orphan.md")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EventKind::BeforeBuildAll,
            EventKind::BeforeBuildDirectory,
            EventKind::AfterBuildDirectory,
            EventKind::InitPage,
            EventKind::BeforeBuildPage,
            EventKind::AfterBuildPage,
            EventKind::Clean,
            EventKind::AfterBuildAll,
        ] {
            let seen = Arc::clone(&seen);
            builder.events.listen(
                kind,
                Box::new(move |event| {
                    seen.lock().push(event.kind());
                    None
                }),
            );
        }

        site.touch("inputs/a.md", 200);
        site.touch("outputs/a.html", 150);
        builder.build_all().unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::BeforeBuildAll,
                EventKind::BeforeBuildDirectory,
                EventKind::InitPage,
                EventKind::BeforeBuildPage,
                EventKind::AfterBuildPage,
                EventKind::AfterBuildDirectory,
                EventKind::Clean,
                EventKind::AfterBuildAll,
            ]
        );
    }

    struct AlwaysStale;

    impl Judge for AlwaysStale {
        fn judge(&self, _: &FolderMap, _: &mut CacheStore, _: Subject<'_>) -> Result<Decision> {
            Ok(Decision::Stale)
        }
    }

    #[test]
    fn test_injected_judge_and_page_factory() {
        let site = Site::new();
        site.write("inputs/a.md", "{{ page.title }}", 100);

        let factory: PageFactory = Box::new(|input, config| {
            let mut page = Page::new(input, config);
            page.ctx.insert("title".into(), Value::from("Injected"));
            page
        });
        let (builder, renders) = counting(site.builder(), None);
        let mut builder = builder
            .with_judge(AlwaysStale)
            .with_page_factory(factory);

        builder.build_all().unwrap();
        builder.build_all().unwrap();
        assert_eq!(*renders.lock(), 2);

        let html = fs::read_to_string(site.path("outputs/a.html")).unwrap();
        assert_eq!(html, "<html><p>Injected</p>\n</html>");
    }

    #[test]
    fn test_listeners_shape_the_page() {
        let site = Site::new();
        site.write("layouts/post.html", "<article>{{ page.title }}</article>", 100);
        site.write("inputs/a.md", "a", 100);

        let mut builder = site.builder();
        builder.events.listen(
            EventKind::InitPage,
            Box::new(|event| {
                if let Event::InitPage(page) = event {
                    page.layout = PathBuf::from("layouts/post.html");
                    page.ctx.insert("title".into(), Value::from("Post"));
                }
                None
            }),
        );
        builder.build_all().unwrap();

        let html = fs::read_to_string(site.path("outputs/a.html")).unwrap();
        assert_eq!(html, "<article>Post</article>");
        assert!(builder.cache().get("layouts/post.html").is_some());
    }

    #[test]
    fn test_front_matter_picks_layout() {
        let site = Site::new();
        site.write("layouts/post.html", "<article>{{ page.title }}</article>", 100);
        site.write(
            "inputs/a.md",
            "+++\ntitle = \"Hi\"\nlayout = \"layouts/post.html\"\n+++\nbody",
            100,
        );
        site.write("inputs/bad.md", "+++\ntitle = \n+++\n", 100);

        let mut builder = site.builder();
        let counters = builder.build_all().unwrap();

        assert_eq!(counters, BuildCounters { ok: 1, error: 1 });
        let html = fs::read_to_string(site.path("outputs/a.html")).unwrap();
        assert_eq!(html, "<article>Hi</article>");
        assert!(builder.cache().get("layouts/post.html").is_some());
        assert!(!site.path("outputs/bad.html").exists());
    }

    #[test]
    fn test_listeners_request_rebuilds() {
        let site = Site::new();
        site.write("inputs/index.md", "index", 100);
        site.write("inputs/blog/post.md", "post", 100);

        let (mut builder, renders) = counting(site.builder(), None);
        builder.events.listen(
            EventKind::AfterBuildDirectory,
            Box::new(|event| match event {
                Event::AfterBuildDirectory { input, .. } if input.ends_with("blog") => {
                    Some(crate::event::rebuild_request(["inputs/index.md", "inputs/gone.md"]))
                }
                _ => None,
            }),
        );

        // index.md is built with its directory, then again on request.
        let counters = builder.build_all().unwrap();
        assert_eq!(counters, BuildCounters { ok: 3, error: 0 });
        assert_eq!(*renders.lock(), 3);

        // Requests are forced even when nothing changed.
        *renders.lock() = 0;
        assert_eq!(builder.build_all().unwrap().ok, 1);
        assert_eq!(*renders.lock(), 1);
    }
}
