//! Per-file build jobs.
//!
//! Every file goes through the same lifecycle, driven by [`Processor::start`]:
//!
//! ```text
//! check() ──false──▶ abandoned (wrong extension, up to date)
//!    │ true / Err
//!    ▼
//! process() ──Ok──▶ cache recorded ─▶ on_success() ─▶ ok
//!    │ Err
//!    ▼
//! report ─▶ on_error() ─▶ partial output removed ─▶ error
//! ```
//!
//! A failing file never stops the build.

use crate::{
    build::Builder,
    event::Event,
    judge::{Decision, Subject},
    log,
    page::Page,
    utils::category::Role,
};
use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

/// One file to build. Paths are site-relative.
#[derive(Debug)]
pub struct Job {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub output: Option<PathBuf>,
    pub decision: Option<Decision>,
    /// Rebuild even when timestamps say it is up to date.
    pub force: bool,
}

impl Job {
    pub fn new(input: PathBuf, output_dir: PathBuf, force: bool) -> Self {
        Self {
            input,
            output_dir,
            output: None,
            decision: None,
            force,
        }
    }

    /// Status word for log lines.
    fn status(&self, first: &'static str) -> &'static str {
        match self.decision {
            Some(Decision::Stale) => "Updated",
            _ => first,
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Abandoned,
    Failed,
}

pub trait Processor: Sized {
    /// Folder this processor takes its inputs from.
    const ROLE: Role;

    fn new(job: Job) -> Self;
    fn job(&self) -> &Job;

    /// Decide whether the job runs. Prepares the output directory when it does.
    fn check(&mut self, builder: &mut Builder) -> Result<bool>;

    fn process(&mut self, builder: &mut Builder) -> Result<()>;

    fn on_success(&mut self, _builder: &mut Builder) {}

    fn on_error(&mut self, _builder: &mut Builder, _err: &anyhow::Error) {}

    fn start(&mut self, builder: &mut Builder) -> Outcome {
        let result = match self.check(builder) {
            Ok(false) => return Outcome::Abandoned,
            Ok(true) => self
                .process(builder)
                .and_then(|()| builder.record(self.job()))
                .map_err(|err| (err, true)),
            Err(err) => Err((err, false)),
        };

        match result {
            Ok(()) => {
                builder.counters.ok += 1;
                self.on_success(builder);
                Outcome::Done
            }
            Err((err, processed)) => {
                builder.counters.error += 1;
                builder.report_failure(&self.job().input, &err);
                self.on_error(builder, &err);
                if processed && let Some(output) = &self.job().output {
                    builder.remove_partial(output);
                }
                Outcome::Failed
            }
        }
    }
}

// ============================================================================
// Render
// ============================================================================

/// Renders pages from the input folder.
pub struct RenderProcessor {
    job: Job,
    page: Option<Page>,
}

impl Processor for RenderProcessor {
    const ROLE: Role = Role::Input;

    fn new(job: Job) -> Self {
        Self { job, page: None }
    }

    fn job(&self) -> &Job {
        &self.job
    }

    fn check(&mut self, builder: &mut Builder) -> Result<bool> {
        if !builder.folders().accepts(&self.job.input) {
            return Ok(false);
        }

        let mut page = builder.new_page(&self.job.input)?;

        let layout = page.layout.clone();
        if builder.judge(Subject::tracked(&layout))? == Decision::Stale {
            builder.updated_layouts.insert(layout.clone());
        }

        let output = builder
            .folders()
            .swap_root(
                &self.job.input,
                Some(Role::Input),
                Role::Output,
                Some(builder.folders().output_ext()),
            )
            .with_context(|| format!("{} is not an input", self.job.input.display()))?;
        self.job.output = Some(output.clone());

        let force = self.job.force || builder.updated_layouts.contains(&layout);
        let decision = builder.judge(Subject::direct(&self.job.input, &output, force))?;
        self.job.decision = Some(decision);
        if decision.is_skip() {
            return Ok(false);
        }

        builder.prepare_dir(&self.job.output_dir)?;
        page.output = Some(output);
        self.page = Some(page);
        Ok(true)
    }

    fn process(&mut self, builder: &mut Builder) -> Result<()> {
        let page = self.page.as_mut().context("page was not prepared")?;

        builder.emit(&mut Event::BeforeBuildPage(&mut *page));
        page.render(&builder.renderers, builder.folders().site_root())?;
        builder.emit(&mut Event::AfterBuildPage(&mut *page));

        let output = self.job.output.as_ref().context("output was not resolved")?;
        let target = builder.folders().absolute(output);
        fs::write(&target, &page.result)
            .with_context(|| format!("failed to write {}", output.display()))
    }

    fn on_success(&mut self, _builder: &mut Builder) {
        if let Some(output) = &self.job.output {
            log!("build"; "{} {}", self.job.status("Built"), output.display());
        }
    }
}

// ============================================================================
// Include
// ============================================================================

/// Copies files from the include folder verbatim.
pub struct IncludeProcessor {
    job: Job,
}

impl Processor for IncludeProcessor {
    const ROLE: Role = Role::Include;

    fn new(job: Job) -> Self {
        Self { job }
    }

    fn job(&self) -> &Job {
        &self.job
    }

    fn check(&mut self, builder: &mut Builder) -> Result<bool> {
        let output = builder
            .folders()
            .swap_root(&self.job.input, Some(Role::Include), Role::Output, None)
            .with_context(|| format!("{} is not an include", self.job.input.display()))?;
        self.job.output = Some(output.clone());

        let decision = builder.judge(Subject::direct(&self.job.input, &output, self.job.force))?;
        self.job.decision = Some(decision);
        if decision.is_skip() {
            return Ok(false);
        }

        builder.prepare_dir(&self.job.output_dir)?;
        Ok(true)
    }

    fn process(&mut self, builder: &mut Builder) -> Result<()> {
        let output = self.job.output.as_ref().context("output was not resolved")?;
        let folders = builder.folders();
        fs::copy(folders.absolute(&self.job.input), folders.absolute(output))
            .with_context(|| format!("failed to copy to {}", output.display()))?;
        Ok(())
    }

    fn on_success(&mut self, _builder: &mut Builder) {
        if let Some(output) = &self.job.output {
            log!("build"; "{} {}", self.job.status("Copied"), output.display());
        }
    }
}
