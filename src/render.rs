//! Rendering strategies.
//!
//! The builder only needs two operations: turn markdown into HTML and expand
//! a template file with a set of variables. Both sit behind traits so tests
//! and extensions can swap them out.

use anyhow::{Context, Result};
use minijinja::{AutoEscape, Environment, ErrorKind};
use pulldown_cmark::{Options, Parser, html};
use serde_json::{Map, Value};
use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use crate::utils::{category::cache_key, front_matter::split_front_matter};

pub trait Markdown: Send {
    fn render(&self, text: &str) -> String;
}

pub trait Templates: Send {
    /// Expand the template at `path` (site-relative) with `vars`.
    fn render_file(&self, root: &Path, path: &Path, vars: &Map<String, Value>) -> Result<String>;
}

/// CommonMark with tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct CmarkRenderer;

impl Markdown for CmarkRenderer {
    fn render(&self, text: &str) -> String {
        let parser = Parser::new_ext(text, Options::ENABLE_TABLES);
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// Jinja templates loaded from the site root.
///
/// Includes and `extends` resolve relative to the root, so a page can pull in
/// `{% include "includes/nav.html" %}`. Front matter is stripped on load.
/// Output is not escaped: pages emit HTML.
#[derive(Debug, Default, Clone, Copy)]
pub struct JinjaTemplates;

impl Templates for JinjaTemplates {
    fn render_file(&self, root: &Path, path: &Path, vars: &Map<String, Value>) -> Result<String> {
        let mut env = Environment::new();
        env.set_loader(site_loader(root.to_path_buf()));
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let name = cache_key(path);
        let template = env
            .get_template(&name)
            .with_context(|| format!("failed to load template {name}"))?;
        template
            .render(vars)
            .with_context(|| format!("failed to render template {name}"))
    }
}

type LoadResult = Result<Option<String>, minijinja::Error>;

/// Load templates below `root` by site-relative name.
fn site_loader(root: PathBuf) -> impl Fn(&str) -> LoadResult + Send + Sync + 'static {
    move |name| {
        let rel = Path::new(name);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Ok(None);
        }

        match fs::read_to_string(root.join(rel)) {
            Ok(source) => Ok(Some(split_front_matter(&source).1.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("could not read template {name}"),
            )
            .with_source(err)),
        }
    }
}

/// Rendering strategies handed to the builder.
pub struct Renderers {
    pub markdown: Box<dyn Markdown>,
    pub templates: Box<dyn Templates>,
}

impl Default for Renderers {
    fn default() -> Self {
        Self {
            markdown: Box::new(CmarkRenderer),
            templates: Box::new(JinjaTemplates),
        }
    }
}
