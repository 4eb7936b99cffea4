//! One page being built.

use crate::{config::SiteConfig, render::Renderers, utils::front_matter::split_front_matter};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// A page and everything accumulated while rendering it.
///
/// Template variables:
///
/// | Variable   | Value                                                |
/// |------------|------------------------------------------------------|
/// | `page`     | [`Page::ctx`]: `title`, `description`, `head`, ...   |
/// | `metadata` | The `[metadata]` table of the config                 |
/// | `content`  | Rendered body (layout only)                          |
///
/// A `+++` TOML front matter block at the top of the input is merged into
/// the context; its `layout` key picks the layout instead.
#[derive(Debug, Clone)]
pub struct Page {
    /// Site-relative input path.
    pub input: PathBuf,
    /// Site-relative output path, known once the page is judged.
    pub output: Option<PathBuf>,
    /// Site-relative layout the body is embedded into.
    pub layout: PathBuf,
    /// Rendered body before it is embedded into the layout.
    pub content: String,
    /// Final output.
    pub result: String,
    /// Free-form page context, seeded from the metadata config.
    pub ctx: Map<String, Value>,
    metadata: Map<String, Value>,
}

/// Builds pages; swap it to attach different defaults.
pub type PageFactory = Box<dyn Fn(&Path, &SiteConfig) -> Page + Send>;

impl Page {
    pub fn new(input: &Path, config: &SiteConfig) -> Self {
        let metadata = config.metadata_context();

        let mut ctx = metadata.clone();
        for key in ["title", "description", "head"] {
            ctx.entry(key).or_insert_with(|| Value::String(String::new()));
        }

        Self {
            input: input.to_path_buf(),
            output: None,
            layout: config.default_layout.clone(),
            content: String::new(),
            result: String::new(),
            ctx,
            metadata,
        }
    }

    pub fn default_factory() -> PageFactory {
        Box::new(Page::new)
    }

    /// Merge the input's front matter into the context.
    ///
    /// A missing input is left for rendering to report.
    pub fn load_front_matter(&mut self, root: &Path) -> Result<()> {
        let source = match fs::read_to_string(root.join(&self.input)) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.input.display()));
            }
        };
        let Some(raw) = split_front_matter(&source).0 else {
            return Ok(());
        };

        let table: toml::Table = toml::from_str(raw)
            .with_context(|| format!("invalid front matter in {}", self.input.display()))?;
        for (key, value) in table {
            if key == "layout"
                && let Some(layout) = value.as_str()
            {
                self.layout = PathBuf::from(layout);
                continue;
            }
            self.ctx.insert(key, serde_json::to_value(value)?);
        }
        Ok(())
    }

    /// Template, then markdown, then layout.
    pub fn render(&mut self, renderers: &Renderers, root: &Path) -> Result<()> {
        let body = renderers
            .templates
            .render_file(root, &self.input, &self.vars())?;
        self.content = renderers.markdown.render(&body);
        self.result = renderers
            .templates
            .render_file(root, &self.layout, &self.vars())?;
        Ok(())
    }

    fn vars(&self) -> Map<String, Value> {
        let mut vars = Map::new();
        vars.insert("page".into(), Value::Object(self.ctx.clone()));
        vars.insert("metadata".into(), Value::Object(self.metadata.clone()));
        vars.insert("content".into(), Value::String(self.content.clone()));
        vars
    }
}
