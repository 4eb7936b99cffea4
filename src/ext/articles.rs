//! `articles`: per-directory article listings.
//!
//! Every page with a non-empty `description` is an article. Its title,
//! description, timestamps and output file name are kept in a data file
//! (`articles.json`) next to the input, newest first.
//!
//! Pages with `list_articles = true` in their front matter are listings. They
//! get the list of their directory as `page.articles`, `page.articles_markdown`
//! and `page.articles_html`, and are rebuilt whenever that list changes.
//!
//! ```toml
//! [metadata.articles]
//! data_file_name = "articles.json"
//! markdown_format = "- [{title}]({file_name}) {description}"
//! html_format = '<li><a href="{file_name}">{title}</a></li>'
//! ```
//!
//! Placeholders: `{title}`, `{description}`, `{created_at}`,
//! `{last_updated_at}` (formatted with `metadata.time_format`), `{file_name}`.

use super::dates::{format_time, time_format};
use crate::{
    build::Builder,
    event::{Bundle, Event, EventKind, Listener, rebuild_request},
    log,
    page::Page,
    utils::{
        category::{FolderMap, Role},
        fs::epoch_seconds,
    },
};
use anyhow::{Context, Result, bail};
use educe::Educe;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Front matter flag marking a listing page.
const LISTING_KEY: &str = "list_articles";

pub fn setup(builder: &mut Builder) -> Result<()> {
    let config = match builder.config().metadata.get("articles") {
        Some(value) => value
            .clone()
            .try_into::<ArticlesConfig>()
            .context("invalid metadata.articles")?,
        None => ArticlesConfig::default(),
    };
    if config.data_file_name.is_empty() || config.data_file_name.contains(['/', '\\']) {
        bail!("invalid articles data file name `{}`", config.data_file_name);
    }

    let store = Store {
        root: builder.folders().site_root().to_path_buf(),
        folders: builder.folders().clone(),
        time_format: time_format(builder)?,
        config,
        state: Mutex::default(),
    };
    builder.events.add_bundle(&Articles {
        store: Arc::new(store),
    })
}

#[derive(Debug, Clone, Deserialize, Educe)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
struct ArticlesConfig {
    #[educe(Default = "articles.json".to_string())]
    data_file_name: String,

    #[educe(Default = "- [{title}]({file_name}) {description}  \n  *{created_at}*".to_string())]
    markdown_format: String,

    #[educe(Default = r#"<li><a href="{file_name}">{title} {description}<br><em>{created_at}</em></li>"#.to_string())]
    html_format: String,
}

/// One entry of the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub description: String,
    /// Unix seconds.
    pub created_at: f64,
    /// Unix seconds.
    pub last_updated_at: f64,
    /// Output file name, relative to the listing page.
    pub file_name: String,
}

#[derive(Default)]
struct State {
    building_all: bool,
    /// Articles built since their directory was last merged.
    pending: FxHashMap<PathBuf, Vec<Article>>,
    /// Listing pages by input directory.
    listings: FxHashMap<PathBuf, BTreeSet<PathBuf>>,
}

struct Store {
    root: PathBuf,
    folders: FolderMap,
    config: ArticlesConfig,
    time_format: String,
    state: Mutex<State>,
}

fn is_listing(page: &Page) -> bool {
    page.ctx.get(LISTING_KEY).and_then(Value::as_bool) == Some(true)
}

fn input_dir(input: &Path) -> PathBuf {
    input.parent().map(PathBuf::from).unwrap_or_default()
}

fn log_failure(err: &anyhow::Error) {
    log!("ext"; "articles: {err:#}");
}

impl Store {
    fn data_path(&self, dir: &Path) -> PathBuf {
        self.root.join(dir).join(&self.config.data_file_name)
    }

    fn load(&self, dir: &Path) -> Result<Vec<Article>> {
        let path = self.data_path(dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        serde_json::from_str(&content).with_context(|| format!("invalid {}", path.display()))
    }

    /// Rewrite the data file; an empty list removes it.
    fn write(&self, dir: &Path, articles: &[Article]) -> Result<()> {
        let path = self.data_path(dir);
        if articles.is_empty() {
            return match fs::remove_file(&path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => {
                    Err(err).with_context(|| format!("failed to remove {}", path.display()))
                }
                _ => Ok(()),
            };
        }

        let json = serde_json::to_string_pretty(articles)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    fn track_listing(&self, page: &Page) {
        let mut state = self.state.lock();
        let listings = state.listings.entry(input_dir(&page.input)).or_default();
        if is_listing(page) {
            listings.insert(page.input.clone());
        } else {
            listings.remove(&page.input);
        }
    }

    fn forget_listing(&self, input: &Path) {
        if let Some(listings) = self.state.lock().listings.get_mut(&input_dir(input)) {
            listings.remove(input);
        }
    }

    /// Rebuild request for the listings of `dir`, if it has any.
    fn listings_of(&self, dir: &Path) -> Option<Value> {
        let state = self.state.lock();
        let listings = state.listings.get(dir).filter(|l| !l.is_empty())?;
        log!("ext"; "articles of {} changed, rebuilding listings", dir.display());
        Some(rebuild_request(listings))
    }

    fn article(&self, page: &Page) -> Option<Article> {
        if is_listing(page) {
            return None;
        }
        let description = page
            .ctx
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())?;
        let file_name = page.output.as_deref()?.file_name()?.to_string_lossy();

        let meta = fs::metadata(self.root.join(&page.input)).ok();
        let modified = meta.as_ref().and_then(|m| m.modified().ok());
        // Not every filesystem records creation time.
        let created = meta.as_ref().and_then(|m| m.created().ok()).or(modified);
        let stamp = |key: &str, fallback: Option<SystemTime>| {
            page.ctx
                .get(key)
                .and_then(Value::as_f64)
                .or_else(|| fallback.map(epoch_seconds))
                .unwrap_or_default()
        };

        Some(Article {
            title: page
                .ctx
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            description: description.to_string(),
            created_at: stamp("created_at", created),
            last_updated_at: stamp("last_updated_at", modified),
            file_name: file_name.into_owned(),
        })
    }

    fn push(&self, dir: PathBuf, article: Article) {
        let mut state = self.state.lock();
        let pending = state.pending.entry(dir).or_default();
        pending.retain(|a| a.file_name != article.file_name);
        pending.push(article);
    }

    /// Fold pending articles of `dir` into its data file.
    fn merge(&self, dir: &Path) -> Result<Option<Value>> {
        let added = self.state.lock().pending.remove(dir).unwrap_or_default();
        if added.is_empty() {
            return Ok(None);
        }

        let existing = self.load(dir)?;
        let mut merged: Vec<Article> = existing
            .iter()
            .filter(|old| !added.iter().any(|new| new.file_name == old.file_name))
            .cloned()
            .collect();
        merged.extend(added);
        merged.sort_by(|a, b| b.created_at.total_cmp(&a.created_at));

        if merged == existing {
            return Ok(None);
        }
        self.write(dir, &merged)?;
        Ok(self.listings_of(dir))
    }

    /// Drop the article written to `file_name` from the data file of `dir`.
    fn remove(&self, dir: &Path, file_name: &str) -> Result<Option<Value>> {
        let mut articles = self.load(dir)?;
        let before = articles.len();
        articles.retain(|a| a.file_name != file_name);
        if articles.len() == before {
            return Ok(None);
        }
        self.write(dir, &articles)?;
        Ok(self.listings_of(dir))
    }

    fn format(&self, template: &str, article: &Article) -> String {
        let time = |secs: f64| {
            let time = UNIX_EPOCH + Duration::try_from_secs_f64(secs).unwrap_or_default();
            format_time(time, &self.time_format).unwrap_or_default()
        };
        [
            ("{title}", article.title.clone()),
            ("{description}", article.description.clone()),
            ("{created_at}", time(article.created_at)),
            ("{last_updated_at}", time(article.last_updated_at)),
            ("{file_name}", article.file_name.clone()),
        ]
        .into_iter()
        .fold(template.to_string(), |out, (key, value)| out.replace(key, &value))
    }

    /// Expose the list of the page's directory to a listing page.
    fn fill(&self, page: &mut Page) {
        let articles = self.load(&input_dir(&page.input)).unwrap_or_else(|err| {
            log_failure(&err);
            Vec::new()
        });

        let join = |template: &str| {
            articles
                .iter()
                .map(|a| self.format(template, a))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let markdown = join(&self.config.markdown_format);
        let html = join(&self.config.html_format);

        let list = articles
            .iter()
            .filter_map(|a| serde_json::to_value(a).ok())
            .collect();
        page.ctx.insert("articles".into(), Value::Array(list));
        page.ctx.insert("articles_markdown".into(), Value::String(markdown));
        page.ctx.insert("articles_html".into(), Value::String(html));
    }

    fn on_clean(&self, input: Option<&Path>, output: &Path) -> Option<Value> {
        let input = match input {
            Some(input) => input.to_path_buf(),
            None => self
                .folders
                .swap_root(output, Some(Role::Output), Role::Input, None)?,
        };
        if self.folders.classify(&input) != Some(Role::Input) {
            return None;
        }
        self.forget_listing(&input);

        let file_name = output.file_name()?.to_string_lossy();
        self.remove(&input_dir(&input), &file_name)
            .unwrap_or_else(|err| {
                log_failure(&err);
                None
            })
    }
}

struct Articles {
    store: Arc<Store>,
}

impl Articles {
    fn building_all(&self, value: bool) -> Listener {
        let store = Arc::clone(&self.store);
        Box::new(move |_| {
            store.state.lock().building_all = value;
            None
        })
    }
}

impl Bundle for Articles {
    fn name(&self) -> &str {
        "articles"
    }

    fn listeners(&self) -> Vec<(EventKind, Listener)> {
        let store = Arc::clone(&self.store);
        let on_init: Listener = Box::new(move |event| {
            if let Event::InitPage(page) = event {
                store.track_listing(page);
            }
            None
        });

        let store = Arc::clone(&self.store);
        let on_before_page: Listener = Box::new(move |event| {
            if let Event::BeforeBuildPage(page) = event
                && is_listing(page)
            {
                store.fill(page);
            }
            None
        });

        let store = Arc::clone(&self.store);
        let on_after_page: Listener = Box::new(move |event| {
            let Event::AfterBuildPage(page) = event else {
                return None;
            };
            let dir = input_dir(&page.input);
            if let Some(article) = store.article(page) {
                store.push(dir.clone(), article);
            }
            // Full builds merge once per directory.
            if store.state.lock().building_all {
                return None;
            }
            store.merge(&dir).unwrap_or_else(|err| {
                log_failure(&err);
                None
            })
        });

        let store = Arc::clone(&self.store);
        let on_directory: Listener = Box::new(move |event| {
            let Event::AfterBuildDirectory { input, .. } = event else {
                return None;
            };
            store.merge(*input).unwrap_or_else(|err| {
                log_failure(&err);
                None
            })
        });

        let store = Arc::clone(&self.store);
        let on_clean: Listener = Box::new(move |event| match event {
            Event::Clean {
                input,
                output,
                is_directory: false,
            } => store.on_clean(*input, *output),
            _ => None,
        });

        vec![
            (EventKind::BeforeBuildAll, self.building_all(true)),
            (EventKind::AfterBuildAll, self.building_all(false)),
            (EventKind::InitPage, on_init),
            (EventKind::BeforeBuildPage, on_before_page),
            (EventKind::AfterBuildPage, on_after_page),
            (EventKind::AfterBuildDirectory, on_directory),
            (EventKind::Clean, on_clean),
        ]
    }
}
