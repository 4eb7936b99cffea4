//! Build lifecycle events.
//!
//! Extensions subscribe to events either one listener at a time with
//! [`Dispatcher::listen`] or as a named [`Bundle`] that is attached and
//! detached as a unit. Listeners run synchronously, in registration order,
//! on the thread driving the build.
//!
//! ```text
//! BeforeBuildAll
//! ├── BeforeBuildDirectory
//! │   ├── InitPage
//! │   ├── BeforeBuildPage
//! │   └── AfterBuildPage
//! ├── AfterBuildDirectory
//! ├── Clean (per orphan)
//! AfterBuildAll
//! ```
//!
//! A listener may return [`rebuild_request`] to have the builder force-rebuild
//! inputs once the current directory, single build or cleanup is done.

use crate::{build::BuildCounters, page::Page, utils::category::cache_key};
use anyhow::{Result, bail};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const REBUILD_KEY: &str = "rebuild";

/// Discriminant of [`Event`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeBuildAll,
    AfterBuildAll,
    BeforeBuildDirectory,
    AfterBuildDirectory,
    InitPage,
    BeforeBuildPage,
    AfterBuildPage,
    Clean,
}

/// Event payload. Paths are site-relative.
#[derive(Debug)]
pub enum Event<'a> {
    BeforeBuildAll,
    AfterBuildAll {
        counters: BuildCounters,
    },
    BeforeBuildDirectory {
        input: &'a Path,
        output: &'a Path,
    },
    AfterBuildDirectory {
        input: &'a Path,
        output: &'a Path,
    },
    /// A page was just created; its context and layout may be adjusted.
    InitPage(&'a mut Page),
    BeforeBuildPage(&'a mut Page),
    /// The page is rendered but not yet written.
    AfterBuildPage(&'a mut Page),
    Clean {
        input: Option<&'a Path>,
        output: &'a Path,
        is_directory: bool,
    },
}

impl Event<'_> {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::BeforeBuildAll => EventKind::BeforeBuildAll,
            Self::AfterBuildAll { .. } => EventKind::AfterBuildAll,
            Self::BeforeBuildDirectory { .. } => EventKind::BeforeBuildDirectory,
            Self::AfterBuildDirectory { .. } => EventKind::AfterBuildDirectory,
            Self::InitPage(_) => EventKind::InitPage,
            Self::BeforeBuildPage(_) => EventKind::BeforeBuildPage,
            Self::AfterBuildPage(_) => EventKind::AfterBuildPage,
            Self::Clean { .. } => EventKind::Clean,
        }
    }
}

/// Event handler. The returned value is only observed by
/// [`Dispatcher::dispatch_collect`].
pub type Listener = Box<dyn FnMut(&mut Event<'_>) -> Option<Value> + Send>;

/// Listener result asking for `inputs` (site-relative) to be force-rebuilt.
pub fn rebuild_request<P: AsRef<Path>>(inputs: impl IntoIterator<Item = P>) -> Value {
    let inputs = inputs
        .into_iter()
        .map(|input| Value::String(cache_key(input.as_ref())))
        .collect();

    let mut request = Map::new();
    request.insert(REBUILD_KEY.into(), Value::Array(inputs));
    Value::Object(request)
}

/// Every input requested by [`rebuild_request`] results, in order.
pub fn rebuild_requests(results: &[Option<Value>]) -> Vec<PathBuf> {
    results
        .iter()
        .flatten()
        .filter_map(|result| result.get(REBUILD_KEY)?.as_array())
        .flatten()
        .filter_map(Value::as_str)
        .map(PathBuf::from)
        .collect()
}

/// Named group of listeners attached and detached together.
pub trait Bundle {
    fn name(&self) -> &str;

    /// Every (event, handler) pair of the bundle.
    fn listeners(&self) -> Vec<(EventKind, Listener)>;
}

struct Registered {
    owner: Option<String>,
    listener: Listener,
}

#[derive(Default)]
pub struct Dispatcher {
    listeners: FxHashMap<EventKind, Vec<Registered>>,
    bundles: Vec<String>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a single listener.
    #[allow(dead_code)] // Extension API
    pub fn listen(&mut self, kind: EventKind, listener: Listener) {
        self.push(kind, None, listener);
    }

    /// Attach every listener of `bundle`. Bundle names must be unique.
    pub fn add_bundle(&mut self, bundle: &dyn Bundle) -> Result<()> {
        let name = bundle.name().to_string();
        if self.has_bundle(&name) {
            bail!("bundle `{name}` is already attached");
        }

        for (kind, listener) in bundle.listeners() {
            self.push(kind, Some(name.clone()), listener);
        }
        self.bundles.push(name);
        Ok(())
    }

    /// Detach every listener the bundle registered. Returns whether it was attached.
    #[allow(dead_code)] // Extension API
    pub fn remove_bundle(&mut self, name: &str) -> bool {
        let Some(index) = self.bundles.iter().position(|b| b == name) else {
            return false;
        };
        self.bundles.remove(index);

        for registered in self.listeners.values_mut() {
            registered.retain(|r| r.owner.as_deref() != Some(name));
        }
        true
    }

    pub fn has_bundle(&self, name: &str) -> bool {
        self.bundles.iter().any(|b| b == name)
    }

    /// Run every listener of the event's kind in registration order.
    pub fn dispatch(&mut self, event: &mut Event<'_>) {
        if let Some(registered) = self.listeners.get_mut(&event.kind()) {
            for r in registered {
                (r.listener)(event);
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch), collecting each listener's result.
    pub fn dispatch_collect(&mut self, event: &mut Event<'_>) -> Vec<Option<Value>> {
        self.listeners
            .get_mut(&event.kind())
            .map(|registered| {
                registered
                    .iter_mut()
                    .map(|r| (r.listener)(event))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn push(&mut self, kind: EventKind, owner: Option<String>, listener: Listener) {
        self.listeners
            .entry(kind)
            .or_default()
            .push(Registered { owner, listener });
    }
}
