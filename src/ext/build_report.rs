//! `build_report`: per-directory page totals.

use crate::{
    build::Builder,
    event::{Bundle, Event, EventKind, Listener},
    log,
};
use anyhow::Result;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{path::PathBuf, sync::Arc};

pub fn setup(builder: &mut Builder) -> Result<()> {
    builder.events.add_bundle(&BuildReport::default())
}

#[derive(Default)]
struct BuildReport {
    built: Arc<Mutex<FxHashMap<PathBuf, usize>>>,
}

impl Bundle for BuildReport {
    fn name(&self) -> &str {
        "build_report"
    }

    fn listeners(&self) -> Vec<(EventKind, Listener)> {
        let built = Arc::clone(&self.built);
        let on_page: Listener = Box::new(move |event| {
            let Event::AfterBuildPage(page) = event else {
                return None;
            };
            let dir = page.input.parent().map(PathBuf::from).unwrap_or_default();
            *built.lock().entry(dir).or_default() += 1;
            None
        });

        let built = Arc::clone(&self.built);
        let on_directory: Listener = Box::new(move |event| {
            let Event::AfterBuildDirectory { input, .. } = event else {
                return None;
            };
            let count = built.lock().remove(*input).unwrap_or_default();
            if count > 0 {
                log!("ext"; "{} pages built in {}", count, input.display());
            }
            Some(Value::from(count))
        });

        vec![
            (EventKind::AfterBuildPage, on_page),
            (EventKind::AfterBuildDirectory, on_directory),
        ]
    }
}
