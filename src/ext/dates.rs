//! `dates`: exposes file timestamps to pages.
//!
//! Adds `created_at` and `last_updated_at` to the page context, formatted
//! with `metadata.time_format` (default `%Y-%m-%d %H:%M:%S`). Values already
//! in the context are left alone.

use crate::{
    build::Builder,
    event::{Bundle, Event, EventKind, Listener},
    page::Page,
};
use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::{
    fmt::Write,
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn setup(builder: &mut Builder) -> Result<()> {
    let bundle = Dates {
        root: builder.folders().site_root().to_path_buf(),
        time_format: time_format(builder)?,
    };
    builder.events.add_bundle(&bundle)
}

/// `metadata.time_format`, rejected up front when chrono cannot format it.
pub(super) fn time_format(builder: &Builder) -> Result<String> {
    let time_format = builder
        .config()
        .metadata
        .get("time_format")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_TIME_FORMAT)
        .to_string();

    if format_time(UNIX_EPOCH, &time_format).is_none() {
        bail!("invalid metadata.time_format `{time_format}`");
    }
    Ok(time_format)
}

struct Dates {
    root: PathBuf,
    time_format: String,
}

impl Bundle for Dates {
    fn name(&self) -> &str {
        "dates"
    }

    fn listeners(&self) -> Vec<(EventKind, Listener)> {
        let root = self.root.clone();
        let time_format = self.time_format.clone();

        vec![(
            EventKind::InitPage,
            Box::new(move |event| {
                if let Event::InitPage(page) = event {
                    stamp(page, &root, &time_format);
                }
                None
            }),
        )]
    }
}

fn stamp(page: &mut Page, root: &Path, time_format: &str) {
    let Ok(meta) = fs::metadata(root.join(&page.input)) else {
        return;
    };
    let Ok(modified) = meta.modified() else {
        return;
    };
    // Not every filesystem records creation time.
    let created = meta.created().unwrap_or(modified);

    for (key, time) in [("created_at", created), ("last_updated_at", modified)] {
        if page.ctx.contains_key(key) {
            continue;
        }
        if let Some(formatted) = format_time(time, time_format) {
            page.ctx.insert(key.into(), Value::String(formatted));
        }
    }
}

pub(super) fn format_time(time: SystemTime, time_format: &str) -> Option<String> {
    let local: DateTime<Local> = time.into();
    let mut out = String::new();
    write!(out, "{}", local.format(time_format)).ok()?;
    Some(out)
}
