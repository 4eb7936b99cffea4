//! Built-in extensions.
//!
//! Extensions are compiled in and enabled by name through the `extensions`
//! config key:
//!
//! ```toml
//! extensions = ["dates", "articles", "build_report"]
//! ```
//!
//! Each one is a setup function run once against the builder, typically
//! attaching an event [`Bundle`](crate::event::Bundle).

mod articles;
mod build_report;
mod dates;

use crate::{build::Builder, log};
use anyhow::{Context, Result, bail};

/// Hook run once when the extension is loaded.
pub type Setup = fn(&mut Builder) -> Result<()>;

const REGISTRY: &[(&str, Setup)] = &[
    ("dates", dates::setup),
    ("articles", articles::setup),
    ("build_report", build_report::setup),
];

fn lookup(name: &str) -> Option<Setup> {
    REGISTRY
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, setup)| *setup)
}

/// Run the setup of every extension listed in the config, in order.
pub fn load_extensions(builder: &mut Builder) -> Result<()> {
    let names = builder.config().extensions.clone();

    for name in &names {
        let Some(setup) = lookup(name) else {
            let known: Vec<_> = REGISTRY.iter().map(|(known, _)| *known).collect();
            bail!("unknown extension `{name}` (available: {})", known.join(", "));
        };
        setup(builder).with_context(|| format!("failed to load extension `{name}`"))?;
        log!("ext"; "loaded {name}");
    }

    Ok(())
}
