//! Utility modules for the site builder.

pub mod category;
pub mod front_matter;
pub mod fs;
