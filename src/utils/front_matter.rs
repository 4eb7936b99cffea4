//! TOML front matter at the top of page inputs.
//!
//! ```text
//! +++
//! title = "Hello"
//! description = "First post"
//! +++
//! # Body
//! ```

const FENCE: &str = "+++";

/// Split `source` into its raw front matter and the body after it.
///
/// Sources without a closed `+++` block have no front matter.
pub fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let Some(rest) = source
        .strip_prefix(FENCE)
        .and_then(|r| r.strip_prefix('\n').or_else(|| r.strip_prefix("\r\n")))
    else {
        return (None, source);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, source)
}
