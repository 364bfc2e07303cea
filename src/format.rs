//! Line-oriented storage format.
//!
//! ```text
//! [Preferences]
//! ; attached to "a"
//! a=1
//! b="text"
//! # trailing comment
//! ```
//!
//! Comment and blank lines accumulate until the next `key=value` line and are
//! attached to that key. Whatever is left after the last key becomes the end
//! comment. Section headers are dropped on read and a single header is written
//! back. Garbled lines are skipped.

use tracing::{debug, warn};

use crate::codec::{validate_key, validate_text};
use crate::store::PreferenceStore;

/// Section header written at the top of every file.
pub const SECTION_HEADER: &str = "[Preferences]";

/// Result of parsing a file.
#[derive(Debug, Default)]
pub struct Parsed {
    pub store: PreferenceStore,
    /// 1-based numbers of lines that were skipped.
    pub skipped: Vec<usize>,
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#')
}

/// Parse file contents into a store.
pub fn parse(contents: &str) -> Parsed {
    let mut parsed = Parsed::default();
    let mut pending = String::new();

    for (index, raw) in contents.split_inclusive('\n').enumerate() {
        let line_no = index + 1;
        let line = raw.trim_end_matches(['\n', '\r']);
        let trimmed = line.trim();

        if is_comment(trimmed) {
            pending.push_str(raw);
            if !raw.ends_with('\n') {
                pending.push('\n');
            }
            continue;
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            debug!(line = line_no, section = trimmed, "skipping section header");
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            warn!(line = line_no, "skipping line without '='");
            parsed.skipped.push(line_no);
            continue;
        };

        let key = key.trim();
        let value = value.trim();
        if let Err(err) = validate_key(key).and_then(|_| validate_text(key, value)) {
            warn!(line = line_no, error = %err, "skipping malformed entry");
            parsed.skipped.push(line_no);
            continue;
        }

        let store = &mut parsed.store;
        if store.insert(key, value).is_some() {
            debug!(line = line_no, key, "duplicate key, later value wins");
        }
        store.append_comment(key, &pending);
        pending.clear();
    }

    parsed.store.set_end_comment(pending);
    parsed
}

/// Serialize a store into file contents.
pub fn serialize(store: &PreferenceStore) -> String {
    let mut out = String::with_capacity(SECTION_HEADER.len() + 1 + store.len() * 24);
    out.push_str(SECTION_HEADER);
    out.push('\n');

    for entry in store.iter() {
        if let Some(comment) = entry.comment {
            out.push_str(comment);
        }
        out.push_str(entry.key);
        out.push('=');
        out.push_str(entry.value);
        out.push('\n');
    }

    out.push_str(store.end_comment());
    out
}
