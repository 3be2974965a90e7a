//! Helpers for cleaning up client-supplied filenames.
//!
//! Uploads arrive with whatever name the client's browser or tool sent,
//! sometimes including directories. The core only ever stores and logs a
//! bare, conservative file name.

use std::sync::LazyLock;

use regex::Regex;

const FALLBACK_FILENAME: &str = "document.pdf";
const MAX_FILENAME_LEN: usize = 128;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("filename pattern is valid"));

/// Returns only the final component of a client path.
///
/// Handles both `/` and `\` separators since uploads can come from any
/// platform. Safe for span fields.
pub fn redact_filename(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if base.is_empty() {
        "<unknown>"
    } else {
        base
    }
}

/// Normalises an uploaded file name before it is stored on a task.
///
/// - `C:\Users\me\My Paper (v2).pdf` → `My_Paper_v2_.pdf`
/// - `../../etc/passwd` → `passwd`
/// - `.hidden.pdf` → `hidden.pdf`
/// - empty → `document.pdf`
pub fn proper_filename(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original).trim();
    let replaced = UNSAFE_CHARS.replace_all(base, "_");
    let trimmed = replaced.trim_start_matches('.');

    let mut name: String = trimmed.chars().take(MAX_FILENAME_LEN).collect();
    if name.trim_matches(['_', '.']).is_empty() {
        name = FALLBACK_FILENAME.to_string();
    }
    name
}
