//! Display titles derived from note content.
//!
//! A title is never stored: it is the first non-empty line of the Markdown
//! text, with ATX heading markers removed, whitespace collapsed and the result
//! truncated for the note list.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DEFAULT_TITLE_MAX_CHARS;

pub const UNTITLED: &str = "Untitled";

static HEADING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}(\s+|$)").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn derive_title(content: &str) -> String {
    derive_title_with_limit(content, DEFAULT_TITLE_MAX_CHARS)
}

pub fn derive_title_with_limit(content: &str, max_chars: usize) -> String {
    content
        .lines()
        .find_map(|line| title_from_line(line, max_chars))
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Title for a single line, or None if the line carries no text.
pub(crate) fn title_from_line(line: &str, max_chars: usize) -> Option<String> {
    let mut text = line.trim();
    while let Some(m) = HEADING_MARKER.find(text) {
        text = text[m.end()..].trim_start();
    }

    let collapsed = WHITESPACE_RUN.replace_all(text, " ");
    let collapsed = collapsed.trim();
    if collapsed.is_empty() {
        return None;
    }

    Some(truncate(collapsed, max_chars.max(1)))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    // Keep the ellipsis inside the limit so a derived title re-derives to itself
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out = out.trim_end().to_string();
    out.push('…');
    out
}
