//! Document import and export
//!
//! Practice history is exchanged as a plain UTF-8 document using a fixed
//! line-oriented marker grammar:
//!
//! ```text
//! SPEAKDRILL_EXPORT v1
//! Categories: Everyday | Work | Travel
//! RECORD_START
//! ID: 5f0c...
//! Timestamp: 2025-03-01T10:00:00Z
//! Topic: Ordering food
//! #1: I'd like the soup, please.
//! Translation: Ich hätte gern die Suppe.
//! Category: 0
//! Score: 87
//! Recording #1: audio/wav | recordings/5f0c-1.wav
//! RECORD_END
//! ```
//!
//! Values escape `\`, `|` and line breaks with a backslash. List items are
//! joined by ` | `; exactly that one space of padding is removed on import,
//! so values keep any whitespace of their own. Import is all or nothing:
//! any structural problem rejects the whole document.

mod export;
mod import;

pub use export::export_state;
pub use import::import_state;

use std::path::Path;

use crate::Result;
use crate::store::{AppState, Categories, PracticeSession};

/// First line of every document
pub const HEADER: &str = "SPEAKDRILL_EXPORT v1";

pub(crate) const RECORD_START: &str = "RECORD_START";
pub(crate) const RECORD_END: &str = "RECORD_END";

/// Result of a successful import
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedState {
    pub sessions: Vec<PracticeSession>,
    /// Present when the document carried category labels
    pub categories: Option<Categories>,
}

impl ParsedState {
    /// Merge into `state`, returning how many sessions were new
    pub fn apply_to(self, state: &mut AppState) -> usize {
        if let Some(categories) = self.categories {
            state.categories = categories;
        }
        state.merge_sessions(self.sessions)
    }
}

/// Export `state` to a file
///
/// # Errors
///
/// Returns error if the file cannot be written
pub fn write_document(path: &Path, state: &AppState) -> Result<()> {
    std::fs::write(path, export_state(state))?;
    tracing::info!(path = %path.display(), sessions = state.sessions.len(), "exported history");
    Ok(())
}

/// Parse a document file
///
/// # Errors
///
/// Returns `Error::Import` if the document is malformed, or the IO error
pub fn read_document(path: &Path) -> Result<ParsedState> {
    let bytes = std::fs::read(path)?;
    import_state(&bytes)
}

pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse of [`escape`]; `None` on a dangling or unknown escape
pub(crate) fn unescape(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '|' => out.push('|'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

/// Split a ` | `-joined list, removing only the padding the exporter adds
pub(crate) fn split_list(value: &str) -> Vec<&str> {
    let parts = split_unescaped(value, '|');
    let last = parts.len() - 1;
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            let part = if i > 0 { part.strip_prefix(' ').unwrap_or(part) } else { part };
            if i < last { part.strip_suffix(' ').unwrap_or(part) } else { part }
        })
        .collect()
}

/// Split on `sep` where it is not escaped; parts stay escaped
pub(crate) fn split_unescaped(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&value[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&value[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_round_trip() {
        let raw = "line one\nback\\slash | pipe";
        let escaped = escape(raw);
        assert!(!escaped.contains('\n'));
        assert_eq!(unescape(&escaped).as_deref(), Some(raw));
    }

    #[test]
    fn test_unescape_rejects_unknown() {
        assert!(unescape("bad \\q").is_none());
        assert!(unescape("dangling \\").is_none());
    }

    #[test]
    fn test_split_respects_escapes() {
        assert_eq!(split_unescaped("a | b\\|c | d", '|'), vec!["a ", " b\\|c ", " d"]);
    }

    #[test]
    fn test_split_list_keeps_value_whitespace() {
        assert_eq!(split_list(" a | b |  c "), vec![" a", "b", " c "]);
        assert_eq!(split_list("a|b"), vec!["a", "b"]);
        assert_eq!(split_list("solo "), vec!["solo "]);
    }
}
