//! Filename sanitizing and per-run name deduplication.
//!
//! Slide titles become output filenames, so they are stripped of characters
//! that common filesystems reject and bounded in length.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex to collapse any whitespace run (including line breaks) into one space.
static WHITESPACE_COLLAPSE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Characters that are not allowed in filenames.
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length of a sanitized name, in characters.
pub const MAX_NAME_CHARS: usize = 100;

/// Turn arbitrary title text into a safe file stem.
///
/// - Removes `< > : " / \ | ? *`
/// - Collapses whitespace runs to single spaces
/// - Truncates to [`MAX_NAME_CHARS`] characters and trims
pub fn sanitize_filename(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c))
        .collect();

    let collapsed = WHITESPACE_COLLAPSE_REGEX.replace_all(stripped.trim(), " ");

    let truncated: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    truncated.trim().to_string()
}

/// Tracks which names were already handed out during one run.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    counts: HashMap<String, usize>,
}

impl NameRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `base`, returning it unchanged the first time and `base_N`
    /// (N = 2, 3, ...) afterwards.
    pub fn register(&mut self, base: &str) -> String {
        let count = self.counts.entry(base.to_string()).or_insert(0);
        *count += 1;

        if *count == 1 {
            base.to_string()
        } else {
            format!("{}_{}", base, count)
        }
    }

    /// Output filename for a slide.
    ///
    /// Falls back to `Slide_<position>.png` when there is no title or the
    /// title sanitizes to nothing.
    pub fn output_name(&mut self, title: Option<&str>, position: usize) -> String {
        let safe = title.map(sanitize_filename).unwrap_or_default();

        if safe.is_empty() {
            format!("Slide_{}.png", position)
        } else {
            format!("{}.png", self.register(&safe))
        }
    }
}
