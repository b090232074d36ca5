//! Keyword matching over normalized page text.
//!
//! Input text is expected to be lowercased and whitespace-collapsed already
//! (the fetcher's contract). Keywords are normalized the same way before
//! matching, so matching is case-insensitive.
//!
//! Every occurrence produces its own [`KeywordHit`]; hits are not
//! de-duplicated even when two occurrences share the same context.

use regex::Regex;
use tracing::warn;

use keywatch_fetcher::normalize_text;
use keywatch_shared::{KeywordHit, KeywordMode, WatchSettings};

/// Default characters of context on each side of a match.
pub const DEFAULT_CONTEXT: usize = 50;

// ---------------------------------------------------------------------------
// Compiled keywords
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum CompiledKeyword {
    Literal(String),
    Pattern { source: String, regex: Regex },
}

impl CompiledKeyword {
    fn keyword(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Pattern { source, .. } => source,
        }
    }
}

/// Keywords prepared for repeated matching across many pages.
///
/// Built by [`Matcher::compile`]. Keywords are normalized, empty ones are
/// dropped, and duplicates (after normalization) keep their first position.
#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    entries: Vec<CompiledKeyword>,
}

impl KeywordSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Normalized keywords in match order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(CompiledKeyword::keyword)
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Finds keyword occurrences and cuts a bounded context window around each.
#[derive(Debug, Clone)]
pub struct Matcher {
    mode: KeywordMode,
    context_before: usize,
    context_after: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(KeywordMode::Literal)
    }
}

impl Matcher {
    pub fn new(mode: KeywordMode) -> Self {
        Self {
            mode,
            context_before: DEFAULT_CONTEXT,
            context_after: DEFAULT_CONTEXT,
        }
    }

    pub fn from_settings(settings: &WatchSettings) -> Self {
        Self::new(settings.keyword_mode).with_context(settings.context_before, settings.context_after)
    }

    /// Set the context width, in characters, before and after each match.
    pub fn with_context(mut self, before: usize, after: usize) -> Self {
        self.context_before = before;
        self.context_after = after;
        self
    }

    pub fn mode(&self) -> KeywordMode {
        self.mode
    }

    /// Normalize and compile `keywords`, preserving caller order.
    ///
    /// In pattern mode a keyword that is not a valid regular expression is
    /// skipped with a warning.
    pub fn compile<S: AsRef<str>>(&self, keywords: &[S]) -> KeywordSet {
        let mut entries: Vec<CompiledKeyword> = Vec::with_capacity(keywords.len());

        for raw in keywords {
            let raw = raw.as_ref();
            let keyword = match self.mode {
                KeywordMode::Literal => normalize_text(raw),
                KeywordMode::Pattern => raw.to_lowercase(),
            };
            if keyword.trim().is_empty() || entries.iter().any(|e| e.keyword() == keyword) {
                continue;
            }

            match self.mode {
                KeywordMode::Literal => entries.push(CompiledKeyword::Literal(keyword)),
                KeywordMode::Pattern => match Regex::new(&keyword) {
                    Ok(regex) => entries.push(CompiledKeyword::Pattern {
                        source: keyword,
                        regex,
                    }),
                    Err(e) => warn!(keyword = %raw, error = %e, "skipping invalid keyword pattern"),
                },
            }
        }

        KeywordSet { entries }
    }

    /// Find every occurrence of every keyword in `text`.
    pub fn find_hits<S: AsRef<str>>(&self, text: &str, keywords: &[S]) -> Vec<KeywordHit> {
        self.find_compiled(text, &self.compile(keywords))
    }

    /// Find every occurrence of a pre-compiled keyword set in `text`.
    ///
    /// Hits are grouped by keyword (in set order), each group in document
    /// order. Literal keywords report overlapping occurrences; patterns report
    /// the regex engine's successive non-overlapping matches.
    pub fn find_compiled(&self, text: &str, set: &KeywordSet) -> Vec<KeywordHit> {
        let mut hits = Vec::new();

        for entry in &set.entries {
            match entry {
                CompiledKeyword::Literal(keyword) => {
                    let mut from = 0;
                    while let Some(pos) = text[from..].find(keyword.as_str()) {
                        let start = from + pos;
                        let end = start + keyword.len();
                        hits.push(KeywordHit::new(keyword, self.context(text, start, end)));
                        // Step one character so overlapping occurrences are found.
                        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
                    }
                }
                CompiledKeyword::Pattern { source, regex } => {
                    for m in regex.find_iter(text) {
                        hits.push(KeywordHit::new(
                            source,
                            self.context(text, m.start(), m.end()),
                        ));
                    }
                }
            }
        }

        hits
    }

    /// Slice of `text` from `context_before` characters ahead of `start` to
    /// `context_after` characters past `end`, clamped to the text.
    fn context<'t>(&self, text: &'t str, start: usize, end: usize) -> &'t str {
        let from = match self.context_before {
            0 => start,
            n => text[..start]
                .char_indices()
                .rev()
                .nth(n - 1)
                .map_or(0, |(i, _)| i),
        };
        let to = text[end..]
            .char_indices()
            .nth(self.context_after)
            .map_or(text.len(), |(i, _)| end + i);
        &text[from..to]
    }
}
