//! Tagged-span markup for transcripts and feedback
//!
//! Text may carry inline tags such as `[kw]word[/kw]`. [`parse`] turns it
//! into a flat list of spans; unmatched or mismatched tags are left as
//! plain text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::ai::Mistake;

/// Opening tag, body, closing tag
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[(kw|err|fix|slot)\](.*?)\[/(kw|err|fix|slot)\]").expect("valid regex")
});

/// Kinds of highlighted span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Topic keyword
    Keyword,
    /// Mispronounced or wrong word
    Mistake,
    /// Suggested replacement
    Correction,
    /// Fill-in slot in a sentence pattern
    Slot,
}

impl Tag {
    /// Name used in markup
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Keyword => "kw",
            Self::Mistake => "err",
            Self::Correction => "fix",
            Self::Slot => "slot",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "kw" => Some(Self::Keyword),
            "err" => Some(Self::Mistake),
            "fix" => Some(Self::Correction),
            "slot" => Some(Self::Slot),
            _ => None,
        }
    }

    const fn ansi(self) -> &'static str {
        match self {
            Self::Keyword => "\x1b[1;36m",
            Self::Mistake => "\x1b[4;31m",
            Self::Correction => "\x1b[32m",
            Self::Slot => "\x1b[33m",
        }
    }

    fn wrap(self, text: &str) -> String {
        format!("[{name}]{text}[/{name}]", name = self.name())
    }
}

/// A run of text, optionally tagged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Plain(String),
    Tagged(Tag, String),
}

impl Span {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Plain(text) | Self::Tagged(_, text) => text,
        }
    }
}

/// Parse tagged text into spans
#[must_use]
pub fn parse(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut plain = String::new();
    let mut pos = 0;

    while let Some(caps) = TAG_REGEX.captures_at(text, pos) {
        let (Some(whole), Some(open), Some(body), Some(close)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            break;
        };

        if open.as_str() != close.as_str() {
            // Treat the opening tag as text and look again right after it
            plain.push_str(&text[pos..open.end() + 1]);
            pos = open.end() + 1;
            continue;
        }

        plain.push_str(&text[pos..whole.start()]);
        if !plain.is_empty() {
            spans.push(Span::Plain(std::mem::take(&mut plain)));
        }
        if let Some(tag) = Tag::from_name(open.as_str()) {
            spans.push(Span::Tagged(tag, body.as_str().to_string()));
        }
        pos = whole.end();
    }

    plain.push_str(&text[pos..]);
    if !plain.is_empty() {
        spans.push(Span::Plain(plain));
    }
    spans
}

/// Concatenated text with all tags removed
#[must_use]
pub fn plain_text(spans: &[Span]) -> String {
    spans.iter().map(Span::text).collect()
}

/// Render spans for a terminal
#[must_use]
pub fn render_ansi(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Span::Plain(text) => text.clone(),
            Span::Tagged(tag, text) => format!("{}{text}\x1b[0m", tag.ansi()),
        })
        .collect()
}

/// Build a case-insensitive whole-word pattern matching any of `words`
fn word_pattern<S: AsRef<str>>(words: &[S]) -> Option<Regex> {
    let mut escaped: Vec<String> = words
        .iter()
        .map(|w| w.as_ref().trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        return None;
    }
    // Longest first so multi-word keywords win over their parts
    escaped.sort_by_key(|w| std::cmp::Reverse(w.len()));
    escaped.dedup();

    match Regex::new(&format!(r"(?i)\b(?:{})\b", escaped.join("|"))) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "could not build highlight pattern");
            None
        }
    }
}

/// Wrap whole-word, case-insensitive occurrences of `keywords` in `[kw]` tags
#[must_use]
pub fn highlight_keywords<S: AsRef<str>>(text: &str, keywords: &[S]) -> String {
    let Some(re) = word_pattern(keywords) else {
        return text.to_string();
    };
    re.replace_all(text, |caps: &Captures<'_>| Tag::Keyword.wrap(&caps[0]))
        .into_owned()
}

/// Tag each mistaken word, followed by its correction when there is one
#[must_use]
pub fn mark_mistakes(text: &str, mistakes: &[Mistake]) -> String {
    let words: Vec<&str> = mistakes.iter().map(|m| m.word.as_str()).collect();
    let Some(re) = word_pattern(&words) else {
        return text.to_string();
    };

    let suggestions: HashMap<String, Option<&str>> = mistakes
        .iter()
        .map(|m| (m.word.trim().to_lowercase(), m.suggestion.as_deref()))
        .collect();

    re.replace_all(text, |caps: &Captures<'_>| {
        let word = &caps[0];
        let marked = Tag::Mistake.wrap(word);
        match suggestions.get(&word.to_lowercase()).copied().flatten() {
            Some(fix) if !fix.trim().is_empty() => format!("{marked} {}", Tag::Correction.wrap(fix.trim())),
            _ => marked,
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let spans = parse("I [kw]ordered[/kw] the [slot]dish[/slot].");
        assert_eq!(
            spans,
            vec![
                Span::Plain("I ".to_string()),
                Span::Tagged(Tag::Keyword, "ordered".to_string()),
                Span::Plain(" the ".to_string()),
                Span::Tagged(Tag::Slot, "dish".to_string()),
                Span::Plain(".".to_string()),
            ]
        );
    }

    #[test]
    fn test_mismatched_tags_stay_plain() {
        let spans = parse("[kw]open[/err] then [err]bad[/err]");
        assert_eq!(
            spans,
            vec![
                Span::Plain("[kw]open[/err] then ".to_string()),
                Span::Tagged(Tag::Mistake, "bad".to_string()),
            ]
        );
        assert_eq!(parse("no tags [here]"), vec![Span::Plain("no tags [here]".to_string())]);
    }

    #[test]
    fn test_highlight_whole_words_case_insensitive() {
        let out = highlight_keywords("Coffee and coffeehouse. COFFEE!", &["coffee"]);
        assert_eq!(out, "[kw]Coffee[/kw] and coffeehouse. [kw]COFFEE[/kw]!");

        let out = highlight_keywords("a (b) c", &["(b)", ""]);
        assert_eq!(out, "a (b) c");
    }

    #[test]
    fn test_highlight_prefers_longest() {
        let out = highlight_keywords("train station", &["train", "train station"]);
        assert_eq!(out, "[kw]train station[/kw]");
    }

    #[test]
    fn test_mark_mistakes() {
        let mistakes = vec![
            Mistake {
                word: "tree".to_string(),
                issue: "th sound".to_string(),
                suggestion: Some("three".to_string()),
            },
            Mistake {
                word: "ship".to_string(),
                issue: "vowel".to_string(),
                suggestion: None,
            },
        ];
        let out = mark_mistakes("Tree ships, one ship.", &mistakes);
        assert_eq!(out, "[err]Tree[/err] [fix]three[/fix] ships, one [err]ship[/err].");

        let spans = parse(&out);
        assert_eq!(plain_text(&spans), "Tree three ships, one ship.");
    }

    #[test]
    fn test_render_ansi() {
        let rendered = render_ansi(&parse("say [fix]hello[/fix]"));
        assert_eq!(rendered, "say \x1b[32mhello\x1b[0m");
    }
}
