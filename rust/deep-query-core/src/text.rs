//! Shared text utilities used by extraction, generation, and validation.
//!
//! Grounded on `keyword_hierarchy_manager.py`'s regex fallback patterns and
//! stopword lists (`original_source/experiments/07_tree_extension_deep_query`).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Words that never stand alone as a keyword or answer.
const STOPWORDS: &[&str] = &[
    "what", "which", "who", "when", "where", "how", "why", "the", "a", "an", "in", "on", "at",
    "for", "with", "by", "to", "from", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "this",
    "that", "these", "those", "and", "or", "but", "if", "then",
];

/// Generic words the extractor must reject as short-answer candidates.
const GENERIC_WORDS: &[&str] = &[
    "system", "method", "approach", "process", "technique", "thing", "stuff", "way", "aspect",
];

#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_lowercase().as_str())
}

#[must_use]
pub fn is_generic_word(word: &str) -> bool {
    GENERIC_WORDS.contains(&word.to_lowercase().as_str())
}

fn proper_noun_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").unwrap())
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap())
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d[\d,.]*\b").unwrap())
}

fn technical_term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z]+-[A-Za-z]+\b|\b[A-Z]{2,}\b").unwrap())
}

/// Proper nouns (runs of capitalized words) found in `text`, stopwords filtered out.
#[must_use]
pub fn proper_nouns(text: &str) -> Vec<String> {
    proper_noun_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|noun| !is_stopword(noun) && noun.len() > 2)
        .collect()
}

/// Four-digit years, e.g. publication/launch dates.
#[must_use]
pub fn years(text: &str) -> Vec<String> {
    year_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Plain numbers (not necessarily years).
#[must_use]
pub fn numbers(text: &str) -> Vec<String> {
    number_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Hyphenated compounds and all-caps acronyms, a cheap proxy for technical terms.
#[must_use]
pub fn technical_terms(text: &str) -> Vec<String> {
    technical_term_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|t| !is_stopword(t) && t.len() > 2)
        .collect()
}

/// Normalize for comparison: lowercase, strip non-alphanumeric punctuation.
#[must_use]
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize into a lowercase content-word set (stopwords excluded).
#[must_use]
pub fn content_words(s: &str) -> HashSet<String> {
    normalize(s)
        .split_whitespace()
        .filter(|w| !is_stopword(w))
        .map(ToString::to_string)
        .collect()
}

/// Returns the byte range of `answer` inside `question_text` if it appears
/// as a literal substring that is *not* an unavoidable fragment of a larger
/// proper-noun phrase already containing the answer as a strict prefix/suffix
/// token boundary.
///
/// A leak is "unavoidable" only when the answer is itself a strict
/// substring of a longer capitalized phrase present in the question (e.g.
/// question mentions "James Webb Space Telescope" while the answer is
/// "James Webb"); a bare standalone occurrence of the answer always counts
/// as a leak.
#[must_use]
pub fn leaks_answer(question_text: &str, answer: &str) -> Option<(usize, usize)> {
    let answer_trim = answer.trim();
    if answer_trim.is_empty() {
        return None;
    }
    let q_lower = question_text.to_lowercase();
    let a_lower = answer_trim.to_lowercase();
    let idx = q_lower.find(&a_lower)?;
    let end = idx + a_lower.len();

    // Unavoidable proper-noun fragment: the match sits inside a longer
    // capitalized phrase in the original (non-lowered) text.
    for phrase in proper_nouns(question_text) {
        let phrase_lower = phrase.to_lowercase();
        if phrase_lower.len() > a_lower.len() && phrase_lower.contains(&a_lower) {
            return None;
        }
    }
    Some((idx, end))
}

/// Jaccard-style content-word overlap in `[0, 1]`.
#[must_use]
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let wa = content_words(a);
    let wb = content_words(b);
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let overlap = wa.intersection(&wb).count();
    overlap as f64 / wa.len().max(wb.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proper_nouns_filters_stopwords_and_short_tokens() {
        let nouns = proper_nouns("The James Webb Space Telescope succeeded Hubble in 2021.");
        assert!(nouns.contains(&"James Webb Space Telescope".to_string()));
        assert!(!nouns.iter().any(|n| n == "The"));
    }

    #[test]
    fn leaks_answer_detects_bare_occurrence() {
        assert!(leaks_answer("What replaced James Webb?", "James Webb").is_some());
    }

    #[test]
    fn leaks_answer_allows_proper_noun_fragment() {
        assert!(leaks_answer(
            "Which observatory is the James Webb Space Telescope named after?",
            "James Webb"
        )
        .is_none());
    }

    #[test]
    fn word_overlap_symmetric_and_bounded() {
        let score = word_overlap("james webb telescope", "webb telescope launch");
        assert!(score > 0.0 && score <= 1.0);
        assert_eq!(word_overlap("a", "b"), 0.0);
    }
}
