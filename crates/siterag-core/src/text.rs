//! Whitespace tokenization, sentence boundaries and query-term normalization.
//!
//! Token accounting everywhere in the crate is "maximal run of
//! non-whitespace characters", so chunk sizes are comparable across
//! languages without a model tokenizer.

use std::ops::Range;

/// English stop words, shared by the Tantivy analyzer and the keyword
/// fallback so both paths agree on what a query term is.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their", "there",
    "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could",
    "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
];

const ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "mr.", "mrs.", "ms.", "dr.", "prof.", "vs.", "inc.", "ltd.", "st.", "jr.", "sr.", "approx.", "etc.",
];

const CLOSING: &[char] = &['"', '\'', ')', ']', '}', '\u{201d}', '\u{2019}', '\u{bb}'];
const TERMINALS: &[char] = &['.', '!', '?', '\u{2026}', '\u{3002}', '\u{ff01}', '\u{ff1f}'];

/// Byte span of one whitespace-delimited token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

pub fn word_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push(Span { start: s, end: i });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push(Span { start: s, end: text.len() });
    }
    spans
}

pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Group `words` (as returned by [`word_spans`]) into sentences, returned as
/// ranges of word indices. Boundaries fall after terminal punctuation or
/// at any whitespace gap containing a newline.
pub fn split_sentences(text: &str, words: &[Span]) -> Vec<Range<usize>> {
    let mut sentences = Vec::new();
    let mut first = 0;
    for (i, w) in words.iter().enumerate() {
        let newline_after = match words.get(i + 1) {
            Some(next) => text[w.end..next.start].contains('\n'),
            None => true,
        };
        if newline_after || ends_sentence(&text[w.start..w.end]) {
            sentences.push(first..i + 1);
            first = i + 1;
        }
    }
    sentences
}

fn ends_sentence(word: &str) -> bool {
    let core = word.trim_end_matches(CLOSING);
    if !core.ends_with(TERMINALS) {
        return false;
    }
    let lower = core.to_lowercase();
    !ABBREVIATIONS.contains(&lower.as_str())
}

/// Lowercased alphanumeric query terms, de-duplicated in order of first
/// appearance. Stop words are dropped unless nothing else remains.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut raw: Vec<String> = Vec::new();
    for term in query.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        let term = term.to_lowercase();
        if !raw.contains(&term) {
            raw.push(term);
        }
    }
    let content: Vec<String> = raw.iter().filter(|t| !STOP_WORDS.contains(&t.as_str())).cloned().collect();
    if content.is_empty() { raw } else { content }
}

/// True when the query has terms and all of them are stop words. The
/// full-text analyzer drops such queries entirely.
pub fn only_stop_words(query: &str) -> bool {
    let terms = query_terms(query);
    !terms.is_empty() && terms.iter().all(|t| STOP_WORDS.contains(&t.as_str()))
}
