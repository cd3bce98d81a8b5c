//! Sentence-aware chunking with token overlap.
//!
//! Chunks are computed as ranges of whitespace tokens, so every chunk starts
//! and ends on a token boundary and its text is an exact slice of the
//! source. Sentences are packed greedily; when the next sentence does not
//! fit, the chunk is closed and the next one is seeded with the longest run
//! of trailing sentences whose token count does not exceed the overlap. If
//! not even the last sentence fits, its trailing words are carried instead.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::text::{split_sentences, word_spans, Span};
use crate::types::{Chunk, Document, Meta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on tokens per chunk.
    pub chunk_size: usize,
    /// Tokens carried from the end of one chunk into the next.
    pub chunk_overlap: usize,
    pub respect_sentence_boundaries: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 400, chunk_overlap: 80, respect_sentence_boundaries: true }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.chunk_size = self.chunk_size.max(1);
        self.chunk_overlap = self.chunk_overlap.min(self.chunk_size - 1);
        self
    }
}

/// One chunk of a text, before decoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Out-of-range parameters are clamped (`chunk_size >= 1`,
    /// `chunk_overlap < chunk_size`) so chunking itself cannot fail on them.
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config: config.normalized() }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into ordered, overlapping chunks. Empty or
    /// whitespace-only input yields no chunks. If chunking fails internally
    /// the whole input is returned as a single chunk.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        match self.try_chunk(text) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Chunking failed ({}); keeping document as a single chunk", e);
                vec![TextChunk { text: text.to_string(), start_char: 0, end_char: text.chars().count(), chunk_index: 0 }]
            }
        }
    }

    /// Chunk a document and decorate every piece with identity, tenant and
    /// provenance metadata.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let pieces = self.chunk(&document.text);
        debug!("Document {} -> {} chunks", document.id, pieces.len());
        decorate(document, pieces, &self.config)
    }

    fn try_chunk(&self, text: &str) -> Result<Vec<TextChunk>> {
        let words = word_spans(text);
        let windows = if self.config.respect_sentence_boundaries {
            self.pack_sentences(text, &words)
        } else {
            self.word_windows(0..words.len())
        };

        let offsets = CharOffsets::new(text);
        let mut chunks = Vec::with_capacity(windows.len());
        let mut last_start: Option<usize> = None;
        for (chunk_index, w) in windows.into_iter().enumerate() {
            if w.is_empty() || w.end > words.len() {
                return Err(Error::MalformedInput(format!("invalid token window {:?}", w)));
            }
            if last_start.is_some_and(|s| w.start <= s) {
                return Err(Error::MalformedInput("token windows are not advancing".to_string()));
            }
            last_start = Some(w.start);
            let (start, end) = (words[w.start].start, words[w.end - 1].end);
            chunks.push(TextChunk {
                text: text[start..end].to_string(),
                start_char: offsets.char_at(start),
                end_char: offsets.char_at(end),
                chunk_index,
            });
        }
        Ok(chunks)
    }

    fn pack_sentences(&self, text: &str, words: &[Span]) -> Vec<Range<usize>> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut out = Vec::new();
        let mut current: Vec<Range<usize>> = Vec::new();
        // true once `current` holds a sentence not already emitted
        let mut fresh = false;

        for sentence in split_sentences(text, words) {
            // a sentence that fills a whole chunk leaves no room for carried tokens
            let must_split = sentence.len() > size || (sentence.len() == size && overlap > 0 && !current.is_empty());
            if must_split {
                // pending sentences (or the carried seed) lead into the split
                let region_start = current.first().map_or(sentence.start, |u| u.start);
                let windows = self.word_windows(region_start..sentence.end);
                debug!("Hard-splitting sentence of {} tokens into {} windows", sentence.len(), windows.len());
                out.extend(windows);
                current = if overlap > 0 { vec![sentence.end - overlap..sentence.end] } else { Vec::new() };
                fresh = false;
                continue;
            }

            if token_count(&current) + sentence.len() > size {
                if fresh {
                    out.push(span_of(&current));
                }
                current = trailing_overlap(&current, overlap);
                let room = size - sentence.len();
                if token_count(&current) > room {
                    current = trailing_words(&current, room);
                }
            }
            current.push(sentence);
            fresh = true;
        }
        if fresh {
            out.push(span_of(&current));
        }
        out
    }

    fn word_windows(&self, range: Range<usize>) -> Vec<Range<usize>> {
        let size = self.config.chunk_size;
        let stride = size - self.config.chunk_overlap;
        let mut out = Vec::new();
        let mut start = range.start;
        while start < range.end {
            let end = (start + size).min(range.end);
            out.push(start..end);
            if end >= range.end {
                break;
            }
            start += stride;
        }
        out
    }
}

fn token_count(units: &[Range<usize>]) -> usize {
    units.iter().map(|u| u.len()).sum()
}

fn span_of(units: &[Range<usize>]) -> Range<usize> {
    match (units.first(), units.last()) {
        (Some(first), Some(last)) => first.start..last.end,
        _ => 0..0,
    }
}

/// Longest suffix of `units` whose token count stays within `overlap`,
/// falling back to the last `overlap` words when no whole unit fits.
fn trailing_overlap(units: &[Range<usize>], overlap: usize) -> Vec<Range<usize>> {
    let mut taken = 0;
    let mut keep = units.len();
    for u in units.iter().rev() {
        if taken + u.len() > overlap {
            break;
        }
        taken += u.len();
        keep -= 1;
    }
    if keep == units.len() {
        return trailing_words(units, overlap);
    }
    units[keep..].to_vec()
}

/// The last `n` words covered by contiguous `units`, as a single range.
fn trailing_words(units: &[Range<usize>], n: usize) -> Vec<Range<usize>> {
    let span = span_of(units);
    if n == 0 || span.is_empty() {
        return Vec::new();
    }
    vec![span.end - n.min(span.len())..span.end]
}

/// Byte offset to character offset lookup.
struct CharOffsets {
    starts: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        Self { starts: text.char_indices().map(|(i, _)| i).collect() }
    }

    fn char_at(&self, byte: usize) -> usize {
        match self.starts.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        }
    }
}

/// Attach identity, tenant and metadata to raw chunks. Pure: no I/O.
pub fn decorate(document: &Document, pieces: Vec<TextChunk>, config: &ChunkingConfig) -> Vec<Chunk> {
    let created_at = Utc::now().to_rfc3339();
    let total = pieces.len();
    pieces
        .into_iter()
        .map(|piece| {
            let mut metadata = Meta::new();
            metadata.insert("title".to_string(), document.title.clone());
            metadata.insert("domain".to_string(), document.domain.clone());
            metadata.insert("url".to_string(), document.url.clone());
            metadata.insert("content_type".to_string(), document.content_type.clone());
            if let Some(crawl_id) = &document.crawl_id {
                metadata.insert("crawl_id".to_string(), crawl_id.clone());
            }
            metadata.insert("chunk_size".to_string(), config.chunk_size.to_string());
            metadata.insert("chunk_overlap".to_string(), config.chunk_overlap.to_string());
            metadata.insert("respect_sentence_boundaries".to_string(), config.respect_sentence_boundaries.to_string());
            metadata.insert("total_chunks".to_string(), total.to_string());
            metadata.insert("created_at".to_string(), created_at.clone());
            Chunk {
                id: format!("{}:{}", document.id, piece.chunk_index),
                document_id: document.id.clone(),
                org_id: document.org_id.clone(),
                chunk_index: piece.chunk_index,
                content: piece.text,
                start_char: piece.start_char,
                end_char: piece.end_char,
                embedding: None,
                metadata,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkingConfig { chunk_size: size, chunk_overlap: overlap, respect_sentence_boundaries: true })
    }

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn basic_sentence_windows_overlap_by_one_sentence() {
        let chunks = chunker(2, 1).chunk("A. B. C.");
        assert_eq!(texts(&chunks), vec!["A. B.", "B. C."]);
        assert_eq!(chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!((chunks[0].start_char, chunks[0].end_char), (0, 5));
        assert_eq!((chunks[1].start_char, chunks[1].end_char), (3, 8));
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        assert!(chunker(10, 2).chunk("").is_empty());
        assert!(chunker(10, 2).chunk(" \n\t ").is_empty());
    }

    #[test]
    fn short_document_is_one_chunk() {
        let text = "Just one short sentence. And another.";
        let chunks = chunker(50, 10).chunk(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!((chunks[0].start_char, chunks[0].end_char), (0, text.chars().count()));
    }

    #[test]
    fn overlong_sentence_is_hard_split_with_stride() {
        // one sentence of 10 tokens, size 4, overlap 1 -> stride 3
        let text = "w0 w1 w2 w3 w4 w5 w6 w7 w8 w9.";
        let chunks = chunker(4, 1).chunk(text);
        assert_eq!(texts(&chunks), vec!["w0 w1 w2 w3", "w3 w4 w5 w6", "w6 w7 w8 w9."]);
    }

    #[test]
    fn hard_split_keeps_carried_overlap() {
        let text = "Intro here. a b c d e f g h i.";
        let chunks = chunker(4, 2).chunk(text);
        // the pending "Intro here." leads into the split region
        assert_eq!(texts(&chunks), vec!["Intro here. a b", "a b c d", "c d e f", "e f g h", "g h i."]);
        assert!(chunks.iter().all(|c| crate::text::count_tokens(&c.text) <= 4));
        assert_eq!(chunks.last().map(|c| c.text.as_str()), Some("g h i."));
    }

    #[test]
    fn long_sentences_still_carry_trailing_words() {
        // every sentence is longer than the overlap
        let text = "a b c. d e f. g h i. j k l. m n o.";
        let chunks = chunker(10, 2).chunk(text);
        assert_eq!(texts(&chunks), vec!["a b c. d e f. g h i.", "h i. j k l. m n o."]);
        assert!(chunks[1].start_char < chunks[0].end_char);
    }

    #[test]
    fn abbreviation_merged_sentences_keep_overlap() {
        let chunks = chunker(2, 1).chunk("jr. a. a.");
        assert_eq!(texts(&chunks), vec!["jr. a.", "a. a."]);
    }

    #[test]
    fn full_size_sentence_after_carried_text_is_windowed() {
        let chunks = chunker(3, 1).chunk("One two. Three four five.");
        assert_eq!(texts(&chunks), vec!["One two. Three", "Three four five."]);
    }

    #[test]
    fn word_windows_when_sentences_ignored() {
        let c = Chunker::new(ChunkingConfig { chunk_size: 3, chunk_overlap: 1, respect_sentence_boundaries: false });
        let chunks = c.chunk("one. two three. four five");
        assert_eq!(texts(&chunks), vec!["one. two three.", "three. four five"]);
    }

    #[test]
    fn character_offsets_account_for_multibyte_text() {
        let text = "Café au lait. Crème brûlée.";
        let chunks = chunker(3, 0).chunk(text);
        assert_eq!(texts(&chunks), vec!["Café au lait.", "Crème brûlée."]);
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks {
            let slice: String = chars[c.start_char..c.end_char].iter().collect();
            assert_eq!(slice, c.text);
        }
    }

    #[test]
    fn invalid_parameters_are_clamped() {
        let c = Chunker::new(ChunkingConfig { chunk_size: 0, chunk_overlap: 5, respect_sentence_boundaries: true });
        assert_eq!(c.config().chunk_size, 1);
        assert_eq!(c.config().chunk_overlap, 0);
        assert_eq!(c.chunk("a b c").len(), 3);
        assert!(ChunkingConfig { chunk_size: 10, chunk_overlap: 10, respect_sentence_boundaries: true }.validate().is_err());
        assert!(ChunkingConfig::default().validate().is_ok());
    }

    #[test]
    fn decorate_attaches_identity_and_metadata() {
        let doc = Document {
            id: "doc-1".into(),
            org_id: "org-a".into(),
            domain: "example.com".into(),
            url: "https://example.com/a".into(),
            title: "A".into(),
            text: "First. Second. Third.".into(),
            content_type: "article".into(),
            extracted_at: Utc::now(),
            crawl_id: Some("crawl-7".into()),
            processed: false,
        };
        let chunks = chunker(2, 1).chunk_document(&doc);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].id, "doc-1:1");
        assert_eq!(chunks[1].org_id, "org-a");
        assert_eq!(chunks[1].meta("crawl_id"), Some("crawl-7"));
        assert_eq!(chunks[1].meta("total_chunks"), Some("2"));
        assert_eq!(chunks[0].meta("chunk_overlap"), Some("1"));
        assert!(chunks.iter().all(|c| c.embedding.is_none()));
    }
}
