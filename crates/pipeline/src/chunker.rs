//! Dual-constraint text chunking
//!
//! Splits chapter text into bounded chunks for synthesis. A chunk closes when
//! either the word limit or the character limit would be exceeded. Splitting
//! prefers sentence boundaries, then clause boundaries, then word boundaries.
//!
//! Inline annotation markers (angle-bracket control tokens such as `<laugh>`)
//! are kept intact and never count toward either limit.

use once_cell::sync::Lazy;
use regex::Regex;

use bookvoice_config::ChunkingConfig;
use bookvoice_core::{Chapter, TextChunk};

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<[a-z][a-z0-9_]*>$").expect("valid marker pattern"));

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    is_marker: bool,
}

/// Chunk one chapter into bounded, 0-indexed chunks
///
/// Total function: empty or whitespace-only input yields an empty vec.
/// Joining the produced chunk texts with single spaces reproduces the
/// chapter's word sequence exactly.
pub fn chunk_chapter(chapter_id: usize, text: &str, limits: &ChunkingConfig) -> Vec<TextChunk> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut builder = ChunkBuilder::new(chapter_id, limits);
    for sentence in split_groups(&tokens, ends_sentence) {
        let (words, chars) = measure(sentence);
        if words <= limits.max_words && chars <= limits.max_chars {
            builder.push_group(sentence, words, chars);
            continue;
        }

        // Sentence alone exceeds the limits: fall back to clause boundaries
        for clause in split_groups(sentence, ends_clause) {
            let (words, chars) = measure(clause);
            if words <= limits.max_words && chars <= limits.max_chars {
                builder.push_group(clause, words, chars);
            } else {
                // Still oversized: hard-split at word boundaries
                for token in clause {
                    builder.push_token(*token);
                }
            }
        }
    }
    builder.finish()
}

/// Chunk every chapter, assigning globally contiguous chunk indices
pub fn chunk_book(chapters: &[Chapter], limits: &ChunkingConfig) -> Vec<TextChunk> {
    let mut all: Vec<TextChunk> = Vec::new();
    for chapter in chapters {
        let offset = all.len();
        let mut chunks = chunk_chapter(chapter.id, &chapter.text, limits);
        for chunk in &mut chunks {
            chunk.index += offset;
        }
        all.extend(chunks);
    }
    all
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    text.split_whitespace()
        .map(|t| Token {
            text: t,
            is_marker: MARKER_RE.is_match(t),
        })
        .collect()
}

/// Word and character counts with annotation markers excluded
///
/// Characters include one joining space between counted words, matching the
/// length of the chunk text with markers removed.
fn measure(tokens: &[Token<'_>]) -> (usize, usize) {
    let words = tokens.iter().filter(|t| !t.is_marker).count();
    let chars: usize = tokens
        .iter()
        .filter(|t| !t.is_marker)
        .map(|t| t.text.chars().count())
        .sum();
    (words, chars + words.saturating_sub(1))
}

fn strip_closers(s: &str) -> &str {
    s.trim_end_matches(['"', '\'', '\u{201d}', '\u{2019}', ')', ']'])
}

fn ends_sentence(token: &Token<'_>) -> bool {
    !token.is_marker && strip_closers(token.text).ends_with(['.', '!', '?', '\u{2026}'])
}

fn ends_clause(token: &Token<'_>) -> bool {
    let t = strip_closers(token.text);
    !token.is_marker && (t.ends_with([',', ';', ':']) || ends_sentence(token))
}

/// Split tokens into groups closed after each boundary token
fn split_groups<'a, 'b>(
    tokens: &'b [Token<'a>],
    is_boundary: fn(&Token<'a>) -> bool,
) -> Vec<&'b [Token<'a>]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if is_boundary(token) {
            groups.push(&tokens[start..=i]);
            start = i + 1;
        }
    }
    if start < tokens.len() {
        groups.push(&tokens[start..]);
    }
    groups
}

struct ChunkBuilder<'a> {
    chapter_id: usize,
    max_words: usize,
    max_chars: usize,
    current: Vec<Token<'a>>,
    cur_words: usize,
    cur_chars: usize,
    chunks: Vec<TextChunk>,
}

impl<'a> ChunkBuilder<'a> {
    fn new(chapter_id: usize, limits: &ChunkingConfig) -> Self {
        Self {
            chapter_id,
            max_words: limits.max_words,
            max_chars: limits.max_chars,
            current: Vec::new(),
            cur_words: 0,
            cur_chars: 0,
            chunks: Vec::new(),
        }
    }

    /// Append a group known to fit on its own, flushing first when the
    /// combined chunk would exceed either limit
    fn push_group(&mut self, group: &[Token<'a>], words: usize, chars: usize) {
        if !self.current.is_empty() && !self.fits(words, chars) {
            self.flush();
        }
        let joiner = usize::from(self.cur_words > 0 && words > 0);
        self.cur_words += words;
        self.cur_chars += chars + joiner;
        self.current.extend_from_slice(group);
    }

    /// Append a single token during a hard word-level split
    fn push_token(&mut self, token: Token<'a>) {
        if token.is_marker {
            // Markers ride along for free and are never split off
            self.current.push(token);
            return;
        }

        let chars = token.text.chars().count();
        if self.current.is_empty() && chars > self.max_chars {
            // Unsplittable lexeme: emit alone rather than corrupting it
            self.current.push(token);
            self.cur_words = 1;
            self.cur_chars = chars;
            self.flush();
            return;
        }

        if !self.current.is_empty() && !self.fits(1, chars) {
            self.flush();
        }
        let joiner = usize::from(self.cur_words > 0);
        self.cur_words += 1;
        self.cur_chars += chars + joiner;
        self.current.push(token);
    }

    fn fits(&self, words: usize, chars: usize) -> bool {
        let joiner = usize::from(self.cur_words > 0 && words > 0);
        self.cur_words + words <= self.max_words
            && self.cur_chars + chars + joiner <= self.max_chars
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let text = self
            .current
            .iter()
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ");
        self.chunks.push(TextChunk {
            chapter_id: self.chapter_id,
            index: self.chunks.len(),
            text,
            word_count: self.cur_words,
            char_count: self.cur_chars,
        });
        self.current.clear();
        self.cur_words = 0;
        self.cur_chars = 0;
    }

    fn finish(mut self) -> Vec<TextChunk> {
        self.flush();
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_words: usize, max_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_words,
            max_chars,
        }
    }

    fn rejoin(chunks: &[TextChunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_chapter(0, "", &limits(70, 300)).is_empty());
        assert!(chunk_chapter(0, "   \n\t ", &limits(70, 300)).is_empty());
    }

    #[test]
    fn test_word_sequence_preserved() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    It barked! Then it slept? Everything was quiet.";
        let chunks = chunk_chapter(0, text, &limits(5, 100));

        let original: Vec<&str> = text.split_whitespace().collect();
        let rejoined = rejoin(&chunks);
        let restored: Vec<&str> = rejoined.split_whitespace().collect();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_limits_respected() {
        let text = "One two three four. Five six seven eight. Nine ten.";
        let chunks = chunk_chapter(0, text, &limits(5, 40));
        for chunk in &chunks {
            assert!(chunk.word_count <= 5, "chunk too wordy: {:?}", chunk);
            assert!(chunk.char_count <= 40, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let text = "A b c. D e f. G h i. J k l.";
        let chunks = chunk_chapter(3, text, &limits(3, 20));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.chapter_id, 3);
        }
    }

    #[test]
    fn test_oversized_sentence_splits_at_clauses() {
        let text = "First part of the sentence, second part follows here, \
                    and the third part closes it.";
        let chunks = chunk_chapter(0, text, &limits(6, 60));
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.word_count <= 6);
        }
    }

    #[test]
    fn test_long_sentence_hard_splits_within_both_limits() {
        // Scenario: 30-word chunk A plus an 80-word run-on sentence B
        let a = (0..30).map(|i| format!("wa{i}")).collect::<Vec<_>>().join(" ");
        let b = (0..80).map(|i| format!("wb{i}")).collect::<Vec<_>>().join(" ");
        let text = format!("{a}. {b}.");

        let chunks = chunk_chapter(0, &text, &limits(70, 300));
        let b_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.text.contains("wb0") || c.text.contains("wb79"))
            .collect();
        assert!(b_chunks.len() >= 2, "run-on sentence must split: {chunks:?}");
        for chunk in &chunks {
            assert!(chunk.word_count <= 70);
            assert!(chunk.char_count <= 300);
        }

        // No word lost or duplicated across the split
        let original: Vec<&str> = text.split_whitespace().collect();
        let rejoined = rejoin(&chunks);
        assert_eq!(original, rejoined.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn test_markers_excluded_from_counts() {
        let text = "He laughed <laugh> loudly.";
        let chunks = chunk_chapter(0, text, &limits(70, 300));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].word_count, 3);
        // "He" + "laughed" + "loudly." with two joining spaces
        assert_eq!(chunks[0].char_count, 2 + 7 + 7 + 2);
        assert!(chunks[0].text.contains("<laugh>"));
    }

    #[test]
    fn test_marker_never_split_across_chunks() {
        // Markers between every word; tight word limit forces many chunks
        let text = "alpha <sigh> beta <laugh> gamma <gasp> delta <cry> epsilon.";
        let chunks = chunk_chapter(0, text, &limits(2, 300));
        for chunk in &chunks {
            // Any marker in a chunk is complete
            let opens = chunk.text.matches('<').count();
            let closes = chunk.text.matches('>').count();
            assert_eq!(opens, closes, "split marker in {:?}", chunk.text);
        }
        let rejoined = rejoin(&chunks);
        assert_eq!(
            text.split_whitespace().collect::<Vec<_>>(),
            rejoined.split_whitespace().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_unsplittable_lexeme_emitted_alone() {
        let long_word = "x".repeat(50);
        let text = format!("short {long_word} tail.");
        let chunks = chunk_chapter(0, &text, &limits(70, 20));

        let oversized: Vec<_> = chunks.iter().filter(|c| c.char_count > 20).collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].text, long_word);
        assert_eq!(oversized[0].word_count, 1);
    }

    #[test]
    fn test_chunk_book_global_indices() {
        let chapters = vec![
            Chapter::new(0, "One", "A b. C d."),
            Chapter::new(1, "Two", "E f. G h."),
        ];
        let chunks = chunk_book(&chapters, &limits(2, 100));
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
        assert_eq!(chunks[0].chapter_id, 0);
        assert_eq!(chunks[2].chapter_id, 1);
    }

    #[test]
    fn test_abbreviation_heavy_text_still_preserves_words() {
        let text = "Dr. Smith arrived. He said hello.";
        let chunks = chunk_chapter(0, text, &limits(70, 300));
        let rejoined = rejoin(&chunks);
        assert_eq!(
            text.split_whitespace().collect::<Vec<_>>(),
            rejoined.split_whitespace().collect::<Vec<_>>()
        );
    }
}
