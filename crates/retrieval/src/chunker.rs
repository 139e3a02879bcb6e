//! Sentence-aware chunker with a raw character overlap.
//!
//! Text is split on `.`, `!` and `?` and sentences are accumulated greedily
//! until the next one would push the buffer past `max_chunk_size`. The next
//! buffer is seeded with the last `overlap_size` characters of the sealed
//! one, so neighbouring chunks share context.
//!
//! All lengths are counted in `char`s; no slice ever splits a character.

use docchat_core::document::Chunk;
use docchat_core::error::Error;
use tracing::debug;

/// Joins sentences inside one buffer.
const SENTENCE_JOINER: &str = ". ";

/// Separates the overlap tail from the first new sentence.
const OVERLAP_JOINER: char = ' ';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chunk_size: usize,
    overlap_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap_size: 50,
        }
    }
}

impl Chunker {
    /// Create a chunker. `overlap_size` must be smaller than a non-zero
    /// `max_chunk_size`.
    pub fn new(max_chunk_size: usize, overlap_size: usize) -> Result<Self, Error> {
        if max_chunk_size == 0 {
            return Err(Error::Config {
                message: "max_chunk_size must be > 0".into(),
            });
        }
        if overlap_size >= max_chunk_size {
            return Err(Error::Config {
                message: format!(
                    "overlap_size ({overlap_size}) must be smaller than max_chunk_size ({max_chunk_size})"
                ),
            });
        }
        Ok(Self {
            max_chunk_size,
            overlap_size,
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    /// Split `text` into chunks owned by `document_name`.
    ///
    /// Every sentence of the input appears whole in at least one chunk. A
    /// chunk only exceeds `max_chunk_size` when a single sentence does.
    pub fn chunk(&self, text: &str, document_name: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_len = 0usize;

        for sentence in split_sentences(text) {
            let sentence_len = sentence.chars().count();
            // The joiner is counted so an appended chunk stays within max_chunk_size.
            let joined_len = buffer_len + SENTENCE_JOINER.len() + sentence_len;

            if buffer_len > 0 && joined_len > self.max_chunk_size {
                let tail = self.overlap_tail(&buffer, sentence_len).to_string();
                seal(&mut chunks, document_name, &buffer);

                buffer = tail;
                if !buffer.is_empty() {
                    buffer.push(OVERLAP_JOINER);
                }
                buffer.push_str(sentence);
            } else {
                if !buffer.is_empty() {
                    buffer.push_str(SENTENCE_JOINER);
                }
                buffer.push_str(sentence);
            }
            buffer_len = buffer.chars().count();
        }

        if !buffer.trim().is_empty() {
            seal(&mut chunks, document_name, &buffer);
        }

        debug!(
            document = %document_name,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "Chunked document"
        );

        chunks
    }

    /// The overlap carried into the next buffer.
    ///
    /// Shortened so that `tail + ' ' + next_sentence` still fits; empty when
    /// the next sentence alone fills the chunk.
    fn overlap_tail<'a>(&self, sealed: &'a str, next_sentence_len: usize) -> &'a str {
        let room = self
            .max_chunk_size
            .saturating_sub(next_sentence_len + OVERLAP_JOINER.len_utf8());
        let take = self.overlap_size.min(room);
        char_tail(sealed, take).trim_start()
    }
}

/// Sentence-like units: split on terminal punctuation, trimmed, non-empty.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn seal(chunks: &mut Vec<Chunk>, document_name: &str, buffer: &str) {
    let content = buffer.trim();
    if content.is_empty() {
        return;
    }
    let index = chunks.len();
    chunks.push(Chunk::new(document_name, index, content));
}

/// The last `n` characters of `s`.
fn char_tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((byte_idx, _)) => &s[byte_idx..],
        None => s,
    }
}
