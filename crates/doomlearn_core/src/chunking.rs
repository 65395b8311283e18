//! crates/doomlearn_core/src/chunking.rs
//!
//! Fixed-window text chunking.
//!
//! Splits extracted text into bounded, overlapping segments for embedding and
//! retrieval. Windows are measured in characters, not bytes.

/// Window sizes for the chunker, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub target_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: 900,
            overlap_chars: 120,
        }
    }
}

impl ChunkingConfig {
    pub fn new(target_chars: usize, overlap_chars: usize) -> Self {
        Self {
            target_chars,
            overlap_chars,
        }
    }

    fn window(&self) -> usize {
        self.target_chars.max(1)
    }

    /// How far each window start moves. Always at least one character, so the
    /// chunker terminates even when `overlap >= target`.
    fn stride(&self) -> usize {
        self.target_chars
            .saturating_sub(self.overlap_chars)
            .max(1)
    }
}

/// Lazily chunks `text`. The returned iterator is finite and can be cloned to
/// restart from the beginning.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> TextChunks<'_> {
    let text = text.trim();
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());

    TextChunks {
        text,
        offsets,
        start: 0,
        window: config.window(),
        stride: config.stride(),
        done: text.is_empty(),
    }
}

/// Iterator over the non-empty, whitespace-trimmed chunks of a text.
#[derive(Debug, Clone)]
pub struct TextChunks<'a> {
    text: &'a str,
    /// Byte offset of every char, plus the text length as a sentinel.
    offsets: Vec<usize>,
    /// Window start, in chars.
    start: usize,
    window: usize,
    stride: usize,
    done: bool,
}

impl<'a> TextChunks<'a> {
    fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }
}

impl<'a> Iterator for TextChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let len = self.char_len();
            if self.start >= len {
                self.done = true;
                break;
            }

            let end = (self.start + self.window).min(len);
            let piece = self.text[self.offsets[self.start]..self.offsets[end]].trim();

            if end >= len {
                self.done = true;
            } else {
                self.start += self.stride;
            }

            if !piece.is_empty() {
                return Some(piece);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn alphabet_text(len: usize) -> String {
        ('a'..='z').cycle().take(len).collect()
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        assert_eq!(chunk_text("", ChunkingConfig::default()).count(), 0);
        assert_eq!(chunk_text(" \n\t ", ChunkingConfig::default()).count(), 0);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks: Vec<_> = chunk_text("  hello world  ", ChunkingConfig::default()).collect();
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn default_window_over_two_thousand_chars() {
        let text = alphabet_text(2000);
        let chunks: Vec<_> = chunk_text(&text, ChunkingConfig::new(900, 120)).collect();

        let lengths: Vec<_> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![900, 900, 440]);

        // Consecutive chunks share exactly `overlap` chars of boundary context.
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(900 - 120).collect();
            let head: String = pair[1].chars().take(120).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn non_overlap_regions_reconstruct_the_text() {
        let text = alphabet_text(1337);
        let config = ChunkingConfig::new(100, 30);
        let mut chunks = chunk_text(&text, config);

        let mut rebuilt = chunks.next().unwrap().to_string();
        for chunk in chunks {
            rebuilt.extend(chunk.chars().skip(30));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn overlap_not_smaller_than_target_still_terminates() {
        let chunks: Vec<_> = chunk_text("abcdefgh", ChunkingConfig::new(4, 10)).collect();
        assert_eq!(chunks, vec!["abcd", "bcde", "cdef", "defg", "efgh"]);

        let chunks: Vec<_> = chunk_text("abc", ChunkingConfig::new(0, 0)).collect();
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn windows_count_characters_not_bytes() {
        let chunks: Vec<_> = chunk_text("héllo wörld ünïcode", ChunkingConfig::new(6, 0)).collect();
        assert_eq!(chunks, vec!["héllo", "wörld", "ünïcod", "e"]);
    }

    #[test]
    fn whitespace_only_windows_are_skipped() {
        let text = format!("abc{}def", " ".repeat(9));
        let chunks: Vec<_> = chunk_text(&text, ChunkingConfig::new(3, 0)).collect();
        assert_eq!(chunks, vec!["abc", "def"]);
    }

    #[test]
    fn iterator_restarts_when_cloned() {
        let text = alphabet_text(500);
        let chunks = chunk_text(&text, ChunkingConfig::new(120, 20));
        let first: Vec<_> = chunks.clone().collect();
        let second: Vec<_> = chunks.collect();
        assert_eq!(first, second);
    }
}
