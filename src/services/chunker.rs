//! Fixed-size character windows with overlap.

use crate::error::ConfigError;
use crate::models::{Chunk, ChunkingConfig};

/// Splits text into overlapping windows of `size` characters, advancing by
/// `size - overlap` each step.
///
/// Boundaries are character positions only; no attempt is made to align them
/// with sentences or tokens.
#[derive(Debug, Clone)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Fails when the window would never advance.
    pub fn new(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            size: config.size,
            overlap: config.overlap,
        })
    }

    #[cfg(test)]
    pub fn with_defaults() -> Self {
        Self {
            size: crate::models::DEFAULT_CHUNK_SIZE,
            overlap: crate::models::DEFAULT_CHUNK_OVERLAP,
        }
    }

    fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Chunk `text`, dropping windows that are blank after trimming.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        // Byte offset of every char boundary, including the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total_chars {
            let end = (start + self.size).min(total_chars);
            let window = text[boundaries[start]..boundaries[end]].trim();

            if !window.is_empty() {
                chunks.push(Chunk::new(chunks.len(), window.to_string(), start, end));
            }

            start += self.step();
        }

        chunks
    }

    /// Chunk contents only.
    #[cfg(test)]
    pub fn split(&self, text: &str) -> Vec<String> {
        self.chunk(text).into_iter().map(|c| c.content).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> TextChunker {
        TextChunker::new(&ChunkingConfig::new(size, overlap)).unwrap()
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunks = TextChunker::with_defaults().chunk("Hello, world!");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].position, 0);
    }

    #[test]
    fn test_empty_and_blank_documents() {
        let chunker = TextChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n\t  ").is_empty());
        assert!(chunker.chunk(&" ".repeat(5000)).is_empty());
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            TextChunker::new(&ChunkingConfig::new(200, 200)),
            Err(ConfigError::InvalidChunking { .. })
        ));
        assert!(TextChunker::new(&ChunkingConfig::new(100, 300)).is_err());
        assert!(TextChunker::new(&ChunkingConfig::new(0, 0)).is_err());
        assert!(TextChunker::new(&ChunkingConfig::new(1, 0)).is_ok());
    }

    #[test]
    fn test_windows_match_reference_walk() {
        let text = "Cats are mammals. Dogs are mammals too.";
        let chunks = chunker(20, 5).split(text);

        assert_eq!(
            chunks,
            vec!["Cats are mammals. Do", "s. Dogs are mammals", "mals too."]
        );
    }

    #[test]
    fn test_final_chunk_is_not_padded() {
        let chunks = chunker(4, 1).chunk("abcdefghij");
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();

        assert_eq!(contents, vec!["abcd", "defg", "ghij", "j"]);
        assert_eq!(chunks.last().unwrap().start_offset, 9);
        assert_eq!(chunks.last().unwrap().end_offset, 10);
    }

    #[test]
    fn test_blank_windows_are_skipped_and_positions_stay_dense() {
        let text = format!("alpha{}omega", " ".repeat(30));
        let chunks = chunker(10, 0).chunk(&text);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();

        assert_eq!(contents, vec!["alpha", "omega"]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, i);
        }
    }

    #[test]
    fn test_multibyte_text_splits_on_characters() {
        let text = "مرحبا بالعالم وداعا";
        let chunks = chunker(6, 2).chunk(text);

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].content, "مرحبا");
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 6);
        }
    }

    #[test]
    fn test_every_character_is_covered() {
        let text: String = (0..997)
            .map(|i| if i % 11 == 0 { ' ' } else { (b'a' + (i % 26) as u8) as char })
            .collect();

        for (size, overlap) in [(50, 0), (50, 10), (37, 36), (1, 0), (800, 200)] {
            let chunks = chunker(size, overlap).chunk(&text);
            let mut covered = vec![false; text.chars().count()];
            for chunk in &chunks {
                for flag in &mut covered[chunk.start_offset..chunk.end_offset] {
                    *flag = true;
                }
            }
            for (i, c) in text.chars().enumerate() {
                if !c.is_whitespace() {
                    assert!(covered[i], "char {i} uncovered for ({size}, {overlap})");
                }
            }
        }
    }

    #[test]
    fn test_chunks_reconstruct_non_whitespace_content() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    Pack my box with five dozen liquor jugs.";
        let chunker = chunker(16, 4);
        let chunks = chunker.chunk(text);
        let chars: Vec<char> = text.chars().collect();

        let mut rebuilt = String::new();
        let mut cursor = 0;
        for chunk in &chunks {
            let from = cursor.max(chunk.start_offset);
            rebuilt.extend(&chars[from..chunk.end_offset]);
            cursor = chunk.end_offset;
        }

        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(strip(&rebuilt), strip(text));
    }

    #[test]
    fn test_smaller_step_never_yields_fewer_chunks() {
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        let text = text.trim_end();
        let size = 64;

        let counts: Vec<usize> = (0..size)
            .map(|overlap| chunker(size, overlap).chunk(text).len())
            .collect();

        for pair in counts.windows(2) {
            assert!(pair[1] >= pair[0], "counts not monotonic: {:?}", counts);
        }
    }
}
