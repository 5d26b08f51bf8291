use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A trimmed, non-empty window of a document's extracted text.
///
/// Offsets are character positions of the untrimmed window in the source
/// text, so consecutive chunks overlap by the configured amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub position: usize,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Chunk {
    pub fn new(position: usize, content: String, start_offset: usize, end_offset: usize) -> Self {
        Self {
            position,
            content,
            start_offset,
            end_offset,
        }
    }
}

/// Facts recorded about the ingested file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: Option<String>,
    pub staged_path: Option<PathBuf>,
    pub checksum: Option<String>,
    pub size_bytes: u64,
    pub text_chars: usize,
}

impl DocumentMetadata {
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("<unnamed>")
    }
}
