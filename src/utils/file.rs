//! File utilities for staging and recognizing uploaded documents.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Calculate SHA-256 checksum of raw bytes.
pub fn calculate_checksum(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    hex::encode(hash)
}

/// PDF by extension, or by magic bytes when the extension says nothing.
pub fn is_pdf(path: &Path) -> std::io::Result<bool> {
    if extension(path).as_deref() == Some("pdf") {
        return Ok(true);
    }

    let mut buffer = [0u8; 5];
    let mut file = fs::File::open(path)?;
    let n = file.read(&mut buffer)?;
    Ok(&buffer[..n] == PDF_MAGIC)
}

/// Check if a file is likely a text file.
pub fn is_text_file(path: &Path) -> bool {
    if let Some(ext) = extension(path) {
        if is_binary_extension(&ext) {
            return false;
        }
        if is_text_extension(&ext) {
            return true;
        }
    }

    // Check by reading first bytes
    if let Ok(file) = fs::File::open(path) {
        let mut buffer = [0u8; 512];
        let mut reader = std::io::BufReader::new(file);
        if let Ok(n) = reader.read(&mut buffer) {
            // Null bytes indicate binary content
            return !buffer[..n].contains(&0);
        }
    }

    false
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Check if extension indicates a binary file.
fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "exe"
            | "dll"
            | "so"
            | "dylib"
            | "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "bmp"
            | "webp"
            | "mp3"
            | "mp4"
            | "zip"
            | "tar"
            | "gz"
            | "7z"
            | "pdf"
            | "doc"
            | "docx"
            | "xls"
            | "xlsx"
            | "ppt"
            | "pptx"
            | "db"
            | "sqlite"
            | "bin"
    )
}

/// Check if extension indicates a text file.
fn is_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        "txt" | "md" | "markdown" | "rst" | "adoc" | "org" | "csv" | "tsv" | "json" | "html"
            | "htm" | "xml"
    )
}

/// Sanitize a filename by replacing invalid characters.
///
/// Replaces characters that are not allowed in filenames on common operating
/// systems (Windows, macOS, Linux) with hyphens.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect::<String>()
        .trim_matches(|c| c == '-' || c == '.')
        .to_string()
}

/// Write an upload to `dir` as `<prefix>_<sanitized name>`.
pub fn stage_document(
    dir: &Path,
    prefix: &str,
    filename: Option<&str>,
    content: &[u8],
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let name = filename
        .map(sanitize_filename)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    let path = dir.join(format!("{prefix}_{name}"));

    fs::write(&path, content)?;
    Ok(path)
}
