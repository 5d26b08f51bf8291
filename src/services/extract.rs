//! Document-to-text extraction.

use std::path::Path;

use crate::error::ExtractionError;
use crate::utils::file::{is_pdf, is_text_file};

/// Turns a document on disk into plain text.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Extracts PDFs with `pdf-extract` and reads UTF-8 text files as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

impl DocumentExtractor for FileExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        if is_pdf(path)? {
            let bytes = std::fs::read(path)?;
            // The parser panics on some malformed inputs.
            return std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
                .map_err(|_| ExtractionError::Pdf("malformed document".to_string()))?
                .map_err(|e| ExtractionError::Pdf(e.to_string()));
        }

        if is_text_file(path) {
            let bytes = std::fs::read(path)?;
            return String::from_utf8(bytes).map_err(|_| ExtractionError::InvalidUtf8);
        }

        Err(ExtractionError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One page, one Helvetica text run, with a correct xref table.
    pub(crate) fn minimal_pdf(text: &str) -> Vec<u8> {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        let content = format!("BT /F1 12 Tf 72 720 Td ({escaped}) Tj ET");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }

        let xref_offset = pdf.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            tail.push_str(&format!("{offset:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.extend_from_slice(tail.as_bytes());
        pdf
    }

    #[test]
    fn test_extracts_pdf_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("animals.pdf");
        std::fs::write(&path, minimal_pdf("Cats are mammals. Dogs are mammals too.")).unwrap();

        let text = FileExtractor.extract(&path).unwrap();
        assert_eq!(text.trim(), "Cats are mammals. Dogs are mammals too.");
    }

    #[test]
    fn test_pdf_detected_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload");
        std::fs::write(&path, minimal_pdf("Stored without a name.")).unwrap();

        let text = FileExtractor.extract(&path).unwrap();
        assert!(text.contains("Stored without a name."));
    }

    #[test]
    fn test_reads_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Cats are mammals.").unwrap();

        assert_eq!(FileExtractor.extract(&path).unwrap(), "Cats are mammals.");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileExtractor.extract(&dir.path().join("absent.pdf"));
        assert!(matches!(result, Err(ExtractionError::Io(_))));
    }

    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.7\nthis is not really a pdf").unwrap();

        assert!(matches!(
            FileExtractor.extract(&path),
            Err(ExtractionError::Pdf(_))
        ));
    }

    #[test]
    fn test_binary_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G', 0, 0, 0]).unwrap();

        assert!(matches!(
            FileExtractor.extract(&path),
            Err(ExtractionError::UnsupportedFormat(ext)) if ext == "png"
        ));
    }
}
