//! Utility modules.

pub mod file;

pub use file::{calculate_checksum, is_pdf, is_text_file, sanitize_filename, stage_document};
