//! Reading documents from disk.

use anyhow::{Context, Result};
use notewise_context::transcript::extract_transcript_from_json;
use std::path::Path;

/// Load the transcript of a document file.
///
/// `.json` files are treated as editor exports and reduced to the text after
/// the last context separator; anything else is read verbatim.
pub fn read_transcript(path: &Path) -> Result<String> {
    let content = read_text(path)?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return extract_transcript_from_json(&content)
            .with_context(|| format!("Failed to parse editor document {}", path.display()));
    }

    Ok(content)
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Default summary key for a document file: its name without extension.
pub fn default_document_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
