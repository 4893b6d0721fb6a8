//! Result types returned by the conversion entry points.

use crate::error::PageError;
use crate::model::Document;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// PDF document metadata, extracted without rendering pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// What happened to one page on the structured path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-based page number.
    pub number: usize,
    /// Where the rasterised image was written.
    pub image_path: PathBuf,
    /// Characters of text OCR produced (0 when OCR failed).
    pub text_chars: usize,
    /// Blocks the analyzer emitted.
    pub blocks: usize,
    /// The page-local failure, if any. The page still appears in the
    /// document with an empty block list.
    pub error: Option<PageError>,
}

/// Aggregate statistics for a structured-path run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub heading_blocks: usize,
    pub paragraph_blocks: usize,
    pub persisted: bool,
    pub duration_ms: u64,
}

/// Full result of a structured-path conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// The structural tree as analysed (and persisted, when enabled).
    pub document: Document,
    /// The rendered LaTeX source.
    pub latex: String,
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageOutcome>,
    pub stats: RunStats,
}

/// One page's result on the vision-model path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLatex {
    /// 1-based page number.
    pub number: usize,
    pub image_path: PathBuf,
    /// Where the fragment was written, when the call succeeded.
    pub fragment_path: Option<PathBuf>,
    /// The LaTeX fragment, absent when the page failed.
    pub latex: Option<String>,
    pub error: Option<PageError>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Aggregate statistics for a vision-path run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionStats {
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub duration_ms: u64,
}

/// Full result of a vision-path conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionRunOutput {
    /// The combined, preamble-wrapped document.
    pub latex: String,
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageLatex>,
    pub stats: VisionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_output_serialises() {
        let output = RunOutput {
            document: Document::new("x.pdf"),
            latex: "\\documentclass{article}".into(),
            metadata: DocumentMetadata::default(),
            pages: vec![],
            stats: RunStats::default(),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("x.pdf"));
    }
}
