//! Error types for the scantex library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScanTexError`] — **Fatal**: the run cannot proceed at all (bad input
//!   file, corrupt PDF, store connection refused, invalid config). Returned
//!   as `Err(ScanTexError)` from the top-level `convert*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (OCR glitch,
//!   transient vision-model error) but all other pages are fine. Stored
//!   inside the per-page result so callers can inspect partial success
//!   rather than losing the whole document to one bad page.
//!
//! Persistence failures are a special case: a failed relational statement is
//! run-fatal (the data is the point of persisting), and a graph write that
//! fails after the relational write succeeded is surfaced as
//! [`StoreError::Divergence`] naming the document so an operator can
//! compensate — the two stores offer no shared transaction.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// All fatal errors returned by the scantex library.
#[derive(Debug, Error)]
pub enum ScanTexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    /// Fatal for the whole run: there is no per-page recovery from a
    /// document pdfium cannot open.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// Tesseract could not be initialised at all (missing language data).
    /// Per-page recognition failures are [`PageError::OcrFailed`] instead.
    #[error("Failed to initialise Tesseract for language '{language}': {detail}\nInstall language data (e.g. apt install tesseract-ocr-eng).")]
    OcrInit { language: String, detail: String },

    // ── Vision-model errors ───────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every page failed after all retries; output would be empty.
    #[error("All {total} pages failed after {retries} retries each.\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── Persistence errors ────────────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The LaTeX template failed to parse or render.
    #[error("LaTeX template error: {0}")]
    Template(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file (LaTeX, page image, fragment).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The overall run continues; the page contributes an empty block list (or,
/// on the vision path, no fragment).
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// OCR failed for the page; its text is treated as empty.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// Vision-model call failed after retries.
    #[error("Page {page}: vision-model call failed after {retries} retries: {detail}")]
    VisionFailed {
        page: usize,
        retries: u8,
        detail: String,
    },
}

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not connect to a backend.
    #[error("Failed to connect to {backend}: {detail}")]
    Connection {
        backend: &'static str,
        detail: String,
    },

    /// A relational statement failed. The statement's effects are rolled
    /// back before this error is surfaced; nothing of it persists.
    #[error("PostgreSQL error: {0}")]
    Postgres(String),

    /// A graph query failed.
    #[error("Neo4j error: {0}")]
    Graph(String),

    /// The relational write succeeded but the graph write did not, so the
    /// two stores now disagree about this document.
    #[error("Store divergence for document {document_id}: relational write committed but graph write failed: {detail}")]
    Divergence { document_id: Uuid, detail: String },

    /// A traversal found a broken or cyclic FOLLOWS chain.
    #[error("Inconsistent block order for page {page_id}: {detail}")]
    BrokenChain { page_id: Uuid, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_pdf_display() {
        let e = ScanTexError::CorruptPdf {
            path: PathBuf::from("/tmp/x.pdf"),
            detail: "bad xref".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/x.pdf"), "got: {msg}");
        assert!(msg.contains("bad xref"));
    }

    #[test]
    fn page_error_is_serialisable() {
        let e = PageError::OcrFailed {
            page: 3,
            detail: "engine crashed".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert!(back.to_string().contains("Page 3"));
    }

    #[test]
    fn divergence_names_the_document() {
        let id = Uuid::new_v4();
        let e = StoreError::Divergence {
            document_id: id,
            detail: "bolt connection reset".into(),
        };
        assert!(e.to_string().contains(&id.to_string()));
    }

    #[test]
    fn store_error_converts_to_fatal() {
        let e: ScanTexError = StoreError::Postgres("duplicate key".into()).into();
        assert!(e.to_string().contains("duplicate key"));
    }
}
