//! OCR: recognise page text with Tesseract 5.x via leptess.
//!
//! Tesseract is CPU-bound C++ and its handle is not shareable across
//! threads, so each page gets a fresh engine inside `spawn_blocking`.
//! Initialisation is cheap next to recognition, and a fresh engine per page
//! also means one page's crash cannot poison the next.
//!
//! Failure policy: a page whose recognition fails contributes empty text and
//! a warning, the run continues. Only a failure to initialise the engine at
//! all (missing language data) is fatal, and that is caught up front by
//! [`verify_language`] before any rendering work is spent.

use crate::error::{PageError, ScanTexError};
use leptess::LepTess;
use tracing::{debug, warn};

/// Check that Tesseract can be initialised for the given language(s).
///
/// Called once at pipeline start so a missing traineddata file fails the run
/// before any pages are rasterised.
pub async fn verify_language(language: &str) -> Result<(), ScanTexError> {
    let lang = language.to_string();
    tokio::task::spawn_blocking(move || match LepTess::new(None, &lang) {
        Ok(_) => Ok(()),
        Err(e) => Err(ScanTexError::OcrInit {
            language: lang,
            detail: e.to_string(),
        }),
    })
    .await
    .map_err(|e| ScanTexError::Internal(format!("OCR init task panicked: {}", e)))?
}

/// Recognise the text of one rasterised page.
///
/// Returns the recognised text, or a [`PageError::OcrFailed`] the caller is
/// expected to downgrade to empty text.
pub async fn recognize_page(
    language: &str,
    page_number: usize,
    png: Vec<u8>,
) -> Result<String, PageError> {
    let lang = language.to_string();
    let result = tokio::task::spawn_blocking(move || recognize_blocking(&lang, &png));

    match result.await {
        Ok(Ok(text)) => {
            debug!("Page {}: OCR produced {} chars", page_number, text.len());
            Ok(text)
        }
        Ok(Err(detail)) => {
            warn!("Page {}: OCR failed: {}", page_number, detail);
            Err(PageError::OcrFailed {
                page: page_number,
                detail,
            })
        }
        Err(join_err) => {
            warn!("Page {}: OCR task panicked: {}", page_number, join_err);
            Err(PageError::OcrFailed {
                page: page_number,
                detail: format!("task panicked: {}", join_err),
            })
        }
    }
}

fn recognize_blocking(language: &str, png: &[u8]) -> Result<String, String> {
    let mut engine = LepTess::new(None, language).map_err(|e| e.to_string())?;
    engine.set_image_from_mem(png).map_err(|e| e.to_string())?;
    engine.get_utf8_text().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires the eng traineddata installed; skipped unless present.
    #[tokio::test]
    async fn bad_language_fails_verification() {
        if LepTess::new(None, "eng").is_err() {
            eprintln!("Skipping: tesseract eng data not installed");
            return;
        }
        let err = verify_language("zz_nonexistent").await.unwrap_err();
        assert!(matches!(err, ScanTexError::OcrInit { .. }));
    }
}
