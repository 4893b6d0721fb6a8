//! PDF rasterisation: render selected pages to PNG files via pdfium.
//!
//! pdfium wraps a C++ library with thread-local state that is not safe to
//! call from async contexts, so all rendering runs inside
//! `tokio::task::spawn_blocking` on the dedicated blocking pool.
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded and matching the
//! input-size sweet spot for both Tesseract and vision models.

use crate::config::PipelineConfig;
use crate::error::ScanTexError;
use crate::output::DocumentMetadata;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One rasterised page: the PNG bytes plus where they were written.
///
/// The encoded bytes are kept so OCR and the vision path can consume the
/// page without re-reading the file.
pub struct RenderedPage {
    /// 1-based page number in the source document.
    pub number: usize,
    /// Where the PNG landed, e.g. `exported_images/page_0001.png`.
    pub image_path: PathBuf,
    /// Page dimensions in PDF points.
    pub width_pts: f32,
    pub height_pts: f32,
    pub png: Vec<u8>,
}

/// Image filename for a 1-based page number: `page_0001.png`.
pub fn page_image_name(number: usize) -> String {
    format!("page_{number:04}.png")
}

/// Rasterise selected pages and write each as a PNG under `config.images_dir`.
///
/// Pages are returned in ascending page order. An out-of-range index in the
/// selection is a fatal [`ScanTexError::PageOutOfRange`]; a pdfium failure on
/// an in-range page is a fatal [`ScanTexError::RasterisationFailed`].
pub async fn render_pages(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<RenderedPage>, ScanTexError> {
    let path = pdf_path.to_path_buf();
    let images_dir = config.images_dir.clone();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let selection = config.pages.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, &images_dir, dpi, max_pixels, &selection)
    })
    .await
    .map_err(|e| ScanTexError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    images_dir: &Path,
    dpi: u32,
    max_pixels: u32,
    selection: &crate::config::PageSelection,
) -> Result<Vec<RenderedPage>, ScanTexError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ScanTexError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    // Explicit selections that name a page past the end are a caller error,
    // reported before any rendering starts.
    if let crate::config::PageSelection::Single(p) = selection {
        if *p > total_pages {
            return Err(ScanTexError::PageOutOfRange {
                page: *p,
                total: total_pages,
            });
        }
    }
    let indices = selection.to_indices(total_pages);

    std::fs::create_dir_all(images_dir).map_err(|e| ScanTexError::OutputWriteFailed {
        path: images_dir.to_path_buf(),
        source: e,
    })?;

    let mut results = Vec::with_capacity(indices.len());

    for idx in indices {
        let number = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| ScanTexError::RasterisationFailed {
                page: number,
                detail: format!("{:?}", e),
            })?;

        let width_pts = page.width().value;
        let height_pts = page.height().value;

        // PDF points are 1/72 inch; the pixel cap bounds oversized pages.
        let target_width = ((width_pts / 72.0) * dpi as f32).round() as i32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width.clamp(1, max_pixels as i32))
            .set_maximum_height(max_pixels as i32);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ScanTexError::RasterisationFailed {
                    page: number,
                    detail: format!("{:?}", e),
                })?;

        let image = bitmap.as_image();
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| ScanTexError::RasterisationFailed {
                page: number,
                detail: format!("PNG encoding failed: {}", e),
            })?;

        let image_path = images_dir.join(page_image_name(number));
        write_atomic(&image_path, &png)?;

        debug!(
            "Rendered page {} → {}x{} px → {}",
            number,
            image.width(),
            image.height(),
            image_path.display()
        );

        results.push(RenderedPage {
            number,
            image_path,
            width_pts,
            height_pts,
            png,
        });
    }

    if results.is_empty() {
        warn!("Page selection matched no pages (total={})", total_pages);
    }

    Ok(results)
}

/// Write via a temp file in the same directory, then rename. A crash mid-write
/// leaves either the old file or nothing, never a truncated PNG.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScanTexError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| ScanTexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    use std::io::Write;
    tmp.write_all(bytes)
        .map_err(|e| ScanTexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tmp.persist(path)
        .map_err(|e| ScanTexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

/// Extract document metadata from a PDF without rendering pages.
pub async fn extract_metadata(pdf_path: &Path) -> Result<DocumentMetadata, ScanTexError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path))
        .await
        .map_err(|e| ScanTexError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(pdf_path: &Path) -> Result<DocumentMetadata, ScanTexError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ScanTexError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let metadata = document.metadata();
    let pages = document.pages();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: pages.len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_names_are_zero_padded() {
        assert_eq!(page_image_name(1), "page_0001.png");
        assert_eq!(page_image_name(42), "page_0042.png");
        assert_eq!(page_image_name(1234), "page_1234.png");
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_0001.png");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }
}
