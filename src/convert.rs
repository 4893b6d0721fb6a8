//! Conversion entry points.
//!
//! Two independent paths share the input and rasterisation stages:
//!
//! * [`convert`] — the structured path: OCR each page, analyse the text into
//!   blocks, optionally persist the tree to both stores, render LaTeX from
//!   the blocks.
//! * [`convert_vision`] — the vision path: send each page image to a
//!   multimodal model and combine the returned fragments. No OCR, no
//!   analysis, no persistence.
//!
//! Both paths process pages strictly one at a time; a page's failure is
//! recorded and the run moves on.

use crate::config::PipelineConfig;
use crate::error::{PageError, ScanTexError};
use crate::model::Document;
use crate::output::{
    DocumentMetadata, PageLatex, PageOutcome, RunOutput, RunStats, VisionRunOutput, VisionStats,
};
use crate::pipeline::{analyze::StructureAnalyzer, input, ocr, raster};
use crate::prompts;
use crate::render::DocumentRenderer;
use crate::store::PersistenceGateway;
use crate::vision;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a scanned PDF (path or URL) to LaTeX via OCR and structure
/// analysis.
///
/// This is the primary entry point for the library. Page-local failures do
/// not abort the run: a page whose OCR fails appears in the result with an
/// empty block list and its error recorded in `pages`.
///
/// # Errors
/// Returns `Err(ScanTexError)` only for run-fatal conditions: unreadable or
/// corrupt input, missing OCR language data, a store connection or write
/// failure, a broken template, or an out-of-range page selection.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, ScanTexError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    // Fail on missing traineddata before spending any rendering work.
    ocr::verify_language(&config.ocr_language).await?;

    let metadata = raster::extract_metadata(&pdf_path).await?;
    info!("PDF has {} pages", metadata.page_count);

    let rendered = raster::render_pages(&pdf_path, config).await?;
    let total_selected = rendered.len();
    config.progress.on_run_start(total_selected);

    let mut document = Document::new(&pdf_path);
    let analyzer = StructureAnalyzer::new(config.marker);
    let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total_selected);

    for page_image in &rendered {
        let number = page_image.number;
        config.progress.on_page_start(number, total_selected);

        let mut page = crate::model::Page::new(document.id, number);
        page.width = Some(page_image.width_pts);
        page.height = Some(page_image.height_pts);

        let (text, page_error) =
            match ocr::recognize_page(&config.ocr_language, number, page_image.png.clone()).await {
                Ok(text) => (text, None),
                // Tolerated: the page contributes no text and no blocks.
                Err(e) => (String::new(), Some(e)),
            };

        let kinds = analyzer.analyze(&text);
        page.set_blocks(kinds);

        let outcome = PageOutcome {
            number,
            image_path: page_image.image_path.clone(),
            text_chars: text.chars().count(),
            blocks: page.blocks.len(),
            error: page_error,
        };
        match &outcome.error {
            None => config
                .progress
                .on_page_complete(number, total_selected, outcome.blocks),
            Some(e) => config
                .progress
                .on_page_error(number, total_selected, &e.to_string()),
        }
        debug!(
            "Page {}: {} chars of text, {} blocks",
            number, outcome.text_chars, outcome.blocks
        );

        outcomes.push(outcome);
        document.pages.push(page);
    }

    let persisted = match &config.stores {
        Some(store_config) => {
            let gateway = PersistenceGateway::connect(store_config).await?;
            // Close on both exit paths; the first error wins.
            let result = gateway.persist(&document).await;
            let close_result = gateway.close().await;
            result?;
            close_result?;
            true
        }
        None => false,
    };

    let renderer = match &config.template_path {
        Some(path) => DocumentRenderer::from_template_file(path)?,
        None => DocumentRenderer::new()?,
    };
    let latex = renderer.render_document(&document, metadata.title.as_deref())?;

    let succeeded = outcomes.iter().filter(|o| o.error.is_none()).count();
    let stats = RunStats {
        pages_processed: succeeded,
        pages_failed: outcomes.len() - succeeded,
        heading_blocks: document
            .pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter(|b| b.kind.type_tag() == "heading")
            .count(),
        paragraph_blocks: document
            .pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter(|b| b.kind.type_tag() == "paragraph")
            .count(),
        persisted,
        duration_ms: total_start.elapsed().as_millis() as u64,
    };

    config.progress.on_run_complete(total_selected, succeeded);
    info!(
        "Conversion complete: {}/{} pages, {} blocks, {}ms",
        succeeded,
        total_selected,
        stats.heading_blocks + stats.paragraph_blocks,
        stats.duration_ms
    );

    Ok(RunOutput {
        document,
        latex,
        metadata,
        pages: outcomes,
        stats,
    })
}

/// Convert and write the LaTeX source to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RunOutput, ScanTexError> {
    let output = convert(input_str, config).await?;
    write_output_atomic(output_path.as_ref(), output.latex.as_bytes()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, ScanTexError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanTexError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Extract PDF metadata without converting content.
///
/// Requires neither Tesseract, stores, nor a model provider.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, ScanTexError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    raster::extract_metadata(resolved.path()).await
}

/// Convert a scanned PDF to LaTeX via the vision-model path.
///
/// Each page image is sent to the model with the conversion contract as the
/// prompt; the returned fragments are written under `config.fragments_dir`
/// and combined into one preamble-wrapped document. Failed pages are skipped
/// in the combined output. Only when every page fails is the run an error.
pub async fn convert_vision(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<VisionRunOutput, ScanTexError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting vision conversion: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    let provider = resolve_provider(config)?;
    let metadata = raster::extract_metadata(&pdf_path).await?;
    let rendered = raster::render_pages(&pdf_path, config).await?;
    let total_selected = rendered.len();
    config.progress.on_run_start(total_selected);

    tokio::fs::create_dir_all(&config.fragments_dir)
        .await
        .map_err(|e| ScanTexError::OutputWriteFailed {
            path: config.fragments_dir.clone(),
            source: e,
        })?;

    let mut pages: Vec<PageLatex> = Vec::with_capacity(total_selected);

    for (i, page_image) in rendered.iter().enumerate() {
        let number = page_image.number;
        if i > 0 {
            // Pace calls to the external API; politeness, not backpressure.
            vision::courtesy_delay(config.call_delay_secs).await;
        }
        config.progress.on_page_start(number, total_selected);

        let mut result = vision::transcribe_page(
            &provider,
            number,
            page_image.image_path.clone(),
            &page_image.png,
            config,
        )
        .await;

        if let Some(latex) = &result.latex {
            let fragment_path = config.fragments_dir.join(vision::page_fragment_name(number));
            write_output_atomic(&fragment_path, latex.as_bytes()).await?;
            result.fragment_path = Some(fragment_path);
            config
                .progress
                .on_page_complete(number, total_selected, latex.len());
        } else if let Some(e) = &result.error {
            config
                .progress
                .on_page_error(number, total_selected, &e.to_string());
        }

        pages.push(result);
    }

    let succeeded = pages.iter().filter(|p| p.error.is_none()).count();
    if succeeded == 0 && !pages.is_empty() {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(PageError::to_string)
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(ScanTexError::AllPagesFailed {
            total: pages.len(),
            retries: config.max_retries,
            first_error,
        });
    }

    let body = vision::combine_fragments(&pages);
    let latex = prompts::wrap_document(&body, metadata.title.as_deref());

    let stats = VisionStats {
        pages_processed: succeeded,
        pages_failed: pages.len() - succeeded,
        prompt_tokens: pages.iter().map(|p| p.prompt_tokens).sum(),
        completion_tokens: pages.iter().map(|p| p.completion_tokens).sum(),
        duration_ms: total_start.elapsed().as_millis() as u64,
    };

    config.progress.on_run_complete(total_selected, succeeded);
    info!(
        "Vision conversion complete: {}/{} pages, {} output tokens, {}ms",
        succeeded, total_selected, stats.completion_tokens, stats.duration_ms
    );

    Ok(VisionRunOutput {
        latex,
        metadata,
        pages,
        stats,
    })
}

/// Vision-path conversion writing the combined document to a file.
pub async fn convert_vision_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<VisionRunOutput, ScanTexError> {
    let output = convert_vision(input_str, config).await?;
    write_output_atomic(output_path.as_ref(), output.latex.as_bytes()).await?;
    Ok(output)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Atomic write: temp file in the target directory, then rename.
async fn write_output_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScanTexError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScanTexError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| ScanTexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ScanTexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ScanTexError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScanTexError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the model provider, from most-specific to least-specific:
///
/// 1. A pre-built provider on the config, used as-is.
/// 2. A named provider (`config.provider_name`) plus optional model; the
///    factory reads the matching API key from the environment.
/// 3. The `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` pair, honoured before
///    auto-detection so an environment-level choice wins over key scanning.
/// 4. `GEMINI_API_KEY` when present (the conversion prompt was tuned against
///    Gemini-class models), then full auto-detection across all known keys.
fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, ScanTexError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(gemini_key) = std::env::var("GEMINI_API_KEY") {
        if !gemini_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScanTexError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No model provider could be auto-detected from the environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

const DEFAULT_VISION_MODEL: &str = "gemini-2.0-flash";

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_output_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.tex");
        write_output_atomic(&path, b"\\documentclass{article}")
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\\documentclass{article}"
        );
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let config = PipelineConfig::default();
        let err = convert("/no/such/scan.pdf", &config).await.unwrap_err();
        assert!(matches!(err, ScanTexError::FileNotFound { .. }));
    }
}
