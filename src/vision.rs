//! Vision-model path: send page images straight to a multimodal model.
//!
//! This path bypasses OCR, structure analysis and persistence entirely; the
//! whole behavioural contract lives in the prompt (see [`crate::prompts`])
//! and the model is treated as an opaque `image -> LaTeX | absent` function.
//! The module stays thin: message assembly, retry, and the optional
//! corrective second pass. Anything about what the LaTeX should look like
//! belongs in the prompt text, not here.
//!
//! ## Retry strategy
//!
//! HTTP 429 / 503 errors from model APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) keeps retries cheap: with 500 ms base
//! and 3 retries the wait sequence is 500 ms → 1 s → 2 s.

use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::output::PageLatex;
use crate::prompts::{review_prompt, DEFAULT_CONVERSION_PROMPT};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Fragment filename for a 1-based page number, matching the image naming:
/// `page_0001.tex`.
pub fn page_fragment_name(number: usize) -> String {
    format!("page_{number:04}.tex")
}

/// Wrap already-encoded PNG bytes for the model API.
///
/// PNG is lossless, so rendered text stays crisp; `detail: "high"` makes
/// tiling models spend their full token budget on the image, without it
/// fine print and small tables are lost.
pub fn encode_page(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

/// Transcribe one page image to a LaTeX fragment.
///
/// Always returns a [`PageLatex`], never propagates the error upward, so a
/// single bad page doesn't abort the document. Callers check `error` to
/// decide whether the page contributed a fragment.
///
/// With `double_check` enabled, a second call re-sends the same image with
/// the first pass's output attached for review, and the reviewed result
/// replaces the original. A second-pass failure keeps the first result
/// with a warning; it never degrades a page that already succeeded.
pub async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image_path: PathBuf,
    png: &[u8],
    config: &PipelineConfig,
) -> PageLatex {
    let conversion_prompt = config
        .vision_prompt
        .as_deref()
        .unwrap_or(DEFAULT_CONVERSION_PROMPT);
    let image = encode_page(png);

    let first = call_model(provider, page_num, conversion_prompt, image.clone(), config).await;

    let (latex, prompt_tokens, completion_tokens) = match first {
        Ok(response) => response,
        Err(detail) => {
            return PageLatex {
                number: page_num,
                image_path,
                fragment_path: None,
                latex: None,
                error: Some(PageError::VisionFailed {
                    page: page_num,
                    retries: config.max_retries as u8,
                    detail,
                }),
                prompt_tokens: 0,
                completion_tokens: 0,
            }
        }
    };

    let (latex, prompt_tokens, completion_tokens) = if config.double_check {
        info!("Page {}: corrective second pass", page_num);
        let prompt = review_prompt(conversion_prompt, &latex);
        match call_model(provider, page_num, &prompt, image, config).await {
            Ok((reviewed, pt, ct)) => (reviewed, prompt_tokens + pt, completion_tokens + ct),
            Err(detail) => {
                warn!(
                    "Page {}: second pass failed, keeping first result: {}",
                    page_num, detail
                );
                (latex, prompt_tokens, completion_tokens)
            }
        }
    } else {
        (latex, prompt_tokens, completion_tokens)
    };

    PageLatex {
        number: page_num,
        image_path,
        fragment_path: None,
        latex: Some(strip_code_fences(&latex)),
        error: None,
        prompt_tokens,
        completion_tokens,
    }
}

/// One model call with retries. Returns (content, prompt_tokens, completion_tokens).
async fn call_model(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    prompt: &str,
    image: ImageData,
    config: &PipelineConfig,
) -> Result<(String, usize, usize), String> {
    // The empty user text is intentional: model APIs require at least one
    // user turn to respond to, but the image carries all the content.
    let messages = vec![
        ChatMessage::system(prompt),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    };

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens",
                    page_num, response.prompt_tokens, response.completion_tokens
                );
                return Ok((
                    response.content,
                    response.prompt_tokens,
                    response.completion_tokens,
                ));
            }
            Err(e) => {
                let err_msg = format!("{}", e);
                warn!(
                    "Page {}: attempt {} failed: {}",
                    page_num,
                    attempt + 1,
                    err_msg
                );
                last_err = Some(err_msg);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| "Unknown error".to_string()))
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:latex|tex)?\s*\n(.*?)\n?```\s*$").unwrap());

/// Models occasionally wrap output in ```latex fences despite the prompt.
pub fn strip_code_fences(latex: &str) -> String {
    let trimmed = latex.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Combine per-page fragments into one document body, in page order.
///
/// Failed pages contribute nothing; their absence is already logged and
/// recorded in the page results.
pub fn combine_fragments(pages: &[PageLatex]) -> String {
    pages
        .iter()
        .filter_map(|p| p.latex.as_deref())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Sleep a random number of seconds in the configured inclusive range.
///
/// Courtesy pacing between consecutive model calls; (0, 0) disables it.
pub async fn courtesy_delay(range: (u64, u64)) {
    let (min, max) = range;
    if max == 0 {
        return;
    }
    let secs = rand::rng().random_range(min..=max);
    debug!("Courtesy delay: {}s", secs);
    sleep(Duration::from_secs(secs)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_names_match_image_names() {
        assert_eq!(page_fragment_name(1), "page_0001.tex");
        assert_eq!(page_fragment_name(217), "page_0217.tex");
    }

    #[test]
    fn encode_produces_valid_base64() {
        let data = encode_page(b"\x89PNG\r\n\x1a\nfake");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(
            strip_code_fences("```latex\n\\section*{A}\n```"),
            "\\section*{A}"
        );
        assert_eq!(strip_code_fences("\\section*{A}"), "\\section*{A}");
        assert_eq!(strip_code_fences("```\nx\n```"), "x");
    }

    #[test]
    fn combine_skips_failed_pages() {
        let ok = |n: usize, tex: &str| PageLatex {
            number: n,
            image_path: PathBuf::from(format!("exported_images/page_{n:04}.png")),
            fragment_path: None,
            latex: Some(tex.to_string()),
            error: None,
            prompt_tokens: 0,
            completion_tokens: 0,
        };
        let mut failed = ok(2, "");
        failed.latex = None;
        failed.error = Some(PageError::VisionFailed {
            page: 2,
            retries: 3,
            detail: "timeout".into(),
        });

        let combined = combine_fragments(&[ok(1, "first"), failed, ok(3, "third")]);
        assert_eq!(combined, "first\n\nthird");
    }
}
