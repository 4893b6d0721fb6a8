//! Configuration types for the scantex pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs, serialise them for logging, and diff two runs
//! to understand why their outputs differ.
//!
//! Store credentials live in a separate [`StoreConfig`] that is read from
//! the environment exactly once, in [`StoreConfig::from_env`], and then
//! passed to the gateway explicitly — no component reaches into the process
//! environment at call time.

use crate::error::ScanTexError;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a scan-to-LaTeX pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use scantex::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(150)
///     .marker('#')
///     .ocr_language("eng")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    ///
    /// 150 DPI keeps text sharp enough for Tesseract while image files stay
    /// small. Increase to 200–300 for small-font documents.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// A safety cap independent of DPI so an oversized page cannot exhaust
    /// memory; the other dimension scales proportionally.
    pub max_rendered_pixels: u32,

    /// Heading marker character recognised by the structure analyzer. Default: `#`.
    ///
    /// A line starting with a run of this character followed by whitespace is
    /// a heading; the run length is the heading level.
    pub marker: char,

    /// Tesseract language codes, e.g. "eng" or "eng+fra". Default: "eng".
    pub ocr_language: String,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Directory for exported page images (`page_0001.png`, …).
    /// Created if absent. Default: `exported_images`.
    pub images_dir: PathBuf,

    /// Directory for per-page LaTeX fragments on the vision path
    /// (`page_0001.tex`, …). Created if absent. Default: `rendered_latex`.
    pub fragments_dir: PathBuf,

    /// Path to a custom Tera document template. If None, the built-in
    /// template is used.
    pub template_path: Option<PathBuf>,

    /// Store credentials. None disables persistence entirely.
    pub stores: Option<StoreConfig>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    // ── Vision path ───────────────────────────────────────────────────────
    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-nano".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, the provider is auto-detected from
    /// API-key environment variables.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for vision-model transcription. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what is on the page,
    /// which is exactly what transcription wants.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient vision-model failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Corrective second pass: re-send the page with the first pass's LaTeX
    /// attached for review. Doubles cost and latency. Default: false.
    pub double_check: bool,

    /// Inclusive range of the randomized courtesy delay between consecutive
    /// vision-model calls, in seconds. Default: (3, 6).
    ///
    /// This is politeness toward the external API, not backpressure; set
    /// (0, 0) to disable.
    pub call_delay_secs: (u64, u64),

    /// Custom conversion prompt. If None, uses the built-in contract from
    /// [`crate::prompts`].
    pub vision_prompt: Option<String>,

    /// Per-page progress events. Defaults to a no-op.
    pub progress: ProgressCallback,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            marker: '#',
            ocr_language: "eng".to_string(),
            pages: PageSelection::default(),
            images_dir: PathBuf::from("exported_images"),
            fragments_dir: PathBuf::from("rendered_latex"),
            template_path: None,
            stores: None,
            download_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            double_check: false,
            call_delay_secs: (3, 6),
            vision_prompt: None,
            progress: Arc::new(NoopProgressCallback),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("marker", &self.marker)
            .field("ocr_language", &self.ocr_language)
            .field("pages", &self.pages)
            .field("images_dir", &self.images_dir)
            .field("fragments_dir", &self.fragments_dir)
            .field("stores", &self.stores.as_ref().map(|_| "<StoreConfig>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("double_check", &self.double_check)
            .field("call_delay_secs", &self.call_delay_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn marker(mut self, marker: char) -> Self {
        self.config.marker = marker;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    pub fn fragments_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.fragments_dir = dir.into();
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = Some(path.into());
        self
    }

    pub fn stores(mut self, stores: StoreConfig) -> Self {
        self.config.stores = Some(stores);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn double_check(mut self, v: bool) -> Self {
        self.config.double_check = v;
        self
    }

    pub fn call_delay_secs(mut self, min: u64, max: u64) -> Self {
        self.config.call_delay_secs = (min, max);
        self
    }

    pub fn vision_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.vision_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress = callback;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ScanTexError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ScanTexError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.marker.is_whitespace() {
            return Err(ScanTexError::InvalidConfig(
                "Heading marker must not be whitespace".into(),
            ));
        }
        if c.ocr_language.is_empty() {
            return Err(ScanTexError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.call_delay_secs.0 > c.call_delay_secs.1 {
            return Err(ScanTexError::InvalidConfig(format!(
                "Call delay range is inverted: {}..{}",
                c.call_delay_secs.0, c.call_delay_secs.1
            )));
        }
        Ok(self.config)
    }
}

/// Connection settings for the two persistence backends.
///
/// One relational store (PostgreSQL) for structured queries, one graph
/// store (Neo4j) for CONTAINS/FOLLOWS traversal. Both are required when
/// persistence is enabled — the gateway writes every fact to both.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// libpq-style connection string, e.g. `host=localhost user=postgres dbname=scantex`.
    pub pg_conn_str: String,
    /// Bolt endpoint, e.g. `bolt://localhost:7687`.
    pub neo4j_uri: String,
    pub neo4j_username: String,
    pub neo4j_password: String,
}

impl StoreConfig {
    /// Read store settings from the environment.
    ///
    /// Returns None when `PG_CONN_STR` or `NEO4J_URI` is unset, which the
    /// driver treats as "persistence disabled". Username defaults to
    /// `neo4j`, password to empty.
    pub fn from_env() -> Option<Self> {
        let pg_conn_str = std::env::var("PG_CONN_STR").ok()?;
        let neo4j_uri = std::env::var("NEO4J_URI").ok()?;
        Some(Self {
            pg_conn_str,
            neo4j_uri,
            neo4j_username: std::env::var("NEO4J_USERNAME")
                .unwrap_or_else(|_| "neo4j".to_string()),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or_default(),
        })
    }
}

impl fmt::Debug for StoreConfig {
    // Credentials stay out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("neo4j_uri", &self.neo4j_uri)
            .field("neo4j_username", &self.neo4j_username)
            .finish_non_exhaustive()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_valid() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.marker, '#');
        assert_eq!(config.ocr_language, "eng");
        assert!(config.stores.is_none());
    }

    #[test]
    fn whitespace_marker_rejected() {
        let err = PipelineConfig::builder().marker(' ').build();
        assert!(err.is_err());
    }

    #[test]
    fn inverted_delay_range_rejected() {
        let err = PipelineConfig::builder().call_delay_secs(6, 3).build();
        assert!(err.is_err());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2] // deduplicated and sorted
        );
    }

    #[test]
    fn store_config_debug_hides_credentials() {
        let cfg = StoreConfig {
            pg_conn_str: "host=localhost password=hunter2".into(),
            neo4j_uri: "bolt://localhost:7687".into(),
            neo4j_username: "neo4j".into(),
            neo4j_password: "hunter2".into(),
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("bolt://localhost:7687"));
    }
}
