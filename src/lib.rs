//! # scantex
//!
//! Convert scanned PDF documents to LaTeX.
//!
//! ## Why this crate?
//!
//! Scanned documents carry no text layer, so text-extraction tools get
//! nothing out of them. This crate rasterises each page into a PNG and
//! offers two independent ways forward:
//!
//! * **Structured path** — OCR the page with Tesseract, split the text into
//!   typed blocks (headings, paragraphs), optionally persist the
//!   Document → Page → Block tree to PostgreSQL and Neo4j, then render
//!   LaTeX from the blocks through a Tera template.
//! * **Vision path** — send the raw page image to a multimodal model
//!   (Gemini, OpenAI, Anthropic, Ollama via edgequake-llm) with a strict
//!   LaTeX transcription contract in the prompt, and combine the returned
//!   fragments into one compilable document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Raster    rasterise pages via pdfium → exported_images/page_NNNN.png
//!  │
//!  ├─ structured:                          ├─ vision:
//!  │   3. OCR       Tesseract per page     │   3. Model     one call per page
//!  │   4. Analyze   text → typed blocks    │   4. Fragment  rendered_latex/page_NNNN.tex
//!  │   5. Persist   PostgreSQL + Neo4j     │   5. Combine   fragments + preamble
//!  │   6. Render    blocks → LaTeX         │
//!  └───────────────────────────────────────┴─ Output  .tex + per-page stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scantex::{convert, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Add .stores(StoreConfig::from_env()...) to enable persistence.
//!     let config = PipelineConfig::default();
//!     let output = convert("scan.pdf", &config).await?;
//!     println!("{}", output.latex);
//!     eprintln!(
//!         "{} headings, {} paragraphs across {} pages",
//!         output.stats.heading_blocks,
//!         output.stats.paragraph_blocks,
//!         output.stats.pages_processed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scantex` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scantex = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod store;
pub mod vision;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSelection, PipelineConfig, PipelineConfigBuilder, StoreConfig};
pub use convert::{
    convert, convert_sync, convert_to_file, convert_vision, convert_vision_to_file, inspect,
};
pub use error::{PageError, ScanTexError, StoreError};
pub use model::{Block, BlockKind, BoundingBox, Document, Page};
pub use output::{
    DocumentMetadata, PageLatex, PageOutcome, RunOutput, RunStats, VisionRunOutput, VisionStats,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use render::DocumentRenderer;
pub use store::{PersistenceGateway, StructureStore};
