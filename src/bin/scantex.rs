//! CLI binary for scantex.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scantex::{
    convert, convert_to_file, convert_vision, convert_vision_to_file, inspect, PageSelection,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, StoreConfig,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
/// Pages are processed sequentially, so a single start-time slot suffices.
struct CliProgressCallback {
    bar: ProgressBar,
    page_start: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose bar length is set by `on_run_start`.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_start: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        *self.page_start.lock().unwrap() = Some(Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, produced: usize) {
        let elapsed_ms = self
            .page_start
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{produced:>5} items")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed_ms = self
            .page_start
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = truncate_message(error, 80);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

/// Cap a one-line message at `max` characters, ellipsised. Counts chars,
/// not bytes, so multibyte provider errors cannot split a code point.
fn truncate_message(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let mut out: String = message.chars().take(max.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR pipeline, output to file
  scantex scan.pdf output.tex

  # Output to stdout
  scantex scan.pdf

  # Specific pages with a custom heading marker
  scantex --pages 3-15 --marker '*' scan.pdf out.tex

  # Vision-model path (needs an API key)
  scantex --vision scan.pdf out.tex

  # Vision path with the corrective second pass
  scantex --vision --double-check scan.pdf out.tex

  # Convert from URL, skip the stores
  scantex --no-persist https://example.org/scan.pdf out.tex

  # Inspect PDF metadata (no OCR, stores, or API key needed)
  scantex --inspect-only scan.pdf

  # JSON result on stdout
  scantex --json scan.pdf > result.json

ENVIRONMENT VARIABLES:
  PG_CONN_STR             PostgreSQL connection string (enables persistence)
  NEO4J_URI               Neo4j bolt endpoint (enables persistence)
  NEO4J_USERNAME          Neo4j username (default: neo4j)
  NEO4J_PASSWORD          Neo4j password
  GEMINI_API_KEY          Google Gemini API key (vision path)
  OPENAI_API_KEY          OpenAI API key (vision path)
  ANTHROPIC_API_KEY       Anthropic API key (vision path)
  EDGEQUAKE_LLM_PROVIDER  Override vision provider
  EDGEQUAKE_MODEL         Override vision model ID

SETUP:
  The OCR path needs Tesseract language data (e.g. apt install
  tesseract-ocr-eng) and a pdfium shared library on the loader path.
  Persistence is enabled automatically when PG_CONN_STR and NEO4J_URI are
  both set; --no-persist overrides that.
"#;

/// Convert scanned PDF documents to LaTeX.
#[derive(Parser, Debug)]
#[command(
    name = "scantex",
    version,
    about = "Convert scanned PDF documents to LaTeX",
    long_about = "Convert scanned PDF documents (local files or URLs) to LaTeX. The default \
path rasterises pages, OCRs them with Tesseract, analyses the text into typed blocks, \
optionally persists the structure to PostgreSQL and Neo4j, and renders LaTeX from a \
template. The --vision path sends page images to a multimodal model instead.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output LaTeX file. Writes to stdout when omitted.
    output: Option<PathBuf>,

    /// Use the vision-model path instead of OCR + structure analysis.
    #[arg(long, env = "SCANTEX_VISION")]
    vision: bool,

    /// Vision path: re-send each page with the first result for review.
    #[arg(long, env = "SCANTEX_DOUBLE_CHECK")]
    double_check: bool,

    /// Heading marker character recognised in OCR text.
    #[arg(long, env = "SCANTEX_MARKER", default_value_t = '#')]
    marker: char,

    /// Tesseract language codes, e.g. eng or eng+fra.
    #[arg(long, env = "SCANTEX_LANG", default_value = "eng")]
    lang: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "SCANTEX_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "SCANTEX_PAGES", default_value = "all")]
    pages: String,

    /// Directory for exported page images.
    #[arg(long, env = "SCANTEX_IMAGES_DIR", default_value = "exported_images")]
    images_dir: PathBuf,

    /// Directory for per-page LaTeX fragments (vision path).
    #[arg(long, env = "SCANTEX_FRAGMENTS_DIR", default_value = "rendered_latex")]
    fragments_dir: PathBuf,

    /// Skip the persistence stores even when PG_CONN_STR/NEO4J_URI are set.
    #[arg(long, env = "SCANTEX_NO_PERSIST")]
    no_persist: bool,

    /// Custom Tera document template (.tex) for the structured path.
    #[arg(long, env = "SCANTEX_TEMPLATE")]
    template: Option<PathBuf>,

    /// Vision model ID (e.g. gemini-2.0-flash, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max model output tokens per page (vision path).
    #[arg(long, env = "SCANTEX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (vision path).
    #[arg(long, env = "SCANTEX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on a model failure (vision path).
    #[arg(long, env = "SCANTEX_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Disable the courtesy delay between model calls (vision path).
    #[arg(long, env = "SCANTEX_NO_DELAY")]
    no_delay: bool,

    /// Output structured JSON instead of LaTeX.
    #[arg(long, env = "SCANTEX_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "SCANTEX_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCANTEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCANTEX_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SCANTEX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs when the progress bar is active; the
    // bar provides the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input).await.context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    if cli.vision {
        run_vision(&cli, &config).await
    } else {
        run_structured(&cli, &config).await
    }
}

async fn run_structured(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    if let Some(ref output_path) = cli.output {
        let output = convert_to_file(&cli.input, output_path, config)
            .await
            .context("Conversion failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {} blocks  {}ms  →  {}",
                if output.stats.pages_failed == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                output.stats.pages_processed,
                output.pages.len(),
                dim(&(output.stats.heading_blocks + output.stats.paragraph_blocks).to_string()),
                output.stats.duration_ms,
                bold(&output_path.display().to_string()),
            );
            if output.stats.persisted {
                eprintln!("   persisted to PostgreSQL + Neo4j");
            }
        }
    } else {
        let output = convert(&cli.input, config)
            .await
            .context("Conversion failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            write_stdout(&output.latex)?;
        }
    }
    Ok(())
}

async fn run_vision(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    if let Some(ref output_path) = cli.output {
        let output = convert_vision_to_file(&cli.input, output_path, config)
            .await
            .context("Vision conversion failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {}ms  →  {}",
                if output.stats.pages_failed == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                output.stats.pages_processed,
                output.pages.len(),
                output.stats.duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&output.stats.prompt_tokens.to_string()),
                dim(&output.stats.completion_tokens.to_string()),
            );
        }
    } else {
        let output = convert_vision(&cli.input, config)
            .await
            .context("Vision conversion failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            write_stdout(&output.latex)?;
        }
    }
    Ok(())
}

fn write_stdout(latex: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(latex.as_bytes())
        .context("Failed to write to stdout")?;
    if !latex.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .marker(cli.marker)
        .ocr_language(cli.lang.clone())
        .pages(pages)
        .images_dir(cli.images_dir.clone())
        .fragments_dir(cli.fragments_dir.clone())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .double_check(cli.double_check)
        .download_timeout_secs(cli.download_timeout);

    if cli.no_delay {
        builder = builder.call_delay_secs(0, 0);
    }
    if let Some(ref path) = cli.template {
        builder = builder.template_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    if !cli.no_persist && !cli.vision {
        if let Some(stores) = StoreConfig::from_env() {
            builder = builder.stores(stores);
        }
    }

    let mut config = builder.build().context("Invalid configuration")?;
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    Ok(config)
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        for &p in &pages {
            if p < 1 {
                anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
            }
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through() {
        assert_eq!(truncate_message("timeout", 80), "timeout");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // A multibyte char straddling the cut must not panic.
        let msg = "é".repeat(100);
        let out = truncate_message(&msg, 80);
        assert_eq!(out.chars().count(), 80);
        assert!(out.ends_with('\u{2026}'));
    }

    #[test]
    fn page_selection_forms() {
        assert!(matches!(parse_pages("all").unwrap(), PageSelection::All));
        assert!(matches!(
            parse_pages("5").unwrap(),
            PageSelection::Single(5)
        ));
        assert!(matches!(
            parse_pages("3-15").unwrap(),
            PageSelection::Range(3, 15)
        ));
        assert!(matches!(parse_pages("1,3,5").unwrap(), PageSelection::Set(_)));
        assert!(parse_pages("15-3").is_err());
        assert!(parse_pages("0").is_err());
    }
}
