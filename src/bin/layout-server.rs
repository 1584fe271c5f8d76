//! HTTP server binary for layout-service.
//!
//! A thin shim over the library crate that maps CLI flags and `LAYOUT_*`
//! environment variables to `ServiceConfig` and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use layout_service::{serve, Backend, MakeMode, ServiceConfig};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default address (0.0.0.0:8087)
  layout-server

  # Use a local pdfium copy and a dedicated scratch directory
  layout-server --pdfium-lib-path ./pdfium/lib --temp-root /var/tmp/layout

  # Analyse a document
  curl -F file=@paper.pdf 'http://localhost:8087/analyze_layout/?parse_method=auto&lang=en'

  # Only pages 2-4 (0-indexed), forcing OCR
  curl -F file=@scan.png 'http://localhost:8087/analyze_layout/?parse_method=ocr&start_page_id=2&end_page_id=4'

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (OCR only)
  ANTHROPIC_API_KEY       Anthropic API key (OCR only)
  GEMINI_API_KEY          Google Gemini API key (OCR only)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, e.g. layout_service=debug,tower_http=debug

No API key is needed for documents with a text layer (parse_method=txt, or
auto on born-digital PDFs).
"#;

/// Serve document layout analysis over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "layout-server",
    version,
    about = "Serve document layout analysis over HTTP",
    long_about = "Accepts PDF and image uploads on POST /analyze_layout/ and returns the \
composed document tree, the raw layout detections, a flat content list and Markdown as JSON. \
Text is read from the PDF text layer when present and recognised with a vision LLM otherwise.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "LAYOUT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port.
    #[arg(short, long, env = "LAYOUT_PORT", default_value_t = 8087)]
    port: u16,

    /// Service name reported by GET /health.
    #[arg(long, env = "LAYOUT_TITLE")]
    title: Option<String>,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "LAYOUT_MAX_UPLOAD_MB", default_value_t = 200,
          value_parser = clap::value_parser!(u64).range(1..=4096))]
    max_upload_mb: u64,

    /// Parent directory for per-request scratch directories.
    #[arg(long, env = "LAYOUT_TEMP_ROOT")]
    temp_root: Option<PathBuf>,

    /// Disable LaTeX extraction for display formulas (crops them instead).
    #[arg(long, env = "LAYOUT_NO_FORMULA")]
    no_formula: bool,

    /// Disable HTML extraction for tables (crops them instead).
    #[arg(long, env = "LAYOUT_NO_TABLE")]
    no_table: bool,

    /// Markdown flavour: mm_markdown or nlp_markdown.
    #[arg(long, env = "LAYOUT_MD_MODE", default_value = "mm_markdown")]
    md_mode: String,

    /// Directory holding libpdfium. Defaults to the system library.
    #[arg(long, env = "LAYOUT_PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Longest edge of rendered page images in pixels.
    #[arg(long, env = "LAYOUT_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(100..=10000))]
    max_pixels: u32,

    /// Text-layer characters a page needs to skip OCR in auto mode.
    #[arg(long, env = "LAYOUT_MIN_TEXT_CHARS", default_value_t = 50)]
    min_text_chars: usize,

    /// Vision LLM model ID used for OCR.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Number of concurrent VLM calls per document.
    #[arg(short, long, env = "LAYOUT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Max LLM output tokens per page.
    #[arg(long, env = "LAYOUT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "LAYOUT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "LAYOUT_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(0..=20))]
    max_retries: u32,

    /// Path to a text file containing a custom OCR system prompt.
    #[arg(long, env = "LAYOUT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LAYOUT_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).await?;
    info!("Configuration: {:?}", config);

    let backend = Backend::pdfium(&config.analyzer);
    serve(config, backend).await.context("Server failed")?;
    Ok(())
}

async fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let md_mode: MakeMode = cli.md_mode.parse().context("Invalid --md-mode")?;

    let mut builder = ServiceConfig::builder()
        .host(&cli.host)
        .port(cli.port)
        .max_upload_bytes((cli.max_upload_mb * 1024 * 1024) as usize)
        .formula_enable(!cli.no_formula)
        .table_enable(!cli.no_table)
        .make_md_mode(md_mode)
        .max_rendered_pixels(cli.max_pixels)
        .min_text_chars_per_page(cli.min_text_chars)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries);

    if let Some(ref title) = cli.title {
        builder = builder.title(title);
    }
    if let Some(ref dir) = cli.temp_root {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create temp root {}", dir.display()))?;
        builder = builder.temp_root(dir);
    }
    if let Some(ref dir) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref prompt_path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(prompt_path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", prompt_path.display()))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
