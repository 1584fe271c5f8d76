//! # layout-service
//!
//! An HTTP service that runs document layout analysis on uploaded PDFs and
//! images and answers with a structured document tree, the raw detections,
//! a flat content list and Markdown.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /analyze_layout/ (multipart "file")
//!  │
//!  ├─ 1. Validate   extension check, nothing written yet        → 400 / 422
//!  ├─ 2. Persist    upload lands in a per-request scratch dir
//!  ├─ 3. Read       PDF kept as is, images wrapped in a 1-page PDF
//!  ├─ 4. Trim       keep pages start_page_id..=end_page_id
//!  ├─ 5. Analyze    pdfium text layer, or VLM OCR on rendered pages
//!  ├─ 6. Compose    detections → middle_json, figure/table crops to disk
//!  ├─ 7. Render     markdown + content list
//!  └─ 8. Respond    JSON; the scratch dir is removed on every path → 200 / 500
//! ```
//!
//! The reader and the analyzer are trait objects ([`DocumentReader`],
//! [`LayoutAnalyzer`]) so the server can be driven by any backend. The
//! default one, [`Backend::pdfium`], needs the pdfium shared library and, for
//! scanned pages only, a vision LLM API key.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layout_service::{serve, Backend, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OCR provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ServiceConfig::builder().port(8087).build()?;
//!     let backend = Backend::pdfium(&config.analyzer);
//!     serve(config, backend).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `layout-server` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another axum application:
//! ```toml
//! layout-service = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod layout;
pub mod middle;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod upload;
pub mod writer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AnalyzerConfig, MakeMode, PageRange, ParseMethod, ParseOptions, ServiceConfig,
    ServiceConfigBuilder,
};
pub use error::LayoutError;
pub use layout::{
    AnalyzeBatch, Bbox, BlockCategory, DocumentAnalysis, LayoutDet, NormalizedDocument,
    PageImage, PageInference, PageInfo,
};
pub use middle::{ContentItem, MiddleJson, PageLayout};
pub use output::{AnalysisResult, AnalyzeResponse};
pub use pipeline::parse::parse_document;
pub use pipeline::{Backend, DocumentReader, LayoutAnalyzer};
pub use server::{router, serve, AppState};
