//! Pipeline stages behind the HTTP handler.
//!
//! The handler only talks to two trait objects, [`DocumentReader`] and
//! [`LayoutAnalyzer`], bundled in a [`Backend`]. Composition and rendering
//! are deterministic and live here as plain functions.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ reader ──▶ trim ──▶ analyze ──▶ compose ──▶ markdown ──▶ content list
//! (path)    (pdfium)  (pdfium)  (text/VLM)  (middle)    (mkcontent)   (mkcontent)
//! ```
//!
//! 1. [`reader`]: normalise a PDF or image upload to PDF bytes; trim pages
//! 2. [`analyze`]: default analyzer, pdfium text layer or VLM OCR per page
//! 3. [`compose`]: inference → `middle_json`, writing figure/table crops
//! 4. [`mkcontent`]: `middle_json` → markdown and content list
//! 5. [`parse`]: the orchestrator running 2-4 in a fixed order

pub mod analyze;
pub mod compose;
pub mod encode;
pub mod llm;
pub mod mkcontent;
pub mod parse;
pub mod postprocess;
pub mod reader;
pub mod render;
pub mod text_layer;

use crate::config::{AnalyzerConfig, PageRange};
use crate::error::LayoutError;
use crate::layout::{AnalyzeBatch, DocumentAnalysis, NormalizedDocument};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Turns uploads into [`NormalizedDocument`]s and cuts page ranges out of them.
///
/// Both methods block; callers run them under `spawn_blocking`.
pub trait DocumentReader: Send + Sync {
    /// Read a PDF or image file into canonical PDF bytes.
    fn read(&self, path: &Path) -> Result<NormalizedDocument, LayoutError>;

    /// Keep only the pages selected by `range`.
    ///
    /// A range selecting nothing yields a document with zero pages rather
    /// than an error.
    fn trim_pages(
        &self,
        document: &NormalizedDocument,
        range: PageRange,
    ) -> Result<NormalizedDocument, LayoutError>;
}

/// Batch layout analysis.
///
/// Returns one [`DocumentAnalysis`] per input document that has at least
/// one page, in input order.
#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(&self, batch: AnalyzeBatch) -> Result<Vec<DocumentAnalysis>, LayoutError>;
}

/// The collaborators a request is processed with.
#[derive(Clone)]
pub struct Backend {
    pub reader: Arc<dyn DocumentReader>,
    pub analyzer: Arc<dyn LayoutAnalyzer>,
}

impl Backend {
    pub fn new(reader: Arc<dyn DocumentReader>, analyzer: Arc<dyn LayoutAnalyzer>) -> Self {
        Self { reader, analyzer }
    }

    /// The default collaborators: [`reader::PdfiumReader`] and
    /// [`analyze::PdfiumLayoutAnalyzer`].
    ///
    /// Nothing is bound or resolved here. pdfium is loaded per call and the
    /// VLM provider on the first OCR request.
    pub fn pdfium(config: &AnalyzerConfig) -> Self {
        Self::new(
            Arc::new(reader::PdfiumReader::from_config(config)),
            Arc::new(analyze::PdfiumLayoutAnalyzer::new(config.clone())),
        )
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("reader", &"<dyn DocumentReader>")
            .field("analyzer", &"<dyn LayoutAnalyzer>")
            .finish()
    }
}

/// Run blocking work on tokio's blocking pool.
pub(crate) async fn blocking<T, F>(what: &'static str, f: F) -> Result<T, LayoutError>
where
    F: FnOnce() -> Result<T, LayoutError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LayoutError::Internal(format!("{what} task panicked: {e}")))?
}
