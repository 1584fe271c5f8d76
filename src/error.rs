//! Error types for the layout service.
//!
//! Every failure inside the library is a [`LayoutError`]. There is no
//! non-fatal variant: a request either produces all of its artifacts or
//! fails as a whole, so a page that cannot be read, rendered, or recognised
//! aborts the document it belongs to.
//!
//! The HTTP layer only needs one distinction from this enum:
//! [`LayoutError::is_client_error`] separates a rejected upload (400) from
//! everything that went wrong while processing an accepted one (500).

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the layout service library.
#[derive(Debug, Error)]
pub enum LayoutError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// The uploaded file name carries an extension outside the allow-list.
    #[error("File type '{extension}' not supported. Please upload one of: {allowed}")]
    UnsupportedType { extension: String, allowed: String },

    /// `parse_method` was not one of `auto`, `txt`, `ocr`.
    #[error("Unknown parse method '{0}': expected one of auto, txt, ocr")]
    InvalidParseMethod(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// The per-request temporary directory could not be created or written.
    #[error("Temporary storage error at '{path}': {source}")]
    TempStorage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The uploaded file could not be read back from disk.
    #[error("Failed to read document '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An extracted image could not be persisted.
    #[error("Failed to write image '{path}': {source}")]
    ImageWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// The file claims to be a PDF but pdfium cannot make sense of it.
    #[error("Document '{name}' is corrupt: {detail}")]
    CorruptDocument { name: String, detail: String },

    /// An image upload could not be decoded or wrapped into a PDF.
    #[error("Image '{path}' could not be converted: {detail}")]
    ImageConversionFailed { path: PathBuf, detail: String },

    /// Copying the requested page range into a new document failed.
    #[error("Page trimming failed: {0}")]
    TrimFailed(String),

    /// pdfium returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The text layer of a page could not be read.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    // ── Analysis errors ───────────────────────────────────────────────────
    /// OCR was required but no vision provider could be resolved.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The vision model failed on a page after every retry.
    #[error("OCR failed for page {page} after {retries} retries: {detail}")]
    OcrFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The analyzer returned no usable result for the submitted document.
    #[error("Layout analysis failed to produce any output.")]
    AnalysisProducedNothing,

    /// A result could not be turned into JSON.
    #[error("Failed to serialise analysis result: {0}")]
    Serialisation(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set --pdfium-lib-path (or LAYOUT_PDFIUM_LIB_PATH) to the directory holding libpdfium, \
or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LayoutError {
    /// True when the caller sent something we refuse to process at all.
    pub fn is_client_error(&self) -> bool {
        matches!(self, LayoutError::UnsupportedType { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_names_extension_and_allowed_set() {
        let e = LayoutError::UnsupportedType {
            extension: ".docx".into(),
            allowed: "[.pdf, .png]".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("'.docx'"), "got: {msg}");
        assert!(msg.contains("[.pdf, .png]"), "got: {msg}");
        assert!(e.is_client_error());
    }

    #[test]
    fn produced_nothing_display() {
        let e = LayoutError::AnalysisProducedNothing;
        assert!(e.to_string().contains("failed to produce any output"));
        assert!(!e.is_client_error());
    }

    #[test]
    fn ocr_failed_display() {
        let e = LayoutError::OcrFailed {
            page: 2,
            retries: 3,
            detail: "timeout".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 2"));
        assert!(msg.contains("3 retries"));
        assert!(msg.contains("timeout"));
    }
}
