//! Default [`DocumentReader`]: pdfium-backed reading and page trimming.
//!
//! PDFs are passed through after a magic-byte check. Images are wrapped in
//! a one-page PDF whose page size in points equals the image size in
//! pixels, so every later stage only ever sees PDF bytes.

use crate::config::{AnalyzerConfig, PageRange};
use crate::error::LayoutError;
use crate::layout::NormalizedDocument;
use crate::pipeline::render::bind_pdfium;
use crate::pipeline::DocumentReader;
use crate::upload::file_extension;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Reads uploads and trims page ranges with pdfium.
///
/// A pdfium binding is created per call; nothing is shared between
/// requests.
#[derive(Debug, Clone, Default)]
pub struct PdfiumReader {
    lib_path: Option<PathBuf>,
}

impl PdfiumReader {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.pdfium_lib_path.clone())
    }

    fn pdfium(&self) -> Result<Pdfium, LayoutError> {
        bind_pdfium(self.lib_path.as_deref())
    }

    fn image_to_pdf(&self, path: &Path, bytes: &[u8]) -> Result<Vec<u8>, LayoutError> {
        let conversion_err = |detail: String| LayoutError::ImageConversionFailed {
            path: path.to_path_buf(),
            detail,
        };

        let image = image::load_from_memory(bytes).map_err(|e| conversion_err(e.to_string()))?;
        let (width, height) = (image.width() as f32, image.height() as f32);

        let pdfium = self.pdfium()?;
        let mut document = pdfium
            .create_new_pdf()
            .map_err(|e| conversion_err(format!("{e:?}")))?;
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(width),
                PdfPoints::new(height),
            ))
            .map_err(|e| conversion_err(format!("{e:?}")))?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &image,
                Some(PdfPoints::new(width)),
                Some(PdfPoints::new(height)),
            )
            .map_err(|e| conversion_err(format!("{e:?}")))?;

        document
            .save_to_bytes()
            .map_err(|e| conversion_err(format!("{e:?}")))
    }
}

impl DocumentReader for PdfiumReader {
    fn read(&self, path: &Path) -> Result<NormalizedDocument, LayoutError> {
        info!("Processing '{}' using the document reader", path.display());
        let bytes = std::fs::read(path).map_err(|source| LayoutError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if file_extension(name) == ".pdf" {
            if !bytes.starts_with(PDF_MAGIC) {
                return Err(LayoutError::CorruptDocument {
                    name: name.to_string(),
                    detail: "missing %PDF header".into(),
                });
            }
            return Ok(NormalizedDocument::new(bytes));
        }

        let pdf = self.image_to_pdf(path, &bytes)?;
        debug!("Wrapped image '{}' into a {} byte PDF", name, pdf.len());
        Ok(NormalizedDocument::new(pdf))
    }

    fn trim_pages(
        &self,
        document: &NormalizedDocument,
        range: PageRange,
    ) -> Result<NormalizedDocument, LayoutError> {
        let pdfium = self.pdfium()?;
        let source = pdfium
            .load_pdf_from_byte_slice(document.as_bytes(), None)
            .map_err(|e| LayoutError::CorruptDocument {
                name: "upload".into(),
                detail: format!("{e:?}"),
            })?;
        let total = source.pages().len() as usize;

        let selected = range.resolve(total);
        if selected == Some(0..=total.saturating_sub(1)) {
            return Ok(document.clone());
        }

        let mut target = pdfium
            .create_new_pdf()
            .map_err(|e| LayoutError::TrimFailed(format!("{e:?}")))?;
        if let Some(pages) = &selected {
            let (start, end) = (*pages.start() as PdfPageIndex, *pages.end() as PdfPageIndex);
            target
                .pages_mut()
                .copy_page_range_from_document(&source, start..=end, 0)
                .map_err(|e| LayoutError::TrimFailed(format!("{e:?}")))?;
        }
        debug!(
            "Trimmed {} pages to {:?} ({} kept)",
            total,
            selected,
            target.pages().len()
        );

        let bytes = target
            .save_to_bytes()
            .map_err(|e| LayoutError::TrimFailed(format!("{e:?}")))?;
        Ok(NormalizedDocument::new(bytes))
    }
}
