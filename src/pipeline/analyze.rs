//! Default [`LayoutAnalyzer`]: pdfium text layer or vision-LLM OCR.
//!
//! ## Per-document flow
//!
//! ```text
//! bytes ──▶ pdfium (blocking) ──▶ pages ──┬─ txt ──▶ text_layer ──▶ layout_dets
//!            size, text layer,            │
//!            image objects, raster        └─ ocr ──▶ VLM (buffer_unordered) ──▶ layout_dets
//! ```
//!
//! With `auto`, a document is sent to OCR when fewer than half of its pages
//! carry enough text-layer characters; scanned documents have none.
//!
//! The VLM provider is resolved on first OCR use and cached, so a service
//! that only ever sees born-digital PDFs never needs an API key.

use crate::config::{AnalyzerConfig, ParseMethod};
use crate::error::LayoutError;
use crate::layout::{
    resolve_lang, AnalyzeBatch, DocumentAnalysis, NormalizedDocument, PageImage, PageInference,
    PageInfo,
};
use crate::pipeline::encode::encode_page;
use crate::pipeline::render::{bind_pdfium, page_size, render_page};
use crate::pipeline::text_layer::{from_pdf_rect, layout_from_text, PageText, TextSegment};
use crate::pipeline::{blocking, llm, LayoutAnalyzer};
use crate::prompts::{build_layout_prompt, DEFAULT_LAYOUT_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt, TryStreamExt};
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// One page as read out of pdfium.
struct ExtractedPage {
    info: PageInfo,
    text: PageText,
    image: PageImage,
}

/// Layout analysis backed by pdfium and, for scans, a vision LLM.
pub struct PdfiumLayoutAnalyzer {
    config: AnalyzerConfig,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl PdfiumLayoutAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            provider: OnceCell::new(),
        }
    }

    async fn provider(&self) -> Result<Arc<dyn LLMProvider>, LayoutError> {
        self.provider
            .get_or_try_init(|| resolve_provider(&self.config))
            .await
            .map(Arc::clone)
    }

    async fn analyze_document(
        &self,
        document: NormalizedDocument,
        lang: String,
        batch: &AnalyzeBatch,
    ) -> Result<Option<DocumentAnalysis>, LayoutError> {
        let lib_path = self.config.pdfium_lib_path.clone();
        let max_pixels = self.config.max_rendered_pixels;
        let input = document.clone();
        let pages = blocking("page extraction", move || {
            extract_pages(lib_path.as_deref(), &input, max_pixels)
        })
        .await?;

        if pages.is_empty() {
            return Ok(None);
        }

        let char_counts: Vec<usize> = pages.iter().map(|p| p.text.char_count()).collect();
        let ocr_enabled = use_ocr(
            batch.parse_method,
            &char_counts,
            self.config.min_text_chars_per_page,
        );
        info!(
            "Analysing {} pages ({}, lang={})",
            pages.len(),
            if ocr_enabled { "ocr" } else { "txt" },
            lang
        );

        let inference = if ocr_enabled {
            self.ocr_pages(&pages, &lang, batch.formula_enable, batch.table_enable)
                .await?
        } else {
            pages
                .iter()
                .map(|p| PageInference {
                    layout_dets: layout_from_text(&p.text, &p.info),
                    page_info: p.info,
                })
                .collect()
        };

        Ok(Some(DocumentAnalysis {
            inference,
            images: pages.into_iter().map(|p| p.image).collect(),
            document,
            lang,
            ocr_enabled,
        }))
    }

    async fn ocr_pages(
        &self,
        pages: &[ExtractedPage],
        lang: &str,
        formula_enable: bool,
        table_enable: bool,
    ) -> Result<Vec<PageInference>, LayoutError> {
        let provider = self.provider().await?;
        let system_prompt = format!(
            "{}{}",
            self.config
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_LAYOUT_PROMPT),
            build_layout_prompt(lang, formula_enable, table_enable)
        );

        let to_encode: Vec<(PageInfo, PageImage)> =
            pages.iter().map(|p| (p.info, p.image.clone())).collect();
        let encoded = blocking("page encoding", move || {
            to_encode
                .into_iter()
                .map(|(info, page)| {
                    encode_page(&page.image)
                        .map(|data| (info, data))
                        .map_err(|e| LayoutError::RasterisationFailed {
                            page: info.page_no + 1,
                            detail: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;

        let config = &self.config;
        let prompt = system_prompt.as_str();
        let mut results: Vec<PageInference> = stream::iter(encoded.into_iter().map(|(info, data)| {
            let provider = Arc::clone(&provider);
            async move {
                let layout_dets = llm::ocr_page(&provider, &info, data, prompt, config).await?;
                debug!("Page {}: {} regions", info.page_no + 1, layout_dets.len());
                Ok::<_, LayoutError>(PageInference {
                    layout_dets,
                    page_info: info,
                })
            }
        }))
        .buffer_unordered(config.concurrency)
        .try_collect()
        .await?;

        results.sort_by_key(|p| p.page_info.page_no);
        Ok(results)
    }
}

impl std::fmt::Debug for PdfiumLayoutAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumLayoutAnalyzer")
            .field("config", &self.config)
            .field("provider_resolved", &self.provider.initialized())
            .finish()
    }
}

#[async_trait]
impl LayoutAnalyzer for PdfiumLayoutAnalyzer {
    async fn analyze(&self, batch: AnalyzeBatch) -> Result<Vec<DocumentAnalysis>, LayoutError> {
        let mut results = Vec::with_capacity(batch.len());
        for (idx, document) in batch.documents.iter().enumerate() {
            let lang = resolve_lang(batch.langs.get(idx).map(String::as_str).unwrap_or(""));
            match self.analyze_document(document.clone(), lang, &batch).await? {
                Some(analysis) => results.push(analysis),
                None => warn!("Document {} has no pages; skipping", idx),
            }
        }
        Ok(results)
    }
}

/// Decide between text layer and OCR for one document.
pub fn use_ocr(parse_method: ParseMethod, char_counts: &[usize], min_chars: usize) -> bool {
    match parse_method {
        ParseMethod::Txt => false,
        ParseMethod::Ocr => true,
        ParseMethod::Auto => {
            let with_text = char_counts.iter().filter(|&&n| n >= min_chars).count();
            with_text * 2 < char_counts.len()
        }
    }
}

fn extract_pages(
    lib_path: Option<&Path>,
    document: &NormalizedDocument,
    max_pixels: u32,
) -> Result<Vec<ExtractedPage>, LayoutError> {
    let pdfium = bind_pdfium(lib_path)?;
    let pdf = pdfium
        .load_pdf_from_byte_slice(document.as_bytes(), None)
        .map_err(|e| LayoutError::CorruptDocument {
            name: "document".into(),
            detail: format!("{e:?}"),
        })?;

    let mut pages = Vec::with_capacity(pdf.pages().len() as usize);
    for (page_no, page) in pdf.pages().iter().enumerate() {
        let (width, height) = page_size(&page);
        let text = read_text_layer(&page, page_no, height)?;
        let image = render_page(&page, page_no, max_pixels)?;
        pages.push(ExtractedPage {
            info: PageInfo {
                page_no,
                width,
                height,
            },
            text,
            image,
        });
    }
    Ok(pages)
}

fn read_text_layer(
    page: &PdfPage<'_>,
    page_no: usize,
    page_height: f32,
) -> Result<PageText, LayoutError> {
    let text = page.text().map_err(|e| LayoutError::TextExtractionFailed {
        page: page_no + 1,
        detail: format!("{e:?}"),
    })?;

    let segments = text
        .segments()
        .iter()
        .map(|segment| {
            let r = segment.bounds();
            let bbox = from_pdf_rect(
                r.left().value,
                r.bottom().value,
                r.right().value,
                r.top().value,
                page_height,
            );
            TextSegment::new(bbox, segment.text())
        })
        .collect();

    let images = page
        .objects()
        .iter()
        .filter(|object| object.object_type() == PdfPageObjectType::Image)
        .filter_map(|object| object.bounds().ok())
        .map(|r| {
            from_pdf_rect(
                r.left().value,
                r.bottom().value,
                r.right().value,
                r.top().value,
                page_height,
            )
        })
        .collect();

    Ok(PageText { segments, images })
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, LayoutError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LayoutError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in the config;
/// 2. a provider named in the config, with the configured model;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. whatever [`ProviderFactory::from_env`] detects.
async fn resolve_provider(config: &AnalyzerConfig) -> Result<Arc<dyn LLMProvider>, LayoutError> {
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

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LayoutError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "OCR needs a vision model and none could be auto-detected from the environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
