//! Configuration types for the layout service.
//!
//! Process-wide settings live in [`ServiceConfig`], built once at start-up
//! through [`ServiceConfigBuilder`] and never mutated afterwards. Per-request
//! knobs (language, parse method, page range) travel separately in
//! [`ParseOptions`], assembled by the HTTP handler from the query string.

use crate::error::LayoutError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Title reported by the health endpoint unless overridden.
pub const DEFAULT_TITLE: &str = "Layout Analysis Service";

/// Settings for the whole service.
///
/// # Example
/// ```rust
/// use layout_service::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(9000)
///     .table_enable(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 9000);
/// ```
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Interface to bind. Default: `0.0.0.0`.
    pub host: String,

    /// TCP port. Default: 8087.
    pub port: u16,

    /// Human-readable service name reported by `GET /health`.
    pub title: String,

    /// Largest accepted request body in bytes. Default: 200 MiB.
    pub max_upload_bytes: usize,

    /// Parent directory for per-request scratch directories.
    /// `None` uses the system temp directory.
    pub temp_root: Option<PathBuf>,

    /// Extract display formulas as LaTeX. Default: true.
    pub formula_enable: bool,

    /// Extract tables as HTML. Default: true.
    pub table_enable: bool,

    /// Markdown flavour produced for every request. Default: [`MakeMode::MmMd`].
    pub make_md_mode: MakeMode,

    /// Settings for the default pdfium/VLM analyzer.
    pub analyzer: AnalyzerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8087,
            title: DEFAULT_TITLE.to_string(),
            max_upload_bytes: 200 * 1024 * 1024,
            temp_root: None,
            formula_enable: true,
            table_enable: true,
            make_md_mode: MakeMode::MmMd,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings for [`crate::pipeline::analyze::PdfiumLayoutAnalyzer`] and
/// [`crate::pipeline::reader::PdfiumReader`].
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Directory holding the pdfium shared library. `None` binds the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Longest edge of a rendered page image in pixels. Default: 2000.
    ///
    /// Page images feed both the OCR model and the figure/table crops, so
    /// the cap bounds memory per page regardless of the physical page size.
    pub max_rendered_pixels: u32,

    /// Text-layer characters a page needs to count as "has text" when the
    /// parse method is `auto`. Default: 50.
    pub min_text_chars_per_page: usize,

    /// Number of concurrent VLM calls per document in OCR mode. Default: 4.
    pub concurrency: usize,

    /// Vision model identifier, e.g. "gpt-4.1-nano".
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for OCR calls. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries per page on a failed VLM call. Default: 3.
    pub max_retries: u32,

    /// Initial backoff in milliseconds, doubled after each retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom OCR system prompt. If None, uses the built-in layout prompt.
    pub system_prompt: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            pdfium_lib_path: None,
            max_rendered_pixels: 2000,
            min_text_chars_per_page: 50,
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("min_text_chars_per_page", &self.min_text_chars_per_page)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn formula_enable(mut self, v: bool) -> Self {
        self.config.formula_enable = v;
        self
    }

    pub fn table_enable(mut self, v: bool) -> Self {
        self.config.table_enable = v;
        self
    }

    pub fn make_md_mode(mut self, mode: MakeMode) -> Self {
        self.config.make_md_mode = mode;
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.analyzer.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.analyzer.max_rendered_pixels = px.max(100);
        self
    }

    pub fn min_text_chars_per_page(mut self, n: usize) -> Self {
        self.config.analyzer.min_text_chars_per_page = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.analyzer.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.analyzer.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.analyzer.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.analyzer.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.analyzer.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.analyzer.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.analyzer.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.analyzer.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.analyzer.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, LayoutError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(LayoutError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.make_md_mode == MakeMode::ContentList {
            return Err(LayoutError::InvalidConfig(
                "make_md_mode must be a markdown mode (mm_markdown or nlp_markdown)".into(),
            ));
        }
        if c.analyzer.concurrency == 0 {
            return Err(LayoutError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the analyzer obtains page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    /// Use the text layer when the document has one, OCR otherwise. (default)
    #[default]
    Auto,
    /// Text layer only.
    Txt,
    /// Always OCR the rendered pages.
    Ocr,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::Auto => "auto",
            ParseMethod::Txt => "txt",
            ParseMethod::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseMethod {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ParseMethod::Auto),
            "txt" => Ok(ParseMethod::Txt),
            "ocr" => Ok(ParseMethod::Ocr),
            _ => Err(LayoutError::InvalidParseMethod(s.to_string())),
        }
    }
}

/// Rendering mode for the composed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MakeMode {
    /// Markdown with image links for figures and image-only tables. (default)
    #[default]
    #[serde(rename = "mm_markdown")]
    MmMd,
    /// Text-only markdown: images dropped.
    #[serde(rename = "nlp_markdown")]
    NlpMd,
    /// Flattened content list.
    #[serde(rename = "content_list")]
    ContentList,
}

impl FromStr for MakeMode {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm_markdown" | "mm" => Ok(MakeMode::MmMd),
            "nlp_markdown" | "nlp" => Ok(MakeMode::NlpMd),
            "content_list" => Ok(MakeMode::ContentList),
            other => Err(LayoutError::InvalidConfig(format!(
                "unknown markdown mode '{other}'"
            ))),
        }
    }
}

/// Inclusive, 0-indexed page range requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    /// `None` means "to the end of the document".
    pub end: Option<usize>,
}

impl PageRange {
    pub fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// Resolve against a document of `total_pages` pages.
    ///
    /// An end past the last page is clamped to it. Returns `None` when the
    /// range selects nothing (empty document or `start > end`).
    pub fn resolve(&self, total_pages: usize) -> Option<RangeInclusive<usize>> {
        let last = total_pages.checked_sub(1)?;
        let end = self.end.map_or(last, |e| e.min(last));
        if self.start > end {
            return None;
        }
        Some(self.start..=end)
    }
}

/// Everything the orchestrator needs to know about one request.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub lang: String,
    pub parse_method: ParseMethod,
    pub page_range: PageRange,
    pub formula_enable: bool,
    pub table_enable: bool,
    pub make_md_mode: MakeMode,
}

impl ParseOptions {
    /// Request options on top of the service-wide toggles.
    pub fn from_service(
        config: &ServiceConfig,
        lang: impl Into<String>,
        parse_method: ParseMethod,
        page_range: PageRange,
    ) -> Self {
        Self {
            lang: lang.into(),
            parse_method,
            page_range,
            formula_enable: config.formula_enable,
            table_enable: config.table_enable,
            make_md_mode: config.make_md_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_all_interfaces_on_8087() {
        let c = ServiceConfig::default();
        assert_eq!(c.bind_addr(), "0.0.0.0:8087");
        assert!(c.formula_enable);
        assert!(c.table_enable);
        assert_eq!(c.make_md_mode, MakeMode::MmMd);
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = ServiceConfig::builder()
            .max_rendered_pixels(10)
            .temperature(9.0)
            .concurrency(0)
            .build()
            .expect("clamped values are valid");
        assert_eq!(c.analyzer.max_rendered_pixels, 100);
        assert_eq!(c.analyzer.temperature, 2.0);
        assert_eq!(c.analyzer.concurrency, 1);

        let err = ServiceConfig::builder()
            .make_md_mode(MakeMode::ContentList)
            .build()
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidConfig(_)));

        let err = ServiceConfig::builder().max_upload_bytes(0).build().unwrap_err();
        assert!(matches!(err, LayoutError::InvalidConfig(_)));
    }

    #[test]
    fn analyzer_debug_lists_retry_and_prompt_settings() {
        let c = ServiceConfig::builder()
            .retry_backoff_ms(250)
            .system_prompt("custom")
            .build()
            .unwrap();
        let dbg = format!("{:?}", c.analyzer);
        assert!(dbg.contains("retry_backoff_ms: 250"), "{dbg}");
        assert!(dbg.contains("system_prompt: Some(\"custom\")"), "{dbg}");
    }

    #[test]
    fn parse_method_from_str() {
        assert_eq!("auto".parse::<ParseMethod>().unwrap(), ParseMethod::Auto);
        assert_eq!("TXT".parse::<ParseMethod>().unwrap(), ParseMethod::Txt);
        assert_eq!(" ocr ".parse::<ParseMethod>().unwrap(), ParseMethod::Ocr);
        assert!(matches!(
            "vlm".parse::<ParseMethod>(),
            Err(LayoutError::InvalidParseMethod(m)) if m == "vlm"
        ));
    }

    #[test]
    fn make_mode_serialises_to_pipeline_names() {
        assert_eq!(
            serde_json::to_string(&MakeMode::MmMd).unwrap(),
            "\"mm_markdown\""
        );
        assert_eq!("nlp".parse::<MakeMode>().unwrap(), MakeMode::NlpMd);
    }

    #[test]
    fn page_range_resolution() {
        assert_eq!(PageRange::new(0, None).resolve(5), Some(0..=4));
        assert_eq!(PageRange::new(1, Some(2)).resolve(5), Some(1..=2));
        // End past the last page is clamped.
        assert_eq!(PageRange::new(3, Some(99)).resolve(5), Some(3..=4));
        // Start after end selects nothing.
        assert_eq!(PageRange::new(3, Some(1)).resolve(5), None);
        // Start past the document selects nothing.
        assert_eq!(PageRange::new(7, None).resolve(5), None);
        assert_eq!(PageRange::new(0, None).resolve(0), None);
    }
}
