//! Data exchanged between the reader, the analyzer and the composer.
//!
//! Coordinates are PDF points with the origin at the top-left corner of the
//! page, x growing right and y growing down. Page images carry their own
//! pixels-per-point scale so crops can be cut from them.

use crate::config::ParseMethod;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// A document in the canonical PDF form every analyzer accepts.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    bytes: Vec<u8>,
}

impl NormalizedDocument {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for NormalizedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedDocument")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Axis-aligned box `[x0, y0, x1, y1]`, serialised as a 4-element array.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Bbox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Bbox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bbox) -> Bbox {
        Bbox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Overlap of the two vertical extents, in points (0 when disjoint).
    pub fn vertical_overlap(&self, other: &Bbox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    /// Overlap of the two horizontal extents, in points (0 when disjoint).
    pub fn horizontal_overlap(&self, other: &Bbox) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// Vertical gap between the two boxes (0 when they overlap).
    pub fn vertical_distance(&self, other: &Bbox) -> f32 {
        if self.y1 < other.y0 {
            other.y0 - self.y1
        } else if other.y1 < self.y0 {
            self.y0 - other.y1
        } else {
            0.0
        }
    }

    /// Four-corner polygon, clockwise from top-left.
    pub fn to_poly(&self) -> [f32; 8] {
        [
            self.x0, self.y0, self.x1, self.y0, self.x1, self.y1, self.x0, self.y1,
        ]
    }

    pub fn from_poly(poly: &[f32; 8]) -> Bbox {
        let xs = [poly[0], poly[2], poly[4], poly[6]];
        let ys = [poly[1], poly[3], poly[5], poly[7]];
        Bbox {
            x0: xs.iter().copied().fold(f32::INFINITY, f32::min),
            y0: ys.iter().copied().fold(f32::INFINITY, f32::min),
            x1: xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            y1: ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }

    /// Round every coordinate to two decimals for stable JSON output.
    pub fn rounded(&self) -> Bbox {
        let r = |v: f32| (v * 100.0).round() / 100.0;
        Bbox {
            x0: r(self.x0),
            y0: r(self.y0),
            x1: r(self.x1),
            y1: r(self.y1),
        }
    }
}

impl From<[f32; 4]> for Bbox {
    fn from(v: [f32; 4]) -> Self {
        Bbox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Bbox> for [f32; 4] {
    fn from(b: Bbox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// Layout categories produced by the analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCategory {
    Title,
    Text,
    Abandon,
    Figure,
    FigureCaption,
    Table,
    TableCaption,
    TableFootnote,
    InterlineEquation,
    EquationCaption,
}

impl BlockCategory {
    pub const ALL: [BlockCategory; 10] = [
        BlockCategory::Title,
        BlockCategory::Text,
        BlockCategory::Abandon,
        BlockCategory::Figure,
        BlockCategory::FigureCaption,
        BlockCategory::Table,
        BlockCategory::TableCaption,
        BlockCategory::TableFootnote,
        BlockCategory::InterlineEquation,
        BlockCategory::EquationCaption,
    ];

    pub const fn id(&self) -> u8 {
        match self {
            BlockCategory::Title => 0,
            BlockCategory::Text => 1,
            BlockCategory::Abandon => 2,
            BlockCategory::Figure => 3,
            BlockCategory::FigureCaption => 4,
            BlockCategory::Table => 5,
            BlockCategory::TableCaption => 6,
            BlockCategory::TableFootnote => 7,
            BlockCategory::InterlineEquation => 8,
            BlockCategory::EquationCaption => 9,
        }
    }

    pub fn from_id(id: u8) -> Option<BlockCategory> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            BlockCategory::Title => "title",
            BlockCategory::Text => "text",
            BlockCategory::Abandon => "abandon",
            BlockCategory::Figure => "figure",
            BlockCategory::FigureCaption => "figure_caption",
            BlockCategory::Table => "table",
            BlockCategory::TableCaption => "table_caption",
            BlockCategory::TableFootnote => "table_footnote",
            BlockCategory::InterlineEquation => "interline_equation",
            BlockCategory::EquationCaption => "equation_caption",
        }
    }

    /// Lenient mapping from a free-form label (as a vision model writes it).
    pub fn from_label(label: &str) -> Option<BlockCategory> {
        let norm = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let cat = match norm.as_str() {
            "title" | "heading" | "section_header" | "header_title" => BlockCategory::Title,
            "text" | "paragraph" | "plain_text" | "list" | "list_item" => BlockCategory::Text,
            "abandon" | "header" | "footer" | "page_header" | "page_footer"
            | "page_number" => BlockCategory::Abandon,
            "figure" | "image" | "picture" | "chart" => BlockCategory::Figure,
            "figure_caption" | "image_caption" | "caption" => BlockCategory::FigureCaption,
            "table" => BlockCategory::Table,
            "table_caption" => BlockCategory::TableCaption,
            "table_footnote" | "footnote" => BlockCategory::TableFootnote,
            "formula" | "equation" | "interline_equation" | "isolate_formula" => {
                BlockCategory::InterlineEquation
            }
            "formula_caption" | "equation_caption" => BlockCategory::EquationCaption,
            _ => return None,
        };
        Some(cat)
    }
}

/// One detected region on a page, in the shape of the raw model payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDet {
    pub category_id: u8,
    pub poly: [f32; 8],
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl LayoutDet {
    pub fn new(category: BlockCategory, bbox: Bbox, score: f32) -> Self {
        Self {
            category_id: category.id(),
            poly: bbox.rounded().to_poly(),
            score,
            text: None,
            latex: None,
            html: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_latex(mut self, latex: impl Into<String>) -> Self {
        self.latex = Some(latex.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn category(&self) -> Option<BlockCategory> {
        BlockCategory::from_id(self.category_id)
    }

    pub fn bbox(&self) -> Bbox {
        Bbox::from_poly(&self.poly)
    }
}

/// Page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page_no: usize,
    pub width: f32,
    pub height: f32,
}

/// Raw inference for one page: one element of `model_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInference {
    pub layout_dets: Vec<LayoutDet>,
    pub page_info: PageInfo,
}

/// A rendered page and its pixels-per-point scale.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    pub scale: f32,
}

/// What the analyzer returns for one input document.
#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    /// One entry per page, in page order.
    pub inference: Vec<PageInference>,
    /// Rendered pages, parallel to `inference`.
    pub images: Vec<PageImage>,
    /// The document the results were computed from.
    pub document: NormalizedDocument,
    /// Language the analyzer settled on.
    pub lang: String,
    /// Whether page text came from OCR rather than the text layer.
    pub ocr_enabled: bool,
}

impl DocumentAnalysis {
    pub fn page_count(&self) -> usize {
        self.inference.len()
    }
}

/// Batch input for [`crate::pipeline::LayoutAnalyzer::analyze`].
///
/// `documents` and `langs` are parallel; the remaining fields apply to the
/// whole batch.
#[derive(Debug, Clone)]
pub struct AnalyzeBatch {
    pub documents: Vec<NormalizedDocument>,
    pub langs: Vec<String>,
    pub parse_method: ParseMethod,
    pub formula_enable: bool,
    pub table_enable: bool,
}

impl AnalyzeBatch {
    /// A batch holding exactly one document.
    pub fn single(
        document: NormalizedDocument,
        lang: impl Into<String>,
        parse_method: ParseMethod,
        formula_enable: bool,
        table_enable: bool,
    ) -> Self {
        Self {
            documents: vec![document],
            langs: vec![lang.into()],
            parse_method,
            formula_enable,
            table_enable,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Normalise a caller-supplied language tag.
pub fn resolve_lang(lang: &str) -> String {
    let l = lang.trim().to_ascii_lowercase();
    if l.is_empty() {
        "en".to_string()
    } else {
        l
    }
}
