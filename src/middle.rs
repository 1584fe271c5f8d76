//! The composed document tree (`middle_json`) and the flattened content list.

use crate::layout::Bbox;
use serde::{Deserialize, Serialize};

/// Structured intermediate representation of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddleJson {
    pub pdf_info: Vec<PageLayout>,
    #[serde(rename = "_backend")]
    pub backend: String,
    #[serde(rename = "_parse_type")]
    pub parse_type: String,
    #[serde(rename = "_lang")]
    pub lang: String,
    #[serde(rename = "_version_name")]
    pub version_name: String,
}

/// Blocks of one page, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_idx: usize,
    pub page_size: [f32; 2],
    pub para_blocks: Vec<ParaBlock>,
    pub discarded_blocks: Vec<ParaBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Title,
    Text,
    Image,
    ImageBody,
    ImageCaption,
    ImageFootnote,
    Table,
    TableBody,
    TableCaption,
    TableFootnote,
    InterlineEquation,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Text,
    InterlineEquation,
    Image,
    Table,
}

/// A paragraph-level block. Image and table blocks group their body and
/// captions as child `blocks`; every other kind carries `lines` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParaBlock {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub bbox: Bbox,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<Line>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ParaBlock>,
}

impl ParaBlock {
    pub fn new(kind: BlockKind, bbox: Bbox, index: usize) -> Self {
        Self {
            kind,
            bbox,
            index,
            level: None,
            lines: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Concatenated text of all text spans, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| {
                l.spans
                    .iter()
                    .filter_map(|s| s.content.as_deref())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First span of the given kind, searching child blocks too.
    pub fn find_span(&self, kind: SpanKind) -> Option<&Span> {
        self.lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .find(|s| s.kind == kind)
            .or_else(|| self.blocks.iter().find_map(|b| b.find_span(kind)))
    }

    /// Text of every child block of `kind`.
    pub fn child_texts(&self, kind: BlockKind) -> Vec<String> {
        self.blocks
            .iter()
            .filter(|b| b.kind == kind)
            .map(ParaBlock::text)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub bbox: Bbox,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub bbox: Bbox,
    #[serde(rename = "type")]
    pub kind: SpanKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl Span {
    pub fn text(kind: SpanKind, bbox: Bbox, content: impl Into<String>) -> Self {
        Self {
            bbox,
            kind,
            content: Some(content.into()),
            image_path: None,
            html: None,
        }
    }

    pub fn image(kind: SpanKind, bbox: Bbox, image_path: Option<String>) -> Self {
        Self {
            bbox,
            kind,
            content: None,
            image_path,
            html: None,
        }
    }
}

/// One entry of `content_list_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_level: Option<u8>,
        page_idx: usize,
    },
    Image {
        img_path: String,
        image_caption: Vec<String>,
        image_footnote: Vec<String>,
        page_idx: usize,
    },
    Table {
        img_path: String,
        table_caption: Vec<String>,
        table_footnote: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_body: Option<String>,
        page_idx: usize,
    },
    Equation {
        text: String,
        text_format: String,
        page_idx: usize,
    },
}
