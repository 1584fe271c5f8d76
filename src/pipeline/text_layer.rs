//! Layout from a PDF text layer.
//!
//! pdfium hands back text as segments: runs of characters that share a font
//! and a baseline, each with a bounding box. This module turns them into
//! layout detections in three passes:
//!
//! 1. **Lines**: segments whose vertical extents overlap by more than half
//!    of the smaller height, and that are not separated by a column gutter,
//!    sit on the same line.
//! 2. **Blocks**: a line joins the block above it when the gap is smaller
//!    than `0.8 ×` the line height and the two overlap horizontally. Lines
//!    are matched against every open block, so side-by-side columns stay
//!    separate.
//! 3. **Classification**: headers and footers, titles and body text.
//!
//! Everything here is pure; the pdfium calls that produce the input live in
//! [`crate::pipeline::analyze`].

use crate::layout::{Bbox, BlockCategory, LayoutDet, PageInfo};
use crate::pipeline::postprocess::clean_block_text;

/// Minimum share of the smaller height two segments must overlap by to share a line.
const LINE_OVERLAP_RATIO: f32 = 0.5;
/// Largest horizontal gap, relative to text height, between segments of one line.
const LINE_GAP_RATIO: f32 = 1.0;
/// Largest line gap, relative to line height, inside one block.
const BLOCK_GAP_RATIO: f32 = 0.8;
/// A one-line block this much taller than the median line is a title.
const TITLE_HEIGHT_RATIO: f32 = 1.3;
/// Share of the page height treated as header or footer margin.
const MARGIN_RATIO: f32 = 0.05;
/// Longest text, in characters, a header or footer block may hold.
const MARGIN_MAX_CHARS: usize = 60;
/// Image objects smaller than this on either side (points) are ignored.
const MIN_FIGURE_SIDE: f32 = 8.0;

const TEXT_LAYER_SCORE: f32 = 1.0;

/// One run of text as reported by the PDF text layer, in top-left page points.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub bbox: Bbox,
    pub text: String,
}

impl TextSegment {
    pub fn new(bbox: Bbox, text: impl Into<String>) -> Self {
        Self {
            bbox,
            text: text.into(),
        }
    }
}

/// Everything read from one page's text layer.
#[derive(Debug, Clone, Default)]
pub struct PageText {
    pub segments: Vec<TextSegment>,
    /// Bounds of image objects on the page.
    pub images: Vec<Bbox>,
}

impl PageText {
    /// Non-whitespace characters on the page.
    pub fn char_count(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }
}

/// Convert a PDF rectangle (bottom-left origin) to a top-left [`Bbox`].
pub fn from_pdf_rect(left: f32, bottom: f32, right: f32, top: f32, page_height: f32) -> Bbox {
    Bbox::new(left, page_height - top, right, page_height - bottom)
}

#[derive(Debug, Clone)]
struct TextLine {
    bbox: Bbox,
    segments: Vec<TextSegment>,
}

impl TextLine {
    fn text(&self) -> String {
        let mut out = String::new();
        let mut prev: Option<&Bbox> = None;
        for seg in &self.segments {
            if let Some(p) = prev {
                let gap = seg.bbox.x0 - p.x1;
                if gap > 0.15 * self.bbox.height()
                    && !out.ends_with(char::is_whitespace)
                    && !seg.text.starts_with(char::is_whitespace)
                {
                    out.push(' ');
                }
            }
            out.push_str(&seg.text);
            prev = Some(&seg.bbox);
        }
        out.trim().to_string()
    }
}

#[derive(Debug, Clone)]
struct TextBlock {
    bbox: Bbox,
    lines: Vec<TextLine>,
}

impl TextBlock {
    fn text(&self) -> String {
        let joined = self
            .lines
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n");
        clean_block_text(&joined)
    }
}

fn group_lines(segments: &[TextSegment]) -> Vec<TextLine> {
    let mut sorted: Vec<&TextSegment> = segments
        .iter()
        .filter(|s| !s.text.trim().is_empty() && s.bbox.height() > 0.0)
        .collect();
    sorted.sort_by(|a, b| {
        a.bbox
            .y0
            .total_cmp(&b.bbox.y0)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    let mut lines: Vec<TextLine> = Vec::new();
    for seg in sorted {
        let joined = lines.iter_mut().rev().take(4).find(|line| {
            let min_h = line.bbox.height().min(seg.bbox.height());
            let gap = (seg.bbox.x0 - line.bbox.x1).max(line.bbox.x0 - seg.bbox.x1);
            line.bbox.vertical_overlap(&seg.bbox) > LINE_OVERLAP_RATIO * min_h
                && gap <= LINE_GAP_RATIO * min_h
        });
        match joined {
            Some(line) => {
                line.bbox = line.bbox.union(&seg.bbox);
                line.segments.push(seg.clone());
            }
            None => lines.push(TextLine {
                bbox: seg.bbox,
                segments: vec![seg.clone()],
            }),
        }
    }

    for line in &mut lines {
        line.segments.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    }
    lines.sort_by(|a, b| {
        a.bbox
            .y0
            .total_cmp(&b.bbox.y0)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });
    lines
}

fn group_blocks(lines: Vec<TextLine>) -> Vec<TextBlock> {
    let mut blocks: Vec<TextBlock> = Vec::new();
    for line in lines {
        let target = blocks
            .iter()
            .enumerate()
            .filter_map(|(i, block)| {
                let last = block.lines.last()?;
                let gap = line.bbox.y0 - last.bbox.y1;
                let limit = BLOCK_GAP_RATIO * last.bbox.height().max(line.bbox.height());
                let stacked = line.bbox.y0 >= last.bbox.y0 && gap < limit;
                (stacked && block.bbox.horizontal_overlap(&line.bbox) > 0.0).then_some((i, gap))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        match target {
            Some(i) => {
                let block = &mut blocks[i];
                block.bbox = block.bbox.union(&line.bbox);
                block.lines.push(line);
            }
            None => blocks.push(TextBlock {
                bbox: line.bbox,
                lines: vec![line],
            }),
        }
    }
    blocks
}

fn median(mut values: Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn classify(block: &TextBlock, text: &str, median_height: f32, page: &PageInfo) -> BlockCategory {
    let margin = MARGIN_RATIO * page.height;
    let in_margin = block.bbox.y1 <= margin || block.bbox.y0 >= page.height - margin;
    if in_margin && text.chars().count() < MARGIN_MAX_CHARS {
        return BlockCategory::Abandon;
    }
    if block.lines.len() == 1
        && median_height > 0.0
        && block.bbox.height() >= TITLE_HEIGHT_RATIO * median_height
    {
        return BlockCategory::Title;
    }
    BlockCategory::Text
}

/// Build layout detections for one page from its text layer.
pub fn layout_from_text(page_text: &PageText, page: &PageInfo) -> Vec<LayoutDet> {
    let lines = group_lines(&page_text.segments);
    let median_height = median(lines.iter().map(|l| l.bbox.height()).collect());
    let blocks = group_blocks(lines);

    let mut dets: Vec<LayoutDet> = blocks
        .iter()
        .filter_map(|block| {
            let text = block.text();
            if text.is_empty() {
                return None;
            }
            let category = classify(block, &text, median_height, page);
            Some(LayoutDet::new(category, block.bbox, TEXT_LAYER_SCORE).with_text(text))
        })
        .collect();

    dets.extend(
        page_text
            .images
            .iter()
            .filter(|b| b.width() >= MIN_FIGURE_SIDE && b.height() >= MIN_FIGURE_SIDE)
            .map(|b| LayoutDet::new(BlockCategory::Figure, *b, TEXT_LAYER_SCORE)),
    );
    dets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageInfo {
        PageInfo {
            page_no: 0,
            width: 600.0,
            height: 800.0,
        }
    }

    fn seg(x0: f32, y0: f32, x1: f32, y1: f32, text: &str) -> TextSegment {
        TextSegment::new(Bbox::new(x0, y0, x1, y1), text)
    }

    fn texts(dets: &[LayoutDet]) -> Vec<(BlockCategory, String)> {
        dets.iter()
            .map(|d| (d.category().unwrap(), d.text.clone().unwrap_or_default()))
            .collect()
    }

    #[test]
    fn pdf_rect_is_flipped_to_top_left() {
        let b = from_pdf_rect(10.0, 700.0, 110.0, 720.0, 800.0);
        assert_eq!(b, Bbox::new(10.0, 80.0, 110.0, 100.0));
    }

    #[test]
    fn segments_on_one_baseline_form_one_line() {
        let text = PageText {
            segments: vec![
                seg(200.0, 100.0, 260.0, 112.0, "world"),
                seg(100.0, 101.0, 195.0, 112.0, "hello"),
            ],
            images: vec![],
        };
        let dets = layout_from_text(&text, &page());
        assert_eq!(texts(&dets), vec![(BlockCategory::Text, "hello world".into())]);
    }

    #[test]
    fn touching_segments_are_not_spaced() {
        let text = PageText {
            segments: vec![
                seg(100.0, 100.0, 130.0, 112.0, "lay"),
                seg(130.0, 100.0, 160.0, 112.0, "out"),
            ],
            images: vec![],
        };
        assert_eq!(texts(&layout_from_text(&text, &page()))[0].1, "layout");
    }

    #[test]
    fn close_lines_form_a_block_and_gaps_split_blocks() {
        let text = PageText {
            segments: vec![
                seg(100.0, 100.0, 400.0, 112.0, "first line"),
                seg(100.0, 114.0, 400.0, 126.0, "second line"),
                seg(100.0, 200.0, 400.0, 212.0, "next paragraph"),
            ],
            images: vec![],
        };
        let dets = layout_from_text(&text, &page());
        assert_eq!(
            texts(&dets),
            vec![
                (BlockCategory::Text, "first line\nsecond line".into()),
                (BlockCategory::Text, "next paragraph".into()),
            ]
        );
    }

    #[test]
    fn columns_stay_separate() {
        let text = PageText {
            segments: vec![
                seg(50.0, 100.0, 280.0, 112.0, "left one"),
                seg(320.0, 100.0, 550.0, 112.0, "right one"),
                seg(50.0, 114.0, 280.0, 126.0, "left two"),
                seg(320.0, 114.0, 550.0, 126.0, "right two"),
            ],
            images: vec![],
        };
        let dets = layout_from_text(&text, &page());
        let got = texts(&dets);
        assert!(got.contains(&(BlockCategory::Text, "left one\nleft two".into())));
        assert!(got.contains(&(BlockCategory::Text, "right one\nright two".into())));
    }

    #[test]
    fn tall_single_line_is_a_title() {
        let text = PageText {
            segments: vec![
                seg(100.0, 80.0, 400.0, 104.0, "Introduction"),
                seg(100.0, 150.0, 400.0, 162.0, "body one"),
                seg(100.0, 200.0, 400.0, 212.0, "body two"),
            ],
            images: vec![],
        };
        let dets = layout_from_text(&text, &page());
        assert_eq!(dets[0].category(), Some(BlockCategory::Title));
        assert_eq!(dets[1].category(), Some(BlockCategory::Text));
    }

    #[test]
    fn short_margin_blocks_are_abandoned() {
        let text = PageText {
            segments: vec![
                seg(280.0, 10.0, 320.0, 22.0, "Header"),
                seg(100.0, 300.0, 400.0, 312.0, "body"),
                seg(290.0, 780.0, 310.0, 792.0, "7"),
            ],
            images: vec![],
        };
        let cats: Vec<_> = layout_from_text(&text, &page())
            .iter()
            .map(|d| d.category().unwrap())
            .collect();
        assert_eq!(
            cats,
            vec![
                BlockCategory::Abandon,
                BlockCategory::Text,
                BlockCategory::Abandon
            ]
        );
    }

    #[test]
    fn image_objects_become_figures() {
        let text = PageText {
            segments: vec![],
            images: vec![Bbox::new(50.0, 50.0, 300.0, 250.0), Bbox::new(0.0, 0.0, 2.0, 2.0)],
        };
        let dets = layout_from_text(&text, &page());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].category(), Some(BlockCategory::Figure));
    }

    #[test]
    fn char_count_ignores_whitespace() {
        let text = PageText {
            segments: vec![seg(0.0, 0.0, 1.0, 1.0, "a b\n c")],
            images: vec![],
        };
        assert_eq!(text.char_count(), 3);
    }
}
