//! Composition: raw page inference → `middle_json`.
//!
//! For every page the detections are put in reading order (top to bottom,
//! then left to right) and turned into paragraph blocks:
//!
//! | category                     | becomes                                        |
//! |------------------------------|------------------------------------------------|
//! | title                        | `title` block, `level` 1                       |
//! | text, equation_caption       | `text` block                                   |
//! | abandon                      | entry in `discarded_blocks`                    |
//! | figure (+ figure_caption)    | `image` block with body and caption children   |
//! | table (+ caption/footnote)   | `table` block with body, caption and footnotes |
//! | interline_equation           | `interline_equation` block, LaTeX or crop      |
//!
//! Captions and footnotes attach to the vertically nearest figure or table;
//! when there is none they stay on the page as plain text. Figure, table and
//! image-only equation regions are cropped from the rendered page and handed
//! to the [`ImageWriter`] as `p{page}_b{index}.jpg`.

use crate::error::LayoutError;
use crate::layout::{Bbox, BlockCategory, DocumentAnalysis, LayoutDet, PageImage, PageInference};
use crate::middle::{BlockKind, Line, MiddleJson, PageLayout, ParaBlock, Span, SpanKind};
use crate::pipeline::encode::{crop_region, encode_jpeg};
use crate::writer::ImageWriter;
use std::path::PathBuf;
use tracing::debug;

/// Value of `_backend` in every composed document.
pub const BACKEND_NAME: &str = "pipeline";

/// Compose the analysis of one document into `middle_json`.
pub fn result_to_middle_json(
    analysis: &DocumentAnalysis,
    image_writer: &dyn ImageWriter,
    formula_enable: bool,
) -> Result<MiddleJson, LayoutError> {
    let pdf_info = analysis
        .inference
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            compose_page(
                idx,
                page,
                analysis.images.get(idx),
                image_writer,
                formula_enable,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MiddleJson {
        pdf_info,
        backend: BACKEND_NAME.to_string(),
        parse_type: if analysis.ocr_enabled { "ocr" } else { "txt" }.to_string(),
        lang: analysis.lang.clone(),
        version_name: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// A detection in reading order, with its position used as block index.
struct Region<'a> {
    index: usize,
    category: BlockCategory,
    bbox: Bbox,
    det: &'a LayoutDet,
}

fn compose_page(
    page_idx: usize,
    page: &PageInference,
    image: Option<&PageImage>,
    writer: &dyn ImageWriter,
    formula_enable: bool,
) -> Result<PageLayout, LayoutError> {
    let mut sorted: Vec<&LayoutDet> = page.layout_dets.iter().collect();
    sorted.sort_by(|a, b| {
        let (ba, bb) = (a.bbox(), b.bbox());
        ba.y0.total_cmp(&bb.y0).then(ba.x0.total_cmp(&bb.x0))
    });
    let regions: Vec<Region<'_>> = sorted
        .into_iter()
        .enumerate()
        .map(|(index, det)| Region {
            index,
            category: det.category().unwrap_or(BlockCategory::Text),
            bbox: det.bbox(),
            det,
        })
        .collect();

    let crop = |region: &Region<'_>| -> Result<Option<String>, LayoutError> {
        let Some(image) = image else {
            return Ok(None);
        };
        let name = format!("p{}_b{}.jpg", page_idx, region.index);
        let bytes = encode_jpeg(&crop_region(image, &region.bbox)).map_err(|e| {
            LayoutError::ImageWriteFailed {
                path: PathBuf::from(&name),
                source: std::io::Error::other(e.to_string()),
            }
        })?;
        writer.write(&name, &bytes)?;
        Ok(Some(name))
    };

    // Captions and footnotes first find their owner.
    let owner_of = |region: &Region<'_>| -> Option<usize> {
        let wanted = match region.category {
            BlockCategory::FigureCaption => BlockCategory::Figure,
            BlockCategory::TableCaption | BlockCategory::TableFootnote => BlockCategory::Table,
            _ => return None,
        };
        regions
            .iter()
            .filter(|r| r.category == wanted)
            .min_by(|a, b| {
                region
                    .bbox
                    .vertical_distance(&a.bbox)
                    .total_cmp(&region.bbox.vertical_distance(&b.bbox))
            })
            .map(|r| r.index)
    };
    let owners: Vec<Option<usize>> = regions.iter().map(owner_of).collect();

    let mut para_blocks = Vec::new();
    let mut discarded_blocks = Vec::new();

    for region in &regions {
        match region.category {
            BlockCategory::Abandon => {
                discarded_blocks.push(text_block(BlockKind::Discarded, region));
            }
            BlockCategory::Title => {
                let mut block = text_block(BlockKind::Title, region);
                block.level = Some(1);
                para_blocks.push(block);
            }
            BlockCategory::Text | BlockCategory::EquationCaption => {
                para_blocks.push(text_block(BlockKind::Text, region));
            }
            BlockCategory::FigureCaption
            | BlockCategory::TableCaption
            | BlockCategory::TableFootnote => {
                if owners[region.index].is_none() {
                    para_blocks.push(text_block(BlockKind::Text, region));
                }
            }
            BlockCategory::InterlineEquation => {
                let latex = region
                    .det
                    .latex
                    .as_deref()
                    .filter(|l| formula_enable && !l.trim().is_empty());
                let span = match latex {
                    Some(latex) => Span::text(SpanKind::InterlineEquation, region.bbox, latex),
                    None => Span::image(SpanKind::InterlineEquation, region.bbox, crop(region)?),
                };
                let mut block = ParaBlock::new(BlockKind::InterlineEquation, region.bbox, region.index);
                block.lines.push(Line {
                    bbox: region.bbox,
                    spans: vec![span],
                });
                para_blocks.push(block);
            }
            BlockCategory::Figure | BlockCategory::Table => {
                let is_table = region.category == BlockCategory::Table;
                let (outer, body_kind, span_kind) = if is_table {
                    (BlockKind::Table, BlockKind::TableBody, SpanKind::Table)
                } else {
                    (BlockKind::Image, BlockKind::ImageBody, SpanKind::Image)
                };

                let mut span = Span::image(span_kind, region.bbox, crop(region)?);
                if is_table {
                    span.html = region.det.html.clone();
                }
                let mut body = ParaBlock::new(body_kind, region.bbox, region.index);
                body.lines.push(Line {
                    bbox: region.bbox,
                    spans: vec![span],
                });

                let mut block = ParaBlock::new(outer, region.bbox, region.index);
                block.blocks.push(body);
                for (child, owner) in regions.iter().zip(&owners) {
                    if *owner != Some(region.index) {
                        continue;
                    }
                    let kind = match child.category {
                        BlockCategory::FigureCaption => BlockKind::ImageCaption,
                        BlockCategory::TableCaption => BlockKind::TableCaption,
                        _ => BlockKind::TableFootnote,
                    };
                    block.bbox = block.bbox.union(&child.bbox);
                    block.blocks.push(text_block(kind, child));
                }
                para_blocks.push(block);
            }
        }
    }

    debug!(
        "Page {}: {} blocks, {} discarded",
        page_idx + 1,
        para_blocks.len(),
        discarded_blocks.len()
    );

    Ok(PageLayout {
        page_idx,
        page_size: [page.page_info.width, page.page_info.height],
        para_blocks,
        discarded_blocks,
    })
}

/// A block whose lines are the text of `region`, one line per text line.
fn text_block(kind: BlockKind, region: &Region<'_>) -> ParaBlock {
    let mut block = ParaBlock::new(kind, region.bbox, region.index);
    let text = region.det.text.as_deref().unwrap_or_default();
    block.lines = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Line {
            bbox: region.bbox,
            spans: vec![Span::text(SpanKind::Text, region.bbox, l.trim())],
        })
        .collect();
    block
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::layout::{NormalizedDocument, PageInfo};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Mutex;

    /// Keeps written images in memory.
    #[derive(Default)]
    pub(crate) struct MemoryWriter {
        pub(crate) files: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MemoryWriter {
        pub(crate) fn names(&self) -> Vec<String> {
            self.files
                .lock()
                .unwrap()
                .iter()
                .map(|(n, _)| n.clone())
                .collect()
        }
    }

    impl ImageWriter for MemoryWriter {
        fn write(&self, name: &str, bytes: &[u8]) -> Result<(), LayoutError> {
            self.files
                .lock()
                .unwrap()
                .push((name.to_string(), bytes.to_vec()));
            Ok(())
        }
    }

    fn det(cat: BlockCategory, x0: f32, y0: f32, x1: f32, y1: f32) -> LayoutDet {
        LayoutDet::new(cat, Bbox::new(x0, y0, x1, y1), 1.0)
    }

    fn analysis(dets: Vec<LayoutDet>) -> DocumentAnalysis {
        DocumentAnalysis {
            inference: vec![PageInference {
                layout_dets: dets,
                page_info: PageInfo {
                    page_no: 0,
                    width: 100.0,
                    height: 200.0,
                },
            }],
            images: vec![PageImage {
                image: DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 200, Rgb([255, 255, 255]))),
                scale: 1.0,
            }],
            document: NormalizedDocument::new(b"%PDF".to_vec()),
            lang: "en".into(),
            ocr_enabled: false,
        }
    }

    #[test]
    fn blocks_follow_reading_order() {
        let a = analysis(vec![
            det(BlockCategory::Text, 10.0, 100.0, 90.0, 120.0).with_text("second"),
            det(BlockCategory::Title, 10.0, 10.0, 90.0, 30.0).with_text("Heading"),
            det(BlockCategory::Abandon, 40.0, 190.0, 60.0, 198.0).with_text("3"),
        ]);
        let writer = MemoryWriter::default();
        let middle = result_to_middle_json(&a, &writer, true).unwrap();

        assert_eq!(middle.backend, "pipeline");
        assert_eq!(middle.parse_type, "txt");
        let page = &middle.pdf_info[0];
        assert_eq!(page.page_size, [100.0, 200.0]);
        let kinds: Vec<_> = page.para_blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Title, BlockKind::Text]);
        assert_eq!(page.para_blocks[0].level, Some(1));
        assert_eq!(page.para_blocks[1].text(), "second");
        assert_eq!(page.discarded_blocks.len(), 1);
        assert!(writer.names().is_empty());
    }

    #[test]
    fn figure_gets_crop_and_nearest_caption() {
        let a = analysis(vec![
            det(BlockCategory::Figure, 10.0, 20.0, 90.0, 80.0),
            det(BlockCategory::FigureCaption, 10.0, 82.0, 90.0, 90.0).with_text("Figure 1"),
            det(BlockCategory::Text, 10.0, 150.0, 90.0, 170.0).with_text("body"),
        ]);
        let writer = MemoryWriter::default();
        let middle = result_to_middle_json(&a, &writer, true).unwrap();

        let blocks = &middle.pdf_info[0].para_blocks;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Image);
        assert_eq!(blocks[0].child_texts(BlockKind::ImageCaption), vec!["Figure 1"]);
        let span = blocks[0].find_span(SpanKind::Image).unwrap();
        assert_eq!(span.image_path.as_deref(), Some("p0_b0.jpg"));
        assert_eq!(writer.names(), vec!["p0_b0.jpg"]);
        let (_, bytes) = &writer.files.lock().unwrap()[0];
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn orphan_caption_stays_as_text() {
        let a = analysis(vec![
            det(BlockCategory::TableCaption, 10.0, 10.0, 90.0, 20.0).with_text("Table 9"),
        ]);
        let middle = result_to_middle_json(&a, &MemoryWriter::default(), true).unwrap();
        let blocks = &middle.pdf_info[0].para_blocks;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Text);
        assert_eq!(blocks[0].text(), "Table 9");
    }

    #[test]
    fn table_keeps_html_and_footnote() {
        let a = analysis(vec![
            det(BlockCategory::TableCaption, 10.0, 10.0, 90.0, 18.0).with_text("Table 1"),
            det(BlockCategory::Table, 10.0, 20.0, 90.0, 80.0).with_html("<table></table>"),
            det(BlockCategory::TableFootnote, 10.0, 82.0, 90.0, 88.0).with_text("n = 3"),
        ]);
        let middle = result_to_middle_json(&a, &MemoryWriter::default(), true).unwrap();
        let blocks = &middle.pdf_info[0].para_blocks;
        assert_eq!(blocks.len(), 1);
        let table = &blocks[0];
        assert_eq!(table.kind, BlockKind::Table);
        assert_eq!(table.bbox, Bbox::new(10.0, 10.0, 90.0, 88.0));
        assert_eq!(table.child_texts(BlockKind::TableCaption), vec!["Table 1"]);
        assert_eq!(table.child_texts(BlockKind::TableFootnote), vec!["n = 3"]);
        let span = table.find_span(SpanKind::Table).unwrap();
        assert_eq!(span.html.as_deref(), Some("<table></table>"));
    }

    #[test]
    fn equations_fall_back_to_crops_without_formula_support() {
        let eq = det(BlockCategory::InterlineEquation, 10.0, 10.0, 90.0, 30.0).with_latex("a^2");

        let writer = MemoryWriter::default();
        let on = result_to_middle_json(&analysis(vec![eq.clone()]), &writer, true).unwrap();
        let span = on.pdf_info[0].para_blocks[0]
            .find_span(SpanKind::InterlineEquation)
            .unwrap();
        assert_eq!(span.content.as_deref(), Some("a^2"));
        assert!(writer.names().is_empty());

        let off = result_to_middle_json(&analysis(vec![eq]), &writer, false).unwrap();
        let span = off.pdf_info[0].para_blocks[0]
            .find_span(SpanKind::InterlineEquation)
            .unwrap();
        assert!(span.content.is_none());
        assert_eq!(span.image_path.as_deref(), Some("p0_b0.jpg"));
    }

    #[test]
    fn ocr_flag_sets_parse_type() {
        let mut a = analysis(vec![]);
        a.ocr_enabled = true;
        a.lang = "ch".into();
        let middle = result_to_middle_json(&a, &MemoryWriter::default(), true).unwrap();
        assert_eq!(middle.parse_type, "ocr");
        assert_eq!(middle.lang, "ch");
        assert_eq!(middle.version_name, env!("CARGO_PKG_VERSION"));
    }
}
