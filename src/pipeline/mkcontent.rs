//! Rendering of `middle_json` into markdown and a flat content list.

use crate::config::MakeMode;
use crate::middle::{BlockKind, ContentItem, PageLayout, ParaBlock, SpanKind};

/// Render the pages as markdown.
///
/// `img_dir` is the path prefix image links are written with, normally the
/// name of the image directory relative to the markdown file.
/// [`MakeMode::NlpMd`] drops images and image-only tables; captions of
/// kept tables survive in both modes. [`MakeMode::ContentList`] renders like
/// [`MakeMode::MmMd`].
pub fn make_markdown(pdf_info: &[PageLayout], mode: MakeMode, img_dir: &str) -> String {
    let with_images = mode != MakeMode::NlpMd;
    pdf_info
        .iter()
        .flat_map(|page| page.para_blocks.iter())
        .filter_map(|block| block_markdown(block, with_images, img_dir))
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Flatten the pages into content items, in reading order.
pub fn make_content_list(pdf_info: &[PageLayout], img_dir: &str) -> Vec<ContentItem> {
    pdf_info
        .iter()
        .flat_map(|page| {
            page.para_blocks
                .iter()
                .filter_map(move |block| content_item(block, page.page_idx, img_dir))
        })
        .collect()
}

fn image_link(img_dir: &str, name: &str) -> String {
    if img_dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", img_dir.trim_end_matches('/'), name)
    }
}

fn single_line(block: &ParaBlock) -> String {
    block.text().lines().map(str::trim).collect::<Vec<_>>().join(" ")
}

fn block_markdown(block: &ParaBlock, with_images: bool, img_dir: &str) -> Option<String> {
    match block.kind {
        BlockKind::Title => {
            let level = block.level.unwrap_or(1).clamp(1, 6) as usize;
            Some(format!("{} {}", "#".repeat(level), single_line(block)))
        }
        BlockKind::Text => Some(block.text()),
        BlockKind::InterlineEquation => {
            let span = block.find_span(SpanKind::InterlineEquation)?;
            match (&span.content, &span.image_path) {
                (Some(latex), _) => Some(format!("$$\n{}\n$$", latex.trim())),
                (None, Some(path)) if with_images => {
                    Some(format!("![]({})", image_link(img_dir, path)))
                }
                _ => None,
            }
        }
        BlockKind::Image => {
            if !with_images {
                return None;
            }
            let mut parts = Vec::new();
            if let Some(path) = block
                .find_span(SpanKind::Image)
                .and_then(|s| s.image_path.as_deref())
            {
                parts.push(format!("![]({})", image_link(img_dir, path)));
            }
            parts.extend(block.child_texts(BlockKind::ImageCaption));
            parts.extend(block.child_texts(BlockKind::ImageFootnote));
            Some(parts.join("\n"))
        }
        BlockKind::Table => {
            let span = block.find_span(SpanKind::Table);
            let html = span.and_then(|s| s.html.as_deref());
            let path = span.and_then(|s| s.image_path.as_deref());
            if html.is_none() && !with_images {
                return None;
            }
            let mut parts = block.child_texts(BlockKind::TableCaption);
            match (html, path) {
                (Some(html), _) => parts.push(html.to_string()),
                (None, Some(path)) => parts.push(format!("![]({})", image_link(img_dir, path))),
                (None, None) => {}
            }
            parts.extend(block.child_texts(BlockKind::TableFootnote));
            Some(parts.join("\n"))
        }
        _ => None,
    }
}

fn content_item(block: &ParaBlock, page_idx: usize, img_dir: &str) -> Option<ContentItem> {
    let path_of = |kind: SpanKind| {
        block
            .find_span(kind)
            .and_then(|s| s.image_path.as_deref())
            .map(|p| image_link(img_dir, p))
            .unwrap_or_default()
    };

    match block.kind {
        BlockKind::Title | BlockKind::Text => {
            let text = if block.kind == BlockKind::Title {
                single_line(block)
            } else {
                block.text()
            };
            if text.trim().is_empty() {
                return None;
            }
            Some(ContentItem::Text {
                text,
                text_level: block.level.filter(|_| block.kind == BlockKind::Title),
                page_idx,
            })
        }
        BlockKind::InterlineEquation => {
            let span = block.find_span(SpanKind::InterlineEquation)?;
            match &span.content {
                Some(latex) => Some(ContentItem::Equation {
                    text: format!("$$\n{}\n$$", latex.trim()),
                    text_format: "latex".to_string(),
                    page_idx,
                }),
                None => span.image_path.as_ref().map(|_| ContentItem::Image {
                    img_path: path_of(SpanKind::InterlineEquation),
                    image_caption: Vec::new(),
                    image_footnote: Vec::new(),
                    page_idx,
                }),
            }
        }
        BlockKind::Image => Some(ContentItem::Image {
            img_path: path_of(SpanKind::Image),
            image_caption: block.child_texts(BlockKind::ImageCaption),
            image_footnote: block.child_texts(BlockKind::ImageFootnote),
            page_idx,
        }),
        BlockKind::Table => Some(ContentItem::Table {
            img_path: path_of(SpanKind::Table),
            table_caption: block.child_texts(BlockKind::TableCaption),
            table_footnote: block.child_texts(BlockKind::TableFootnote),
            table_body: block.find_span(SpanKind::Table).and_then(|s| s.html.clone()),
            page_idx,
        }),
        _ => None,
    }
}
