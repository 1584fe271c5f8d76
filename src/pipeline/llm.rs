//! VLM interaction: send a page image, get layout regions back.
//!
//! All prompt text lives in [`crate::prompts`]; this module owns the call,
//! the retry loop and the translation of the model's JSON reply into
//! [`LayoutDet`]s.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids a thundering herd: with 500 ms base and 3 retries the wait
//! sequence is 500 ms → 1 s → 2 s.
//!
//! Unlike a plain transcription, a page that still fails after the last
//! retry fails the whole document: a layout result with a silently missing
//! page would be a partial result.

use crate::config::AnalyzerConfig;
use crate::error::LayoutError;
use crate::layout::{Bbox, BlockCategory, LayoutDet, PageInfo};
use crate::pipeline::postprocess::{clean_block_text, clean_model_output};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Side of the square coordinate space the model reports boxes in.
pub const NORMALISED_EXTENT: f32 = 1000.0;

/// Score attached to regions reported by the model.
const VLM_SCORE: f32 = 1.0;

/// Longest wait between two VLM attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Run layout OCR on one rendered page.
///
/// The request holds the system prompt followed by a user turn carrying the
/// page PNG. The empty user text is intentional: the image carries all of
/// the content.
pub async fn ocr_page(
    provider: &Arc<dyn LLMProvider>,
    page: &PageInfo,
    image_data: ImageData,
    system_prompt: &str,
    config: &AnalyzerConfig,
) -> Result<Vec<LayoutDet>, LayoutError> {
    let start = Instant::now();
    let page_num = page.page_no + 1;
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images("", vec![image_data]),
    ];
    let options = build_options(config);

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {:?}",
                    page_num,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(parse_layout_response(&response.content, page));
            }
            Err(e) => {
                let err_msg = format!("{}", e);
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(LayoutError::OcrFailed {
        page: page_num,
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Build `CompletionOptions` from the analyzer config.
/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at [`MAX_BACKOFF_MS`].
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

fn build_options(config: &AnalyzerConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize)]
struct VlmRegion {
    #[serde(rename = "type", alias = "category")]
    kind: String,
    bbox: [f32; 4],
    #[serde(default, alias = "text")]
    content: Option<String>,
}

/// Translate the model's reply into layout detections in page points.
///
/// The reply should be a JSON array of `{type, bbox, content}` objects with
/// boxes on a 0-1000 grid. Prose around the array is tolerated. When no
/// array can be recovered the whole reply becomes one text block spanning
/// the page; an empty reply yields no detections.
pub fn parse_layout_response(content: &str, page: &PageInfo) -> Vec<LayoutDet> {
    let cleaned = clean_model_output(content);

    match extract_regions(&cleaned) {
        Some(regions) => regions
            .into_iter()
            .filter_map(|r| region_to_det(r, page))
            .collect(),
        None => {
            let text = clean_block_text(&cleaned);
            if text.is_empty() {
                return Vec::new();
            }
            debug!(
                "Page {}: reply is not a region list, using it as one text block",
                page.page_no + 1
            );
            let bbox = Bbox::new(0.0, 0.0, page.width, page.height);
            vec![LayoutDet::new(BlockCategory::Text, bbox, VLM_SCORE).with_text(text)]
        }
    }
}

fn extract_regions(cleaned: &str) -> Option<Vec<VlmRegion>> {
    if let Ok(regions) = serde_json::from_str::<Vec<VlmRegion>>(cleaned) {
        return Some(regions);
    }
    let start = cleaned.find('[')?;
    let end = cleaned.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<VlmRegion>>(&cleaned[start..=end]).ok()
}

fn region_to_det(region: VlmRegion, page: &PageInfo) -> Option<LayoutDet> {
    let category = BlockCategory::from_label(&region.kind).unwrap_or(BlockCategory::Text);
    let scale = |v: f32, extent: f32| v.clamp(0.0, NORMALISED_EXTENT) / NORMALISED_EXTENT * extent;
    let [x0, y0, x1, y1] = region.bbox;
    let bbox = Bbox::new(
        scale(x0, page.width),
        scale(y0, page.height),
        scale(x1, page.width),
        scale(y1, page.height),
    );
    if bbox.area() <= 0.0 {
        return None;
    }

    let det = LayoutDet::new(category, bbox, VLM_SCORE);
    let content = region
        .content
        .map(|c| clean_block_text(&c))
        .filter(|c| !c.is_empty());

    Some(match (category, content) {
        (BlockCategory::Figure, _) | (_, None) => det,
        (BlockCategory::InterlineEquation, Some(c)) => det.with_latex(strip_math_delimiters(&c)),
        (BlockCategory::Table, Some(c)) if c.contains("<table") => det.with_html(c),
        (BlockCategory::Table, Some(_)) => det,
        (_, Some(c)) => det.with_text(c),
    })
}

fn strip_math_delimiters(latex: &str) -> String {
    let t = latex.trim();
    let t = t
        .strip_prefix("$$")
        .and_then(|s| s.strip_suffix("$$"))
        .or_else(|| t.strip_prefix("\\[").and_then(|s| s.strip_suffix("\\]")))
        .unwrap_or(t);
    t.trim().to_string()
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

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&AnalyzerConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 65), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, 2), MAX_BACKOFF_MS);
    }

    #[test]
    fn parses_fenced_region_list() {
        let reply = r#"```json
[
  {"type": "title", "bbox": [100, 50, 900, 100], "content": "Results"},
  {"type": "text", "bbox": [100, 120, 900, 300], "content": "We measured things."},
  {"type": "figure", "bbox": [100, 320, 900, 600], "content": ""}
]
```"#;
        let dets = parse_layout_response(reply, &page());
        assert_eq!(dets.len(), 3);
        assert_eq!(dets[0].category(), Some(BlockCategory::Title));
        assert_eq!(dets[0].text.as_deref(), Some("Results"));
        assert_eq!(dets[0].bbox(), Bbox::new(60.0, 40.0, 540.0, 80.0));
        assert_eq!(dets[2].category(), Some(BlockCategory::Figure));
        assert!(dets[2].text.is_none());
    }

    #[test]
    fn equation_and_table_payloads() {
        let reply = r#"[
  {"type": "equation", "bbox": [0, 0, 1000, 100], "content": "$$E = mc^2$$"},
  {"type": "table", "bbox": [0, 200, 1000, 400], "content": "<table><tr><td>1</td></tr></table>"},
  {"type": "table", "bbox": [0, 500, 1000, 600], "content": "| a | b |"}
]"#;
        let dets = parse_layout_response(reply, &page());
        assert_eq!(dets[0].category(), Some(BlockCategory::InterlineEquation));
        assert_eq!(dets[0].latex.as_deref(), Some("E = mc^2"));
        assert!(dets[1].html.as_deref().unwrap().starts_with("<table>"));
        assert!(dets[2].html.is_none() && dets[2].text.is_none());
    }

    #[test]
    fn tolerates_prose_around_the_array() {
        let reply = "Here are the regions:\n[{\"type\": \"text\", \"bbox\": [0, 0, 500, 500], \"content\": \"hi\"}]\nDone.";
        let dets = parse_layout_response(reply, &page());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn unknown_types_become_text_and_degenerate_boxes_are_dropped() {
        let reply = r#"[
  {"type": "sidebar", "bbox": [0, 0, 500, 500], "content": "aside"},
  {"type": "text", "bbox": [10, 10, 10, 400], "content": "zero width"}
]"#;
        let dets = parse_layout_response(reply, &page());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].category(), Some(BlockCategory::Text));
    }

    #[test]
    fn unparseable_reply_becomes_one_page_block() {
        let dets = parse_layout_response("# Heading\r\n\nJust markdown.  ", &page());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox(), Bbox::new(0.0, 0.0, 600.0, 800.0));
        assert_eq!(dets[0].text.as_deref(), Some("# Heading\n\nJust markdown."));
    }

    #[test]
    fn empty_reply_yields_nothing() {
        assert!(parse_layout_response("  \n", &page()).is_empty());
    }
}
