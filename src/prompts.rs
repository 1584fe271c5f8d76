//! System prompts for VLM-based layout OCR.
//!
//! Keeping every prompt here means a change to what the model is asked for
//! touches one place, and unit tests can inspect the prompt text without a
//! real model. Callers can override the base prompt through
//! [`crate::config::AnalyzerConfig::system_prompt`]; the per-request
//! instructions from [`build_layout_prompt`] are appended either way.

/// Default system prompt for turning a page image into layout blocks.
pub const DEFAULT_LAYOUT_PROMPT: &str = r#"You are an expert document layout analyser. You receive the image of one document page and return every content region on it.

Follow these rules precisely:

1. REGIONS
   - Return one entry per visually distinct region, in natural reading order
   - Use exactly one of these types:
     title, text, abandon, figure, figure_caption, table, table_caption,
     table_footnote, interline_equation, equation_caption
   - Use "abandon" for page headers, page footers and page numbers

2. COORDINATES
   - "bbox" is [x0, y0, x1, y1] with the origin at the top-left corner
   - Coordinates are normalised to 0-1000 on both axes, independent of the
     image size

3. CONTENT
   - Text regions: the exact text, preserving line breaks inside the region
   - Figures: an empty string

4. OUTPUT FORMAT
   - Output ONLY a JSON array of objects with keys "type", "bbox", "content"
   - Do NOT wrap the array in fences
   - Do NOT add commentary or explanations"#;

/// Per-request instructions appended to the system prompt.
pub fn build_layout_prompt(lang: &str, formula_enable: bool, table_enable: bool) -> String {
    let mut extra = Vec::new();

    extra.push(format!(
        "The document language is \"{lang}\". Transcribe text in that language; do not translate."
    ));
    if formula_enable {
        extra.push(
            "For interline_equation regions, put the formula as LaTeX without $ delimiters in \"content\"."
                .to_string(),
        );
    } else {
        extra.push("For interline_equation regions, leave \"content\" empty.".to_string());
    }
    if table_enable {
        extra.push(
            "For table regions, put the table as a single HTML <table> element in \"content\"."
                .to_string(),
        );
    } else {
        extra.push("For table regions, leave \"content\" empty.".to_string());
    }

    format!("\n\n5. THIS DOCUMENT\n   - {}", extra.join("\n   - "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BlockCategory;

    #[test]
    fn default_prompt_lists_every_category() {
        for cat in BlockCategory::ALL {
            assert!(
                DEFAULT_LAYOUT_PROMPT.contains(cat.name()),
                "prompt is missing {}",
                cat.name()
            );
        }
    }

    #[test]
    fn layout_prompt_follows_toggles() {
        let on = build_layout_prompt("de", true, true);
        assert!(on.contains("\"de\""));
        assert!(on.contains("LaTeX"));
        assert!(on.contains("<table>"));

        let off = build_layout_prompt("en", false, false);
        assert!(!off.contains("LaTeX"));
        assert!(!off.contains("<table>"));
    }
}
