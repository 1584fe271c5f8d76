//! The request orchestrator.
//!
//! [`parse_document`] runs the collaborators in a fixed order on exactly
//! one document:
//!
//! 1. trim the requested page range out of the normalised bytes;
//! 2. analyse the trimmed document as a single-element batch;
//! 3. compose the first result into `middle_json`, writing crops under
//!    `<output_dir>/<stem>/<method>/images`;
//! 4. render markdown;
//! 5. render the content list.
//!
//! Nothing is retried. An analyzer that returns no result, or a result
//! without pages, fails the request with
//! [`LayoutError::AnalysisProducedNothing`].

use crate::config::ParseOptions;
use crate::error::LayoutError;
use crate::layout::{AnalyzeBatch, NormalizedDocument};
use crate::output::AnalysisResult;
use crate::pipeline::compose::result_to_middle_json;
use crate::pipeline::mkcontent::{make_content_list, make_markdown};
use crate::pipeline::{blocking, Backend};
use crate::upload::{file_stem, prepare_env};
use crate::writer::FileImageWriter;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Analyse one document and build all four artifacts.
///
/// `output_dir` must outlive the call only; the caller owns its cleanup.
pub async fn parse_document(
    backend: &Backend,
    output_dir: &Path,
    file_name: &str,
    document: NormalizedDocument,
    options: &ParseOptions,
) -> Result<AnalysisResult, LayoutError> {
    let reader = Arc::clone(&backend.reader);
    let range = options.page_range;
    let trimmed = blocking("page trimming", move || reader.trim_pages(&document, range)).await?;
    debug!("Trimmed document to {} bytes ({:?})", trimmed.len(), range);

    let batch = AnalyzeBatch::single(
        trimmed,
        options.lang.clone(),
        options.parse_method,
        options.formula_enable,
        options.table_enable,
    );
    let results = backend.analyzer.analyze(batch).await?;
    if results.len() > 1 {
        warn!(
            "Analyzer returned {} results for a single document; using the first",
            results.len()
        );
    }
    let analysis = results
        .into_iter()
        .next()
        .filter(|a| a.page_count() > 0)
        .ok_or(LayoutError::AnalysisProducedNothing)?;

    let stem = file_stem(file_name);
    let (image_dir, md_dir) = prepare_env(output_dir, &stem, options.parse_method)?;
    debug!("Writing images to {}", image_dir.display());
    let img_dir_name = image_dir
        .strip_prefix(&md_dir)
        .ok()
        .and_then(|p| p.to_str())
        .unwrap_or("images")
        .to_string();

    let formula_enable = options.formula_enable;
    let make_md_mode = options.make_md_mode;
    let result = blocking("composition", move || {
        let writer = FileImageWriter::new(image_dir);
        let middle_json = result_to_middle_json(&analysis, &writer, formula_enable)?;
        let markdown = make_markdown(&middle_json.pdf_info, make_md_mode, &img_dir_name);
        let content_list_json = make_content_list(&middle_json.pdf_info, &img_dir_name);
        Ok(AnalysisResult {
            middle_json,
            model_json: analysis.inference,
            content_list_json,
            markdown,
        })
    })
    .await?;

    info!("Layout analysis complete for {}", file_name);
    Ok(result)
}
