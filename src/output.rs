//! Response payloads.

use crate::layout::PageInference;
use crate::middle::{ContentItem, MiddleJson};
use serde::{Deserialize, Serialize};

/// The four artifacts produced for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub middle_json: MiddleJson,
    pub model_json: Vec<PageInference>,
    pub content_list_json: Vec<ContentItem>,
    pub markdown: String,
}

/// Body of a successful `POST /analyze_layout/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub filename: String,
    pub analysis_results: AnalysisResult,
}
