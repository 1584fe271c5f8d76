//! End-to-end tests against the real pdfium collaborators.
//!
//! They need the pdfium shared library, so they are gated behind the
//! `E2E_ENABLED` environment variable and do not run in CI unless explicitly
//! requested. The OCR test additionally needs a vision LLM API key.
//!
//! Run with:
//!   E2E_ENABLED=1 LAYOUT_PDFIUM_LIB_PATH=./pdfium/lib cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e image_upload -- --nocapture

use axum::body::Body;
use axum::http::{Request, StatusCode};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use layout_service::pipeline::reader::PdfiumReader;
use layout_service::{
    router, AnalyzeBatch, AppState, Backend, BlockCategory, DocumentReader, PageRange,
    ParseMethod, ServiceConfig,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

fn pdfium_lib_path() -> Option<PathBuf> {
    std::env::var("LAYOUT_PDFIUM_LIB_PATH").ok().map(PathBuf::from)
}

fn config(temp_root: &Path) -> ServiceConfig {
    let mut builder = ServiceConfig::builder().temp_root(temp_root);
    if let Some(dir) = pdfium_lib_path() {
        builder = builder.pdfium_lib_path(dir);
    }
    builder.build().expect("valid config")
}

/// A white 400×300 PNG with a dark rectangle in the middle.
fn sample_png() -> Vec<u8> {
    let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    for y in 100..200 {
        for x in 100..300 {
            img.put_pixel(x, y, Rgb([20, 20, 20]));
        }
    }
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

fn multipart(filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "e2e-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// ── Reader ───────────────────────────────────────────────────────────────────

#[test]
fn image_is_wrapped_into_a_single_page_pdf() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    std::fs::write(&path, sample_png()).unwrap();

    let reader = PdfiumReader::new(pdfium_lib_path());
    let document = reader.read(&path).expect("read image");
    assert!(document.as_bytes().starts_with(b"%PDF"));

    let same = reader
        .trim_pages(&document, PageRange::new(0, None))
        .expect("trim full range");
    assert_eq!(same, document);

    let empty = reader
        .trim_pages(&document, PageRange::new(3, Some(1)))
        .expect("trim empty range");
    assert!(empty.as_bytes().starts_with(b"%PDF"));
}

#[test]
fn corrupt_pdf_is_rejected() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.pdf");
    std::fs::write(&path, b"this is not a pdf").unwrap();

    let err = PdfiumReader::new(pdfium_lib_path())
        .read(&path)
        .unwrap_err();
    assert!(err.to_string().contains("corrupt"), "{err}");
}

// ── Analyzer ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_analysis_of_an_image_page_finds_a_figure() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    std::fs::write(&path, sample_png()).unwrap();

    let config = config(dir.path());
    let backend = Backend::pdfium(&config.analyzer);
    let document = backend.reader.read(&path).expect("read image");

    let batch = AnalyzeBatch::single(document, "en", ParseMethod::Txt, true, true);
    let results = backend.analyzer.analyze(batch).await.expect("analyze");
    assert_eq!(results.len(), 1);

    let analysis = &results[0];
    assert_eq!(analysis.page_count(), 1);
    assert!(!analysis.ocr_enabled);
    let info = analysis.inference[0].page_info;
    assert!((info.width - 400.0).abs() < 1.0, "width {}", info.width);
    assert!((info.height - 300.0).abs() < 1.0, "height {}", info.height);
    assert!(analysis.inference[0]
        .layout_dets
        .iter()
        .any(|d| d.category() == Some(BlockCategory::Figure)));
}

#[tokio::test]
async fn ocr_analysis_returns_page_detections() {
    e2e_skip_unless_enabled!();
    if std::env::var("OPENAI_API_KEY").is_err()
        && std::env::var("ANTHROPIC_API_KEY").is_err()
        && std::env::var("GEMINI_API_KEY").is_err()
    {
        println!("SKIP: no vision LLM API key set");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    std::fs::write(&path, sample_png()).unwrap();

    let config = config(dir.path());
    let backend = Backend::pdfium(&config.analyzer);
    let document = backend.reader.read(&path).expect("read image");

    let batch = AnalyzeBatch::single(document, "en", ParseMethod::Ocr, true, true);
    let results = backend.analyzer.analyze(batch).await.expect("analyze");
    assert_eq!(results.len(), 1);
    assert!(results[0].ocr_enabled);
    assert_eq!(results[0].inference.len(), 1);
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_upload_round_trips_through_the_server() {
    e2e_skip_unless_enabled!();
    let temp_root = tempfile::tempdir().unwrap();
    let config = config(temp_root.path());
    let backend = Backend::pdfium(&config.analyzer);
    let app = router(AppState::new(config, backend));

    let (content_type, body) = multipart("scan.PNG", &sample_png());
    let request = Request::builder()
        .method("POST")
        .uri("/analyze_layout/?parse_method=txt")
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    println!("{}", serde_json::to_string_pretty(&json).unwrap());

    assert_eq!(status, StatusCode::OK);
    let results = &json["analysis_results"];
    assert_eq!(results["middle_json"]["pdf_info"].as_array().unwrap().len(), 1);
    assert!(results["markdown"].as_str().unwrap().contains("![](images/"));
    assert_eq!(std::fs::read_dir(temp_root.path()).unwrap().count(), 0);
}
