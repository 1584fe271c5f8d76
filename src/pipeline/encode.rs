//! Image encoding for the two places rendered pages leave the process:
//! base64 PNG attachments for the vision model, and JPEG crops of figures
//! and tables written next to the markdown.
//!
//! PNG is used for the model because it is lossless; JPEG artefacts on
//! rendered text confuse vision models. Crops are only looked at by people,
//! so they are stored as JPEG.

use crate::layout::{Bbox, PageImage};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// JPEG quality used for figure and table crops.
pub const CROP_JPEG_QUALITY: u8 = 90;

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
///
/// `detail: "high"` lets GPT-4-class models tile the image instead of
/// looking at a single 512 px overview, which loses fine print.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Cut the region `bbox` (in page points) out of a rendered page.
///
/// The box is scaled by the page's pixels-per-point factor and clamped to
/// the image; a box entirely outside the image yields a 1×1 crop.
pub fn crop_region(page: &PageImage, bbox: &Bbox) -> DynamicImage {
    let (w, h) = (page.image.width(), page.image.height());
    let to_px = |v: f32, max: u32| ((v * page.scale).round().max(0.0) as u32).min(max);

    let x0 = to_px(bbox.x0, w.saturating_sub(1));
    let y0 = to_px(bbox.y0, h.saturating_sub(1));
    let x1 = to_px(bbox.x1, w).max(x0 + 1);
    let y1 = to_px(bbox.y1, h).max(y0 + 1);

    page.image.crop_imm(x0, y0, x1 - x0, y1 - y0)
}

/// Encode a crop as JPEG bytes.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, CROP_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let data = encode_page(&red(10, 10)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[test]
    fn crop_scales_points_to_pixels() {
        let page = PageImage {
            image: red(200, 100),
            scale: 2.0,
        };
        let crop = crop_region(&page, &Bbox::new(10.0, 10.0, 60.0, 30.0));
        assert_eq!((crop.width(), crop.height()), (100, 40));
    }

    #[test]
    fn crop_is_clamped_to_the_image() {
        let page = PageImage {
            image: red(50, 50),
            scale: 1.0,
        };
        let crop = crop_region(&page, &Bbox::new(40.0, 40.0, 500.0, 500.0));
        assert_eq!((crop.width(), crop.height()), (10, 10));

        let outside = crop_region(&page, &Bbox::new(900.0, 900.0, 950.0, 950.0));
        assert_eq!((outside.width(), outside.height()), (1, 1));
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let bytes = encode_jpeg(&red(8, 8)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
