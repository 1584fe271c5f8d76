//! pdfium binding and page rasterisation.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and serialises access internally when the `thread_safe` feature is
//! on. Every function here blocks; the async callers move them onto tokio's
//! blocking pool so request tasks never stall a worker thread.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, which keeps memory bounded and stays within
//! what vision models accept.

use crate::error::LayoutError;
use crate::layout::PageImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Bind pdfium from `lib_dir`, or from the system library when `None`.
pub fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, LayoutError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| LayoutError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Page width and height in points.
pub fn page_size(page: &PdfPage<'_>) -> (f32, f32) {
    (page.width().value, page.height().value)
}

/// Rasterise one page with its longest edge capped at `max_pixels`.
///
/// `page_no` is 0-based and only used for error reporting.
pub fn render_page(
    page: &PdfPage<'_>,
    page_no: usize,
    max_pixels: u32,
) -> Result<PageImage, LayoutError> {
    let (width_pt, height_pt) = page_size(page);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| LayoutError::RasterisationFailed {
            page: page_no + 1,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    let scale = if width_pt > 0.0 {
        image.width() as f32 / width_pt
    } else {
        1.0
    };
    debug!(
        "Rendered page {} ({:.0}x{:.0} pt) → {}x{} px",
        page_no + 1,
        width_pt,
        height_pt,
        image.width(),
        image.height()
    );

    Ok(PageImage { image, scale })
}
