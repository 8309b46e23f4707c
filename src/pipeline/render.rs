//! Page Renderer: count pages and rasterise one page at a time via pdfium.
//!
//! ## spawn_blocking
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while rendering. Every call runs on the blocking pool so
//! the Tokio workers driving a batch never stall.
//!
//! ## One library per process
//!
//! Creating a `Pdfium` initialises the C library and dropping it tears the
//! library down, which would pull it out from under sibling pages still
//! rendering. The binding is made once, kept in a process-wide static and
//! never dropped. Each page task opens its own document against it; the
//! `thread_safe` feature serialises the calls.
//!
//! ## Pixel cap
//!
//! Registry bulletins mix A4 pages with oversized inserts. `max_rendered_pixels`
//! caps the longest edge regardless of DPI so one poster-sized page cannot
//! exhaust memory while nine siblings render next to it.

use crate::error::{PageError, ScanError};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rasterises pages of a staged PDF.
///
/// Page numbers are 1-based. Asking for page 0 or a page beyond
/// [`PageRenderer::page_count`] is [`PageError::PageOutOfRange`].
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document. Unreadable documents are fatal.
    async fn page_count(&self, pdf: &Path) -> Result<usize, ScanError>;

    /// Render one page. Failures only affect that page.
    async fn render_page(&self, pdf: &Path, page: usize) -> Result<DynamicImage, PageError>;
}

/// pdfium-backed [`PageRenderer`].
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32, max_pixels: u32) -> Self {
        Self { dpi, max_pixels }
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, ScanError> {
        let path = pdf.to_path_buf();
        tokio::task::spawn_blocking(move || page_count_blocking(&path))
            .await
            .map_err(|e| ScanError::Internal(format!("Page count task panicked: {}", e)))?
    }

    async fn render_page(&self, pdf: &Path, page: usize) -> Result<DynamicImage, PageError> {
        let path = pdf.to_path_buf();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);
        tokio::task::spawn_blocking(move || render_page_blocking(&path, page, dpi, max_pixels))
            .await
            .map_err(|e| PageError::RenderFailed {
                page,
                detail: format!("render task panicked: {}", e),
            })?
    }
}

static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// The process-wide pdfium binding, created on first use. A failed bind is
/// not cached, so a later call can succeed once the library is installed.
fn shared_pdfium() -> Result<&'static Pdfium, String> {
    PDFIUM.get_or_try_init(|| {
        let pdfium = bind_pdfium()?;
        info!("pdfium bound");
        Ok(pdfium)
    })
}

/// Bind pdfium: `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, String> {
    if let Ok(raw) = std::env::var("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(&raw);
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| format!("{e:?} (PDFIUM_LIB_PATH={raw})"));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| format!("{e:?}"))
}

fn load_error(path: &Path, err: PdfiumError) -> ScanError {
    let detail = format!("{:?}", err);
    if detail.contains("Password") || detail.contains("password") {
        ScanError::PasswordRequired {
            path: path.to_path_buf(),
        }
    } else {
        ScanError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

fn page_count_blocking(pdf_path: &Path) -> Result<usize, ScanError> {
    let pdfium = shared_pdfium().map_err(ScanError::PdfiumBindingFailed)?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| load_error(pdf_path, e))?;
    let total = document.pages().len() as usize;
    info!("PDF loaded: {} pages", total);
    Ok(total)
}

fn render_page_blocking(
    pdf_path: &Path,
    page: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, PageError> {
    let failed = |detail: String| PageError::RenderFailed { page, detail };

    let pdfium = shared_pdfium().map_err(failed)?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page == 0 || page > total {
        return Err(PageError::PageOutOfRange { page, total });
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| failed(format!("{:?}", e)))?;
    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page,
        image.width(),
        image.height()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pdfium_can_live_in_a_static() {
        assert_send_sync::<Pdfium>();
    }

    #[test]
    fn binding_is_shared_across_calls() {
        // Skips on machines without libpdfium.
        let Ok(first) = shared_pdfium() else {
            return;
        };
        let second = shared_pdfium().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[tokio::test]
    async fn page_zero_is_out_of_range_or_unbound() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("missing.pdf");
        let err = PdfiumRenderer::new(150, 2000)
            .render_page(&pdf, 0)
            .await
            .unwrap_err();
        // Without libpdfium the bind fails first; either way it stays a page error.
        assert!(matches!(
            err,
            PageError::RenderFailed { page: 0, .. } | PageError::PageOutOfRange { page: 0, .. }
        ));
    }
}
