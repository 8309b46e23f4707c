//! Logo Cropper: cut the logo region out of a rendered page and store it.
//!
//! Bounding boxes arrive on the model's 0–1000 scale. Pixel coordinates are
//! `round(n / 1000 * dimension)`, clamped to the image. A region that ends up
//! with no width or height yields no logo.

use crate::model::BoundingBox;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pixel rectangle `(left, top, width, height)` for `bbox` on a
/// `width × height` image, or `None` when the clamped region is empty.
pub fn crop_region(width: u32, height: u32, bbox: &BoundingBox) -> Option<(u32, u32, u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let (w, h) = (width as f64, height as f64);
    let to_px = |n: f64, dim: f64| (n / BoundingBox::SCALE * dim).round() as i64;

    let top = to_px(bbox.ymin, h);
    let left = to_px(bbox.xmin, w);
    let extract_h = to_px(bbox.ymax - bbox.ymin, h);
    let extract_w = to_px(bbox.xmax - bbox.xmin, w);

    let safe_top = top.max(0);
    let safe_left = left.max(0);
    let safe_h = extract_h.min(height as i64 - safe_top);
    let safe_w = extract_w.min(width as i64 - safe_left);

    if safe_w <= 0 || safe_h <= 0 {
        return None;
    }
    Some((
        safe_left as u32,
        safe_top as u32,
        safe_w as u32,
        safe_h as u32,
    ))
}

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());

/// File stem for a logo: the application number with every non-alphanumeric
/// replaced by `_`, or `<job>_p<page>` when the record has none.
pub fn logo_stem(application_number: Option<&str>, job_id: &str, page: usize) -> String {
    match application_number.map(str::trim).filter(|s| !s.is_empty()) {
        Some(num) => RE_UNSAFE.replace_all(num, "_").into_owned(),
        None => RE_UNSAFE
            .replace_all(&format!("{job_id}_p{page}"), "_")
            .into_owned(),
    }
}

/// Writes cropped logos as `logo_<stem>.png` under one directory.
#[derive(Debug, Clone)]
pub struct LogoCropper {
    output_dir: PathBuf,
}

impl LogoCropper {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Crop `bbox` out of `page_image` and write it.
    ///
    /// Returns the written path, or `None` when the region is empty.
    pub async fn crop_and_store(
        &self,
        page_image: &DynamicImage,
        bbox: &BoundingBox,
        stem: &str,
    ) -> Result<Option<PathBuf>, image::ImageError> {
        let Some((x, y, w, h)) = crop_region(page_image.width(), page_image.height(), bbox) else {
            debug!("Empty crop region for {:?}", bbox);
            return Ok(None);
        };

        let logo = page_image.crop_imm(x, y, w, h);
        let dir = self.output_dir.clone();
        let path = dir.join(format!("logo_{stem}.png"));
        let target = path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), image::ImageError> {
            std::fs::create_dir_all(&dir)?;
            logo.save_with_format(&target, image::ImageFormat::Png)
        })
        .await
        .map_err(|e| {
            image::ImageError::IoError(std::io::Error::other(format!("crop task panicked: {e}")))
        })??;

        debug!("Cropped logo {}x{} → {}", w, h, path.display());
        Ok(Some(path))
    }
}
