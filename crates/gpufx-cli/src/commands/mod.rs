//! CLI command implementations

pub mod backends;
pub mod blur;
pub mod kernel;

use anyhow::{Context, Result};
use std::path::Path;

use gpufx_core::{Bitmap, IntSize, PixelFormat};
use gpufx_filter::{Backend, RenderContext, create_context};

/// Loads an image file as a bitmap of `format`.
///
/// Single-channel formats get the luminance, everything else RGBA.
pub fn load_bitmap(path: &Path, format: PixelFormat) -> Result<Bitmap> {
    let image = image::open(path).with_context(|| format!("Failed to load: {}", path.display()))?;
    let size = IntSize::new(image.width(), image.height());
    let bitmap = if format.channels() == 1 {
        Bitmap::from_f32(size, PixelFormat::I8, image.to_luma32f().into_raw())?
    } else {
        Bitmap::from_f32(size, PixelFormat::R32G32B32A32F, image.to_rgba32f().into_raw())?
    };
    Ok(bitmap.with_format(format)?.stored())
}

/// Saves a bitmap. `.exr` keeps float values, other formats are 8-bit.
pub fn save_bitmap(path: &Path, bitmap: &Bitmap) -> Result<()> {
    let rgba: Vec<f32> = match bitmap.format().channels() {
        1 => bitmap.data().iter().flat_map(|v| [*v, *v, *v, 1.0]).collect(),
        _ => bitmap.data().to_vec(),
    };
    let image = image::Rgba32FImage::from_raw(bitmap.width(), bitmap.height(), rgba)
        .context("Bitmap data doesn't match its size")?;
    let image = image::DynamicImage::ImageRgba32F(image);

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let image = match ext.as_str() {
        "exr" => image,
        "jpg" | "jpeg" => image::DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image::DynamicImage::ImageRgba8(image.to_rgba8()),
    };
    image
        .save(path)
        .with_context(|| format!("Failed to save: {}", path.display()))
}

/// Opens a fresh rendering context.
pub fn open_context(backend: Backend) -> Result<Box<dyn RenderContext>> {
    create_context(backend).with_context(|| format!("Cannot open {backend} rendering context"))
}

/// Format byte count for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
