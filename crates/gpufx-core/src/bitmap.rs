//! CPU-side image used to move texels to and from rendering contexts.

use crate::error::{Error, Result};
use crate::format::PixelFormat;
use crate::geom::IntSize;

/// Image in main memory.
///
/// Channel values are normalized `f32` regardless of `format`; the format
/// describes how the image is stored once uploaded.
#[derive(Clone, PartialEq)]
pub struct Bitmap {
    size: IntSize,
    format: PixelFormat,
    data: Vec<f32>,
}

impl Bitmap {
    /// Zero-filled bitmap.
    pub fn new(size: IntSize, format: PixelFormat) -> Self {
        let len = size.area() as usize * format.channels() as usize;
        Self {
            size,
            format,
            data: vec![0.0; len],
        }
    }

    /// Wraps existing channel data.
    pub fn from_f32(size: IntSize, format: PixelFormat, data: Vec<f32>) -> Result<Self> {
        let expected = size.area() as usize * format.channels() as usize;
        if data.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { size, format, data })
    }

    /// Bitmap where every texel equals `pixel`.
    pub fn filled(size: IntSize, format: PixelFormat, pixel: &[f32]) -> Result<Self> {
        let c = format.channels() as usize;
        if pixel.len() != c {
            return Err(Error::BufferSizeMismatch {
                expected: c,
                actual: pixel.len(),
            });
        }
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(size.area() as usize * c)
            .collect();
        Ok(Self { size, format, data })
    }

    /// Size in texels.
    #[inline]
    pub fn size(&self) -> IntSize {
        self.size
    }

    /// Width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    /// Height in texels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Storage format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Channel values, row-major, interleaved.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable channel values.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the bitmap, returning its channel values.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Channel values of one texel.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let c = self.format.channels() as usize;
        let i = (y as usize * self.size.width as usize + x as usize) * c;
        &self.data[i..i + c]
    }

    /// Copy with every value rounded to the storage precision of `format`.
    pub fn stored(&self) -> Self {
        let format = self.format;
        Self {
            size: self.size,
            format,
            data: self.data.iter().map(|&v| format.store(v)).collect(),
        }
    }

    /// Same texels relabelled with another format of equal channel count.
    pub fn with_format(mut self, format: PixelFormat) -> Result<Self> {
        PixelFormat::check_combination(self.format, format)?;
        self.format = format;
        Ok(self)
    }

    /// Largest absolute per-channel difference to `other`.
    pub fn max_difference(&self, other: &Bitmap) -> Result<f32> {
        if self.size != other.size {
            return Err(Error::dimension_mismatch(self.size.to_tuple(), other.size.to_tuple()));
        }
        PixelFormat::check_combination(self.format, other.format)?;
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max))
    }

    /// Bytes this bitmap occupies once stored in its format.
    pub fn stored_bytes(&self) -> u64 {
        self.size.area() * self.format.bytes_per_pixel() as u64
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("values", &self.data.len())
            .finish()
    }
}
