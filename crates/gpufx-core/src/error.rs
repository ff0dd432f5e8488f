//! Error types for gpufx-core.
//!
//! Covers the failure modes of the shared engine types: size validation,
//! pixel format handling, bitmap buffers and log category parsing.
//!
//! # Usage
//!
//! ```rust
//! use gpufx_core::{Error, IntSize, Result};
//!
//! fn check(size: IntSize) -> Result<()> {
//!     if size.is_empty() {
//!         return Err(Error::invalid_dimensions(size.width, size.height, "empty"));
//!     }
//!     Ok(())
//! }
//! assert!(check(IntSize::new(0, 4)).is_err());
//! ```

use thiserror::Error;

use crate::format::PixelFormat;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the shared engine types.
///
/// # Categories
///
/// - **Size errors**: [`InvalidDimensions`](Error::InvalidDimensions), [`DimensionMismatch`](Error::DimensionMismatch)
/// - **Format errors**: [`UnsupportedFormat`](Error::UnsupportedFormat), [`FormatMismatch`](Error::FormatMismatch)
/// - **Buffer errors**: [`BufferSizeMismatch`](Error::BufferSizeMismatch)
/// - **Logging config**: [`UnknownLogCategory`](Error::UnknownLogCategory), [`EmptyCategoryStack`](Error::EmptyCategoryStack)
#[derive(Debug, Error)]
pub enum Error {
    /// Width or height is zero or otherwise unusable.
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Why the size was rejected
        reason: String,
    },

    /// Two images that must agree in size do not.
    #[error("dimension mismatch: {a_width}x{a_height} vs {b_width}x{b_height}")]
    DimensionMismatch {
        /// First width
        a_width: u32,
        /// First height
        a_height: u32,
        /// Second width
        b_width: u32,
        /// Second height
        b_height: u32,
    },

    /// Pixel format name could not be parsed or is not usable here.
    #[error("unsupported pixel format: {format}")]
    UnsupportedFormat {
        /// Format name or description
        format: String,
    },

    /// Source and destination formats cannot be combined.
    #[error("cannot render {src} into {dest}: channel layouts differ")]
    FormatMismatch {
        /// Source format
        src: PixelFormat,
        /// Destination format
        dest: PixelFormat,
    },

    /// Pixel buffer length doesn't match size and format.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        /// Expected number of channel values
        expected: usize,
        /// Actual number of channel values
        actual: usize,
    },

    /// Log category name is not known.
    #[error("unknown log category '{0}'")]
    UnknownLogCategory(String),

    /// `pop` was called without a matching `push`.
    #[error("log category stack is empty")]
    EmptyCategoryStack,
}

impl Error {
    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::DimensionMismatch`] error.
    #[inline]
    pub fn dimension_mismatch(a: (u32, u32), b: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            a_width: a.0,
            a_height: a.1,
            b_width: b.0,
            b_height: b.1,
        }
    }

    /// Creates an [`Error::UnsupportedFormat`] error.
    #[inline]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Returns `true` for size related errors.
    #[inline]
    pub fn is_dimension_error(&self) -> bool {
        matches!(self, Self::InvalidDimensions { .. } | Self::DimensionMismatch { .. })
    }

    /// Returns `true` for format related errors.
    #[inline]
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. } | Self::FormatMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimensions() {
        let err = Error::invalid_dimensions(0, 12, "zero width");
        let msg = err.to_string();
        assert!(msg.contains("0x12"));
        assert!(msg.contains("zero width"));
        assert!(err.is_dimension_error());
    }

    #[test]
    fn test_format_mismatch() {
        let err = Error::FormatMismatch {
            src: PixelFormat::I8,
            dest: PixelFormat::R8G8B8A8,
        };
        assert!(err.is_format_error());
        assert!(err.to_string().contains("I8"));
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = Error::dimension_mismatch((64, 64), (32, 16));
        let msg = err.to_string();
        assert!(msg.contains("64x64"));
        assert!(msg.contains("32x16"));
    }
}
