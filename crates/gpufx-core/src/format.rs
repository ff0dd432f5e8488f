//! Pixel formats shared with the rest of the engine.
//!
//! A [`PixelFormat`] describes how texels are stored on a rendering context.
//! Values crossing the CPU/GPU boundary are always normalized `f32`; the format
//! decides channel count and storage precision.
//!
//! ```rust
//! use gpufx_core::PixelFormat;
//!
//! let pf: PixelFormat = "R8G8B8A8".parse().unwrap();
//! assert_eq!(pf.channels(), 4);
//! assert_eq!(pf.store(0.5), 128.0 / 255.0);
//! ```

use std::fmt;
use std::str::FromStr;

use half::f16;

use crate::error::{Error, Result};

/// Texel storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Single 8-bit unsigned normalized channel (intensity, masks, kernels).
    I8,
    /// 8-bit RGBA.
    #[default]
    R8G8B8A8,
    /// 8-bit BGRA (common swapchain order).
    B8G8R8A8,
    /// Half-float RGBA.
    R16G16B16A16F,
    /// Full-float RGBA.
    R32G32B32A32F,
}

impl PixelFormat {
    /// All known formats.
    pub const ALL: [PixelFormat; 5] = [
        Self::I8,
        Self::R8G8B8A8,
        Self::B8G8R8A8,
        Self::R16G16B16A16F,
        Self::R32G32B32A32F,
    ];

    /// Number of channels per texel.
    #[inline]
    pub const fn channels(&self) -> u32 {
        match self {
            Self::I8 => 1,
            _ => 4,
        }
    }

    /// Bits per channel.
    #[inline]
    pub const fn bits_per_channel(&self) -> u32 {
        match self {
            Self::I8 | Self::R8G8B8A8 | Self::B8G8R8A8 => 8,
            Self::R16G16B16A16F => 16,
            Self::R32G32B32A32F => 32,
        }
    }

    /// Bytes per texel.
    #[inline]
    pub const fn bytes_per_pixel(&self) -> u32 {
        self.channels() * self.bits_per_channel() / 8
    }

    /// Whether channels are floating point.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::R16G16B16A16F | Self::R32G32B32A32F)
    }

    /// Canonical name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::I8 => "I8",
            Self::R8G8B8A8 => "R8G8B8A8",
            Self::B8G8R8A8 => "B8G8R8A8",
            Self::R16G16B16A16F => "R16G16B16A16F",
            Self::R32G32B32A32F => "R32G32B32A32F",
        }
    }

    /// Value as it reads back after being written to a texel of this format.
    #[inline]
    pub fn store(&self, value: f32) -> f32 {
        match self {
            Self::I8 | Self::R8G8B8A8 | Self::B8G8R8A8 => {
                (value.clamp(0.0, 1.0) * 255.0).round() / 255.0
            }
            Self::R16G16B16A16F => f16::from_f32(value).to_f32(),
            Self::R32G32B32A32F => value,
        }
    }

    /// Largest error [`store`](Self::store) can introduce for values in `[0, 1]`.
    #[inline]
    pub fn precision(&self) -> f32 {
        match self {
            Self::I8 | Self::R8G8B8A8 | Self::B8G8R8A8 => 0.5 / 255.0,
            Self::R16G16B16A16F => 1.0 / 2048.0,
            Self::R32G32B32A32F => f32::EPSILON,
        }
    }

    /// Checks that a filter may read `src` and write `dest`.
    ///
    /// Formats must agree in channel layout; precision may differ.
    pub fn check_combination(src: PixelFormat, dest: PixelFormat) -> Result<()> {
        if src.channels() != dest.channels() {
            return Err(Error::FormatMismatch { src, dest });
        }
        Ok(())
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "I8" | "R8" => Ok(Self::I8),
            "R8G8B8A8" | "RGBA8" => Ok(Self::R8G8B8A8),
            "B8G8R8A8" | "BGRA8" => Ok(Self::B8G8R8A8),
            "R16G16B16A16F" | "RGBA16F" | "HALF" => Ok(Self::R16G16B16A16F),
            "R32G32B32A32F" | "RGBA32F" | "FLOAT" => Ok(Self::R32G32B32A32F),
            _ => Err(Error::unsupported_format(s)),
        }
    }
}

/// Edge rule used when a sample falls outside the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Repeat the edge texel.
    #[default]
    Clamp,
    /// Tile the texture.
    Repeat,
    /// Reflect at the edge, edge texel included (`-1 -> 0`).
    Mirror,
}

impl WrapMode {
    /// Maps a possibly out-of-range texel index into `0..len`.
    #[inline]
    pub fn resolve(&self, index: i64, len: u32) -> u32 {
        let n = len as i64;
        debug_assert!(n > 0);
        let i = match self {
            Self::Clamp => index.clamp(0, n - 1),
            Self::Repeat => index.rem_euclid(n),
            Self::Mirror => {
                let period = 2 * n;
                let m = index.rem_euclid(period);
                if m < n { m } else { period - 1 - m }
            }
        };
        i as u32
    }

    /// Integer code used in shader uniforms.
    #[inline]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Clamp => 0,
            Self::Repeat => 1,
            Self::Mirror => 2,
        }
    }
}

impl FromStr for WrapMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "clamp" | "edge" => Ok(Self::Clamp),
            "repeat" | "wrap" => Ok(Self::Repeat),
            "mirror" => Ok(Self::Mirror),
            _ => Err(Error::unsupported_format(format!("wrap mode '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        assert_eq!(PixelFormat::I8.channels(), 1);
        assert_eq!(PixelFormat::B8G8R8A8.channels(), 4);
        assert_eq!(PixelFormat::R32G32B32A32F.bytes_per_pixel(), 16);
        assert_eq!(PixelFormat::R16G16B16A16F.bytes_per_pixel(), 8);
    }

    #[test]
    fn test_store_quantizes_8bit() {
        let v = PixelFormat::R8G8B8A8.store(0.3);
        assert!((v - 0.3).abs() <= PixelFormat::R8G8B8A8.precision());
        assert_eq!(PixelFormat::I8.store(2.0), 1.0);
        assert_eq!(PixelFormat::I8.store(-1.0), 0.0);
        assert_eq!(PixelFormat::R32G32B32A32F.store(0.3), 0.3);
    }

    #[test]
    fn test_store_half() {
        let v = PixelFormat::R16G16B16A16F.store(0.1);
        assert!((v - 0.1).abs() < 1e-4);
        assert_ne!(v, 0.1);
    }

    #[test]
    fn test_combination() {
        assert!(PixelFormat::check_combination(PixelFormat::R8G8B8A8, PixelFormat::R32G32B32A32F).is_ok());
        assert!(PixelFormat::check_combination(PixelFormat::I8, PixelFormat::I8).is_ok());
        assert!(PixelFormat::check_combination(PixelFormat::I8, PixelFormat::B8G8R8A8).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("rgba32f".parse::<PixelFormat>().unwrap(), PixelFormat::R32G32B32A32F);
        assert!("YUV420".parse::<PixelFormat>().is_err());
        for pf in PixelFormat::ALL {
            assert_eq!(pf.name().parse::<PixelFormat>().unwrap(), pf);
        }
    }

    #[test]
    fn test_wrap_clamp() {
        assert_eq!(WrapMode::Clamp.resolve(-3, 5), 0);
        assert_eq!(WrapMode::Clamp.resolve(7, 5), 4);
        assert_eq!(WrapMode::Clamp.resolve(2, 5), 2);
    }

    #[test]
    fn test_wrap_repeat() {
        assert_eq!(WrapMode::Repeat.resolve(-1, 5), 4);
        assert_eq!(WrapMode::Repeat.resolve(5, 5), 0);
        assert_eq!(WrapMode::Repeat.resolve(12, 5), 2);
    }

    #[test]
    fn test_wrap_mirror() {
        assert_eq!(WrapMode::Mirror.resolve(-1, 5), 0);
        assert_eq!(WrapMode::Mirror.resolve(-2, 5), 1);
        assert_eq!(WrapMode::Mirror.resolve(5, 5), 4);
        assert_eq!(WrapMode::Mirror.resolve(6, 5), 3);
        assert_eq!(WrapMode::Mirror.resolve(10, 5), 0);
    }
}
