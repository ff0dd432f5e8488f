//! Rendering context resource limits.

use gpufx_core::{IntSize, PixelFormat};

use crate::{GpuError, GpuResult};

/// Environment variable capping the CPU context's texture memory, in MiB.
pub const CPU_MEMORY_ENV: &str = "GPUFX_CPU_MEMORY_MB";

/// Resource limits of a rendering context.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuLimits {
    /// Maximum texture dimension (width or height).
    pub max_texture_dim: u32,
    /// Texture memory available to the context, in bytes.
    pub available_memory: u64,
}

impl Default for GpuLimits {
    fn default() -> Self {
        Self {
            max_texture_dim: 16384,
            available_memory: 2 * 1024 * 1024 * 1024, // 2 GB
        }
    }
}

impl GpuLimits {
    /// Limits for the software context: system RAM, overridable from the environment.
    pub fn detect_cpu() -> Self {
        let available = std::env::var(CPU_MEMORY_ENV)
            .ok()
            .and_then(|mb| mb.parse::<u64>().ok())
            .map(|mb| mb.saturating_mul(1024 * 1024))
            .unwrap_or_else(|| {
                // Fallback to 4GB if detection fails
                sys_info::mem_info()
                    .map(|m| m.avail * 1024)
                    .unwrap_or(4 * 1024 * 1024 * 1024)
            });

        Self {
            max_texture_dim: 16384,
            available_memory: available,
        }
    }

    /// Bytes a texture of `size` and `format` occupies.
    #[inline]
    pub fn texture_bytes(size: IntSize, format: PixelFormat) -> u64 {
        size.area() * format.bytes_per_pixel() as u64
    }

    /// Checks that a new texture fits next to `used` bytes of existing ones.
    pub fn check_texture(&self, size: IntSize, format: PixelFormat, used: u64) -> GpuResult<u64> {
        if size.is_empty() {
            return Err(GpuError::GpuResource(format!("cannot allocate empty texture {size}")));
        }
        if size.width > self.max_texture_dim || size.height > self.max_texture_dim {
            return Err(GpuError::GpuResource(format!(
                "texture {size} exceeds limit {}",
                self.max_texture_dim
            )));
        }
        let bytes = Self::texture_bytes(size, format);
        if used.saturating_add(bytes) > self.available_memory {
            return Err(GpuError::GpuResource(format!(
                "out of texture memory: {bytes} bytes requested, {} of {} in use",
                used, self.available_memory
            )));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_texture() {
        let limits = GpuLimits {
            max_texture_dim: 128,
            available_memory: 64 * 64 * 4,
        };
        let size = IntSize::new(64, 64);
        assert_eq!(limits.check_texture(size, PixelFormat::R8G8B8A8, 0), Ok(64 * 64 * 4));
        assert!(limits.check_texture(size, PixelFormat::R8G8B8A8, 1).is_err());
        assert!(limits.check_texture(IntSize::new(129, 1), PixelFormat::I8, 0).is_err());
        assert!(limits.check_texture(IntSize::new(0, 1), PixelFormat::I8, 0).is_err());
    }

    #[test]
    fn test_texture_bytes() {
        assert_eq!(GpuLimits::texture_bytes(IntSize::new(3, 1), PixelFormat::R32G32B32A32F), 48);
        assert_eq!(GpuLimits::texture_bytes(IntSize::new(7, 1), PixelFormat::I8), 7);
    }
}
