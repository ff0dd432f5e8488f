//! GPU filter pipeline with a separable Gaussian blur.
//!
//! Filters run on a [`RenderContext`]: a texture/framebuffer/shader namespace
//! owned by one thread. The same filter object may be shared by several
//! contexts at once; everything that lives on a context (kernel texture,
//! uniforms, render targets) is cached per [`ContextId`].
//!
//! # Architecture
//!
//! ```text
//! GpuBlurFilter / GpuCopyFilter
//!     └── FilterPipeline (per-context render targets)
//!             └── GpuFilter trait (configure + render_pass)
//!                     └── RenderContext trait
//!                             ├── CpuContext (rayon, always available)
//!                             └── WgpuContext (render pipelines, feature "wgpu")
//! ```
//!
//! # Example
//!
//! ```rust
//! use gpufx_core::{Bitmap, IntSize, PixelFormat};
//! use gpufx_filter::{CpuContext, GpuBlurFilter, RenderContext};
//!
//! let size = IntSize::new(32, 32);
//! let mut ctx = CpuContext::new();
//! let filter = GpuBlurFilter::new(
//!     size, PixelFormat::R8G8B8A8, PixelFormat::R8G8B8A8, 1.0, false, true, false,
//! ).unwrap();
//!
//! let src = Bitmap::filled(size, PixelFormat::R8G8B8A8, &[0.5, 0.5, 0.5, 1.0]).unwrap();
//! let out = filter.apply_bitmap(&mut ctx, &src).unwrap();
//! assert_eq!(out.size(), size);
//! ```

pub mod backend;
pub mod blur;
pub mod copy;
pub mod kernel;
pub mod pipeline;
pub mod projection;
pub mod resource;
mod shaders;

pub use backend::{
    Backend, ContextId, CpuContext, FramebufferId, GpuLimits, ProgramId, RenderContext,
    ShaderBindings, ShaderKind, TextureId, UniformValue, create_context, describe_backends,
    detect_backends, select_best_backend,
};
#[cfg(feature = "wgpu")]
pub use backend::WgpuContext;
pub use blur::{BlurFilterConfig, FilterState, GpuBlurFilter};
pub use copy::GpuCopyFilter;
pub use kernel::{GaussianKernel, KernelPrecision, build_kernel, kernel_radius, max_supported_radius};
pub use pipeline::{FilterPipeline, GpuFilter, PassInvocation, PassPlan, PassSpec};
pub use projection::ImagingProjection;
pub use resource::{ContextResource, McShaderParam, McTexture};

use gpufx_core::IntSize;
use thiserror::Error;

/// Filter and rendering-context errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    /// Caller passed something the filter can never accept. Not retried.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Allocation failed or the context reported an error. The next apply retries.
    #[error("GPU resource error: {0}")]
    GpuResource(String),

    /// Input size doesn't match what the filter was configured for.
    #[error("Configuration mismatch: expected {expected}, got {actual}")]
    ConfigurationMismatch { expected: IntSize, actual: IntSize },

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("Failed to compile shader: {0}")]
    ShaderCompilation(String),
}

impl GpuError {
    /// `true` for errors a later attempt may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GpuResource(_))
    }

    /// `true` for caller mistakes.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Self::InvalidParameter(_))
    }
}

impl From<gpufx_core::Error> for GpuError {
    fn from(e: gpufx_core::Error) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

pub type GpuResult<T> = Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gpufx_core::PixelFormat;

    #[test]
    fn test_core_error_maps_to_invalid_parameter() {
        let core = gpufx_core::Error::FormatMismatch {
            src: PixelFormat::I8,
            dest: PixelFormat::R8G8B8A8,
        };
        let e: GpuError = core.into();
        assert!(e.is_invalid_parameter());
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_display() {
        let e = GpuError::ConfigurationMismatch {
            expected: IntSize::new(64, 64),
            actual: IntSize::new(32, 64),
        };
        assert_eq!(e.to_string(), "Configuration mismatch: expected 64x64, got 32x64");
        assert!(GpuError::GpuResource("oom".into()).is_retryable());
    }
}
