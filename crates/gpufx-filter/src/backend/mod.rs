//! Rendering contexts.
//!
//! A [`RenderContext`] is one isolated GPU namespace: textures, framebuffers
//! and shader programs created on it are only valid on it, and it is driven by
//! a single thread at a time. Handles are plain indices tagged with the
//! owning [`ContextId`], so a handle from another context is rejected instead
//! of silently aliasing.
//!
//! Two implementations:
//! - [`CpuContext`] - software rasterizer (rayon), always available
//! - [`WgpuContext`] - wgpu render pipelines, feature `wgpu`

mod cpu_context;
mod detect;
mod limits;
mod program;

#[cfg(feature = "wgpu")]
mod wgpu_context;

pub use cpu_context::{CpuContext, CpuContextStats};
pub use detect::{BACKEND_ENV, BackendInfo, describe_backends, detect_backends, select_best_backend};
pub use limits::{CPU_MEMORY_ENV, GpuLimits};
pub use program::{
    KERNEL_UNIT, SOURCE_UNIT, ShaderKind, U_KERNEL_TEX, U_RADIUS, U_TEXEL_SIZE, U_TEXTURE,
    UniformKind, UniformValue,
};
pub(crate) use program::ProgramUniforms;

#[cfg(feature = "wgpu")]
pub use wgpu_context::WgpuContext;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use gpufx_core::{Bitmap, IntSize, PixelFormat, WrapMode};

use crate::projection::ImagingProjection;
use crate::{GpuError, GpuResult};

// =============================================================================
// Handles
// =============================================================================

/// Identity of a rendering context. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for logging.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

macro_rules! context_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            context: ContextId,
            index: u32,
        }

        impl $name {
            pub(crate) fn new(context: ContextId, index: u32) -> Self {
                Self { context, index }
            }

            /// Context the handle belongs to.
            pub fn context(&self) -> ContextId {
                self.context
            }

            pub(crate) fn index(&self) -> u32 {
                self.index
            }

            pub(crate) fn check_owner(&self, owner: ContextId) -> GpuResult<()> {
                if self.context != owner {
                    return Err(GpuError::InvalidHandle(format!(
                        "{} {} belongs to {}, used on {}",
                        stringify!($name), self.index, self.context, owner
                    )));
                }
                Ok(())
            }
        }
    };
}

context_handle!(
    /// Texture on one context.
    TextureId
);
context_handle!(
    /// Render target wrapping a texture on one context.
    FramebufferId
);

/// Compiled shader program on one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId {
    context: ContextId,
    kind: ShaderKind,
}

impl ProgramId {
    pub(crate) fn new(context: ContextId, kind: ShaderKind) -> Self {
        Self { context, kind }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    pub(crate) fn check_owner(&self, owner: ContextId) -> GpuResult<()> {
        if self.context != owner {
            return Err(GpuError::InvalidHandle(format!(
                "program {} belongs to {}, used on {}",
                self.kind, self.context, owner
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Texture bindings
// =============================================================================

/// One texture bound to a sampler unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBinding {
    pub unit: u32,
    pub texture: TextureId,
    pub wrap: WrapMode,
}

/// Textures bound for a draw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderBindings {
    textures: Vec<TextureBinding>,
}

impl ShaderBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `texture` to `unit`, replacing an earlier binding of that unit.
    pub fn texture(mut self, unit: u32, texture: TextureId, wrap: WrapMode) -> Self {
        self.textures.retain(|b| b.unit != unit);
        self.textures.push(TextureBinding { unit, texture, wrap });
        self
    }

    pub fn get(&self, unit: u32) -> Option<&TextureBinding> {
        self.textures.iter().find(|b| b.unit == unit)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextureBinding> {
        self.textures.iter()
    }
}

// =============================================================================
// RenderContext
// =============================================================================

/// An isolated GPU namespace driven by one thread.
///
/// Resource creation, upload and readback fail synchronously. Draws and
/// uniform writes only submit work: problems with them are queued and
/// reported by the next [`check_error`](Self::check_error).
pub trait RenderContext: Send {
    /// Identity, stable for the context's lifetime.
    fn id(&self) -> ContextId;

    /// Backend name.
    fn backend_name(&self) -> &'static str;

    /// Resource limits.
    fn limits(&self) -> &GpuLimits;

    /// Allocates an uninitialized texture usable as sampler source and render target.
    fn create_texture(&mut self, size: IntSize, format: PixelFormat) -> GpuResult<TextureId>;

    /// Replaces the texture contents. Size and channel count must match.
    fn upload_texture(&mut self, texture: TextureId, bitmap: &Bitmap) -> GpuResult<()>;

    /// Reads the texture back. Waits for submitted work.
    fn read_texture(&mut self, texture: TextureId) -> GpuResult<Bitmap>;

    fn texture_size(&self, texture: TextureId) -> GpuResult<IntSize>;

    fn texture_format(&self, texture: TextureId) -> GpuResult<PixelFormat>;

    /// Frees a texture. Unknown handles are ignored.
    fn delete_texture(&mut self, texture: TextureId);

    /// Wraps a texture as render target.
    fn create_framebuffer(&mut self, color: TextureId) -> GpuResult<FramebufferId>;

    /// Frees a render target, leaving its texture alive.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Program for `kind`, compiled on first use.
    fn program(&mut self, kind: ShaderKind) -> GpuResult<ProgramId>;

    /// Writes a uniform. It keeps its value until written again.
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue);

    /// Current value of a uniform, `None` if the program doesn't declare it.
    fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue>;

    /// Runs `program` over every pixel of `target`.
    fn draw_full_frame(
        &mut self,
        target: FramebufferId,
        program: ProgramId,
        bindings: &ShaderBindings,
        projection: &ImagingProjection,
    );

    /// Reports errors queued since the last call.
    fn check_error(&mut self) -> GpuResult<()>;

    /// Creates a texture holding `bitmap`.
    fn upload_bitmap(&mut self, bitmap: &Bitmap) -> GpuResult<TextureId> {
        let texture = self.create_texture(bitmap.size(), bitmap.format())?;
        if let Err(e) = self.upload_texture(texture, bitmap) {
            self.delete_texture(texture);
            return Err(e);
        }
        Ok(texture)
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Available rendering backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Auto-select best available (wgpu > CPU).
    #[default]
    Auto,
    /// Software context using rayon.
    Cpu,
    /// wgpu (Vulkan/Metal/DX12).
    Wgpu,
}

impl Backend {
    /// Check if this backend is available on current system.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Auto => true,
            Self::Cpu => true,
            #[cfg(feature = "wgpu")]
            Self::Wgpu => WgpuContext::is_available(),
            #[cfg(not(feature = "wgpu"))]
            Self::Wgpu => false,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = GpuError;

    fn from_str(s: &str) -> GpuResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            other => Err(GpuError::BackendNotAvailable(format!("unknown backend '{other}'"))),
        }
    }
}

/// Create a fresh rendering context.
pub fn create_context(backend: Backend) -> GpuResult<Box<dyn RenderContext>> {
    match backend {
        Backend::Auto => create_context(select_best_backend()),
        Backend::Cpu => Ok(Box::new(CpuContext::new())),
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                Ok(Box::new(WgpuContext::new()?))
            }
            #[cfg(not(feature = "wgpu"))]
            {
                Err(GpuError::BackendNotAvailable("wgpu feature not enabled".to_string()))
            }
        }
    }
}
