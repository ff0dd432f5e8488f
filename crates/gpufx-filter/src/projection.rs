//! Full-frame quad rendering.
//!
//! An [`ImagingProjection`] maps each destination pixel `p` to source pixel
//! `src_rect.origin + p`. Drawing through it always covers the complete
//! destination target; there is no scissor.

use gpufx_core::{IntRect, IntSize};

use crate::backend::{FramebufferId, ProgramId, RenderContext, ShaderBindings};

/// Destination-to-source mapping for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagingProjection {
    dest_size: IntSize,
    src_rect: IntRect,
}

impl ImagingProjection {
    pub fn new(dest_size: IntSize, src_rect: IntRect) -> Self {
        Self { dest_size, src_rect }
    }

    /// 1:1 mapping of a `size` image onto itself.
    pub fn identity(size: IntSize) -> Self {
        Self::new(size, IntRect::from_size(size))
    }

    #[inline]
    pub fn dest_size(&self) -> IntSize {
        self.dest_size
    }

    #[inline]
    pub fn src_rect(&self) -> IntRect {
        self.src_rect
    }

    /// Offset added to destination pixel coordinates.
    #[inline]
    pub fn src_offset(&self) -> [f32; 2] {
        [self.src_rect.x as f32, self.src_rect.y as f32]
    }

    /// Source pixel center for destination pixel `(x, y)`.
    #[inline]
    pub fn source_center(&self, x: u32, y: u32) -> (f32, f32) {
        (
            (self.src_rect.x + x) as f32 + 0.5,
            (self.src_rect.y + y) as f32 + 0.5,
        )
    }

    /// Draws `program` over the whole of `target`.
    ///
    /// Leaves the context's bound program and target unspecified.
    pub fn draw(
        &self,
        ctx: &mut dyn RenderContext,
        target: FramebufferId,
        program: ProgramId,
        bindings: &ShaderBindings,
    ) {
        ctx.draw_full_frame(target, program, bindings, self);
    }
}
