//! Single-pass texture copy.
//!
//! Converts between formats of the same channel layout, and copies filter
//! outputs out of pipeline-owned textures before the next apply overwrites
//! them.

use gpufx_core::{IntRect, IntSize, PixelFormat, WrapMode};

use crate::backend::{ContextId, RenderContext, SOURCE_UNIT, ShaderBindings, ShaderKind, TextureId, U_TEXTURE};
use crate::pipeline::{FilterPipeline, GpuFilter, PassInvocation, PassPlan, PassSpec};
use crate::resource::IntMcShaderParam;
use crate::GpuResult;

/// Copies a texture, optionally converting its format.
pub struct GpuCopyFilter {
    format: PixelFormat,
    pipeline: FilterPipeline,
    texture: IntMcShaderParam,
}

impl GpuCopyFilter {
    /// Copy into `format` textures.
    pub fn new(format: PixelFormat, standalone: bool) -> Self {
        let texture = IntMcShaderParam::new(U_TEXTURE);
        texture.set(SOURCE_UNIT as i32);
        Self {
            format,
            pipeline: FilterPipeline::new("copy", standalone),
            texture,
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Copies `source` into a filter-owned texture and returns it.
    pub fn apply(&self, ctx: &mut dyn RenderContext, source: TextureId) -> GpuResult<TextureId> {
        PixelFormat::check_combination(ctx.texture_format(source)?, self.format)?;
        self.pipeline.apply(ctx, self, source, None)
    }

    /// Copies `source` into `dest`, which must have the same size.
    pub fn apply_into(&self, ctx: &mut dyn RenderContext, source: TextureId, dest: TextureId) -> GpuResult<()> {
        PixelFormat::check_combination(ctx.texture_format(source)?, self.format)?;
        self.pipeline.apply(ctx, self, source, Some(dest)).map(|_| ())
    }

    pub fn release_context(&self, ctx: &mut dyn RenderContext) {
        self.pipeline.release_context(ctx);
        self.texture.forget(ctx.id());
    }

    pub fn forget_context(&self, id: ContextId) {
        self.pipeline.forget_context(id);
        self.texture.forget(id);
    }
}

impl GpuFilter for GpuCopyFilter {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn configure(&self, source_size: IntSize) -> GpuResult<PassPlan> {
        PassPlan::new(vec![PassSpec::new(
            source_size,
            self.format,
            IntRect::from_size(source_size),
            WrapMode::Clamp,
        )])
    }

    fn render_pass(&self, ctx: &mut dyn RenderContext, pass: &PassInvocation<'_>) -> GpuResult<()> {
        let program = ctx.program(ShaderKind::Copy)?;
        self.texture.bind(ctx, program)?;
        let bindings = ShaderBindings::new().texture(SOURCE_UNIT, pass.source, pass.spec.wrap);
        pass.spec.projection.draw(ctx, pass.target, program, &bindings);
        Ok(())
    }
}

impl std::fmt::Debug for GpuCopyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCopyFilter")
            .field("format", &self.format)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
