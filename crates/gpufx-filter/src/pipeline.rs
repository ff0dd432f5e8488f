//! Generic multi-pass filter execution.
//!
//! A filter describes its passes as a [`PassPlan`] and renders one pass at a
//! time through [`GpuFilter::render_pass`]. [`FilterPipeline`] owns the
//! render targets the plan needs, one set per rendering context, and chains
//! the passes: pass `i` samples the output of pass `i - 1` (pass 0 samples the
//! source) and the last pass writes the destination.
//!
//! Targets are reallocated only when the plan's sizes or formats change.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use gpufx_core::log::target as log_target;
use gpufx_core::{IntRect, IntSize, PixelFormat, WrapMode};

use crate::backend::{ContextId, FramebufferId, RenderContext, TextureId};
use crate::projection::ImagingProjection;
use crate::resource::{ContextResource, lock};
use crate::{GpuError, GpuResult};

/// One pass: where it renders to and how it reads its input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSpec {
    pub target_size: IntSize,
    pub format: PixelFormat,
    pub projection: ImagingProjection,
    /// Edge rule for sampling the pass input.
    pub wrap: WrapMode,
}

impl PassSpec {
    /// Pass rendering `target_size` texels read from `src_rect` of its input.
    pub fn new(target_size: IntSize, format: PixelFormat, src_rect: IntRect, wrap: WrapMode) -> Self {
        Self {
            target_size,
            format,
            projection: ImagingProjection::new(target_size, src_rect),
            wrap,
        }
    }
}

/// Ordered passes of a filter for one source size.
#[derive(Debug, Clone, PartialEq)]
pub struct PassPlan {
    passes: Vec<PassSpec>,
}

impl PassPlan {
    pub fn new(passes: Vec<PassSpec>) -> GpuResult<Self> {
        if passes.is_empty() {
            return Err(GpuError::InvalidParameter("filter plan has no passes".into()));
        }
        if let Some(p) = passes.iter().find(|p| p.target_size.is_empty()) {
            return Err(GpuError::InvalidParameter(format!("empty pass target {}", p.target_size)));
        }
        Ok(Self { passes })
    }

    pub fn passes(&self) -> &[PassSpec] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Size of the final output.
    pub fn output_size(&self) -> IntSize {
        self.last().target_size
    }

    pub fn output_format(&self) -> PixelFormat {
        self.last().format
    }

    /// Targets of all passes but the last.
    pub fn intermediates(&self) -> &[PassSpec] {
        &self.passes[..self.passes.len() - 1]
    }

    fn last(&self) -> &PassSpec {
        // `new` rejects empty plans.
        &self.passes[self.passes.len() - 1]
    }
}

/// A pass ready to render.
#[derive(Debug, Clone, Copy)]
pub struct PassInvocation<'a> {
    pub index: usize,
    /// Input texture (source for pass 0).
    pub source: TextureId,
    pub target: FramebufferId,
    pub spec: &'a PassSpec,
}

/// A filter the pipeline can drive.
pub trait GpuFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pass plan for a source of `source_size`.
    fn configure(&self, source_size: IntSize) -> GpuResult<PassPlan>;

    /// Records one pass on `ctx`. Must not wait for the GPU.
    fn render_pass(&self, ctx: &mut dyn RenderContext, pass: &PassInvocation<'_>) -> GpuResult<()>;
}

#[derive(Debug, Default)]
struct PassTargets {
    key: Vec<(IntSize, PixelFormat)>,
    textures: Vec<TextureId>,
    framebuffers: Vec<FramebufferId>,
    external: Option<(TextureId, FramebufferId)>,
    output: Option<TextureId>,
}

impl PassTargets {
    fn free(&mut self, ctx: &mut dyn RenderContext) {
        for fb in self.framebuffers.drain(..) {
            ctx.delete_framebuffer(fb);
        }
        for tex in self.textures.drain(..) {
            ctx.delete_texture(tex);
        }
        if let Some((_, fb)) = self.external.take() {
            ctx.delete_framebuffer(fb);
        }
        self.key.clear();
        self.output = None;
    }

    fn allocate(&mut self, ctx: &mut dyn RenderContext, key: Vec<(IntSize, PixelFormat)>) -> GpuResult<()> {
        self.free(ctx);
        for &(size, format) in &key {
            let allocated = ctx.create_texture(size, format).and_then(|tex| {
                match ctx.create_framebuffer(tex) {
                    Ok(fb) => Ok((tex, fb)),
                    Err(e) => {
                        ctx.delete_texture(tex);
                        Err(e)
                    }
                }
            });
            match allocated {
                Ok((tex, fb)) => {
                    self.textures.push(tex);
                    self.framebuffers.push(fb);
                }
                Err(e) => {
                    self.free(ctx);
                    return Err(e);
                }
            }
        }
        self.key = key;
        Ok(())
    }

    fn external_framebuffer(&mut self, ctx: &mut dyn RenderContext, texture: TextureId) -> GpuResult<FramebufferId> {
        if let Some((tex, fb)) = self.external {
            if tex == texture {
                return Ok(fb);
            }
            ctx.delete_framebuffer(fb);
            self.external = None;
        }
        let fb = ctx.create_framebuffer(texture)?;
        self.external = Some((texture, fb));
        Ok(fb)
    }
}

/// Runs [`GpuFilter`]s and owns their render targets.
pub struct FilterPipeline {
    label: &'static str,
    standalone: bool,
    targets: ContextResource<PassTargets>,
    allocations: AtomicU64,
}

impl FilterPipeline {
    /// `standalone` pipelines allocate their destination; others render into
    /// one the caller supplies.
    pub fn new(label: &'static str, standalone: bool) -> Self {
        Self {
            label,
            standalone,
            targets: ContextResource::new(),
            allocations: AtomicU64::new(0),
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// Runs all passes of `filter` on `source`.
    ///
    /// With `dest == None` the result goes to a pipeline-owned texture, which
    /// is returned and overwritten by the next apply on the same context.
    pub fn apply(
        &self,
        ctx: &mut dyn RenderContext,
        filter: &dyn GpuFilter,
        source: TextureId,
        dest: Option<TextureId>,
    ) -> GpuResult<TextureId> {
        if dest.is_none() && !self.standalone {
            return Err(GpuError::InvalidParameter(format!(
                "{} is not standalone and needs a destination texture",
                filter.name()
            )));
        }

        let source_size = ctx.texture_size(source)?;
        let plan = filter.configure(source_size)?;

        if let Some(dest) = dest {
            let actual = ctx.texture_size(dest)?;
            if actual != plan.output_size() {
                return Err(GpuError::ConfigurationMismatch {
                    expected: plan.output_size(),
                    actual,
                });
            }
            PixelFormat::check_combination(plan.output_format(), ctx.texture_format(dest)?)?;
        }

        let mut key: Vec<_> = plan.intermediates().iter().map(|p| (p.target_size, p.format)).collect();
        if dest.is_none() {
            key.push((plan.output_size(), plan.output_format()));
        }

        let slot = self.targets.get_or_create(ctx.id(), PassTargets::default);
        let mut targets = lock(&slot);
        if targets.key != key || targets.textures.len() != key.len() {
            debug!(target: log_target::MEMORY, pipeline = self.label, context = %ctx.id(), targets = key.len(), source = %source_size, "allocating render targets");
            targets.allocate(ctx, key)?;
            self.allocations.fetch_add(1, Ordering::Relaxed);
        }
        let external_fb = match dest {
            Some(tex) => Some(targets.external_framebuffer(ctx, tex)?),
            None => None,
        };

        let last = plan.len() - 1;
        let mut input = source;
        for (index, spec) in plan.passes().iter().enumerate() {
            let (texture, target) = match (index == last, dest, external_fb) {
                (true, Some(tex), Some(fb)) => (tex, fb),
                _ => (targets.textures[index], targets.framebuffers[index]),
            };
            filter.render_pass(
                ctx,
                &PassInvocation {
                    index,
                    source: input,
                    target,
                    spec,
                },
            )?;
            input = texture;
        }
        targets.output = if dest.is_none() { Some(input) } else { None };
        drop(targets);

        ctx.check_error()?;
        trace!(target: log_target::SHADER, pipeline = self.label, filter = filter.name(), context = %ctx.id(), passes = plan.len(), "filter applied");
        Ok(input)
    }

    /// Pipeline-owned output on `id` from the last apply, if any.
    pub fn output(&self, id: ContextId) -> Option<TextureId> {
        let slot = self.targets.get(id)?;
        let output = lock(&slot).output;
        output
    }

    /// Deletes the render targets held on `ctx`.
    pub fn release_context(&self, ctx: &mut dyn RenderContext) {
        if let Some(slot) = self.targets.remove(ctx.id()) {
            lock(&slot).free(ctx);
        }
    }

    /// Drops bookkeeping for a context that no longer exists.
    pub fn forget_context(&self, id: ContextId) {
        self.targets.remove(id);
    }

    /// Contexts holding render targets.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.targets.contexts()
    }

    /// Target (re)allocations so far, over all contexts.
    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("label", &self.label)
            .field("standalone", &self.standalone)
            .field("contexts", &self.contexts())
            .finish()
    }
}
