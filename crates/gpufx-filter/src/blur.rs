//! Separable Gaussian blur.
//!
//! Two passes: a horizontal 1-D convolution into an intermediate target,
//! then a vertical one into the destination. The kernel lives in a
//! `(2r + 1) x 1` texture shared by both passes.
//!
//! # States
//!
//! ```text
//! Unconfigured --apply--> Ready <--set_std_dev / set_wrap_mode / resize--> KernelStale
//!                                            KernelStale --apply--> Ready
//! ```
//!
//! Kernel, uniforms and sizes are derived lazily on the first apply after a
//! change, so changing parameters several times per frame is cheap.
//!
//! # Border clipping
//!
//! With `clip_borders` the output only contains pixels whose full kernel
//! footprint lies inside the source: a `w x h` source gives a
//! `(w - 2r) x (h - 2r)` result. The horizontal pass already drops the
//! left/right borders, so the intermediate is `(w - 2r) x h`.
//!
//! # Contexts
//!
//! One filter can be shared by several rendering contexts on different
//! threads (`Arc<GpuBlurFilter>`). Configuration is shared; kernel texture,
//! uniforms and render targets are per context and follow a rebuild made on
//! any of them.

use std::sync::RwLock;

use tracing::{debug, trace};

use gpufx_core::log::target as log_target;
use gpufx_core::{Bitmap, IntRect, IntSize, PixelFormat, WrapMode};

use crate::backend::{
    ContextId, GpuLimits, KERNEL_UNIT, ProgramId, RenderContext, SOURCE_UNIT, ShaderBindings,
    ShaderKind, TextureId, U_KERNEL_TEX, U_RADIUS, U_TEXEL_SIZE, U_TEXTURE,
};
use crate::kernel::{
    DEFAULT_MAX_RADIUS, GaussianKernel, KernelPrecision, build_kernel, kernel_radius, max_supported_radius,
};
use crate::pipeline::{FilterPipeline, GpuFilter, PassInvocation, PassPlan, PassSpec};
use crate::resource::{FloatMcShaderParam, IntMcShaderParam, McTexture, read, write};
use crate::{GpuError, GpuResult};

/// Blur filter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurFilterConfig {
    /// Source size the filter is configured for.
    pub size: IntSize,
    pub src_format: PixelFormat,
    pub dest_format: PixelFormat,
    /// Gaussian standard deviation in pixels.
    pub std_dev: f32,
    /// Drop output pixels whose kernel reaches past the source edge.
    pub clip_borders: bool,
    /// Allocate the destination instead of rendering into a caller texture.
    pub standalone: bool,
    /// Keep kernel weights in `f32` instead of 1/255 steps.
    pub use_float_kernel: bool,
    /// Edge rule for taps outside the source.
    pub wrap_mode: WrapMode,
    /// Accept sources of another size and reconfigure instead of failing.
    pub resizable: bool,
    /// Radius cap; larger blurs are truncated.
    pub max_radius: u32,
}

impl Default for BlurFilterConfig {
    fn default() -> Self {
        Self {
            size: IntSize::default(),
            src_format: PixelFormat::R8G8B8A8,
            dest_format: PixelFormat::R8G8B8A8,
            std_dev: 1.0,
            clip_borders: false,
            standalone: true,
            use_float_kernel: false,
            wrap_mode: WrapMode::Clamp,
            resizable: false,
            max_radius: DEFAULT_MAX_RADIUS,
        }
    }
}

impl BlurFilterConfig {
    /// Defaults for a `size` source.
    pub fn new(size: IntSize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn precision(&self) -> KernelPrecision {
        KernelPrecision::from_float_flag(self.use_float_kernel)
    }

    /// Radius the current settings produce.
    pub fn radius(&self) -> u32 {
        kernel_radius(self.std_dev, self.max_radius)
    }

    /// Checks everything that doesn't need a context.
    pub fn validate(&self) -> GpuResult<()> {
        validate_std_dev(self.std_dev)?;
        if self.size.is_empty() {
            return Err(GpuError::InvalidParameter(format!("empty source size {}", self.size)));
        }
        if self.max_radius == 0 {
            return Err(GpuError::InvalidParameter("max_radius must be at least 1".into()));
        }
        let supported = max_supported_radius(GpuLimits::default().max_texture_dim);
        if self.max_radius > supported {
            return Err(GpuError::InvalidParameter(format!(
                "max_radius {} exceeds the largest kernel texture radius {supported}",
                self.max_radius
            )));
        }
        PixelFormat::check_combination(self.src_format, self.dest_format)?;
        plan_for(self, self.radius(), self.size)?;
        Ok(())
    }
}

fn validate_std_dev(std_dev: f32) -> GpuResult<()> {
    if !std_dev.is_finite() || std_dev <= 0.0 {
        return Err(GpuError::InvalidParameter(format!(
            "standard deviation must be positive, got {std_dev}"
        )));
    }
    Ok(())
}

/// Pass layout for a `source` image.
fn plan_for(config: &BlurFilterConfig, radius: u32, source: IntSize) -> GpuResult<PassPlan> {
    let format = config.dest_format;
    let wrap = config.wrap_mode;
    let passes = if config.clip_borders {
        let dest = source.shrink(radius).ok_or_else(|| {
            GpuError::InvalidParameter(format!(
                "{source} is too small for a clipped blur of radius {radius}, need at least {0}x{0}",
                2 * radius + 1
            ))
        })?;
        let intermediate = IntSize::new(dest.width, source.height);
        vec![
            PassSpec::new(intermediate, format, IntRect::new(radius, 0, dest.width, source.height), wrap),
            PassSpec::new(dest, format, IntRect::new(0, radius, dest.width, dest.height), wrap),
        ]
    } else {
        let full = IntRect::from_size(source);
        vec![
            PassSpec::new(source, format, full, wrap),
            PassSpec::new(source, format, full, wrap),
        ]
    };
    PassPlan::new(passes)
}

/// Lifecycle of the derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Constructed, never applied.
    Unconfigured,
    /// Parameters changed since the last rebuild.
    KernelStale,
    /// Kernel, uniforms and sizes match the parameters.
    Ready,
}

/// Uniforms of one blur program.
struct PassParams {
    texel_size: FloatMcShaderParam,
    radius: IntMcShaderParam,
    texture: IntMcShaderParam,
    kernel_tex: IntMcShaderParam,
}

impl PassParams {
    fn new() -> Self {
        Self {
            texel_size: FloatMcShaderParam::new(U_TEXEL_SIZE),
            radius: IntMcShaderParam::new(U_RADIUS),
            texture: IntMcShaderParam::new(U_TEXTURE),
            kernel_tex: IntMcShaderParam::new(U_KERNEL_TEX),
        }
    }

    fn set(&self, texel_size: f32, radius: u32) {
        self.texel_size.set(texel_size);
        self.radius.set(radius as i32);
        self.texture.set(SOURCE_UNIT as i32);
        self.kernel_tex.set(KERNEL_UNIT as i32);
    }

    fn bind(&self, ctx: &mut dyn RenderContext, program: ProgramId) -> GpuResult<()> {
        self.texel_size.bind(ctx, program)?;
        self.radius.bind(ctx, program)?;
        self.texture.bind(ctx, program)?;
        self.kernel_tex.bind(ctx, program)?;
        Ok(())
    }

    fn forget(&self, id: ContextId) {
        self.texel_size.forget(id);
        self.radius.forget(id);
        self.texture.forget(id);
        self.kernel_tex.forget(id);
    }

    fn upload_count(&self) -> u64 {
        self.texel_size.upload_count()
            + self.radius.upload_count()
            + self.texture.upload_count()
            + self.kernel_tex.upload_count()
    }
}

struct BlurShared {
    config: BlurFilterConfig,
    state: FilterState,
    kernel: Option<GaussianKernel>,
    rebuilds: u64,
}

impl BlurShared {
    fn radius(&self) -> u32 {
        match &self.kernel {
            Some(k) if self.state == FilterState::Ready => k.radius(),
            _ => self.config.radius(),
        }
    }

    fn is_ready_for(&self, source: IntSize) -> bool {
        self.state == FilterState::Ready && self.config.size == source
    }

    fn mark_stale(&mut self) {
        if self.state == FilterState::Ready {
            self.state = FilterState::KernelStale;
        }
    }
}

/// Separable Gaussian blur filter.
pub struct GpuBlurFilter {
    shared: RwLock<BlurShared>,
    pipeline: FilterPipeline,
    gauss_curve: McTexture,
    horiz: PassParams,
    vert: PassParams,
}

impl GpuBlurFilter {
    /// Creates a filter for `size` sources.
    ///
    /// Fails with [`GpuError::InvalidParameter`] for a non-positive `std_dev`,
    /// formats with different channel layouts, or a clipped blur that would
    /// leave nothing of `size`.
    pub fn new(
        size: IntSize,
        src_format: PixelFormat,
        dest_format: PixelFormat,
        std_dev: f32,
        clip_borders: bool,
        standalone: bool,
        use_float_kernel: bool,
    ) -> GpuResult<Self> {
        Self::with_config(BlurFilterConfig {
            size,
            src_format,
            dest_format,
            std_dev,
            clip_borders,
            standalone,
            use_float_kernel,
            ..Default::default()
        })
    }

    pub fn with_config(config: BlurFilterConfig) -> GpuResult<Self> {
        config.validate()?;
        debug!(target: log_target::SHADER, size = %config.size, std_dev = config.std_dev, clip = config.clip_borders, standalone = config.standalone, "blur filter created");
        Ok(Self {
            pipeline: FilterPipeline::new("blur", config.standalone),
            shared: RwLock::new(BlurShared {
                config,
                state: FilterState::Unconfigured,
                kernel: None,
                rebuilds: 0,
            }),
            gauss_curve: McTexture::new("gauss_curve"),
            horiz: PassParams::new(),
            vert: PassParams::new(),
        })
    }

    // ---- parameters -------------------------------------------------------

    /// Changes the blur strength. Equal values are a no-op.
    pub fn set_std_dev(&self, std_dev: f32) -> GpuResult<()> {
        validate_std_dev(std_dev)?;
        let mut shared = write(&self.shared);
        if shared.config.std_dev == std_dev {
            return Ok(());
        }
        let candidate = BlurFilterConfig {
            std_dev,
            ..shared.config.clone()
        };
        if shared.config.clip_borders && !shared.config.resizable {
            plan_for(&candidate, candidate.radius(), candidate.size)?;
        }
        shared.config = candidate;
        shared.mark_stale();
        trace!(target: log_target::SHADER, std_dev, state = ?shared.state, "std_dev changed");
        Ok(())
    }

    /// Changes the edge rule. Equal values are a no-op.
    pub fn set_wrap_mode(&self, wrap_mode: WrapMode) {
        let mut shared = write(&self.shared);
        if shared.config.wrap_mode != wrap_mode {
            shared.config.wrap_mode = wrap_mode;
            shared.mark_stale();
        }
    }

    // ---- apply ------------------------------------------------------------

    /// Blurs `source` into the filter's own destination texture on `ctx`.
    ///
    /// The returned texture belongs to the filter and is overwritten by the
    /// next apply on the same context. Standalone filters only.
    pub fn apply_on_gpu(&self, ctx: &mut dyn RenderContext, source: TextureId) -> GpuResult<TextureId> {
        if !self.pipeline.is_standalone() {
            return Err(GpuError::InvalidParameter(
                "filter is not standalone, use apply_on_gpu_into".into(),
            ));
        }
        self.apply_inner(ctx, source, None)
    }

    /// Blurs `source` into `dest`, which must have the output size.
    pub fn apply_on_gpu_into(&self, ctx: &mut dyn RenderContext, source: TextureId, dest: TextureId) -> GpuResult<()> {
        self.apply_inner(ctx, source, Some(dest)).map(|_| ())
    }

    /// Uploads `bitmap`, blurs it and reads the result back.
    pub fn apply_bitmap(&self, ctx: &mut dyn RenderContext, bitmap: &Bitmap) -> GpuResult<Bitmap> {
        let source = ctx.upload_bitmap(bitmap)?;
        let result = if self.pipeline.is_standalone() {
            self.apply_inner(ctx, source, None)
                .and_then(|out| ctx.read_texture(out))
        } else {
            self.output_size(bitmap.size()).and_then(|size| {
                let dest = ctx.create_texture(size, self.config().dest_format)?;
                let out = self
                    .apply_inner(ctx, source, Some(dest))
                    .and_then(|_| ctx.read_texture(dest));
                ctx.delete_texture(dest);
                out
            })
        };
        ctx.delete_texture(source);
        result
    }

    fn apply_inner(&self, ctx: &mut dyn RenderContext, source: TextureId, dest: Option<TextureId>) -> GpuResult<TextureId> {
        let source_size = ctx.texture_size(source)?;
        let source_format = ctx.texture_format(source)?;
        self.check_source(ctx, source_format)?;

        loop {
            {
                let shared = read(&self.shared);
                if shared.is_ready_for(source_size) {
                    let passes = BlurPasses {
                        filter: self,
                        shared: &shared,
                    };
                    let result = self.pipeline.apply(ctx, &passes, source, dest);
                    drop(shared);
                    if let Err(GpuError::GpuResource(msg)) = &result {
                        debug!(target: log_target::MEMORY, context = %ctx.id(), "blur failed, retrying next apply: {msg}");
                        write(&self.shared).mark_stale();
                    }
                    return result;
                }
            }
            self.prepare(source_size)?;
        }
    }

    /// Rejects inputs no rebuild can fix, before any state changes.
    fn check_source(&self, ctx: &dyn RenderContext, source_format: PixelFormat) -> GpuResult<()> {
        let shared = read(&self.shared);
        if source_format != shared.config.src_format {
            return Err(GpuError::InvalidParameter(format!(
                "source texture is {source_format}, filter expects {}",
                shared.config.src_format
            )));
        }
        let radius = shared.radius();
        let supported = max_supported_radius(ctx.limits().max_texture_dim);
        if radius > supported {
            return Err(GpuError::InvalidParameter(format!(
                "kernel radius {radius} exceeds {supported} supported by {}",
                ctx.backend_name()
            )));
        }
        Ok(())
    }

    /// Brings the shared state to `Ready` for `source_size`.
    fn prepare(&self, source_size: IntSize) -> GpuResult<()> {
        let mut shared = write(&self.shared);
        if shared.config.size != source_size {
            if !shared.config.resizable {
                return Err(GpuError::ConfigurationMismatch {
                    expected: shared.config.size,
                    actual: source_size,
                });
            }
            debug!(target: log_target::CONFIG, from = %shared.config.size, to = %source_size, "blur filter resized");
            shared.config.size = source_size;
            shared.mark_stale();
        }
        if shared.state != FilterState::Ready {
            self.set_dimensions(&mut shared)?;
        }
        Ok(())
    }

    /// Rebuilds kernel, kernel texture contents and uniforms.
    fn set_dimensions(&self, shared: &mut BlurShared) -> GpuResult<()> {
        let config = &shared.config;
        let kernel = build_kernel(config.std_dev, config.max_radius, config.precision())?;
        let radius = kernel.radius();
        plan_for(config, radius, config.size)?;

        if shared.kernel.as_ref() != Some(&kernel) {
            self.gauss_curve.set_bitmap(kernel.to_bitmap()?);
        }
        // The vertical pass reads the intermediate, which keeps the source height.
        self.horiz.set(1.0 / config.size.width as f32, radius);
        self.vert.set(1.0 / config.size.height as f32, radius);

        debug!(target: log_target::SHADER, std_dev = config.std_dev, radius, size = %config.size, precision = ?config.precision(), "blur kernel rebuilt");
        shared.kernel = Some(kernel);
        shared.state = FilterState::Ready;
        shared.rebuilds += 1;
        Ok(())
    }

    fn render_blur_pass(&self, ctx: &mut dyn RenderContext, pass: &PassInvocation<'_>) -> GpuResult<()> {
        let (kind, params) = match pass.index {
            0 => (ShaderKind::HorizontalBlur, &self.horiz),
            1 => (ShaderKind::VerticalBlur, &self.vert),
            i => return Err(GpuError::InvalidParameter(format!("blur has no pass {i}"))),
        };
        let program = ctx.program(kind)?;
        params.bind(ctx, program)?;
        let kernel = self.gauss_curve.get(ctx)?;
        let bindings = ShaderBindings::new()
            .texture(SOURCE_UNIT, pass.source, pass.spec.wrap)
            .texture(KERNEL_UNIT, kernel, WrapMode::Clamp);
        pass.spec.projection.draw(ctx, pass.target, program, &bindings);
        Ok(())
    }

    // ---- accessors --------------------------------------------------------

    pub fn state(&self) -> FilterState {
        read(&self.shared).state
    }

    pub fn std_dev(&self) -> f32 {
        read(&self.shared).config.std_dev
    }

    pub fn wrap_mode(&self) -> WrapMode {
        read(&self.shared).config.wrap_mode
    }

    /// Kernel radius for the current parameters.
    pub fn radius(&self) -> u32 {
        read(&self.shared).radius()
    }

    /// Kernel of the last rebuild.
    pub fn kernel(&self) -> Option<GaussianKernel> {
        read(&self.shared).kernel.clone()
    }

    /// Snapshot of the settings.
    pub fn config(&self) -> BlurFilterConfig {
        read(&self.shared).config.clone()
    }

    pub fn is_standalone(&self) -> bool {
        self.pipeline.is_standalone()
    }

    /// Output size for a `source` image under the current parameters.
    pub fn output_size(&self, source: IntSize) -> GpuResult<IntSize> {
        let shared = read(&self.shared);
        Ok(plan_for(&shared.config, shared.radius(), source)?.output_size())
    }

    /// Output size for the configured source size.
    pub fn dest_size(&self) -> GpuResult<IntSize> {
        let size = read(&self.shared).config.size;
        self.output_size(size)
    }

    /// Size of the horizontal pass result for the configured source size.
    pub fn intermediate_size(&self) -> GpuResult<IntSize> {
        let shared = read(&self.shared);
        let plan = plan_for(&shared.config, shared.radius(), shared.config.size)?;
        Ok(plan.passes()[0].target_size)
    }

    /// Kernel rebuilds so far.
    pub fn rebuild_count(&self) -> u64 {
        read(&self.shared).rebuilds
    }

    /// Kernel texture uploads so far, over all contexts.
    pub fn kernel_upload_count(&self) -> u64 {
        self.gauss_curve.upload_count()
    }

    /// Uniform writes so far, over all contexts.
    pub fn param_upload_count(&self) -> u64 {
        self.horiz.upload_count() + self.vert.upload_count()
    }

    /// Render target (re)allocations so far, over all contexts.
    pub fn allocation_count(&self) -> u64 {
        self.pipeline.allocation_count()
    }

    /// Contexts holding render targets for this filter.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.pipeline.contexts()
    }

    /// Frees everything the filter holds on `ctx`. Other contexts are untouched.
    pub fn release_context(&self, ctx: &mut dyn RenderContext) {
        self.pipeline.release_context(ctx);
        self.gauss_curve.release(ctx);
        self.horiz.forget(ctx.id());
        self.vert.forget(ctx.id());
        debug!(target: log_target::MEMORY, context = %ctx.id(), "blur filter released context");
    }

    /// Drops bookkeeping for a context that was destroyed.
    pub fn forget_context(&self, id: ContextId) {
        self.pipeline.forget_context(id);
        self.gauss_curve.forget(id);
        self.horiz.forget(id);
        self.vert.forget(id);
    }
}

impl std::fmt::Debug for GpuBlurFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = read(&self.shared);
        f.debug_struct("GpuBlurFilter")
            .field("config", &shared.config)
            .field("state", &shared.state)
            .field("contexts", &self.pipeline.contexts())
            .finish()
    }
}

impl GpuFilter for GpuBlurFilter {
    fn name(&self) -> &'static str {
        "gaussian_blur"
    }

    fn configure(&self, source_size: IntSize) -> GpuResult<PassPlan> {
        let shared = read(&self.shared);
        plan_for(&shared.config, shared.radius(), source_size)
    }

    fn render_pass(&self, ctx: &mut dyn RenderContext, pass: &PassInvocation<'_>) -> GpuResult<()> {
        self.render_blur_pass(ctx, pass)
    }
}

/// The filter seen through a held read lock, so a whole apply sees one
/// consistent configuration.
struct BlurPasses<'a> {
    filter: &'a GpuBlurFilter,
    shared: &'a BlurShared,
}

impl GpuFilter for BlurPasses<'_> {
    fn name(&self) -> &'static str {
        self.filter.name()
    }

    fn configure(&self, source_size: IntSize) -> GpuResult<PassPlan> {
        plan_for(&self.shared.config, self.shared.radius(), source_size)
    }

    fn render_pass(&self, ctx: &mut dyn RenderContext, pass: &PassInvocation<'_>) -> GpuResult<()> {
        self.filter.render_blur_pass(ctx, pass)
    }
}
