//! Software rendering context using rayon for parallelization.
//!
//! Behaves like a GPU context as far as filters can tell: textures round
//! values to their storage format, samplers apply wrap modes, uniforms persist
//! per program, and draw errors are queued until [`check_error`].
//!
//! [`check_error`]: RenderContext::check_error

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, trace};

use gpufx_core::log::target as log_target;
use gpufx_core::{Bitmap, IntSize, PixelFormat, WrapMode};

use super::{
    ContextId, FramebufferId, GpuLimits, ProgramId, ProgramUniforms, RenderContext, ShaderBindings,
    ShaderKind, TextureBinding, TextureId, UniformValue,
};
use crate::projection::ImagingProjection;
use crate::{GpuError, GpuResult};

/// Texture in RAM.
struct CpuTexture {
    size: IntSize,
    format: PixelFormat,
    data: Vec<f32>,
}

impl CpuTexture {
    #[inline]
    fn channels(&self) -> usize {
        self.format.channels() as usize
    }

    /// Texel `(x, y)` after applying `wrap` on both axes.
    #[inline]
    fn fetch(&self, x: i64, y: i64, wrap: WrapMode) -> &[f32] {
        let x = wrap.resolve(x, self.size.width) as usize;
        let y = wrap.resolve(y, self.size.height) as usize;
        let c = self.channels();
        let i = (y * self.size.width as usize + x) * c;
        &self.data[i..i + c]
    }
}

/// Work counters, mainly for tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContextStats {
    pub textures_created: u64,
    pub uploads: u64,
    pub readbacks: u64,
    pub programs_compiled: u64,
    pub uniform_writes: u64,
    pub draws: u64,
}

/// Software rendering context.
pub struct CpuContext {
    id: ContextId,
    limits: GpuLimits,
    textures: HashMap<u32, CpuTexture>,
    framebuffers: HashMap<u32, u32>,
    programs: HashMap<ShaderKind, ProgramUniforms>,
    next_index: u32,
    used_bytes: u64,
    errors: Vec<String>,
    stats: CpuContextStats,
}

impl CpuContext {
    /// Context sized to system memory.
    pub fn new() -> Self {
        Self::with_limits(GpuLimits::detect_cpu())
    }

    /// Context with explicit limits.
    pub fn with_limits(limits: GpuLimits) -> Self {
        let id = ContextId::next();
        debug!(target: log_target::MEMORY, context = %id, max_texture_dim = limits.max_texture_dim, available = limits.available_memory, "cpu context created");
        Self {
            id,
            limits,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            next_index: 1,
            used_bytes: 0,
            errors: Vec::new(),
            stats: CpuContextStats::default(),
        }
    }

    /// Bytes held by live textures.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn stats(&self) -> CpuContextStats {
        self.stats
    }

    /// Changes the limits for later allocations.
    pub fn set_limits(&mut self, limits: GpuLimits) {
        self.limits = limits;
    }

    fn alloc_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn texture(&self, texture: TextureId) -> GpuResult<&CpuTexture> {
        texture.check_owner(self.id)?;
        self.textures
            .get(&texture.index())
            .ok_or_else(|| GpuError::InvalidHandle(format!("texture {} was deleted", texture.index())))
    }

    fn texture_mut(&mut self, texture: TextureId) -> GpuResult<&mut CpuTexture> {
        texture.check_owner(self.id)?;
        self.textures
            .get_mut(&texture.index())
            .ok_or_else(|| GpuError::InvalidHandle(format!("texture {} was deleted", texture.index())))
    }

    fn bound_texture(&self, bindings: &ShaderBindings, unit: i32) -> GpuResult<(TextureBinding, &CpuTexture)> {
        let binding = u32::try_from(unit)
            .ok()
            .and_then(|u| bindings.get(u))
            .copied()
            .ok_or_else(|| GpuError::GpuResource(format!("no texture bound to unit {unit}")))?;
        let texture = self.texture(binding.texture)?;
        Ok((binding, texture))
    }

    fn draw(
        &self,
        target: FramebufferId,
        program: ProgramId,
        bindings: &ShaderBindings,
        projection: &ImagingProjection,
    ) -> GpuResult<(u32, Vec<f32>)> {
        target.check_owner(self.id)?;
        program.check_owner(self.id)?;
        let target_index = *self
            .framebuffers
            .get(&target.index())
            .ok_or_else(|| GpuError::InvalidHandle(format!("framebuffer {} was deleted", target.index())))?;
        let out_tex = self
            .textures
            .get(&target_index)
            .ok_or_else(|| GpuError::GpuResource("framebuffer attachment was deleted".into()))?;
        let uniforms = self
            .programs
            .get(&program.kind())
            .copied()
            .ok_or_else(|| GpuError::InvalidHandle(format!("program {} not compiled", program.kind())))?;

        let (src_binding, src) = self.bound_texture(bindings, uniforms.texture)?;
        if src_binding.texture.index() == target_index {
            return Err(GpuError::GpuResource("feedback loop: render target is also sampled".into()));
        }
        if src.channels() != out_tex.channels() {
            return Err(GpuError::GpuResource(format!(
                "cannot render {} into {}",
                src.format, out_tex.format
            )));
        }

        let size = out_tex.size;
        let format = out_tex.format;
        let c = out_tex.channels();
        let row_len = size.width as usize * c;
        let mut out = vec![0.0f32; row_len * size.height as usize];
        let wrap = src_binding.wrap;

        match program.kind().direction() {
            None => {
                out.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
                    for x in 0..size.width {
                        let (cx, cy) = projection.source_center(x, y as u32);
                        let texel = src.fetch(cx.floor() as i64, cy.floor() as i64, wrap);
                        let o = x as usize * c;
                        for (dst, v) in row[o..o + c].iter_mut().zip(texel) {
                            *dst = format.store(*v);
                        }
                    }
                });
            }
            Some((dx, dy)) => {
                let (kernel_binding, kernel) = self.bound_texture(bindings, uniforms.kernel_tex)?;
                if kernel_binding.texture.index() == target_index {
                    return Err(GpuError::GpuResource("feedback loop: render target is also sampled".into()));
                }
                let radius = uniforms.radius.max(0) as i64;
                let texel_size = uniforms.texel_size;
                let axis_len = if dx != 0 { src.size.width } else { src.size.height };

                out.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
                    let mut acc = [0.0f32; 4];
                    for x in 0..size.width {
                        acc.fill(0.0);
                        let (cx, cy) = projection.source_center(x, y as u32);
                        for k in -radius..=radius {
                            let weight = kernel.fetch(k + radius, 0, WrapMode::Clamp)[0];
                            let (sx, sy) = if dx != 0 {
                                let u = (cx + (k * dx) as f32) * texel_size;
                                ((u * axis_len as f32).floor() as i64, cy.floor() as i64)
                            } else {
                                let v = (cy + (k * dy) as f32) * texel_size;
                                (cx.floor() as i64, (v * axis_len as f32).floor() as i64)
                            };
                            for (a, v) in acc.iter_mut().zip(src.fetch(sx, sy, wrap)) {
                                *a += v * weight;
                            }
                        }
                        let o = x as usize * c;
                        for (dst, a) in row[o..o + c].iter_mut().zip(&acc) {
                            *dst = format.store(*a);
                        }
                    }
                });
            }
        }

        Ok((target_index, out))
    }
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext for CpuContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn backend_name(&self) -> &'static str {
        "cpu"
    }

    fn limits(&self) -> &GpuLimits {
        &self.limits
    }

    fn create_texture(&mut self, size: IntSize, format: PixelFormat) -> GpuResult<TextureId> {
        let bytes = self.limits.check_texture(size, format, self.used_bytes)?;
        let index = self.alloc_index();
        let len = size.area() as usize * format.channels() as usize;
        self.textures.insert(
            index,
            CpuTexture {
                size,
                format,
                data: vec![0.0; len],
            },
        );
        self.used_bytes += bytes;
        self.stats.textures_created += 1;
        trace!(target: log_target::MEMORY, context = %self.id, index, %size, %format, used = self.used_bytes, "texture created");
        Ok(TextureId::new(self.id, index))
    }

    fn upload_texture(&mut self, texture: TextureId, bitmap: &Bitmap) -> GpuResult<()> {
        let tex = self.texture_mut(texture)?;
        if bitmap.size() != tex.size || bitmap.format().channels() != tex.format.channels() {
            return Err(GpuError::InvalidParameter(format!(
                "cannot upload {} {} into {} {} texture",
                bitmap.size(),
                bitmap.format(),
                tex.size,
                tex.format
            )));
        }
        let format = tex.format;
        tex.data
            .par_iter_mut()
            .zip(bitmap.data().par_iter())
            .for_each(|(dst, v)| *dst = format.store(*v));
        self.stats.uploads += 1;
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> GpuResult<Bitmap> {
        let tex = self.texture(texture)?;
        let bitmap = Bitmap::from_f32(tex.size, tex.format, tex.data.clone())?;
        self.stats.readbacks += 1;
        Ok(bitmap)
    }

    fn texture_size(&self, texture: TextureId) -> GpuResult<IntSize> {
        Ok(self.texture(texture)?.size)
    }

    fn texture_format(&self, texture: TextureId) -> GpuResult<PixelFormat> {
        Ok(self.texture(texture)?.format)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if texture.check_owner(self.id).is_err() {
            return;
        }
        if let Some(tex) = self.textures.remove(&texture.index()) {
            self.used_bytes -= GpuLimits::texture_bytes(tex.size, tex.format);
            trace!(target: log_target::MEMORY, context = %self.id, index = texture.index(), used = self.used_bytes, "texture deleted");
        }
    }

    fn create_framebuffer(&mut self, color: TextureId) -> GpuResult<FramebufferId> {
        self.texture(color)?;
        let index = self.alloc_index();
        self.framebuffers.insert(index, color.index());
        Ok(FramebufferId::new(self.id, index))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if framebuffer.check_owner(self.id).is_ok() {
            self.framebuffers.remove(&framebuffer.index());
        }
    }

    fn program(&mut self, kind: ShaderKind) -> GpuResult<ProgramId> {
        if !self.programs.contains_key(&kind) {
            self.programs.insert(kind, ProgramUniforms::default());
            self.stats.programs_compiled += 1;
            debug!(target: log_target::SHADER, context = %self.id, program = %kind, "program compiled");
        }
        Ok(ProgramId::new(self.id, kind))
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        let result = program.check_owner(self.id).and_then(|_| {
            self.programs
                .get_mut(&program.kind())
                .ok_or_else(|| GpuError::InvalidHandle(format!("program {} not compiled", program.kind())))?
                .set(program.kind(), name, value)
        });
        match result {
            Ok(()) => self.stats.uniform_writes += 1,
            Err(e) => self.errors.push(e.to_string()),
        }
    }

    fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        program.check_owner(self.id).ok()?;
        self.programs.get(&program.kind())?.get(program.kind(), name)
    }

    fn draw_full_frame(
        &mut self,
        target: FramebufferId,
        program: ProgramId,
        bindings: &ShaderBindings,
        projection: &ImagingProjection,
    ) {
        match self.draw(target, program, bindings, projection) {
            Ok((index, data)) => {
                if let Some(tex) = self.textures.get_mut(&index) {
                    tex.data = data;
                }
                self.stats.draws += 1;
                trace!(target: log_target::SHADER, context = %self.id, program = %program.kind(), dest = %projection.dest_size(), "draw");
            }
            Err(e) => self.errors.push(e.to_string()),
        }
    }

    fn check_error(&mut self) -> GpuResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let msg = std::mem::take(&mut self.errors).join("; ");
        Err(GpuError::GpuResource(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KERNEL_UNIT, SOURCE_UNIT, U_KERNEL_TEX, U_RADIUS, U_TEXEL_SIZE, U_TEXTURE};
    use approx::assert_abs_diff_eq;
    use gpufx_core::IntRect;

    fn ramp(size: IntSize) -> Bitmap {
        let data = (0..size.area()).map(|i| i as f32 / size.area() as f32).collect();
        Bitmap::from_f32(size, PixelFormat::I8, data).unwrap()
    }

    fn kernel_tex(ctx: &mut CpuContext, weights: &[f32]) -> TextureId {
        let bmp = Bitmap::from_f32(IntSize::new(weights.len() as u32, 1), PixelFormat::R32G32B32A32F,
            weights.iter().flat_map(|w| [*w; 4]).collect()).unwrap();
        ctx.upload_bitmap(&bmp).unwrap()
    }

    #[test]
    fn test_upload_rounds_to_format() {
        let mut ctx = CpuContext::new();
        let bmp = Bitmap::filled(IntSize::new(2, 2), PixelFormat::I8, &[0.3]).unwrap();
        let tex = ctx.upload_bitmap(&bmp).unwrap();
        let back = ctx.read_texture(tex).unwrap();
        assert_eq!(back, bmp.stored());
        assert_eq!(ctx.used_bytes(), 4);
        ctx.delete_texture(tex);
        assert_eq!(ctx.used_bytes(), 0);
        assert!(ctx.read_texture(tex).is_err());
    }

    #[test]
    fn test_memory_budget() {
        let mut ctx = CpuContext::with_limits(GpuLimits {
            max_texture_dim: 64,
            available_memory: 1000,
        });
        let a = ctx.create_texture(IntSize::new(16, 16), PixelFormat::R8G8B8A8);
        assert!(matches!(a, Err(GpuError::GpuResource(_))));
        assert!(ctx.create_texture(IntSize::new(30, 30), PixelFormat::I8).is_ok());
        assert!(ctx.create_texture(IntSize::new(30, 30), PixelFormat::I8).is_err());
        assert!(ctx.create_texture(IntSize::new(65, 1), PixelFormat::I8).is_err());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut a = CpuContext::new();
        let mut b = CpuContext::new();
        let tex = a.create_texture(IntSize::new(1, 1), PixelFormat::I8).unwrap();
        assert!(matches!(b.texture_size(tex), Err(GpuError::InvalidHandle(_))));
        assert!(b.create_framebuffer(tex).is_err());
    }

    #[test]
    fn test_copy_with_offset() {
        let mut ctx = CpuContext::new();
        let src = ctx.upload_bitmap(&ramp(IntSize::new(4, 4))).unwrap();
        let dst = ctx.create_texture(IntSize::new(2, 2), PixelFormat::I8).unwrap();
        let fb = ctx.create_framebuffer(dst).unwrap();
        let prog = ctx.program(ShaderKind::Copy).unwrap();
        let bindings = ShaderBindings::new().texture(SOURCE_UNIT, src, WrapMode::Clamp);
        let proj = ImagingProjection::new(IntSize::new(2, 2), IntRect::new(1, 1, 2, 2));
        proj.draw(&mut ctx, fb, prog, &bindings);
        ctx.check_error().unwrap();

        let src_bmp = ctx.read_texture(src).unwrap();
        let out = ctx.read_texture(dst).unwrap();
        assert_eq!(out.pixel(0, 0), src_bmp.pixel(1, 1));
        assert_eq!(out.pixel(1, 1), src_bmp.pixel(2, 2));
    }

    #[test]
    fn test_horizontal_convolution() {
        let mut ctx = CpuContext::new();
        let size = IntSize::new(5, 1);
        let bmp = Bitmap::from_f32(size, PixelFormat::R32G32B32A32F,
            [0.0, 0.0, 1.0, 0.0, 0.0].iter().flat_map(|v| [*v, *v, *v, 1.0]).collect()).unwrap();
        let src = ctx.upload_bitmap(&bmp).unwrap();
        let kernel = kernel_tex(&mut ctx, &[0.25, 0.5, 0.25]);
        let dst = ctx.create_texture(size, PixelFormat::R32G32B32A32F).unwrap();
        let fb = ctx.create_framebuffer(dst).unwrap();

        let prog = ctx.program(ShaderKind::HorizontalBlur).unwrap();
        ctx.set_uniform(prog, U_TEXEL_SIZE, UniformValue::Float(1.0 / 5.0));
        ctx.set_uniform(prog, U_RADIUS, UniformValue::Int(1));
        ctx.set_uniform(prog, U_TEXTURE, UniformValue::Int(SOURCE_UNIT as i32));
        ctx.set_uniform(prog, U_KERNEL_TEX, UniformValue::Int(KERNEL_UNIT as i32));
        let bindings = ShaderBindings::new()
            .texture(SOURCE_UNIT, src, WrapMode::Clamp)
            .texture(KERNEL_UNIT, kernel, WrapMode::Clamp);
        ImagingProjection::identity(size).draw(&mut ctx, fb, prog, &bindings);
        ctx.check_error().unwrap();

        let out = ctx.read_texture(dst).unwrap();
        let row: Vec<f32> = (0..5).map(|x| out.pixel(x, 0)[0]).collect();
        for (got, want) in row.iter().zip([0.0, 0.25, 0.5, 0.25, 0.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(out.pixel(2, 0)[3], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_draw_errors_are_queued() {
        let mut ctx = CpuContext::new();
        let dst = ctx.create_texture(IntSize::new(2, 2), PixelFormat::I8).unwrap();
        let fb = ctx.create_framebuffer(dst).unwrap();
        let prog = ctx.program(ShaderKind::Copy).unwrap();
        ctx.set_uniform(prog, U_RADIUS, UniformValue::Int(1));
        ImagingProjection::identity(IntSize::new(2, 2)).draw(&mut ctx, fb, prog, &ShaderBindings::new());

        let err = ctx.check_error().unwrap_err();
        assert!(matches!(err, GpuError::GpuResource(ref m) if m.contains("no texture bound")));
        assert!(ctx.check_error().is_ok());
        assert_eq!(ctx.stats().draws, 0);
    }

    #[test]
    fn test_feedback_loop_rejected() {
        let mut ctx = CpuContext::new();
        let tex = ctx.create_texture(IntSize::new(2, 2), PixelFormat::I8).unwrap();
        let fb = ctx.create_framebuffer(tex).unwrap();
        let prog = ctx.program(ShaderKind::Copy).unwrap();
        let bindings = ShaderBindings::new().texture(SOURCE_UNIT, tex, WrapMode::Clamp);
        ImagingProjection::identity(IntSize::new(2, 2)).draw(&mut ctx, fb, prog, &bindings);
        assert!(ctx.check_error().is_err());
    }

    #[test]
    fn test_program_compiled_once() {
        let mut ctx = CpuContext::new();
        let a = ctx.program(ShaderKind::VerticalBlur).unwrap();
        let b = ctx.program(ShaderKind::VerticalBlur).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.stats().programs_compiled, 1);
        ctx.set_uniform(a, U_RADIUS, UniformValue::Int(4));
        assert_eq!(ctx.uniform(b, U_RADIUS), Some(UniformValue::Int(4)));
    }
}
