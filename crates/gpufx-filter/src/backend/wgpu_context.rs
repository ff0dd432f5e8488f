//! wgpu rendering context.
//!
//! Textures are real GPU textures, programs are render pipelines drawing a
//! full-screen triangle. Draws are submitted right away and never waited on;
//! only [`read_texture`](RenderContext::read_texture) blocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytemuck::{Pod, Zeroable};
use tracing::{debug, trace, warn};
use wgpu::util::DeviceExt;

use gpufx_core::log::target as log_target;
use gpufx_core::{Bitmap, IntSize, PixelFormat};

use super::{
    ContextId, FramebufferId, GpuLimits, ProgramId, ProgramUniforms, RenderContext, ShaderBindings,
    ShaderKind, TextureId, UniformValue,
};
use crate::projection::ImagingProjection;
use crate::resource::lock;
use crate::shaders;
use crate::{GpuError, GpuResult};

/// Environment variable overriding the detected video memory, in MiB.
pub const GPU_MEMORY_ENV: &str = "GPUFX_GPU_MEMORY_MB";

// =============================================================================
// Uniform Buffers
// =============================================================================

/// Uniform block shared by all programs. Layout matches `Params` in WGSL.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ParamsUniform {
    texel_size: f32,
    radius: i32,
    texture: i32,
    kernel_tex: i32,
    src_offset: [f32; 2],
    wrap_mode: u32,
    _pad: u32,
}

// =============================================================================
// Textures
// =============================================================================

struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: IntSize,
    format: PixelFormat,
    bytes: u64,
}

/// GPU format for a pixel format.
///
/// Channels are moved positionally, so BGRA data lives in an RGBA texture
/// and comes back in the order it went in.
fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::I8 => wgpu::TextureFormat::R8Unorm,
        PixelFormat::R8G8B8A8 | PixelFormat::B8G8R8A8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::R16G16B16A16F => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::R32G32B32A32F => wgpu::TextureFormat::Rgba32Float,
    }
}

/// Packs normalized values into texel bytes.
fn encode_texels(format: PixelFormat, data: &[f32]) -> Vec<u8> {
    match format {
        PixelFormat::I8 | PixelFormat::R8G8B8A8 | PixelFormat::B8G8R8A8 => data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect(),
        PixelFormat::R16G16B16A16F => data
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_bits().to_le_bytes())
            .collect(),
        PixelFormat::R32G32B32A32F => bytemuck::cast_slice(data).to_vec(),
    }
}

/// Inverse of [`encode_texels`].
fn decode_texels(format: PixelFormat, bytes: &[u8]) -> Vec<f32> {
    match format {
        PixelFormat::I8 | PixelFormat::R8G8B8A8 | PixelFormat::B8G8R8A8 => {
            bytes.iter().map(|b| *b as f32 / 255.0).collect()
        }
        PixelFormat::R16G16B16A16F => bytes
            .chunks_exact(2)
            .map(|b| half::f16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32())
            .collect(),
        PixelFormat::R32G32B32A32F => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}

fn fragment_entry(kind: ShaderKind) -> &'static str {
    match kind {
        ShaderKind::HorizontalBlur => "fs_horizontal",
        ShaderKind::VerticalBlur => "fs_vertical",
        ShaderKind::Copy => "fs_copy",
    }
}

// =============================================================================
// WgpuContext
// =============================================================================

/// Rendering context on a wgpu device.
pub struct WgpuContext {
    id: ContextId,
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    limits: GpuLimits,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    modules: HashMap<ShaderKind, wgpu::ShaderModule>,
    pipelines: HashMap<(ShaderKind, wgpu::TextureFormat), wgpu::RenderPipeline>,
    programs: HashMap<ShaderKind, ProgramUniforms>,
    textures: HashMap<u32, WgpuTexture>,
    framebuffers: HashMap<u32, u32>,
    next_index: u32,
    used_bytes: u64,
    errors: Vec<String>,
    device_errors: Arc<Mutex<Vec<String>>>,
}

impl WgpuContext {
    /// Check if wgpu is available.
    pub fn is_available() -> bool {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .is_some()
        })
    }

    /// Opens a device on the best adapter.
    pub fn new() -> GpuResult<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> GpuResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gpufx_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        let device_errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&device_errors);
        device.on_uncaptured_error(Box::new(move |e| {
            lock(&sink).push(e.to_string());
        }));

        let info = adapter.get_info();
        let limits = GpuLimits {
            max_texture_dim: adapter_limits.max_texture_dimension_2d,
            available_memory: estimate_vram(&info, adapter_limits.max_buffer_size),
        };

        let bind_group_layout = Self::create_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gpufx_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let id = ContextId::next();
        debug!(target: log_target::MEMORY, context = %id, adapter = %info.name, backend = ?info.backend, max_texture_dim = limits.max_texture_dim, available = limits.available_memory, "wgpu context created");

        Ok(Self {
            id,
            device,
            queue,
            adapter_name: info.name,
            limits,
            bind_group_layout,
            pipeline_layout,
            modules: HashMap::new(),
            pipelines: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            next_index: 1,
            used_bytes: 0,
            errors: Vec::new(),
            device_errors,
        })
    }

    /// Adapter name as reported by the driver.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Bytes held by live textures.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gpufx_bind_group_layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        })
    }

    fn alloc_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn texture(&self, texture: TextureId) -> GpuResult<&WgpuTexture> {
        texture.check_owner(self.id)?;
        self.textures
            .get(&texture.index())
            .ok_or_else(|| GpuError::InvalidHandle(format!("texture {} was deleted", texture.index())))
    }

    /// Runs `f` inside an error scope and turns a captured error into `GpuResource`.
    fn scoped<T>(&self, filter: wgpu::ErrorFilter, f: impl FnOnce(&wgpu::Device) -> T) -> GpuResult<T> {
        self.device.push_error_scope(filter);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(GpuError::GpuResource(e.to_string())),
            None => Ok(value),
        }
    }

    /// Creates the pipeline for `kind` rendering into `format` if missing.
    fn ensure_pipeline(&mut self, kind: ShaderKind, format: wgpu::TextureFormat) -> GpuResult<()> {
        if !self.pipelines.contains_key(&(kind, format)) {
            let module = self
                .modules
                .get(&kind)
                .ok_or_else(|| GpuError::InvalidHandle(format!("program {kind} not compiled")))?;
            let label = format!("{kind}_{format:?}");
            let pipeline = self
                .scoped(wgpu::ErrorFilter::Validation, |device| {
                    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some(label.as_str()),
                        layout: Some(&self.pipeline_layout),
                        vertex: wgpu::VertexState {
                            module,
                            entry_point: Some(shaders::VERTEX_ENTRY),
                            compilation_options: Default::default(),
                            buffers: &[],
                        },
                        fragment: Some(wgpu::FragmentState {
                            module,
                            entry_point: Some(fragment_entry(kind)),
                            compilation_options: Default::default(),
                            targets: &[Some(wgpu::ColorTargetState {
                                format,
                                blend: None,
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                        }),
                        primitive: wgpu::PrimitiveState::default(),
                        depth_stencil: None,
                        multisample: wgpu::MultisampleState::default(),
                        multiview: None,
                        cache: None,
                    })
                })
                .map_err(|e| GpuError::ShaderCompilation(e.to_string()))?;
            debug!(target: log_target::SHADER, context = %self.id, program = %kind, ?format, "render pipeline created");
            self.pipelines.insert((kind, format), pipeline);
        }
        Ok(())
    }

    fn draw(
        &mut self,
        target: FramebufferId,
        program: ProgramId,
        bindings: &ShaderBindings,
        projection: &ImagingProjection,
    ) -> GpuResult<()> {
        target.check_owner(self.id)?;
        program.check_owner(self.id)?;
        let target_index = *self
            .framebuffers
            .get(&target.index())
            .ok_or_else(|| GpuError::InvalidHandle(format!("framebuffer {} was deleted", target.index())))?;
        let uniforms = self
            .programs
            .get(&program.kind())
            .copied()
            .ok_or_else(|| GpuError::InvalidHandle(format!("program {} not compiled", program.kind())))?;

        let bound = |unit: i32| {
            u32::try_from(unit)
                .ok()
                .and_then(|u| bindings.get(u))
                .copied()
                .ok_or_else(|| GpuError::GpuResource(format!("no texture bound to unit {unit}")))
        };
        let src_binding = bound(uniforms.texture)?;
        // Copy doesn't read the kernel; bind the source again to fill the slot.
        let kernel_binding = match program.kind().direction() {
            Some(_) => bound(uniforms.kernel_tex)?,
            None => src_binding,
        };
        for b in [src_binding, kernel_binding] {
            if b.texture.index() == target_index {
                return Err(GpuError::GpuResource("feedback loop: render target is also sampled".into()));
            }
        }

        let out = self
            .textures
            .get(&target_index)
            .ok_or_else(|| GpuError::GpuResource("framebuffer attachment was deleted".into()))?;
        let src = self.texture(src_binding.texture)?;
        let kernel = self.texture(kernel_binding.texture)?;
        if src.format.channels() != out.format.channels() {
            return Err(GpuError::GpuResource(format!(
                "cannot render {} into {}",
                src.format, out.format
            )));
        }
        let out_format = texture_format(out.format);

        let params = ParamsUniform {
            texel_size: uniforms.texel_size,
            radius: uniforms.radius.max(0),
            texture: uniforms.texture,
            kernel_tex: uniforms.kernel_tex,
            src_offset: projection.src_offset(),
            wrap_mode: src_binding.wrap.code(),
            _pad: 0,
        };
        let params_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params_uniform"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gpufx_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&src.view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&kernel.view) },
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
            ],
        });
        // Views are cheap handles; clone so `self` can be borrowed mutably below.
        let out_view = out.view.clone();

        self.ensure_pipeline(program.kind(), out_format)?;
        let pipeline = self
            .pipelines
            .get(&(program.kind(), out_format))
            .ok_or_else(|| GpuError::ShaderCompilation(format!("no pipeline for {}", program.kind())))?;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("draw_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("draw_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &out_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

impl RenderContext for WgpuContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn limits(&self) -> &GpuLimits {
        &self.limits
    }

    fn create_texture(&mut self, size: IntSize, format: PixelFormat) -> GpuResult<TextureId> {
        let bytes = self.limits.check_texture(size, format, self.used_bytes)?;
        let texture = self.scoped(wgpu::ErrorFilter::OutOfMemory, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("gpufx_texture"),
                size: wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(format),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let index = self.alloc_index();
        self.textures.insert(
            index,
            WgpuTexture {
                texture,
                view,
                size,
                format,
                bytes,
            },
        );
        self.used_bytes += bytes;
        trace!(target: log_target::MEMORY, context = %self.id, index, %size, %format, used = self.used_bytes, "texture created");
        Ok(TextureId::new(self.id, index))
    }

    fn upload_texture(&mut self, texture: TextureId, bitmap: &Bitmap) -> GpuResult<()> {
        let tex = self.texture(texture)?;
        if bitmap.size() != tex.size || bitmap.format().channels() != tex.format.channels() {
            return Err(GpuError::InvalidParameter(format!(
                "cannot upload {} {} into {} {} texture",
                bitmap.size(),
                bitmap.format(),
                tex.size,
                tex.format
            )));
        }
        let bytes = encode_texels(tex.format, bitmap.data());
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(tex.size.width * tex.format.bytes_per_pixel()),
                rows_per_image: Some(tex.size.height),
            },
            wgpu::Extent3d {
                width: tex.size.width,
                height: tex.size.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> GpuResult<Bitmap> {
        let tex = self.texture(texture)?;
        let (size, format) = (tex.size, tex.format);
        let row_bytes = size.width * format.bytes_per_pixel();
        let padded = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size: padded as u64 * size.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| GpuError::GpuResource("map channel closed".into()))?
            .map_err(|e| GpuError::GpuResource(format!("map failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let mut texels = Vec::with_capacity((row_bytes * size.height) as usize);
        for row in mapped.chunks_exact(padded as usize) {
            texels.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        staging.unmap();

        Ok(Bitmap::from_f32(size, format, decode_texels(format, &texels))?)
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
            self.used_bytes -= tex.bytes;
            tex.texture.destroy();
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
        if !self.modules.contains_key(&kind) {
            let source = match kind {
                ShaderKind::HorizontalBlur | ShaderKind::VerticalBlur => shaders::blur_source(),
                ShaderKind::Copy => shaders::copy_source(),
            };
            let module = self
                .scoped(wgpu::ErrorFilter::Validation, |device| {
                    device.create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(kind.name()),
                        source: wgpu::ShaderSource::Wgsl(source.into()),
                    })
                })
                .map_err(|e| GpuError::ShaderCompilation(e.to_string()))?;
            self.modules.insert(kind, module);
            self.programs.insert(kind, ProgramUniforms::default());
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
        if let Err(e) = result {
            self.errors.push(e.to_string());
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
            Ok(()) => {
                trace!(target: log_target::SHADER, context = %self.id, program = %program.kind(), dest = %projection.dest_size(), "draw submitted");
            }
            Err(e) => self.errors.push(e.to_string()),
        }
    }

    fn check_error(&mut self) -> GpuResult<()> {
        self.errors.append(&mut lock(&self.device_errors));
        if self.errors.is_empty() {
            return Ok(());
        }
        let msg = std::mem::take(&mut self.errors).join("; ");
        warn!(target: log_target::SHADER, context = %self.id, "{msg}");
        Err(GpuError::GpuResource(msg))
    }
}

impl Drop for WgpuContext {
    fn drop(&mut self) {
        for (_, tex) in self.textures.drain() {
            tex.texture.destroy();
        }
    }
}

/// Estimate available VRAM based on adapter type and limits.
fn estimate_vram(info: &wgpu::AdapterInfo, max_buffer_bytes: u64) -> u64 {
    if let Some(mb) = std::env::var(GPU_MEMORY_ENV).ok().and_then(|mb| mb.parse::<u64>().ok()) {
        return mb.saturating_mul(1024 * 1024);
    }

    let from_buffer = max_buffer_bytes.saturating_mul(2);

    let estimated = match info.device_type {
        wgpu::DeviceType::DiscreteGpu => from_buffer.clamp(2u64 << 30, 24u64 << 30),
        wgpu::DeviceType::IntegratedGpu => from_buffer.clamp(512u64 << 20, 4u64 << 30),
        wgpu::DeviceType::VirtualGpu => from_buffer.clamp(1u64 << 30, 8u64 << 30),
        _ => from_buffer.clamp(256u64 << 20, 2u64 << 30),
    };

    // Leave 20% for the driver and other processes.
    estimated.saturating_mul(80) / 100
}
