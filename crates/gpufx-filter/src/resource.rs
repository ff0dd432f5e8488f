//! Per-context resources.
//!
//! GPU objects can't be shared between rendering contexts, but filters can.
//! [`ContextResource`] keeps one instance of something per [`ContextId`],
//! created on first use. [`McTexture`] and [`McShaderParam`] build on it: a
//! single shared value plus a generation counter, with each context holding
//! its own uploaded copy and the generation it was uploaded at. Changing the
//! shared value bumps the generation, which makes every context copy stale at
//! once; each context re-uploads on its next use.
//!
//! The map itself sits behind an `RwLock`, each slot behind its own `Mutex`,
//! so contexts on different threads never wait on each other's GPU work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use gpufx_core::Bitmap;
use gpufx_core::log::target;

use crate::backend::{ContextId, ProgramId, RenderContext, TextureId, UniformValue};
use crate::{GpuError, GpuResult};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// ContextResource
// =============================================================================

/// One `T` per rendering context.
pub struct ContextResource<T> {
    slots: RwLock<HashMap<ContextId, Arc<Mutex<T>>>>,
}

impl<T> Default for ContextResource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ContextResource<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Slot of `id`, if it was created.
    pub fn get(&self, id: ContextId) -> Option<Arc<Mutex<T>>> {
        read(&self.slots).get(&id).cloned()
    }

    /// Slot of `id`, creating it with `init` on first use.
    pub fn get_or_create(&self, id: ContextId, init: impl FnOnce() -> T) -> Arc<Mutex<T>> {
        if let Some(slot) = read(&self.slots).get(&id) {
            return slot.clone();
        }
        write(&self.slots)
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    /// Replaces the slot of `id`.
    pub fn set(&self, id: ContextId, value: T) {
        write(&self.slots).insert(id, Arc::new(Mutex::new(value)));
    }

    /// Removes the slot of `id` and returns it.
    pub fn remove(&self, id: ContextId) -> Option<Arc<Mutex<T>>> {
        write(&self.slots).remove(&id)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        read(&self.slots).contains_key(&id)
    }

    /// Contexts that have a slot.
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = read(&self.slots).keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        read(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for ContextResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextResource").field("contexts", &self.contexts()).finish()
    }
}

// =============================================================================
// McTexture
// =============================================================================

#[derive(Default)]
struct SharedBitmap {
    bitmap: Option<Bitmap>,
    generation: u64,
}

#[derive(Debug, Default)]
struct TextureSlot {
    texture: Option<TextureId>,
    generation: u64,
}

/// Texture with the same contents on every context that uses it.
pub struct McTexture {
    label: &'static str,
    shared: RwLock<SharedBitmap>,
    slots: ContextResource<TextureSlot>,
    uploads: AtomicU64,
}

impl McTexture {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            shared: RwLock::new(SharedBitmap::default()),
            slots: ContextResource::new(),
            uploads: AtomicU64::new(0),
        }
    }

    /// Replaces the contents, making every context copy stale.
    pub fn set_bitmap(&self, bitmap: Bitmap) {
        let mut shared = write(&self.shared);
        shared.bitmap = Some(bitmap);
        shared.generation += 1;
    }

    /// Marks every context copy stale without changing the contents.
    pub fn invalidate(&self) {
        write(&self.shared).generation += 1;
    }

    /// Current contents generation, 0 before the first [`set_bitmap`](Self::set_bitmap).
    pub fn generation(&self) -> u64 {
        read(&self.shared).generation
    }

    /// Whether the copy on context `id` matches the current contents.
    pub fn is_current(&self, id: ContextId) -> bool {
        let generation = self.generation();
        self.slots
            .get(id)
            .is_some_and(|s| {
                let slot = lock(&s);
                slot.texture.is_some() && slot.generation == generation
            })
    }

    /// The texture on `ctx`, created or re-uploaded if stale.
    pub fn get(&self, ctx: &mut dyn RenderContext) -> GpuResult<TextureId> {
        let shared = read(&self.shared);
        let bitmap = shared
            .bitmap
            .as_ref()
            .ok_or_else(|| GpuError::InvalidParameter(format!("{} has no contents", self.label)))?;

        let slot = self.slots.get_or_create(ctx.id(), TextureSlot::default);
        let mut slot = lock(&slot);
        if let Some(texture) = slot.texture {
            if slot.generation == shared.generation {
                return Ok(texture);
            }
            let reusable = ctx.texture_size(texture).ok() == Some(bitmap.size())
                && ctx.texture_format(texture).ok() == Some(bitmap.format());
            if !reusable {
                ctx.delete_texture(texture);
                slot.texture = None;
            }
        }

        let texture = match slot.texture {
            Some(texture) => {
                ctx.upload_texture(texture, bitmap)?;
                texture
            }
            None => {
                let texture = ctx.upload_bitmap(bitmap)?;
                slot.texture = Some(texture);
                texture
            }
        };
        slot.generation = shared.generation;
        self.uploads.fetch_add(1, Ordering::Relaxed);
        trace!(target: target::MEMORY, label = self.label, context = %ctx.id(), generation = shared.generation, size = %bitmap.size(), "texture uploaded");
        Ok(texture)
    }

    /// Deletes the copy on `ctx`.
    pub fn release(&self, ctx: &mut dyn RenderContext) {
        if let Some(slot) = self.slots.remove(ctx.id()) {
            if let Some(texture) = lock(&slot).texture.take() {
                ctx.delete_texture(texture);
            }
        }
    }

    /// Drops bookkeeping for a context that no longer exists.
    pub fn forget(&self, id: ContextId) {
        self.slots.remove(id);
    }

    /// Contexts holding a copy.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.slots.contexts()
    }

    /// Uploads done so far, over all contexts.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for McTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McTexture")
            .field("label", &self.label)
            .field("generation", &self.generation())
            .field("contexts", &self.contexts())
            .finish()
    }
}

// =============================================================================
// McShaderParam
// =============================================================================

/// Scalar types a shader parameter can hold.
pub trait UniformType: Copy + PartialEq + Send + Sync + 'static {
    fn to_uniform(self) -> UniformValue;
}

impl UniformType for f32 {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Float(self)
    }
}

impl UniformType for i32 {
    fn to_uniform(self) -> UniformValue {
        UniformValue::Int(self)
    }
}

struct SharedValue<T> {
    value: Option<T>,
    generation: u64,
}

/// Named uniform with the same value on every context.
pub struct McShaderParam<T: UniformType> {
    name: &'static str,
    shared: RwLock<SharedValue<T>>,
    bound: ContextResource<u64>,
    uploads: AtomicU64,
}

pub type FloatMcShaderParam = McShaderParam<f32>;
pub type IntMcShaderParam = McShaderParam<i32>;

impl<T: UniformType> McShaderParam<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shared: RwLock::new(SharedValue {
                value: None,
                generation: 0,
            }),
            bound: ContextResource::new(),
            uploads: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Sets the value. Returns `false`, and invalidates nothing, if it's unchanged.
    pub fn set(&self, value: T) -> bool {
        let mut shared = write(&self.shared);
        if shared.value == Some(value) {
            return false;
        }
        shared.value = Some(value);
        shared.generation += 1;
        true
    }

    pub fn get(&self) -> Option<T> {
        read(&self.shared).value
    }

    /// Forces a re-upload on every context.
    pub fn invalidate(&self) {
        write(&self.shared).generation += 1;
    }

    /// Writes the value to `program` on `ctx` unless that context already has it.
    ///
    /// Returns whether a write happened.
    pub fn bind(&self, ctx: &mut dyn RenderContext, program: ProgramId) -> GpuResult<bool> {
        let shared = read(&self.shared);
        let value = shared
            .value
            .ok_or_else(|| GpuError::InvalidParameter(format!("shader parameter '{}' never set", self.name)))?
            .to_uniform();

        let slot = self.bound.get_or_create(ctx.id(), || 0);
        let mut bound = lock(&slot);
        // Another filter may have written the same program since.
        if *bound == shared.generation && ctx.uniform(program, self.name) == Some(value) {
            return Ok(false);
        }
        ctx.set_uniform(program, self.name, value);
        *bound = shared.generation;
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Drops bookkeeping for a context.
    pub fn forget(&self, id: ContextId) {
        self.bound.remove(id);
    }

    /// Writes done so far, over all contexts.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }
}

impl<T: UniformType + std::fmt::Debug> std::fmt::Debug for McShaderParam<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McShaderParam")
            .field("name", &self.name)
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CpuContext, ShaderKind, U_RADIUS, U_TEXEL_SIZE};
    use gpufx_core::{IntSize, PixelFormat};

    #[test]
    fn test_context_resource_lazy() {
        let res: ContextResource<u32> = ContextResource::new();
        let a = ContextId::next();
        let b = ContextId::next();
        assert!(res.is_empty());
        *lock(&res.get_or_create(a, || 1)) += 1;
        assert_eq!(*lock(&res.get_or_create(a, || 100)), 2);
        res.set(b, 7);
        assert_eq!(res.contexts(), vec![a, b]);
        assert!(res.remove(a).is_some());
        assert!(!res.contains(a));
        assert_eq!(res.len(), 1);
    }

    #[test]
    fn test_mc_texture_uploads_once_per_generation() {
        let tex = McTexture::new("kernel");
        let mut ctx = CpuContext::new();
        assert!(tex.get(&mut ctx).is_err());

        tex.set_bitmap(Bitmap::new(IntSize::new(3, 1), PixelFormat::I8));
        let a = tex.get(&mut ctx).unwrap();
        let b = tex.get(&mut ctx).unwrap();
        assert_eq!(a, b);
        assert_eq!(tex.upload_count(), 1);
        assert!(tex.is_current(ctx.id()));

        tex.invalidate();
        assert!(!tex.is_current(ctx.id()));
        assert_eq!(tex.get(&mut ctx).unwrap(), a);
        assert_eq!(tex.upload_count(), 2);
    }

    #[test]
    fn test_mc_texture_resize_recreates() {
        let tex = McTexture::new("kernel");
        let mut ctx = CpuContext::new();
        tex.set_bitmap(Bitmap::new(IntSize::new(3, 1), PixelFormat::I8));
        let a = tex.get(&mut ctx).unwrap();
        tex.set_bitmap(Bitmap::new(IntSize::new(5, 1), PixelFormat::I8));
        let b = tex.get(&mut ctx).unwrap();
        assert_ne!(a, b);
        assert_eq!(ctx.texture_size(b).unwrap(), IntSize::new(5, 1));
        assert_eq!(ctx.texture_count(), 1);
    }

    #[test]
    fn test_mc_texture_per_context() {
        let tex = McTexture::new("kernel");
        tex.set_bitmap(Bitmap::new(IntSize::new(3, 1), PixelFormat::I8));
        let mut c1 = CpuContext::new();
        let mut c2 = CpuContext::new();
        let t1 = tex.get(&mut c1).unwrap();
        let t2 = tex.get(&mut c2).unwrap();
        assert_eq!(t1.context(), c1.id());
        assert_eq!(t2.context(), c2.id());

        tex.release(&mut c1);
        assert_eq!(c1.texture_count(), 0);
        assert!(tex.is_current(c2.id()));
        assert_eq!(tex.contexts(), vec![c2.id()]);
    }

    #[test]
    fn test_param_set_unchanged_is_noop() {
        let p = FloatMcShaderParam::new(U_TEXEL_SIZE);
        assert!(p.set(0.5));
        assert!(!p.set(0.5));
        assert!(p.set(0.25));
        assert_eq!(p.get(), Some(0.25));
    }

    #[test]
    fn test_param_bind_only_when_stale() {
        let mut ctx = CpuContext::new();
        let prog = ctx.program(ShaderKind::HorizontalBlur).unwrap();
        let p = IntMcShaderParam::new(U_RADIUS);
        assert!(p.bind(&mut ctx, prog).is_err());

        p.set(3);
        assert!(p.bind(&mut ctx, prog).unwrap());
        assert!(!p.bind(&mut ctx, prog).unwrap());
        assert_eq!(ctx.uniform(prog, U_RADIUS), Some(UniformValue::Int(3)));

        // Someone else wrote the program.
        ctx.set_uniform(prog, U_RADIUS, UniformValue::Int(9));
        assert!(p.bind(&mut ctx, prog).unwrap());
        assert_eq!(ctx.uniform(prog, U_RADIUS), Some(UniformValue::Int(3)));

        p.invalidate();
        assert!(p.bind(&mut ctx, prog).unwrap());
        assert_eq!(p.upload_count(), 3);
    }
}
