//! Blur filter behaviour across contexts and threads.

use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use gpufx_core::{Bitmap, IntSize, PixelFormat};
use gpufx_filter::{
    BlurFilterConfig, CpuContext, FilterState, GpuBlurFilter, GpuCopyFilter, GpuError, GpuLimits,
    RenderContext,
};

fn noise(size: IntSize, format: PixelFormat) -> Bitmap {
    let n = size.area() as usize * format.channels() as usize;
    let data = (0..n).map(|i| ((i * 7919) % 257) as f32 / 256.0).collect();
    Bitmap::from_f32(size, format, data).unwrap()
}

fn float_blur(size: IntSize, std_dev: f32, clip: bool) -> GpuBlurFilter {
    GpuBlurFilter::new(
        size,
        PixelFormat::R32G32B32A32F,
        PixelFormat::R32G32B32A32F,
        std_dev,
        clip,
        true,
        true,
    )
    .unwrap()
}

#[test]
fn sigma_one_on_64x64() {
    let size = IntSize::new(64, 64);
    let blur = GpuBlurFilter::new(size, PixelFormat::R8G8B8A8, PixelFormat::R8G8B8A8, 1.0, false, true, false).unwrap();
    let mut ctx = CpuContext::new();

    let flat = Bitmap::filled(size, PixelFormat::R8G8B8A8, &[0.5, 0.25, 0.75, 1.0]).unwrap();
    let out = blur.apply_bitmap(&mut ctx, &flat).unwrap();

    let kernel = blur.kernel().unwrap();
    assert_eq!(kernel.radius(), 3);
    assert_eq!(kernel.width(), 7);
    assert_eq!(blur.intermediate_size().unwrap(), size);
    assert_eq!(out.size(), size);
    assert_abs_diff_eq!(out.max_difference(&flat.stored()).unwrap(), 0.0);
}

#[test]
fn clipped_output_is_interior_of_unclipped() {
    let size = IntSize::new(40, 30);
    let src = noise(size, PixelFormat::R32G32B32A32F);
    let mut ctx = CpuContext::new();

    let full = float_blur(size, 1.5, false).apply_bitmap(&mut ctx, &src).unwrap();
    let clipped_filter = float_blur(size, 1.5, true);
    let clipped = clipped_filter.apply_bitmap(&mut ctx, &src).unwrap();

    let r = clipped_filter.radius();
    assert_eq!(r, 5);
    assert_eq!(clipped.size(), IntSize::new(30, 20));
    for y in 0..clipped.height() {
        for x in 0..clipped.width() {
            for (a, b) in clipped.pixel(x, y).iter().zip(full.pixel(x + r, y + r)) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn quantized_kernel_close_to_float() {
    let size = IntSize::new(32, 32);
    let src = noise(size, PixelFormat::R8G8B8A8);
    let mut ctx = CpuContext::new();

    let quantized = GpuBlurFilter::new(size, PixelFormat::R8G8B8A8, PixelFormat::R8G8B8A8, 2.0, false, true, false).unwrap();
    let float = GpuBlurFilter::new(size, PixelFormat::R8G8B8A8, PixelFormat::R8G8B8A8, 2.0, false, true, true).unwrap();
    let a = quantized.apply_bitmap(&mut ctx, &src).unwrap();
    let b = float.apply_bitmap(&mut ctx, &src).unwrap();
    assert!(a.max_difference(&b).unwrap() < 0.06);
}

#[test]
fn shared_filter_on_many_threads() {
    let size = IntSize::new(48, 32);
    let src = noise(size, PixelFormat::R32G32B32A32F);
    let blur = Arc::new(float_blur(size, 2.0, false));

    let expected = float_blur(size, 2.0, false)
        .apply_bitmap(&mut CpuContext::new(), &src)
        .unwrap();

    let results: Vec<Bitmap> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let blur = Arc::clone(&blur);
                let src = &src;
                s.spawn(move || {
                    let mut ctx = CpuContext::new();
                    let mut last = None;
                    for _ in 0..3 {
                        last = Some(blur.apply_bitmap(&mut ctx, src).unwrap());
                    }
                    blur.release_context(&mut ctx);
                    assert_eq!(ctx.texture_count(), 0);
                    last.unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for out in &results {
        assert_abs_diff_eq!(out.max_difference(&expected).unwrap(), 0.0);
    }
    assert_eq!(blur.rebuild_count(), 1);
    assert_eq!(blur.kernel_upload_count(), 4);
    assert!(blur.contexts().is_empty());
}

#[test]
fn rebuild_reaches_every_context() {
    let size = IntSize::new(24, 24);
    let src = noise(size, PixelFormat::R32G32B32A32F);
    let blur = float_blur(size, 1.0, false);
    let mut a = CpuContext::new();
    let mut b = CpuContext::new();

    blur.apply_bitmap(&mut a, &src).unwrap();
    blur.apply_bitmap(&mut b, &src).unwrap();
    assert_eq!(blur.kernel_upload_count(), 2);

    blur.set_std_dev(2.5).unwrap();
    blur.apply_bitmap(&mut a, &src).unwrap();
    assert_eq!(blur.kernel_upload_count(), 3);
    let from_b = blur.apply_bitmap(&mut b, &src).unwrap();
    assert_eq!(blur.kernel_upload_count(), 4);
    assert_eq!(blur.rebuild_count(), 2);

    let fresh = float_blur(size, 2.5, false).apply_bitmap(&mut CpuContext::new(), &src).unwrap();
    assert_abs_diff_eq!(from_b.max_difference(&fresh).unwrap(), 0.0);
}

#[test]
fn unchanged_parameters_upload_nothing() {
    let size = IntSize::new(16, 16);
    let blur = float_blur(size, 1.0, false);
    let mut ctx = CpuContext::new();
    let src = ctx.upload_bitmap(&noise(size, PixelFormat::R32G32B32A32F)).unwrap();

    blur.apply_on_gpu(&mut ctx, src).unwrap();
    let stats = ctx.stats();
    blur.set_std_dev(1.0).unwrap();
    blur.apply_on_gpu(&mut ctx, src).unwrap();
    let after = ctx.stats();

    assert_eq!(after.uploads, stats.uploads);
    assert_eq!(after.uniform_writes, stats.uniform_writes);
    assert_eq!(after.textures_created, stats.textures_created);
    assert_eq!(after.draws, stats.draws + 2);
}

#[test]
fn foreign_texture_rejected() {
    let size = IntSize::new(8, 8);
    let blur = float_blur(size, 1.0, false);
    let mut a = CpuContext::new();
    let mut b = CpuContext::new();
    let src = a.upload_bitmap(&noise(size, PixelFormat::R32G32B32A32F)).unwrap();

    let err = blur.apply_on_gpu(&mut b, src).unwrap_err();
    assert!(matches!(err, GpuError::InvalidHandle(_)));
    assert_eq!(blur.state(), FilterState::Unconfigured);
}

#[test]
fn recovers_after_out_of_memory() {
    let size = IntSize::new(32, 32);
    let blur = float_blur(size, 1.0, false);
    let source_bytes = GpuLimits::texture_bytes(size, PixelFormat::R32G32B32A32F);
    let mut ctx = CpuContext::with_limits(GpuLimits {
        max_texture_dim: 4096,
        available_memory: source_bytes * 2,
    });
    let src = ctx.upload_bitmap(&noise(size, PixelFormat::R32G32B32A32F)).unwrap();

    let err = blur.apply_on_gpu(&mut ctx, src).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(blur.state(), FilterState::KernelStale);
    assert_eq!(ctx.texture_count(), 1);

    ctx.set_limits(GpuLimits {
        max_texture_dim: 4096,
        available_memory: source_bytes * 8,
    });
    let out = blur.apply_on_gpu(&mut ctx, src).unwrap();
    assert_eq!(ctx.texture_size(out).unwrap(), size);
    assert_eq!(blur.state(), FilterState::Ready);
}

#[test]
fn copy_keeps_result_across_applies() {
    let size = IntSize::new(12, 12);
    let blur = float_blur(size, 1.0, false);
    let copy = GpuCopyFilter::new(PixelFormat::R16G16B16A16F, true);
    let mut ctx = CpuContext::new();

    let first = ctx.upload_bitmap(&noise(size, PixelFormat::R32G32B32A32F)).unwrap();
    let blurred = blur.apply_on_gpu(&mut ctx, first).unwrap();
    let kept = copy.apply(&mut ctx, blurred).unwrap();
    let snapshot = ctx.read_texture(kept).unwrap();

    let second = ctx
        .upload_bitmap(&Bitmap::filled(size, PixelFormat::R32G32B32A32F, &[1.0; 4]).unwrap())
        .unwrap();
    let again = blur.apply_on_gpu(&mut ctx, second).unwrap();
    assert_eq!(again, blurred);
    assert_eq!(ctx.read_texture(kept).unwrap(), snapshot);
}

#[test]
fn resizable_filter_follows_input() {
    let blur = GpuBlurFilter::with_config(BlurFilterConfig {
        resizable: true,
        clip_borders: true,
        ..BlurFilterConfig::new(IntSize::new(32, 32))
    })
    .unwrap();
    let mut ctx = CpuContext::new();

    for (w, h) in [(32, 32), (20, 40), (32, 32)] {
        let src = Bitmap::filled(IntSize::new(w, h), PixelFormat::R8G8B8A8, &[0.5; 4]).unwrap();
        let out = blur.apply_bitmap(&mut ctx, &src).unwrap();
        assert_eq!(out.size(), IntSize::new(w - 6, h - 6));
    }
    assert_eq!(blur.rebuild_count(), 3);

    let tiny = Bitmap::filled(IntSize::new(6, 6), PixelFormat::R8G8B8A8, &[0.5; 4]).unwrap();
    assert!(blur.apply_bitmap(&mut ctx, &tiny).unwrap_err().is_invalid_parameter());
}

#[test]
fn releasing_one_context_keeps_the_other() {
    let size = IntSize::new(20, 16);
    let src = noise(size, PixelFormat::R32G32B32A32F);
    let blur = float_blur(size, 1.5, false);
    let mut a = CpuContext::new();
    let mut b = CpuContext::new();

    let from_a = blur.apply_bitmap(&mut a, &src).unwrap();
    let from_b = blur.apply_bitmap(&mut b, &src).unwrap();
    assert_abs_diff_eq!(from_a.max_difference(&from_b).unwrap(), 0.0);
    let uploads = blur.kernel_upload_count();
    let allocations = blur.allocation_count();

    blur.release_context(&mut a);
    assert_eq!(a.texture_count(), 0);
    assert_eq!(blur.contexts(), vec![b.id()]);

    let again = blur.apply_bitmap(&mut b, &src).unwrap();
    assert_abs_diff_eq!(again.max_difference(&from_b).unwrap(), 0.0);
    assert_eq!(blur.kernel_upload_count(), uploads);
    assert_eq!(blur.allocation_count(), allocations);

    // The released context starts over.
    blur.apply_bitmap(&mut a, &src).unwrap();
    assert_eq!(blur.kernel_upload_count(), uploads + 1);
}
