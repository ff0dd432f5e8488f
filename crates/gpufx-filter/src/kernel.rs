//! Gaussian kernel synthesis.
//!
//! A kernel is the Gaussian pdf sampled at integer offsets `-r..=r` and
//! normalized to sum 1. Two precisions are supported:
//!
//! - [`KernelPrecision::Float`] keeps `f32` weights (stored as RGBA32F texels)
//! - [`KernelPrecision::Quantized`] rounds weights to 1/255 steps (stored as I8)
//!
//! Quantization distributes the 255 available steps by symmetric
//! largest-remainder apportionment, so the quantized weights still sum to
//! exactly 255/255 and stay mirror-symmetric.
//!
//! ```rust
//! use gpufx_filter::kernel::{build_kernel, KernelPrecision, DEFAULT_MAX_RADIUS};
//!
//! let k = build_kernel(1.0, DEFAULT_MAX_RADIUS, KernelPrecision::Float).unwrap();
//! assert_eq!(k.radius(), 3);
//! assert_eq!(k.width(), 7);
//! assert!((k.sum() - 1.0).abs() < 1e-5);
//! ```

use std::f64::consts::PI;

use tracing::{trace, warn};

use gpufx_core::log::target;
use gpufx_core::{Bitmap, IntSize, PixelFormat};

use crate::{GpuError, GpuResult};

/// Largest radius used unless a filter asks for another cap.
pub const DEFAULT_MAX_RADIUS: u32 = 1023;

/// Quantization steps of the 8-bit kernel format.
const LEVELS: i64 = 255;

/// Storage precision of kernel weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KernelPrecision {
    /// Full `f32` weights.
    Float,
    /// Weights rounded to multiples of 1/255.
    #[default]
    Quantized,
}

impl KernelPrecision {
    /// `Float` if `use_float` is set.
    pub fn from_float_flag(use_float: bool) -> Self {
        if use_float { Self::Float } else { Self::Quantized }
    }

    /// Format of the kernel texture.
    pub const fn texture_format(&self) -> PixelFormat {
        match self {
            Self::Float => PixelFormat::R32G32B32A32F,
            Self::Quantized => PixelFormat::I8,
        }
    }

    /// Tolerance of the weight sum around 1.
    pub const fn sum_tolerance(&self) -> f32 {
        match self {
            Self::Float => 1e-5,
            Self::Quantized => 1.0 / 255.0,
        }
    }
}

/// Normalized, symmetric 1-D Gaussian kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    std_dev: f32,
    radius: u32,
    weights: Vec<f32>,
    sum: f32,
    precision: KernelPrecision,
    clamped: bool,
}

impl GaussianKernel {
    pub fn std_dev(&self) -> f32 {
        self.std_dev
    }

    /// Taps on each side of the center.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Total taps, `2 * radius + 1`.
    pub fn width(&self) -> u32 {
        2 * self.radius + 1
    }

    /// Weights for offsets `-radius..=radius`.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at `offset` from the center, 0 outside the kernel.
    pub fn weight(&self, offset: i32) -> f32 {
        let i = offset + self.radius as i32;
        usize::try_from(i)
            .ok()
            .and_then(|i| self.weights.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f32 {
        self.sum
    }

    pub fn precision(&self) -> KernelPrecision {
        self.precision
    }

    /// Whether the radius hit the cap and the tails were cut off.
    pub fn is_clamped(&self) -> bool {
        self.clamped
    }

    /// Kernel as a `width x 1` bitmap in the precision's texture format.
    pub fn to_bitmap(&self) -> GpuResult<Bitmap> {
        let format = self.precision.texture_format();
        let data = self
            .weights
            .iter()
            .flat_map(|w| std::iter::repeat_n(*w, format.channels() as usize))
            .collect();
        Ok(Bitmap::from_f32(IntSize::new(self.width(), 1), format, data)?)
    }
}

/// Largest radius whose `(2r + 1) x 1` kernel texture fits in `max_texture_dim`.
pub fn max_supported_radius(max_texture_dim: u32) -> u32 {
    max_texture_dim.saturating_sub(1) / 2
}

/// Radius used for `std_dev`: `ceil(3 * std_dev)` clamped to `[1, max_radius]`.
pub fn kernel_radius(std_dev: f32, max_radius: u32) -> u32 {
    let max_radius = max_radius.max(1);
    let wanted = (3.0 * std_dev as f64).ceil();
    if wanted >= max_radius as f64 {
        max_radius
    } else {
        (wanted as u32).max(1)
    }
}

/// Builds the kernel for `std_dev`.
///
/// Fails with [`GpuError::InvalidParameter`] unless `std_dev` is finite and positive.
pub fn build_kernel(std_dev: f32, max_radius: u32, precision: KernelPrecision) -> GpuResult<GaussianKernel> {
    if !std_dev.is_finite() || std_dev <= 0.0 {
        return Err(GpuError::InvalidParameter(format!(
            "standard deviation must be positive, got {std_dev}"
        )));
    }

    let radius = kernel_radius(std_dev, max_radius);
    let clamped = (3.0 * std_dev as f64).ceil() > radius as f64;
    if clamped {
        warn!(target: target::SHADER, std_dev, radius, "blur radius clamped, kernel tails cut off");
    }

    // One side of the kernel, index 0 is the center.
    let sigma = std_dev as f64;
    let norm = 1.0 / (2.0 * PI * sigma * sigma).sqrt();
    let half: Vec<f64> = (0..=radius)
        .map(|i| {
            let x = i as f64;
            norm * (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = half[0] + 2.0 * half[1..].iter().sum::<f64>();
    let half: Vec<f64> = half.iter().map(|w| w / total).collect();

    let half: Vec<f32> = match precision {
        KernelPrecision::Float => half.iter().map(|w| *w as f32).collect(),
        KernelPrecision::Quantized => quantize_symmetric(&half)
            .into_iter()
            .map(|q| q as f32 / LEVELS as f32)
            .collect(),
    };

    let weights: Vec<f32> = half[1..]
        .iter()
        .rev()
        .chain(half.iter())
        .copied()
        .collect();
    let sum = weights.iter().sum();

    trace!(target: target::SHADER, std_dev, radius, ?precision, sum, "kernel built");

    Ok(GaussianKernel {
        std_dev,
        radius,
        weights,
        sum,
        precision,
        clamped,
    })
}

/// Splits 255 steps over a half kernel (`half[0]` = center) whose mirrored sum is 1.
///
/// Off-center slots appear twice, so giving one an extra step costs 2.
fn quantize_symmetric(half: &[f64]) -> Vec<i64> {
    let scaled: Vec<f64> = half.iter().map(|w| w * LEVELS as f64).collect();
    let mut steps: Vec<i64> = scaled.iter().map(|s| s.floor() as i64).collect();
    let used = steps[0] + 2 * steps[1..].iter().sum::<i64>();
    let mut remaining = LEVELS - used;

    let mut order: Vec<usize> = (0..half.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = scaled[a] - scaled[a].floor();
        let rb = scaled[b] - scaled[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for i in order {
        let cost = if i == 0 { 1 } else { 2 };
        if remaining >= cost {
            steps[i] += 1;
            remaining -= cost;
        }
    }
    // An odd leftover can only go to the center.
    steps[0] = (steps[0] + remaining).max(0);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_radius_rule() {
        assert_eq!(kernel_radius(1.0, DEFAULT_MAX_RADIUS), 3);
        assert_eq!(kernel_radius(0.01, DEFAULT_MAX_RADIUS), 1);
        assert_eq!(kernel_radius(2.5, DEFAULT_MAX_RADIUS), 8);
        assert_eq!(kernel_radius(100.0, 16), 16);
        assert_eq!(kernel_radius(f32::MAX, 16), 16);
    }

    #[test]
    fn test_radius_monotonic() {
        let mut last = 0;
        for i in 1..400 {
            let r = kernel_radius(i as f32 * 0.05, 12);
            assert!(r >= last);
            assert!((1..=12).contains(&r));
            last = r;
        }
    }

    #[test]
    fn test_float_kernel_normalized() {
        for sd in [0.3, 1.0, 2.0, 7.5, 40.0] {
            let k = build_kernel(sd, DEFAULT_MAX_RADIUS, KernelPrecision::Float).unwrap();
            assert_eq!(k.weights().len() as u32, k.width());
            assert_abs_diff_eq!(k.sum(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_quantized_kernel_exact_steps() {
        for sd in [0.3, 1.0, 2.0, 5.0, 20.0] {
            let k = build_kernel(sd, DEFAULT_MAX_RADIUS, KernelPrecision::Quantized).unwrap();
            let steps: i64 = k.weights().iter().map(|w| (w * 255.0).round() as i64).sum();
            assert_eq!(steps, 255, "std_dev {sd}");
            assert_abs_diff_eq!(k.sum(), 1.0, epsilon = 1.0 / 255.0);
        }
    }

    #[test]
    fn test_symmetric_and_peaked() {
        for precision in [KernelPrecision::Float, KernelPrecision::Quantized] {
            let k = build_kernel(1.5, DEFAULT_MAX_RADIUS, precision).unwrap();
            let r = k.radius() as i32;
            for o in 1..=r {
                assert_eq!(k.weight(o), k.weight(-o));
                assert!(k.weight(o) <= k.weight(o - 1));
            }
            assert_eq!(k.weight(r + 1), 0.0);
        }
    }

    #[test]
    fn test_deterministic() {
        let a = build_kernel(3.3, DEFAULT_MAX_RADIUS, KernelPrecision::Quantized).unwrap();
        let b = build_kernel(3.3, DEFAULT_MAX_RADIUS, KernelPrecision::Quantized).unwrap();
        let bits = |k: &GaussianKernel| k.weights().iter().map(|w| w.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_clamped_flag() {
        let k = build_kernel(10.0, 5, KernelPrecision::Float).unwrap();
        assert!(k.is_clamped());
        assert_eq!(k.radius(), 5);
        assert_abs_diff_eq!(k.sum(), 1.0, epsilon = 1e-5);
        assert!(!build_kernel(1.0, 5, KernelPrecision::Float).unwrap().is_clamped());
    }

    #[test]
    fn test_invalid_std_dev() {
        for sd in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let err = build_kernel(sd, DEFAULT_MAX_RADIUS, KernelPrecision::Float).unwrap_err();
            assert!(err.is_invalid_parameter());
        }
    }

    #[test]
    fn test_std_dev_one_taps() {
        let k = build_kernel(1.0, DEFAULT_MAX_RADIUS, KernelPrecision::Float).unwrap();
        assert_eq!(k.width(), 7);
        assert_abs_diff_eq!(k.weight(0), 0.39905, epsilon = 1e-4);
    }

    #[test]
    fn test_to_bitmap() {
        let k = build_kernel(1.0, DEFAULT_MAX_RADIUS, KernelPrecision::Quantized).unwrap();
        let bmp = k.to_bitmap().unwrap();
        assert_eq!(bmp.format(), PixelFormat::I8);
        assert_eq!(bmp.size(), IntSize::new(7, 1));
        assert_eq!(bmp.stored(), bmp);

        let f = build_kernel(1.0, DEFAULT_MAX_RADIUS, KernelPrecision::Float).unwrap().to_bitmap().unwrap();
        assert_eq!(f.format(), PixelFormat::R32G32B32A32F);
        assert_eq!(f.pixel(3, 0), &[k_center(), k_center(), k_center(), k_center()]);
    }

    #[test]
    fn test_max_supported_radius() {
        assert_eq!(max_supported_radius(16384), 8191);
        assert_eq!(max_supported_radius(15), 7);
        assert_eq!(max_supported_radius(0), 0);
        assert!(2 * max_supported_radius(16384) + 1 <= 16384);
    }

    fn k_center() -> f32 {
        build_kernel(1.0, DEFAULT_MAX_RADIUS, KernelPrecision::Float).unwrap().weight(0)
    }
}
