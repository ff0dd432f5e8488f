//! Integer sizes and rectangles in texel space.
//!
//! Origin (0, 0) is the top-left texel, X grows right, Y grows down.
//!
//! ```rust
//! use gpufx_core::{IntRect, IntSize};
//!
//! let size = IntSize::new(64, 48);
//! assert_eq!(size.shrink(3), Some(IntSize::new(58, 42)));
//!
//! let inner = IntRect::new(3, 3, 58, 42);
//! assert!(IntRect::from_size(size).contains_rect(&inner));
//! ```

use std::fmt;

/// Width and height in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntSize {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
}

impl IntSize {
    /// Creates a size.
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of texels.
    #[inline]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// `true` when either side is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Removes `border` texels from every edge.
    ///
    /// Returns `None` unless at least one texel remains on each axis.
    #[inline]
    pub fn shrink(&self, border: u32) -> Option<IntSize> {
        let w = self.width.checked_sub(border.checked_mul(2)?)?;
        let h = self.height.checked_sub(border.checked_mul(2)?)?;
        if w == 0 || h == 0 {
            return None;
        }
        Some(IntSize::new(w, h))
    }

    /// `(width, height)` tuple.
    #[inline]
    pub const fn to_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for IntSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for IntSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Axis-aligned rectangle, origin inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
}

impl IntRect {
    /// Creates a rectangle.
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin covering `size`.
    #[inline]
    pub const fn from_size(size: IntSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Size part of the rectangle.
    #[inline]
    pub const fn size(&self) -> IntSize {
        IntSize::new(self.width, self.height)
    }

    /// Exclusive right edge.
    #[inline]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[inline]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether `other` lies completely inside this rectangle.
    #[inline]
    pub fn contains_rect(&self, other: &IntRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shrink() {
        assert_eq!(IntSize::new(64, 64).shrink(3), Some(IntSize::new(58, 58)));
        assert_eq!(IntSize::new(7, 7).shrink(3), Some(IntSize::new(1, 1)));
        assert_eq!(IntSize::new(6, 7).shrink(3), None);
        assert_eq!(IntSize::new(10, 10).shrink(u32::MAX), None);
        assert_eq!(IntSize::new(10, 10).shrink(0), Some(IntSize::new(10, 10)));
    }

    #[test]
    fn test_display() {
        assert_eq!(IntSize::new(1920, 1080).to_string(), "1920x1080");
    }

    #[test]
    fn test_rect_contains() {
        let outer = IntRect::new(0, 0, 10, 10);
        assert!(outer.contains_rect(&IntRect::new(2, 2, 8, 8)));
        assert!(!outer.contains_rect(&IntRect::new(2, 2, 9, 8)));
        assert_eq!(outer.right(), 10);
        assert_eq!(outer.size(), IntSize::new(10, 10));
    }
}
