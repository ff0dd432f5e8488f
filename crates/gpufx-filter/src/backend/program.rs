//! Shader programs and their uniform state.

use std::fmt;

use crate::{GpuError, GpuResult};

/// Source texel spacing along the pass axis (1/width or 1/height).
pub const U_TEXEL_SIZE: &str = "texel_size";
/// Kernel radius in taps.
pub const U_RADIUS: &str = "radius";
/// Texture unit of the image being filtered.
pub const U_TEXTURE: &str = "texture";
/// Texture unit of the kernel weights.
pub const U_KERNEL_TEX: &str = "kernel_tex";

/// Texture unit the filtered image is bound to.
pub const SOURCE_UNIT: u32 = 0;
/// Texture unit the kernel texture is bound to.
pub const KERNEL_UNIT: u32 = 1;

/// Built-in shader programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    /// 1-D convolution along X.
    HorizontalBlur,
    /// 1-D convolution along Y.
    VerticalBlur,
    /// Texel copy through the projection.
    Copy,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 3] = [Self::HorizontalBlur, Self::VerticalBlur, Self::Copy];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::HorizontalBlur => "horizontal_blur",
            Self::VerticalBlur => "vertical_blur",
            Self::Copy => "copy",
        }
    }

    /// Uniforms the program declares.
    pub const fn uniforms(&self) -> &'static [(&'static str, UniformKind)] {
        match self {
            Self::HorizontalBlur | Self::VerticalBlur => &[
                (U_TEXEL_SIZE, UniformKind::Float),
                (U_RADIUS, UniformKind::Int),
                (U_TEXTURE, UniformKind::Int),
                (U_KERNEL_TEX, UniformKind::Int),
            ],
            Self::Copy => &[(U_TEXTURE, UniformKind::Int)],
        }
    }

    /// Unit vector of the convolution axis, `None` for non-convolving programs.
    pub const fn direction(&self) -> Option<(i64, i64)> {
        match self {
            Self::HorizontalBlur => Some((1, 0)),
            Self::VerticalBlur => Some((0, 1)),
            Self::Copy => None,
        }
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar type of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
}

/// Value written to a uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
}

impl UniformValue {
    pub const fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Int(_) => UniformKind::Int,
        }
    }
}

/// Current uniform values of one program on one context.
///
/// Values persist between draws until overwritten, like GL program state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProgramUniforms {
    pub texel_size: f32,
    pub radius: i32,
    pub texture: i32,
    pub kernel_tex: i32,
}

impl Default for ProgramUniforms {
    fn default() -> Self {
        Self {
            texel_size: 0.0,
            radius: 0,
            texture: SOURCE_UNIT as i32,
            kernel_tex: KERNEL_UNIT as i32,
        }
    }
}

impl ProgramUniforms {
    pub fn set(&mut self, kind: ShaderKind, name: &str, value: UniformValue) -> GpuResult<()> {
        let declared = kind
            .uniforms()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, k)| *k)
            .ok_or_else(|| GpuError::InvalidParameter(format!("program {kind} has no uniform '{name}'")))?;
        if declared != value.kind() {
            return Err(GpuError::InvalidParameter(format!(
                "uniform '{name}' of {kind} is {declared:?}, got {value:?}"
            )));
        }
        match (name, value) {
            (U_TEXEL_SIZE, UniformValue::Float(v)) => self.texel_size = v,
            (U_RADIUS, UniformValue::Int(v)) => self.radius = v,
            (U_TEXTURE, UniformValue::Int(v)) => self.texture = v,
            (U_KERNEL_TEX, UniformValue::Int(v)) => self.kernel_tex = v,
            _ => return Err(GpuError::InvalidParameter(format!("uniform '{name}' has no storage"))),
        }
        Ok(())
    }

    pub fn get(&self, kind: ShaderKind, name: &str) -> Option<UniformValue> {
        kind.uniforms().iter().find(|(n, _)| *n == name)?;
        match name {
            U_TEXEL_SIZE => Some(UniformValue::Float(self.texel_size)),
            U_RADIUS => Some(UniformValue::Int(self.radius)),
            U_TEXTURE => Some(UniformValue::Int(self.texture)),
            U_KERNEL_TEX => Some(UniformValue::Int(self.kernel_tex)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut u = ProgramUniforms::default();
        u.set(ShaderKind::HorizontalBlur, U_RADIUS, UniformValue::Int(3)).unwrap();
        u.set(ShaderKind::HorizontalBlur, U_TEXEL_SIZE, UniformValue::Float(0.25)).unwrap();
        assert_eq!(u.get(ShaderKind::HorizontalBlur, U_RADIUS), Some(UniformValue::Int(3)));
        assert_eq!(u.texel_size, 0.25);
    }

    #[test]
    fn test_rejects_unknown_and_mistyped() {
        let mut u = ProgramUniforms::default();
        assert!(u.set(ShaderKind::Copy, U_RADIUS, UniformValue::Int(1)).is_err());
        assert!(u.set(ShaderKind::VerticalBlur, U_RADIUS, UniformValue::Float(1.0)).is_err());
        assert!(u.set(ShaderKind::VerticalBlur, "u_width", UniformValue::Float(1.0)).is_err());
        assert_eq!(u.get(ShaderKind::Copy, U_KERNEL_TEX), None);
        assert_eq!(u, ProgramUniforms::default());
    }
}
