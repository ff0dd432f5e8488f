//! WGSL sources for the wgpu rendering context.
//!
//! Every program draws one full-screen triangle and computes each target
//! pixel from texel fetches, so results match the software context exactly
//! up to storage rounding. Bindings are shared by all programs:
//!
//! | binding | contents                         |
//! |---------|----------------------------------|
//! | 0       | source texture                   |
//! | 1       | kernel texture (blur only)       |
//! | 2       | `Params` uniform block           |

#![cfg_attr(not(feature = "wgpu"), allow(dead_code))]

/// Vertex entry point shared by all programs.
pub const VERTEX_ENTRY: &str = "vs_main";

/// Common declarations: uniform block, bindings, wrap rule, vertex stage.
const PRELUDE: &str = r#"
struct Params {
    texel_size: f32,
    radius: i32,
    texture: i32,
    kernel_tex: i32,
    src_offset: vec2<f32>,
    wrap_mode: u32,
    _pad: u32,
}

@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var kernel_tex: texture_2d<f32>;
@group(0) @binding(2) var<uniform> params: Params;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VsOut {
    let uv = vec2<f32>(f32((vi << 1u) & 2u), f32(vi & 2u));
    var out: VsOut;
    out.pos = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    return out;
}

// 0 = clamp, 1 = repeat, 2 = mirror (edge texel repeated)
fn wrap_index(i: i32, n: i32, mode: u32) -> i32 {
    switch mode {
        case 1u: {
            return ((i % n) + n) % n;
        }
        case 2u: {
            let period = 2 * n;
            let m = ((i % period) + period) % period;
            return select(period - 1 - m, m, m < n);
        }
        default: {
            return clamp(i, 0, n - 1);
        }
    }
}

fn load_src(x: i32, y: i32) -> vec4<f32> {
    let dims = vec2<i32>(textureDimensions(src_tex));
    let sx = wrap_index(x, dims.x, params.wrap_mode);
    let sy = wrap_index(y, dims.y, params.wrap_mode);
    return textureLoad(src_tex, vec2<i32>(sx, sy), 0);
}

// Framebuffer y grows downwards, same as bitmap rows.
fn source_center(pos: vec4<f32>) -> vec2<f32> {
    return params.src_offset + pos.xy;
}
"#;

const BLUR_BODY: &str = r#"
fn weight(k: i32) -> f32 {
    let n = i32(textureDimensions(kernel_tex).x);
    return textureLoad(kernel_tex, vec2<i32>(clamp(k + params.radius, 0, n - 1), 0), 0).r;
}

@fragment
fn fs_horizontal(in: VsOut) -> @location(0) vec4<f32> {
    let center = source_center(in.pos);
    let len = f32(textureDimensions(src_tex).x);
    let y = i32(floor(center.y));
    var acc = vec4<f32>(0.0);
    for (var k = -params.radius; k <= params.radius; k++) {
        let x = i32(floor((center.x + f32(k)) * params.texel_size * len));
        acc += load_src(x, y) * weight(k);
    }
    return acc;
}

@fragment
fn fs_vertical(in: VsOut) -> @location(0) vec4<f32> {
    let center = source_center(in.pos);
    let len = f32(textureDimensions(src_tex).y);
    let x = i32(floor(center.x));
    var acc = vec4<f32>(0.0);
    for (var k = -params.radius; k <= params.radius; k++) {
        let y = i32(floor((center.y + f32(k)) * params.texel_size * len));
        acc += load_src(x, y) * weight(k);
    }
    return acc;
}
"#;

const COPY_BODY: &str = r#"
@fragment
fn fs_copy(in: VsOut) -> @location(0) vec4<f32> {
    let center = source_center(in.pos);
    return load_src(i32(floor(center.x)), i32(floor(center.y)));
}
"#;

/// Full WGSL source of the blur programs.
pub fn blur_source() -> String {
    [PRELUDE, BLUR_BODY].concat()
}

/// Full WGSL source of the copy program.
pub fn copy_source() -> String {
    [PRELUDE, COPY_BODY].concat()
}
