//! WGSL shaders for the display-list renderer
//!
//! Two pipelines: instanced SDF shapes (disks, half disks, lenses, lines) and
//! instanced textured quads sampled from the label atlas. Both work in screen
//! pixels and convert to clip space with the viewport uniform.

/// Viewport uniform shared by both shaders
pub const VIEW_UNIFORMS: &str = r#"
struct ViewUniforms {
    viewport: vec2<f32>,
    _padding: vec2<f32>,
}

@group(0) @binding(0) var<uniform> view: ViewUniforms;

fn to_clip(p: vec2<f32>) -> vec4<f32> {
    let ndc = vec2<f32>(p.x / view.viewport.x * 2.0 - 1.0, 1.0 - p.y / view.viewport.y * 2.0);
    return vec4<f32>(ndc, 0.0, 1.0);
}

fn quad_corner(index: u32) -> vec2<f32> {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    return corners[index];
}
"#;

/// Shape vertex shader: one bounding quad per instance
pub const SHAPE_VERTEX_SHADER: &str = r#"
struct ShapeInstance {
    @location(0) geometry: vec4<f32>,
    @location(1) extra: vec4<f32>,
    @location(2) fill: vec4<f32>,
    @location(3) stroke: vec4<f32>,
    @location(4) params: vec4<f32>,
}

struct ShapeOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) pixel: vec2<f32>,
    @location(1) geometry: vec4<f32>,
    @location(2) extra: vec4<f32>,
    @location(3) fill: vec4<f32>,
    @location(4) stroke: vec4<f32>,
    @location(5) params: vec4<f32>,
}

@vertex
fn vs_shape(
    @builtin(vertex_index) vertex_idx: u32,
    shape: ShapeInstance,
) -> ShapeOutput {
    let kind = u32(shape.params.x + 0.5);
    let g = shape.geometry;
    var lo: vec2<f32>;
    var hi: vec2<f32>;
    if (kind == 0u || kind == 1u) {
        let r = g.z + 1.0;
        lo = g.xy - vec2<f32>(r, r);
        hi = g.xy + vec2<f32>(r, r);
    } else if (kind == 2u) {
        let ra = shape.extra.x + 1.0;
        let rb = shape.extra.y + 1.0;
        lo = max(g.xy - vec2<f32>(ra, ra), g.zw - vec2<f32>(rb, rb));
        hi = min(g.xy + vec2<f32>(ra, ra), g.zw + vec2<f32>(rb, rb));
    } else {
        let w = shape.extra.x + 1.0;
        lo = min(g.xy, g.zw) - vec2<f32>(w, w);
        hi = max(g.xy, g.zw) + vec2<f32>(w, w);
    }

    let pixel = mix(lo, hi, quad_corner(vertex_idx));
    var out: ShapeOutput;
    out.clip_position = to_clip(pixel);
    out.pixel = pixel;
    out.geometry = shape.geometry;
    out.extra = shape.extra;
    out.fill = shape.fill;
    out.stroke = shape.stroke;
    out.params = shape.params;
    return out;
}
"#;

/// Shape fragment shader: coverage test per kind
pub const SHAPE_FRAGMENT_SHADER: &str = r#"
fn in_upper_disk(p: vec2<f32>, c: vec2<f32>, r: f32) -> bool {
    return p.y <= c.y && distance(p, c) <= r;
}

@fragment
fn fs_shape(in: ShapeOutput) -> @location(0) vec4<f32> {
    let kind = u32(in.params.x + 0.5);
    let p = in.pixel;
    let g = in.geometry;

    if (kind == 0u) {
        let d = distance(p, g.xy);
        if (d > g.z) {
            discard;
        }
        let stroke_width = in.params.y;
        if (stroke_width > 0.0 && d >= g.z - stroke_width) {
            return in.stroke;
        }
        if (in.fill.a <= 0.0) {
            discard;
        }
        return in.fill;
    }
    if (kind == 1u) {
        if (!in_upper_disk(p, g.xy, g.z)) {
            discard;
        }
        return in.fill;
    }
    if (kind == 2u) {
        if (!in_upper_disk(p, g.xy, in.extra.x) || !in_upper_disk(p, g.zw, in.extra.y)) {
            discard;
        }
        return in.fill;
    }

    // Lines: distance to the segment, optionally dashed by arc length
    let ab = g.zw - g.xy;
    let len_sq = max(dot(ab, ab), 1e-6);
    let t = clamp(dot(p - g.xy, ab) / len_sq, 0.0, 1.0);
    let nearest = g.xy + ab * t;
    if (distance(p, nearest) > in.extra.x * 0.5) {
        discard;
    }
    if (kind == 4u) {
        let period = max(in.extra.y + in.extra.z, 1.0);
        let travelled = t * sqrt(len_sq);
        if (travelled - floor(travelled / period) * period >= in.extra.y) {
            discard;
        }
    }
    return in.fill;
}
"#;

/// Atlas quad shaders
pub const QUAD_SHADER: &str = r#"
@group(1) @binding(0) var atlas_texture: texture_2d<f32>;
@group(1) @binding(1) var atlas_sampler: sampler;

struct QuadInstance {
    @location(0) rect: vec4<f32>,
    @location(1) uv: vec4<f32>,
    @location(2) alpha: f32,
}

struct QuadOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) alpha: f32,
}

@vertex
fn vs_quad(
    @builtin(vertex_index) vertex_idx: u32,
    quad: QuadInstance,
) -> QuadOutput {
    let corner = quad_corner(vertex_idx);
    var out: QuadOutput;
    out.clip_position = to_clip(quad.rect.xy + corner * quad.rect.zw);
    out.uv = mix(quad.uv.xy, quad.uv.zw, corner);
    out.alpha = quad.alpha;
    return out;
}

@fragment
fn fs_quad(in: QuadOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(atlas_texture, atlas_sampler, in.uv);
    return vec4<f32>(texel.rgb, texel.a * in.alpha);
}
"#;

/// Complete shape shader source
pub fn shape_shader() -> String {
    format!("{VIEW_UNIFORMS}\n{SHAPE_VERTEX_SHADER}\n{SHAPE_FRAGMENT_SHADER}")
}

/// Complete atlas quad shader source
pub fn quad_shader() -> String {
    format!("{VIEW_UNIFORMS}\n{QUAD_SHADER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_shader_has_entry_points() {
        let shader = shape_shader();
        assert!(shader.contains("fn vs_shape"));
        assert!(shader.contains("fn fs_shape"));
        assert!(shader.contains("ViewUniforms"));
    }

    #[test]
    fn quad_shader_binds_atlas_in_group_one() {
        let shader = quad_shader();
        assert!(shader.contains("fn vs_quad"));
        assert!(shader.contains("fn fs_quad"));
        assert!(shader.contains("@group(1) @binding(0)"));
    }

    #[test]
    fn both_shaders_bind_view_in_group_zero() {
        assert!(shape_shader().contains("@group(0) @binding(0)"));
        assert!(quad_shader().contains("@group(0) @binding(0)"));
    }
}
