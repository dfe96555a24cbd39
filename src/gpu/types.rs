//! GPU instance types for the display list
//!
//! These types are uploaded directly to GPU buffers. All use f32 and are
//! repr(C) so the layout matches the WGSL structs in [`super::shaders`].

use bytemuck::{Pod, Zeroable};

use crate::canvas::Canvas;
use crate::color::Rgba;
use crate::frame::DrawItem;

/// Shape kinds understood by the shape fragment shader
pub const SHAPE_CIRCLE: f32 = 0.0;
pub const SHAPE_HALF_DISK: f32 = 1.0;
pub const SHAPE_LENS: f32 = 2.0;
pub const SHAPE_LINE: f32 = 3.0;
pub const SHAPE_DASHED_LINE: f32 = 4.0;

/// One screen-space shape evaluated as a signed-distance test per pixel.
///
/// Field meaning depends on `params[0]` (the kind):
/// - circle / half disk: `geometry = [cx, cy, r, _]`
/// - lens: `geometry = [ax, ay, bx, by]`, `extra = [ra, rb, _, _]`
/// - lines: `geometry = [x0, y0, x1, y1]`, `extra = [width, on, off, _]`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShapeInstance {
    pub geometry: [f32; 4],
    pub extra: [f32; 4],
    pub fill: [f32; 4],
    pub stroke: [f32; 4],
    /// `[kind, stroke_width, _, _]`
    pub params: [f32; 4],
}

impl ShapeInstance {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x4,
        1 => Float32x4,
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x4,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }

    fn new(kind: f32, geometry: [f32; 4], extra: [f32; 4], fill: Rgba) -> Self {
        Self {
            geometry,
            extra,
            fill: fill.to_array(),
            stroke: [0.0; 4],
            params: [kind, 0.0, 0.0, 0.0],
        }
    }

    /// The shape for a non-atlas draw item. Avatars become flat disks in the
    /// image's mean color.
    pub fn from_item(item: &DrawItem) -> Option<Self> {
        Some(match item {
            DrawItem::HalfDisk { disk, color } => Self::new(
                SHAPE_HALF_DISK,
                [disk.center.0, disk.center.1, disk.radius, 0.0],
                [0.0; 4],
                *color,
            ),
            DrawItem::Lens { a, b, color } => Self::new(
                SHAPE_LENS,
                [a.center.0, a.center.1, b.center.0, b.center.1],
                [a.radius, b.radius, 0.0, 0.0],
                *color,
            ),
            DrawItem::Line { from, to, width, color } => Self::new(
                SHAPE_LINE,
                [from.0, from.1, to.0, to.1],
                [width.max(1.0), 0.0, 0.0, 0.0],
                *color,
            ),
            DrawItem::DashedLine {
                from,
                to,
                width,
                dash,
                color,
            } => Self::new(
                SHAPE_DASHED_LINE,
                [from.0, from.1, to.0, to.1],
                [width.max(1.0), dash.0, dash.1, 0.0],
                *color,
            ),
            DrawItem::Circle {
                center,
                radius,
                fill,
                outline,
            } => {
                let mut shape = Self::new(SHAPE_CIRCLE, [center.0, center.1, *radius, 0.0], [0.0; 4], *fill);
                if let Some((color, width)) = outline {
                    shape.stroke = color.to_array();
                    shape.params[1] = width.max(1.0);
                }
                shape
            }
            DrawItem::Avatar {
                center, radius, image, ..
            } => Self::new(
                SHAPE_CIRCLE,
                [center.0, center.1, *radius, 0.0],
                [0.0; 4],
                mean_color(image),
            ),
            DrawItem::AtlasQuad { .. } => return None,
        })
    }
}

/// Alpha-weighted mean color of an image
pub fn mean_color(image: &Canvas) -> Rgba {
    let (mut r, mut g, mut b, mut weight) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for px in image.as_bytes().chunks_exact(4) {
        let a = px[3] as f64 / 255.0;
        r += px[0] as f64 * a;
        g += px[1] as f64 * a;
        b += px[2] as f64 * a;
        weight += a;
    }
    if weight <= 0.0 {
        return Rgba::TRANSPARENT;
    }
    let channel = |v: f64| (v / weight / 255.0) as f32;
    Rgba::new(channel(r), channel(g), channel(b), 1.0)
}

/// One textured rectangle sampled from the label atlas
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadInstance {
    /// `[x, y, width, height]` in screen pixels
    pub rect: [f32; 4],
    /// `[u0, v0, u1, v1]`
    pub uv: [f32; 4],
    pub alpha: f32,
    /// Padding for 16-byte alignment
    pub _padding: [f32; 3],
}

impl QuadInstance {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x4,
        1 => Float32x4,
        2 => Float32,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }

    pub fn from_item(item: &DrawItem, atlas_size: u32) -> Option<Self> {
        let DrawItem::AtlasQuad { origin, entry, alpha } = item else {
            return None;
        };
        Some(Self {
            rect: [
                origin.0.round(),
                origin.1.round(),
                entry.width as f32,
                entry.height as f32,
            ],
            uv: entry.inset_uv(atlas_size),
            alpha: *alpha,
            _padding: [0.0; 3],
        })
    }
}

/// Viewport size for pixel-to-clip conversion
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewUniforms {
    pub viewport: [f32; 2],
    pub _padding: [f32; 2],
}

impl ViewUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: [width as f32, height as f32],
            _padding: [0.0; 2],
        }
    }
}
