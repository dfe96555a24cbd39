//! Software backend
//!
//! Draws a [`FrameList`] into a [`Canvas`] on the CPU. Always available and
//! used for headless rendering and tests.

use tracing::trace;

use crate::canvas::Canvas;
use crate::color::Rgba;
use crate::config::Backend;
use crate::engine::FrameRenderer;
use crate::frame::{Disk, DrawItem, FrameList};
use crate::labels::LabelAtlas;

#[derive(Debug, Clone)]
pub struct RasterRenderer {
    canvas: Canvas,
}

impl RasterRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Canvas::new(width.max(1), height.max(1)),
        }
    }

    fn draw(&mut self, item: &DrawItem, atlas: &LabelAtlas) {
        let canvas = &mut self.canvas;
        match item {
            DrawItem::HalfDisk { disk, color } => {
                canvas.fill_annulus(disk.center.0, disk.center.1, 0.0, disk.radius, *color, true);
            }
            DrawItem::Lens { a, b, color } => {
                fill_where(canvas, a, b, |x, y| a.contains_upper(x, y) && b.contains_upper(x, y), |c, x, y| {
                    c.blend_pixel(x, y, *color, 255);
                });
            }
            DrawItem::Line { from, to, width, color } => canvas.draw_line(*from, *to, *width, *color),
            DrawItem::DashedLine {
                from,
                to,
                width,
                dash,
                color,
            } => canvas.draw_dashed_line(*from, *to, *width, *dash, *color),
            DrawItem::Circle {
                center,
                radius,
                fill,
                outline,
            } => {
                if fill.a > 0.0 {
                    canvas.fill_circle(center.0, center.1, *radius, *fill);
                }
                if let Some((color, width)) = outline {
                    canvas.stroke_circle(center.0, center.1, *radius, *width, *color);
                }
            }
            DrawItem::Avatar {
                center, radius, image, ..
            } => {
                let disk = Disk {
                    center: *center,
                    radius: *radius,
                };
                let (iw, ih) = (image.width(), image.height());
                if iw == 0 || ih == 0 {
                    return;
                }
                let size = radius * 2.0;
                let (x0, y0) = (center.0 - radius, center.1 - radius);
                fill_where(canvas, &disk, &disk, |x, y| disk.contains(x, y), |c, x, y| {
                    let u = (((x as f32 + 0.5 - x0) / size) * iw as f32) as u32;
                    let v = (((y as f32 + 0.5 - y0) / size) * ih as f32) as u32;
                    if let Some([r, g, b, a]) = image.pixel(u.min(iw - 1), v.min(ih - 1)) {
                        c.blend_pixel(x, y, Rgba::rgb8(r, g, b, 1.0), a);
                    }
                });
            }
            DrawItem::AtlasQuad { origin, entry, alpha } => {
                canvas.blit_scaled(
                    atlas.canvas(),
                    (entry.x, entry.y, entry.width, entry.height),
                    (
                        origin.0.round(),
                        origin.1.round(),
                        entry.width as f32,
                        entry.height as f32,
                    ),
                    *alpha,
                );
            }
        }
    }
}

/// Visit every pixel of the intersected bounding boxes of `a` and `b` whose
/// center passes `inside`
fn fill_where(
    canvas: &mut Canvas,
    a: &Disk,
    b: &Disk,
    inside: impl Fn(f32, f32) -> bool,
    mut paint: impl FnMut(&mut Canvas, i32, i32),
) {
    let min_x = (a.center.0 - a.radius).max(b.center.0 - b.radius).max(0.0);
    let max_x = (a.center.0 + a.radius)
        .min(b.center.0 + b.radius)
        .min(canvas.width() as f32 - 1.0);
    let min_y = (a.center.1 - a.radius).max(b.center.1 - b.radius).max(0.0);
    let max_y = (a.center.1 + a.radius)
        .min(b.center.1 + b.radius)
        .min(canvas.height() as f32 - 1.0);
    if !(min_x <= max_x && min_y <= max_y) {
        return;
    }
    for y in min_y.floor() as i32..=max_y.ceil() as i32 {
        for x in min_x.floor() as i32..=max_x.ceil() as i32 {
            if inside(x as f32 + 0.5, y as f32 + 0.5) {
                paint(canvas, x, y);
            }
        }
    }
}

impl FrameRenderer for RasterRenderer {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.canvas.width(), self.canvas.height()) {
            self.canvas = Canvas::new(width.max(1), height.max(1));
        }
    }

    fn render(&mut self, frame: &FrameList, atlas: &mut LabelAtlas) {
        self.resize(frame.width, frame.height);
        self.canvas.fill(frame.background);
        // The CPU path samples the atlas canvas directly
        atlas.commit();
        for item in &frame.items {
            self.draw(item, atlas);
        }
        trace!(items = frame.len(), "raster frame drawn");
    }

    fn pixels(&self) -> &Canvas {
        &self.canvas
    }
}
