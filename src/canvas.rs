//! Straight-alpha RGBA8 pixel buffer with software drawing primitives
//!
//! Shared by the label atlas (pill rasterization), avatar thumbnails and the
//! CPU backend. All primitives clip silently at the buffer edges.

use std::path::Path;

use crate::color::Rgba;
use crate::error::{SceneError, SceneResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    /// A fully transparent canvas
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Wrap existing RGBA8 bytes. Fails when the length does not match.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> SceneResult<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(SceneError::Image(format!(
                "expected {}x{} RGBA buffer, got {} bytes",
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels
            .get(idx..idx + 4)
            .and_then(|p| p.try_into().ok())
    }

    /// Overwrite every pixel
    pub fn fill(&mut self, color: Rgba) {
        let rgba = color.to_rgba8();
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Zero every pixel
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Overwrite one pixel without blending
    pub fn set_pixel(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        if let Some(idx) = self.index(x, y) {
            self.pixels[idx..idx + 4].copy_from_slice(&rgba);
        }
    }

    /// Source-over blend `color` scaled by `coverage` (0..=255)
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: Rgba, coverage: u8) {
        let Some(idx) = self.index(x, y) else {
            return;
        };
        let src_a = color.a.clamp(0.0, 1.0) * (coverage as f32 / 255.0);
        if src_a <= 0.0 {
            return;
        }
        let dst = &mut self.pixels[idx..idx + 4];
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        let src = [color.r, color.g, color.b];
        for c in 0..3 {
            let d = dst[c] as f32 / 255.0;
            let v = if out_a > 0.0 {
                (src[c].clamp(0.0, 1.0) * src_a + d * dst_a * (1.0 - src_a)) / out_a
            } else {
                0.0
            };
            dst[c] = (v * 255.0).round() as u8;
        }
        dst[3] = (out_a * 255.0).round() as u8;
    }

    pub fn fill_rect(&mut self, min_x: i32, min_y: i32, max_x: i32, max_y: i32, color: Rgba) {
        for y in min_y.max(0)..max_y.min(self.height as i32) {
            for x in min_x.max(0)..max_x.min(self.width as i32) {
                self.blend_pixel(x, y, color, 255);
            }
        }
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba) {
        let r = radius.max(0.5);
        let r_sq = r * r;
        let (min_x, max_x, min_y, max_y) = self.clip_box(cx - r, cx + r, cy - r, cy + r);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r_sq {
                    self.blend_pixel(x, y, color, 255);
                }
            }
        }
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, thickness: f32, color: Rgba) {
        let outer = radius.max(1.0);
        let inner = (outer - thickness.max(1.0)).max(0.0);
        self.fill_annulus(cx, cy, inner, outer, color, false);
    }

    /// Fill the ring between `inner` and `outer`, optionally only the upper
    /// half (screen y above the center)
    pub fn fill_annulus(
        &mut self,
        cx: f32,
        cy: f32,
        inner: f32,
        outer: f32,
        color: Rgba,
        upper_half_only: bool,
    ) {
        let (outer_sq, inner_sq) = (outer * outer, inner * inner);
        let bottom = if upper_half_only { cy } else { cy + outer };
        let (min_x, max_x, min_y, max_y) = self.clip_box(cx - outer, cx + outer, cy - outer, bottom);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let d = dx * dx + dy * dy;
                if d <= outer_sq && d >= inner_sq {
                    self.blend_pixel(x, y, color, 255);
                }
            }
        }
    }

    /// Filled rectangle with rounded corners
    pub fn fill_rounded_rect(
        &mut self,
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
        radius: f32,
        color: Rgba,
    ) {
        let r = radius.min((max_x - min_x) / 2.0).min((max_y - min_y) / 2.0).max(0.0);
        let (x0, x1, y0, y1) = self.clip_box(min_x, max_x - 1.0, min_y, max_y - 1.0);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if inside_rounded(x as f32 + 0.5, y as f32 + 0.5, min_x, min_y, max_x, max_y, r) {
                    self.blend_pixel(x, y, color, 255);
                }
            }
        }
    }

    /// One-pixel outline of a rounded rectangle
    pub fn stroke_rounded_rect(
        &mut self,
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
        radius: f32,
        color: Rgba,
    ) {
        let r = radius.min((max_x - min_x) / 2.0).min((max_y - min_y) / 2.0).max(0.0);
        let ri = (r - 1.0).max(0.0);
        let (x0, x1, y0, y1) = self.clip_box(min_x, max_x - 1.0, min_y, max_y - 1.0);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let outer = inside_rounded(px, py, min_x, min_y, max_x, max_y, r);
                let inner =
                    inside_rounded(px, py, min_x + 1.0, min_y + 1.0, max_x - 1.0, max_y - 1.0, ri);
                if outer && !inner {
                    self.blend_pixel(x, y, color, 255);
                }
            }
        }
    }

    /// Thick line by stamping squares along a Bresenham walk
    pub fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), thickness: f32, color: Rgba) {
        self.walk_line(from, to, thickness, color, None);
    }

    /// Dashed line with `on`/`off` pixel lengths
    pub fn draw_dashed_line(
        &mut self,
        from: (f32, f32),
        to: (f32, f32),
        thickness: f32,
        dash: (f32, f32),
        color: Rgba,
    ) {
        self.walk_line(from, to, thickness, color, Some(dash));
    }

    fn walk_line(
        &mut self,
        from: (f32, f32),
        to: (f32, f32),
        thickness: f32,
        color: Rgba,
        dash: Option<(f32, f32)>,
    ) {
        let Some((from, to)) = self.clip_segment(from, to) else {
            return;
        };
        let (mut x0, mut y0) = (from.0.round() as i32, from.1.round() as i32);
        let (x1, y1) = (to.0.round() as i32, to.1.round() as i32);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = ((thickness.max(1.0).round() as i32) - 1) / 2;
        let (start_x, start_y) = (x0, y0);
        loop {
            let on = match dash {
                Some((on, off)) => {
                    let travelled = ((x0 - start_x) as f32).hypot((y0 - start_y) as f32);
                    travelled % (on + off).max(1.0) < on
                }
                None => true,
            };
            if on {
                for oy in -radius..=radius {
                    for ox in -radius..=radius {
                        self.blend_pixel(x0 + ox, y0 + oy, color, 255);
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Blend an alpha coverage bitmap (e.g. a glyph) in `color`
    pub fn blend_mask(&mut self, x: i32, y: i32, width: usize, height: usize, mask: &[u8], color: Rgba) {
        for row in 0..height {
            for col in 0..width {
                let coverage = mask.get(row * width + col).copied().unwrap_or(0);
                if coverage > 0 {
                    self.blend_pixel(x + col as i32, y + row as i32, color, coverage);
                }
            }
        }
    }

    /// Copy a sub-rectangle of `src` into this canvas without blending
    pub fn copy_from(&mut self, src: &Canvas, dst_x: i32, dst_y: i32) {
        for y in 0..src.height {
            for x in 0..src.width {
                if let Some(rgba) = src.pixel(x, y) {
                    self.set_pixel(dst_x + x as i32, dst_y + y as i32, rgba);
                }
            }
        }
    }

    /// Source-over blit of the `src_rect` region of `src` scaled into the
    /// destination rectangle, modulated by `alpha`. Nearest-neighbor sampling.
    pub fn blit_scaled(
        &mut self,
        src: &Canvas,
        src_rect: (u32, u32, u32, u32),
        dst: (f32, f32, f32, f32),
        alpha: f32,
    ) {
        let (sx0, sy0, sw, sh) = src_rect;
        let (dx0, dy0, dw, dh) = dst;
        if sw == 0 || sh == 0 || dw <= 0.0 || dh <= 0.0 {
            return;
        }
        let (min_x, max_x, min_y, max_y) = self.clip_box(dx0, dx0 + dw - 1.0, dy0, dy0 + dh - 1.0);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let u = ((x as f32 + 0.5 - dx0) / dw * sw as f32).floor() as u32;
                let v = ((y as f32 + 0.5 - dy0) / dh * sh as f32).floor() as u32;
                let Some([r, g, b, a]) = src.pixel(sx0 + u.min(sw - 1), sy0 + v.min(sh - 1)) else {
                    continue;
                };
                if a == 0 {
                    continue;
                }
                let color = Rgba::rgb8(r, g, b, alpha);
                self.blend_pixel(x, y, color, a);
            }
        }
    }

    /// Write the buffer as a PNG
    pub fn save_png(&self, path: &Path) -> SceneResult<()> {
        image::save_buffer(
            path,
            &self.pixels,
            self.width,
            self.height,
            image::ColorType::Rgba8,
        )
        .map_err(|e| SceneError::Image(e.to_string()))
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    /// Integer pixel box clipped to the canvas; may be inverted when empty
    fn clip_box(&self, min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> (i32, i32, i32, i32) {
        let w = self.width as i32 - 1;
        let h = self.height as i32 - 1;
        (
            (min_x.floor() as i32).max(0),
            (max_x.ceil() as i32).min(w),
            (min_y.floor() as i32).max(0),
            (max_y.ceil() as i32).min(h),
        )
    }

    /// Liang-Barsky clip against the canvas grown by a pixel, so huge
    /// off-canvas coordinates never drive the Bresenham walk
    fn clip_segment(&self, from: (f32, f32), to: (f32, f32)) -> Option<((f32, f32), (f32, f32))> {
        if !(from.0.is_finite() && from.1.is_finite() && to.0.is_finite() && to.1.is_finite()) {
            return None;
        }
        let (fx, fy) = (from.0 as f64, from.1 as f64);
        let (dx, dy) = (to.0 as f64 - fx, to.1 as f64 - fy);
        let (xmax, ymax) = (self.width as f64 + 1.0, self.height as f64 + 1.0);
        let mut t0 = 0.0f64;
        let mut t1 = 1.0f64;
        for (p, q) in [(-dx, fx + 1.0), (dx, xmax - fx), (-dy, fy + 1.0), (dy, ymax - fy)] {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
        Some((
            ((fx + t0 * dx) as f32, (fy + t0 * dy) as f32),
            ((fx + t1 * dx) as f32, (fy + t1 * dy) as f32),
        ))
    }
}

fn inside_rounded(px: f32, py: f32, min_x: f32, min_y: f32, max_x: f32, max_y: f32, r: f32) -> bool {
    if px < min_x || px > max_x || py < min_y || py > max_y {
        return false;
    }
    let cx = px.clamp(min_x + r, max_x - r);
    let cy = py.clamp(min_y + r, max_y - r);
    let (dx, dy) = (px - cx, py - cy);
    dx * dx + dy * dy <= r * r
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);

    #[test]
    fn new_canvas_is_transparent() {
        let canvas = Canvas::new(4, 3);
        assert_eq!(canvas.as_bytes().len(), 48);
        assert_eq!(canvas.pixel(3, 2), Some([0, 0, 0, 0]));
        assert_eq!(canvas.pixel(4, 0), None);
    }

    #[test]
    fn from_rgba_checks_length() {
        assert!(Canvas::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(Canvas::from_rgba(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn opaque_blend_replaces_pixel() {
        let mut canvas = Canvas::new(2, 2);
        canvas.fill(Rgba::WHITE);
        canvas.blend_pixel(0, 0, RED, 255);
        assert_eq!(canvas.pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn half_alpha_blend_over_opaque_mixes() {
        let mut canvas = Canvas::new(1, 1);
        canvas.fill(Rgba::new(0.0, 0.0, 0.0, 1.0));
        canvas.blend_pixel(0, 0, RED.with_alpha(0.5), 255);
        let [r, g, _, a] = canvas.pixel(0, 0).unwrap();
        assert!((127..=128).contains(&r));
        assert_eq!(g, 0);
        assert_eq!(a, 255);
    }

    #[test]
    fn primitives_clip_at_edges() {
        let mut canvas = Canvas::new(10, 10);
        canvas.fill_circle(-50.0, -50.0, 20.0, RED);
        canvas.fill_rect(-5, -5, 2, 2, RED);
        canvas.draw_line((-1e9, 5.0), (1e9, 5.0), 1.0, RED);
        assert_eq!(canvas.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(9, 5), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(9, 9), Some([0, 0, 0, 0]));
    }

    #[test]
    fn dashed_line_leaves_gaps() {
        let mut canvas = Canvas::new(40, 3);
        canvas.draw_dashed_line((0.0, 1.0), (39.0, 1.0), 1.0, (8.0, 6.0), RED);
        assert_eq!(canvas.pixel(2, 1).map(|p| p[3]), Some(255));
        assert_eq!(canvas.pixel(10, 1).map(|p| p[3]), Some(0));
        assert_eq!(canvas.pixel(15, 1).map(|p| p[3]), Some(255));
    }

    #[test]
    fn upper_half_annulus_skips_lower_half() {
        let mut canvas = Canvas::new(40, 40);
        canvas.fill_annulus(20.0, 20.0, 5.0, 15.0, RED, true);
        assert_eq!(canvas.pixel(20, 10).map(|p| p[3]), Some(255));
        assert_eq!(canvas.pixel(20, 30).map(|p| p[3]), Some(0));
        assert_eq!(canvas.pixel(20, 20).map(|p| p[3]), Some(0));
    }

    #[test]
    fn rounded_rect_corners_stay_empty() {
        let mut canvas = Canvas::new(30, 20);
        canvas.fill_rounded_rect(0.0, 0.0, 30.0, 20.0, 8.0, RED);
        assert_eq!(canvas.pixel(0, 0).map(|p| p[3]), Some(0));
        assert_eq!(canvas.pixel(15, 10).map(|p| p[3]), Some(255));
    }

    #[test]
    fn blit_scaled_samples_source() {
        let mut src = Canvas::new(2, 1);
        src.set_pixel(0, 0, [255, 0, 0, 255]);
        src.set_pixel(1, 0, [0, 0, 255, 255]);
        let mut dst = Canvas::new(4, 2);
        dst.blit_scaled(&src, (0, 0, 2, 1), (0.0, 0.0, 4.0, 2.0), 1.0);
        assert_eq!(dst.pixel(0, 1), Some([255, 0, 0, 255]));
        assert_eq!(dst.pixel(3, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn save_png_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut canvas = Canvas::new(8, 8);
        canvas.fill(RED);
        canvas.save_png(&path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.get_pixel(3, 3).0, [255, 0, 0, 255]);
    }
}
