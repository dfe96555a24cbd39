//! Row-packed label atlas
//!
//! Every distinct label string is rasterized once as a pill into a shared RGBA
//! texture. Slots are packed left to right in rows; when a new string no
//! longer fits, the whole atlas is cleared and packing restarts. The GPU
//! backend uploads the texture only after [`LabelAtlas::commit`] reports a
//! change.

use std::collections::HashMap;

use tracing::debug;

use super::LabelConfig;
use super::text::TextRasterizer;
use crate::canvas::Canvas;

/// Where a label lives in the atlas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasEntry {
    /// Pixel rectangle in the atlas
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Normalized texture coordinates of the rectangle
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl AtlasEntry {
    /// UVs pulled in by half a texel to avoid sampling neighbors
    pub fn inset_uv(&self, atlas_size: u32) -> [f32; 4] {
        let d = 0.5 / atlas_size.max(1) as f32;
        [self.u0 + d, self.v0 + d, self.u1 - d, self.v1 - d]
    }
}

pub struct LabelAtlas {
    config: LabelConfig,
    text: Box<dyn TextRasterizer>,
    canvas: Canvas,
    entries: HashMap<String, AtlasEntry>,
    cursor_x: u32,
    cursor_y: u32,
    dirty: bool,
    resets: u64,
}

impl std::fmt::Debug for LabelAtlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelAtlas")
            .field("size", &self.config.atlas_size)
            .field("entries", &self.entries.len())
            .field("dirty", &self.dirty)
            .field("resets", &self.resets)
            .finish()
    }
}

impl LabelAtlas {
    const ORIGIN: u32 = 2;

    pub fn new(config: LabelConfig, text: Box<dyn TextRasterizer>) -> Self {
        let size = config.atlas_size.max(16);
        Self {
            config: LabelConfig {
                atlas_size: size,
                ..config
            },
            text,
            canvas: Canvas::new(size, size),
            entries: HashMap::new(),
            cursor_x: Self::ORIGIN,
            cursor_y: Self::ORIGIN,
            dirty: false,
            resets: 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.config.atlas_size
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times the atlas overflowed and was cleared
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag. Returns true when there were pending changes
    /// that need uploading.
    pub fn commit(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn get(&self, text: &str) -> Option<AtlasEntry> {
        self.entries.get(text).copied()
    }

    /// Pixel size a label would occupy, without packing it
    pub fn measure(&self, text: &str) -> (u32, u32) {
        (self.slot_width(text), self.config.row_height)
    }

    /// Look up `text`, rasterizing and packing it on first use
    pub fn ensure(&mut self, text: &str) -> AtlasEntry {
        if let Some(entry) = self.entries.get(text) {
            return *entry;
        }
        let size = self.config.atlas_size;
        let width = self.slot_width(text);
        let height = self.config.row_height;

        if self.cursor_x + width + Self::ORIGIN > size {
            self.cursor_x = Self::ORIGIN;
            self.cursor_y += height + self.config.row_gap;
        }
        if self.cursor_y + height + Self::ORIGIN > size {
            self.reset();
        }

        let (x, y) = (self.cursor_x, self.cursor_y);
        self.draw_pill(text, x, y, width, height);
        self.cursor_x += width + self.config.gap;
        self.dirty = true;

        let s = size as f32;
        let entry = AtlasEntry {
            x,
            y,
            width,
            height,
            u0: x as f32 / s,
            v0: y as f32 / s,
            u1: (x + width) as f32 / s,
            v1: (y + height) as f32 / s,
        };
        self.entries.insert(text.to_string(), entry);
        entry
    }

    /// Drop every entry and pixel
    pub fn clear(&mut self) {
        self.canvas.clear();
        self.entries.clear();
        self.cursor_x = Self::ORIGIN;
        self.cursor_y = Self::ORIGIN;
        self.dirty = true;
    }

    fn reset(&mut self) {
        debug!(entries = self.entries.len(), "label atlas full, resetting");
        self.resets += 1;
        self.clear();
    }

    fn slot_width(&self, text: &str) -> u32 {
        let cfg = &self.config;
        let measured = self.text.measure(text, cfg.font_size);
        let width = (measured + (cfg.padding * 2) as f32).ceil().max(0.0) as u32;
        width
            .max(cfg.min_width)
            .min(cfg.atlas_size.saturating_sub(2 * Self::ORIGIN))
    }

    fn draw_pill(&mut self, text: &str, x: u32, y: u32, width: u32, height: u32) {
        let cfg = &self.config;
        let (x0, y0) = (x as f32, y as f32);
        let (x1, y1) = (x0 + width as f32, y0 + height as f32);
        self.canvas
            .fill_rounded_rect(x0, y0, x1, y1, cfg.corner_radius, cfg.background);
        self.canvas
            .stroke_rounded_rect(x0, y0, x1, y1, cfg.corner_radius, cfg.border);

        let text_width = self.text.measure(text, cfg.font_size);
        let left = x0 + (width as f32 - text_width) / 2.0;
        let center_y = y0 + height as f32 / 2.0 + 1.0;
        self.text.draw(
            &mut self.canvas,
            text,
            cfg.font_size,
            left,
            center_y,
            cfg.text_color,
        );
    }
}
