//! Text measurement and glyph rasterization

use std::path::Path;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use tracing::{debug, warn};

use crate::canvas::Canvas;
use crate::color::Rgba;
use crate::error::{SceneError, SceneResult};

/// Measures and draws single-line text into a [`Canvas`]
pub trait TextRasterizer: Send {
    /// Advance width of `text` at `size` pixels
    fn measure(&self, text: &str, size: f32) -> f32;

    /// Draw `text` starting at `x`, vertically centered on `center_y`
    fn draw(&self, canvas: &mut Canvas, text: &str, size: f32, x: f32, center_y: f32, color: Rgba);
}

/// Text through a real font
pub struct FontdueText {
    font: fontdue::Font,
}

impl std::fmt::Debug for FontdueText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontdueText").finish_non_exhaustive()
    }
}

impl FontdueText {
    pub fn from_bytes(bytes: Vec<u8>) -> SceneResult<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| SceneError::Font(e.to_string()))?;
        Ok(Self { font })
    }

    pub fn from_path(path: &Path) -> SceneResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes).map_err(|e| SceneError::Font(format!("{}: {e}", path.display())))
    }

    /// First `.ttf` or `.otf` file in `dir`, by file name order
    pub fn discover(dir: &Path) -> SceneResult<Option<Self>> {
        let mut candidates: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"))
            })
            .collect();
        candidates.sort();
        match candidates.first() {
            Some(path) => Self::from_path(path).map(Some),
            None => Ok(None),
        }
    }

    fn layout(&self, text: &str, size: f32, x: f32, y: f32) -> Layout {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x,
            y,
            ..LayoutSettings::default()
        });
        layout.append(&[&self.font], &TextStyle::new(text, size, 0));
        layout
    }
}

impl TextRasterizer for FontdueText {
    fn measure(&self, text: &str, size: f32) -> f32 {
        let layout = self.layout(text, size, 0.0, 0.0);
        let mut min_x = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        for glyph in layout.glyphs() {
            min_x = min_x.min(glyph.x);
            max_x = max_x.max(glyph.x + glyph.width as f32);
        }
        if min_x.is_finite() && max_x.is_finite() {
            (max_x - min_x).max(0.0)
        } else {
            0.0
        }
    }

    fn draw(&self, canvas: &mut Canvas, text: &str, size: f32, x: f32, center_y: f32, color: Rgba) {
        let top = match self.font.horizontal_line_metrics(size) {
            Some(metrics) => center_y + (metrics.ascent + metrics.descent) * 0.5 - metrics.ascent,
            None => center_y - size * 0.5,
        };
        let layout = self.layout(text, size, x, top);
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (metrics, bitmap) = self.font.rasterize_indexed(glyph.key.glyph_index, glyph.key.px);
            canvas.blend_mask(
                glyph.x.floor() as i32,
                glyph.y.floor() as i32,
                metrics.width,
                metrics.height,
                &bitmap,
                color,
            );
        }
    }
}

/// Font-free fallback: fixed advance per character, glyphs drawn as blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct MonospaceText;

impl MonospaceText {
    const ADVANCE: f32 = 0.6;
}

impl TextRasterizer for MonospaceText {
    fn measure(&self, text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * size * Self::ADVANCE
    }

    fn draw(&self, canvas: &mut Canvas, text: &str, size: f32, x: f32, center_y: f32, color: Rgba) {
        let advance = size * Self::ADVANCE;
        let half = (size * 0.35).max(1.0);
        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let left = x + i as f32 * advance;
            canvas.fill_rect(
                left.round() as i32,
                (center_y - half).round() as i32,
                (left + advance - 1.0).round().max(left.round() + 1.0) as i32,
                (center_y + half).round() as i32,
                color,
            );
        }
    }
}

/// Fontdue text from the first font in `fonts_dir`, falling back to
/// [`MonospaceText`] when there is no directory or no usable font
pub fn load_text_rasterizer(fonts_dir: Option<&Path>) -> Box<dyn TextRasterizer> {
    let Some(dir) = fonts_dir else {
        debug!("no font directory configured, using monospace labels");
        return Box::new(MonospaceText);
    };
    match FontdueText::discover(dir) {
        Ok(Some(text)) => {
            debug!(dir = %dir.display(), "loaded label font");
            Box::new(text)
        }
        Ok(None) => {
            warn!(dir = %dir.display(), "no .ttf/.otf font found, using monospace labels");
            Box::new(MonospaceText)
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to load label font, using monospace labels");
            Box::new(MonospaceText)
        }
    }
}
