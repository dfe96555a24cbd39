//! Text labels: rasterization, atlas packing and collision-aware placement

mod atlas;
mod placement;
mod text;

pub use atlas::{AtlasEntry, LabelAtlas};
pub use placement::{CollisionGrid, LabelPlacer, LabelRecord, PlacementInput};
pub use text::{FontdueText, MonospaceText, TextRasterizer, load_text_rasterizer};

use serde::{Deserialize, Serialize};

use crate::color::Rgba;

/// Label appearance, atlas packing and placement tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Atlas texture edge length in pixels
    pub atlas_size: u32,
    pub font_size: f32,
    pub row_height: u32,
    /// Horizontal padding on each side of the text
    pub padding: u32,
    /// Horizontal gap between packed slots
    pub gap: u32,
    /// Vertical gap between packed rows
    pub row_gap: u32,
    pub min_width: u32,
    pub corner_radius: f32,
    pub background: Rgba,
    pub border: Rgba,
    pub text_color: Rgba,
    /// Collision grid cell size in pixels
    pub cell_size: f32,
    /// Label center sits this far above the node
    pub offset_y: f32,
    /// Labels stay at least this far inside the viewport
    pub edge_margin: f32,
    /// Candidates further than this outside the viewport are skipped
    pub offscreen_margin: f32,
    pub dim_alpha: f32,
    /// Target grid cells per label for dense hash thinning
    pub cells_per_label: usize,
    /// Minimum time between hash stride changes
    pub stride_interval_ms: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            atlas_size: 2048,
            font_size: 12.0,
            row_height: 18,
            padding: 6,
            gap: 6,
            row_gap: 2,
            min_width: 8,
            corner_radius: 8.0,
            background: Rgba::rgb8(10, 10, 14, 0.92),
            border: Rgba::rgb8(255, 255, 255, 0.2),
            text_color: Rgba::WHITE,
            cell_size: 20.0,
            offset_y: 16.0,
            edge_margin: 8.0,
            offscreen_margin: 40.0,
            dim_alpha: 0.35,
            cells_per_label: 6,
            stride_interval_ms: 100.0,
        }
    }
}
