//! Edge selection, thinning and color channels
//!
//! Builds the per-frame list of screen-space edge segments. The budget caps
//! how many are emitted; zoom decides how aggressively they are sub-sampled;
//! offscreen and sub-pixel segments are culled. Each segment is assigned a
//! color channel from its endpoint groups so left, right and bridge cohorts
//! stay visually separate.

use serde::{Deserialize, Serialize};

use crate::camera::{Camera, Viewport};
use crate::color::Rgba;
use crate::host::{DegreeHighlight, NodeMask};
use crate::tile::GraphTile;

/// Tuning for edge thinning and culling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Below this zoom large edge sets are sub-sampled to `thin_cap`
    pub thin_zoom: f32,
    /// Edge count above which zoomed-out thinning applies
    pub thin_threshold: usize,
    pub thin_cap: usize,
    /// Offscreen margin in pixels
    pub cull_margin_px: f32,
    /// Segments shorter than this on screen are dropped
    pub min_screen_length_px: f32,
    /// Weight pills are drawn only at or above this zoom
    pub score_min_zoom: f32,
    pub max_score_pills: usize,
    pub line_width_px: f32,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            thin_zoom: 0.8,
            thin_threshold: 3000,
            thin_cap: 3000,
            cull_margin_px: 8.0,
            min_screen_length_px: 1.0,
            score_min_zoom: 1.0,
            max_score_pills: 200,
            line_width_px: 1.0,
        }
    }
}

/// Color channel of an edge, chosen from its endpoint groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeChannel {
    /// Between the left cohort (0) and the bridge cohort (1)
    Left,
    /// Between the right cohort (2) and the bridge cohort (1)
    Right,
    /// Within the bridge cohort
    Bridge,
    Default,
}

impl EdgeChannel {
    pub fn classify(group_a: u16, group_b: u16) -> Self {
        match (group_a.min(group_b), group_a.max(group_b)) {
            (0, 1) => EdgeChannel::Left,
            (1, 2) => EdgeChannel::Right,
            (1, 1) => EdgeChannel::Bridge,
            _ => EdgeChannel::Default,
        }
    }

    pub fn color(self) -> Rgba {
        match self {
            EdgeChannel::Left => Rgba::rgb8(243, 93, 143, 0.45),
            EdgeChannel::Right => Rgba::rgb8(74, 215, 209, 0.45),
            EdgeChannel::Bridge => Rgba::rgb8(255, 211, 105, 0.40),
            EdgeChannel::Default => Rgba::rgb8(186, 188, 198, 0.35),
        }
    }
}

/// Node fill color by group
pub fn node_color(group: u16) -> Rgba {
    match group {
        0 => Rgba::rgb8(0xf3, 0x5d, 0x8f, 1.0),
        1 => Rgba::rgb8(0xff, 0xd3, 0x69, 1.0),
        2 => Rgba::rgb8(0x4a, 0xd7, 0xd1, 1.0),
        _ => Rgba::rgb8(0xdb, 0xe6, 0xff, 1.0),
    }
}

/// Sub-sampling step and emission cap for `edge_count` edges.
///
/// Zoomed out with many edges, the step targets a fixed cap; otherwise it
/// spreads the budget evenly across the edge list.
pub fn thinning_step(edge_count: usize, max_edges: usize, zoom: f32, config: &EdgeConfig) -> (usize, usize) {
    let cap = max_edges.min(edge_count);
    if cap == 0 {
        return (1, 0);
    }
    let step = if zoom < config.thin_zoom && edge_count > config.thin_threshold {
        edge_count.div_ceil(cap.min(config.thin_cap))
    } else {
        (edge_count / cap).max(1)
    };
    (step, cap)
}

/// A drawable edge in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSegment {
    /// Index into the tile's edge list
    pub edge: usize,
    pub from: (f32, f32),
    pub to: (f32, f32),
    pub channel: EdgeChannel,
    /// Present when the tile carries weights
    pub weight: Option<f32>,
}

impl EdgeSegment {
    pub fn midpoint(&self) -> (f32, f32) {
        (
            (self.from.0 + self.to.0) / 2.0,
            (self.from.1 + self.to.1) / 2.0,
        )
    }

    pub fn screen_length(&self) -> f32 {
        (self.to.0 - self.from.0).hypot(self.to.1 - self.from.1)
    }
}

/// Per-frame inputs for [`select_edges`]
#[derive(Debug, Clone, Copy)]
pub struct EdgeQuery<'a> {
    pub tile: &'a GraphTile,
    pub camera: Camera,
    pub viewport: Viewport,
    pub max_edges: usize,
    pub mask: NodeMask<'a>,
    pub degree: DegreeHighlight,
}

/// Build the frame's edge segments under the budget.
pub fn select_edges(query: &EdgeQuery<'_>, config: &EdgeConfig) -> Vec<EdgeSegment> {
    let tile = query.tile;
    let edge_count = tile.edges.len();
    let (step, cap) = thinning_step(edge_count, query.max_edges, query.camera.scale, config);
    let degree = if tile.is_person_mode() {
        query.degree
    } else {
        DegreeHighlight::All
    };
    let margin = config.cull_margin_px;
    let (w, h) = (query.viewport.width, query.viewport.height);

    let mut segments = Vec::with_capacity(cap.min(edge_count / step + 1));
    let mut i = 0;
    while i < edge_count && segments.len() < cap {
        let edge = i;
        i += step;

        let [s, t] = tile.edges[edge];
        let (s, t) = (s as usize, t as usize);
        if query.mask.is_hidden(s) || query.mask.is_hidden(t) {
            continue;
        }
        let touches_center = s == 0 || t == 0;
        match degree {
            DegreeHighlight::First if !touches_center => continue,
            DegreeHighlight::Second if touches_center => continue,
            _ => {}
        }

        let (Some([sx, sy]), Some([tx, ty])) = (tile.position(s), tile.position(t)) else {
            continue;
        };
        let from = query.camera.world_to_screen(sx, sy);
        let to = query.camera.world_to_screen(tx, ty);
        if (from.0 < -margin && to.0 < -margin)
            || (from.0 > w + margin && to.0 > w + margin)
            || (from.1 < -margin && to.1 < -margin)
            || (from.1 > h + margin && to.1 > h + margin)
        {
            continue;
        }
        let segment = EdgeSegment {
            edge,
            from,
            to,
            channel: EdgeChannel::classify(tile.group(s), tile.group(t)),
            weight: tile.edge_weight(edge),
        };
        let length = segment.screen_length();
        if !length.is_finite() || length < config.min_screen_length_px {
            continue;
        }
        segments.push(segment);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostProps, MaskMode};
    use crate::tile::TileMode;

    fn identity_query<'a>(tile: &'a GraphTile, max_edges: usize) -> EdgeQuery<'a> {
        EdgeQuery {
            tile,
            camera: Camera::default(),
            viewport: Viewport::new(1000.0, 1000.0),
            max_edges,
            mask: NodeMask::all_visible(),
            degree: DegreeHighlight::All,
        }
    }

    fn star(n: usize) -> GraphTile {
        let positions = (0..n)
            .map(|i| [100.0 + (i % 30) as f32 * 25.0, 100.0 + (i / 30) as f32 * 25.0])
            .collect();
        let edges = (1..n as u32).map(|i| [0, i]).collect();
        GraphTile::new(positions).with_edges(edges)
    }

    // ========== Thinning Tests ==========

    #[test]
    fn thinning_spreads_budget_when_zoomed_in() {
        let cfg = EdgeConfig::default();
        assert_eq!(thinning_step(10_000, 8000, 1.0, &cfg), (1, 8000));
        assert_eq!(thinning_step(20_000, 5000, 1.0, &cfg), (4, 5000));
        assert_eq!(thinning_step(100, 8000, 1.0, &cfg), (1, 100));
    }

    #[test]
    fn thinning_targets_fixed_cap_when_zoomed_out() {
        let cfg = EdgeConfig::default();
        assert_eq!(thinning_step(30_000, 8000, 0.5, &cfg), (10, 8000));
        // Small edge sets are not thinned even when zoomed out
        assert_eq!(thinning_step(2000, 8000, 0.1, &cfg), (1, 2000));
    }

    #[test]
    fn thinning_handles_empty_budget() {
        assert_eq!(thinning_step(0, 8000, 1.0, &EdgeConfig::default()), (1, 0));
    }

    // ========== Channel Tests ==========

    #[test]
    fn channels_follow_group_pairs_in_either_order() {
        assert_eq!(EdgeChannel::classify(0, 1), EdgeChannel::Left);
        assert_eq!(EdgeChannel::classify(1, 0), EdgeChannel::Left);
        assert_eq!(EdgeChannel::classify(2, 1), EdgeChannel::Right);
        assert_eq!(EdgeChannel::classify(1, 1), EdgeChannel::Bridge);
        assert_eq!(EdgeChannel::classify(0, 2), EdgeChannel::Default);
        assert_eq!(EdgeChannel::classify(0, 0), EdgeChannel::Default);
    }

    #[test]
    fn channel_colors_are_translucent() {
        assert_eq!(EdgeChannel::Left.color().to_rgba8()[..3], [243, 93, 143]);
        assert!((EdgeChannel::Bridge.color().a - 0.40).abs() < 1e-6);
    }

    // ========== Selection Tests ==========

    #[test]
    fn select_respects_cap() {
        let tile = star(200);
        let segments = select_edges(&identity_query(&tile, 50), &EdgeConfig::default());
        assert_eq!(segments.len(), 50);
    }

    #[test]
    fn select_culls_offscreen_and_short_segments() {
        let tile = GraphTile::new(vec![
            [10.0, 10.0],
            [-500.0, 10.0],
            [-600.0, 20.0],
            [10.3, 10.3],
            [900.0, 900.0],
        ])
        .with_edges(vec![[1, 2], [0, 3], [0, 4]]);
        let segments = select_edges(&identity_query(&tile, 100), &EdgeConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].edge, 2);
    }

    #[test]
    fn select_keeps_segments_crossing_the_viewport() {
        let tile = GraphTile::new(vec![[-500.0, 500.0], [1500.0, 500.0]]).with_edges(vec![[0, 1]]);
        let segments = select_edges(&identity_query(&tile, 100), &EdgeConfig::default());
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn hidden_endpoints_drop_edges_but_dimmed_do_not() {
        let tile = star(4);
        let hidden = HostProps {
            visibility_mask: Some(vec![true, false, true, true]),
            ..Default::default()
        };
        let dimmed = HostProps {
            mask_mode: MaskMode::Dim,
            ..hidden.clone()
        };
        let mut query = identity_query(&tile, 100);
        query.mask = hidden.mask(4);
        let segments = select_edges(&query, &EdgeConfig::default());
        assert_eq!(segments.iter().map(|s| s.edge).collect::<Vec<_>>(), vec![1, 2]);

        query.mask = dimmed.mask(4);
        assert_eq!(select_edges(&query, &EdgeConfig::default()).len(), 3);
    }

    #[test]
    fn degree_highlight_applies_only_in_person_mode() {
        let tile = GraphTile::new(vec![[100.0, 100.0], [200.0, 100.0], [300.0, 100.0]])
            .with_edges(vec![[0, 1], [1, 2]]);
        let mut query = identity_query(&tile, 100);
        query.degree = DegreeHighlight::First;
        assert_eq!(select_edges(&query, &EdgeConfig::default()).len(), 2);

        let person = tile.clone().with_mode(TileMode::PersonEgo);
        let mut query = identity_query(&person, 100);
        query.degree = DegreeHighlight::First;
        let first = select_edges(&query, &EdgeConfig::default());
        assert_eq!(first.iter().map(|s| s.edge).collect::<Vec<_>>(), vec![0]);

        query.degree = DegreeHighlight::Second;
        let second = select_edges(&query, &EdgeConfig::default());
        assert_eq!(second.iter().map(|s| s.edge).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn segments_carry_weights_and_channels() {
        let tile = GraphTile::new(vec![[100.0, 100.0], [200.0, 100.0]])
            .with_groups(vec![2, 1])
            .with_edges(vec![[0, 1]])
            .with_edge_weights(vec![42.0]);
        let segments = select_edges(&identity_query(&tile, 100), &EdgeConfig::default());
        assert_eq!(segments[0].weight, Some(42.0));
        assert_eq!(segments[0].channel, EdgeChannel::Right);
        assert_eq!(segments[0].midpoint(), (150.0, 100.0));
    }
}
