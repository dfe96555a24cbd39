//! Pointer hit-testing against labels, compare regions and nodes

use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::host::{NodeMask, Region};
use crate::labels::LabelRecord;
use crate::tile::{CompareOverlay, GraphTile, RingRegion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickConfig {
    /// Smallest hit radius in screen pixels
    pub min_radius_px: f32,
    /// Hit radius grows as `size * size_factor` pixels
    pub size_factor: f32,
    /// Extra slack added to every node radius
    pub tolerance_px: f32,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            min_radius_px: 7.0,
            size_factor: 2.0,
            tolerance_px: 4.0,
        }
    }
}

/// What a pointer-down landed on, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickTarget {
    Label(usize),
    Region(Region),
    Node(usize),
    Empty,
}

/// Topmost node under the screen point, searching back to front.
///
/// The hit radius is fixed in screen pixels so small nodes stay clickable at
/// any zoom.
pub fn pick_node(
    tile: &GraphTile,
    camera: &Camera,
    screen: (f32, f32),
    mask: &NodeMask<'_>,
    config: &PickConfig,
) -> Option<usize> {
    let (wx, wy) = camera.screen_to_world(screen.0, screen.1);
    if !(wx.is_finite() && wy.is_finite()) {
        return None;
    }
    (0..tile.count()).rev().find(|&i| {
        if mask.is_hidden(i) {
            return false;
        }
        let [x, y] = tile.positions[i];
        let radius_px = (tile.size(i) * config.size_factor).max(config.min_radius_px) + config.tolerance_px;
        let radius = radius_px / camera.scale;
        let (dx, dy) = (wx - x, wy - y);
        dx * dx + dy * dy <= radius * radius
    })
}

/// Node whose label box contains the screen point, topmost first
pub fn pick_label(labels: &[LabelRecord], screen: (f32, f32)) -> Option<usize> {
    labels
        .iter()
        .rev()
        .find(|r| r.contains(screen.0, screen.1))
        .map(|r| r.node_index)
}

/// Whether the screen point lies in the upper half-ring of `region`
pub fn in_region(region: &RingRegion, camera: &Camera, screen: (f32, f32)) -> bool {
    let (cx, cy) = camera.world_to_screen(region.cx, region.cy);
    let (px, py) = screen;
    let d = (px - cx).hypot(py - cy);
    let r_in = (region.r1 * camera.scale).max(0.0);
    let r_out = (region.r2 * camera.scale).max(r_in + 1.0);
    py <= cy + 1.0 && d >= r_in && d <= r_out
}

/// Compare-region hit: overlap first, then left-only, then right-only
pub fn hit_region(overlay: &CompareOverlay, camera: &Camera, screen: (f32, f32)) -> Option<Region> {
    let regions = &overlay.regions;
    let hit = |r: &Option<RingRegion>| r.as_ref().is_some_and(|r| in_region(r, camera, screen));
    let (left, right) = (hit(&regions.left), hit(&regions.right));
    if hit(&regions.overlap) {
        Some(Region::Overlap)
    } else if left && !right {
        Some(Region::Left)
    } else if right && !left {
        Some(Region::Right)
    } else {
        None
    }
}

/// Resolve a pointer-down: label, then region, then node
pub fn resolve_pointer(
    tile: &GraphTile,
    camera: &Camera,
    labels: &[LabelRecord],
    screen: (f32, f32),
    mask: &NodeMask<'_>,
    config: &PickConfig,
) -> PickTarget {
    if let Some(index) = pick_label(labels, screen) {
        return PickTarget::Label(index);
    }
    if let Some(region) = tile
        .compare_overlay
        .as_ref()
        .and_then(|o| hit_region(o, camera, screen))
    {
        return PickTarget::Region(region);
    }
    match pick_node(tile, camera, screen, mask, config) {
        Some(index) => PickTarget::Node(index),
        None => PickTarget::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostProps, MaskMode};
    use crate::tile::CompareRegions;

    fn cam(scale: f32) -> Camera {
        Camera {
            scale,
            translate_x: 400.0,
            translate_y: 300.0,
        }
    }

    fn tile() -> GraphTile {
        GraphTile::new(vec![[0.0, 0.0], [100.0, 0.0]]).with_sizes(vec![12.0, 2.0])
    }

    // ========== Node Tests ==========

    #[test]
    fn exact_center_picks_node() {
        let t = tile();
        let cfg = PickConfig::default();
        let mask = NodeMask::all_visible();
        assert_eq!(pick_node(&t, &cam(1.0), (400.0, 300.0), &mask, &cfg), Some(0));
        assert_eq!(pick_node(&t, &cam(2.0), (600.0, 300.0), &mask, &cfg), Some(1));
    }

    #[test]
    fn radius_is_fixed_in_screen_pixels() {
        let t = tile();
        let cfg = PickConfig::default();
        let mask = NodeMask::all_visible();
        // node 1: max(7, 4) + 4 = 11px at any zoom
        for scale in [0.5, 1.0, 3.0] {
            let (sx, sy) = cam(scale).world_to_screen(100.0, 0.0);
            assert_eq!(pick_node(&t, &cam(scale), (sx + 10.9, sy), &mask, &cfg), Some(1));
            assert_eq!(pick_node(&t, &cam(scale), (sx + 11.2, sy), &mask, &cfg), None);
        }
    }

    #[test]
    fn large_nodes_get_larger_radius() {
        // node 0: 12 * 2 + 4 = 28px
        let t = tile();
        let mask = NodeMask::all_visible();
        let cfg = PickConfig::default();
        assert_eq!(pick_node(&t, &cam(1.0), (427.0, 300.0), &mask, &cfg), Some(0));
        assert_eq!(pick_node(&t, &cam(1.0), (429.0, 300.0), &mask, &cfg), None);
    }

    #[test]
    fn later_nodes_win_overlaps_and_hidden_are_skipped() {
        let t = GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0]]);
        let cfg = PickConfig::default();
        assert_eq!(
            pick_node(&t, &cam(1.0), (400.0, 300.0), &NodeMask::all_visible(), &cfg),
            Some(1)
        );
        let props = HostProps {
            visibility_mask: Some(vec![true, false]),
            ..Default::default()
        };
        assert_eq!(pick_node(&t, &cam(1.0), (400.0, 300.0), &props.mask(2), &cfg), Some(0));
    }

    #[test]
    fn dimmed_nodes_are_still_picked() {
        let t = GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0]]);
        let cfg = PickConfig::default();
        let props = HostProps {
            visibility_mask: Some(vec![true, false]),
            mask_mode: MaskMode::Dim,
            ..Default::default()
        };
        assert_eq!(pick_node(&t, &cam(1.0), (400.0, 300.0), &props.mask(2), &cfg), Some(1));
    }

    // ========== Region Tests ==========

    fn overlay() -> CompareOverlay {
        let ring = |cx| RingRegion {
            cx,
            cy: 0.0,
            r1: 100.0,
            r2: 200.0,
        };
        CompareOverlay {
            regions: CompareRegions {
                left: Some(ring(-150.0)),
                right: Some(ring(150.0)),
                overlap: Some(RingRegion {
                    cx: 0.0,
                    cy: -200.0,
                    r1: 0.0,
                    r2: 20.0,
                }),
            },
        }
    }

    #[test]
    fn region_hit_requires_top_half_band() {
        let c = cam(1.0);
        let left = overlay().regions.left.unwrap();
        assert!(in_region(&left, &c, (400.0 - 150.0, 300.0 - 150.0)));
        // inside r1
        assert!(!in_region(&left, &c, (400.0 - 150.0, 300.0 - 50.0)));
        // bottom half
        assert!(!in_region(&left, &c, (400.0 - 150.0, 300.0 + 150.0)));
        // the center row still counts as top half
        assert!(in_region(&left, &c, (400.0 - 300.0, 301.0)));
    }

    #[test]
    fn region_priority_is_overlap_then_exclusive_sides() {
        let c = cam(1.0);
        let ov = overlay();
        // Overlap disc
        assert_eq!(hit_region(&ov, &c, (400.0, 100.0)), Some(Region::Overlap));
        // Left band only
        assert_eq!(hit_region(&ov, &c, (400.0 - 300.0, 299.0)), Some(Region::Left));
        assert_eq!(hit_region(&ov, &c, (400.0 + 300.0, 299.0)), Some(Region::Right));
        // In both bands but not the overlap disc: no hit
        assert_eq!(hit_region(&ov, &c, (400.0, 300.0 - 120.0)), None);
    }

    // ========== Resolution Tests ==========

    #[test]
    fn labels_take_precedence_over_nodes() {
        let t = tile();
        let label = LabelRecord {
            node_index: 1,
            screen_x: 400.0,
            screen_y: 300.0,
            width: 40.0,
            height: 18.0,
            alpha: 1.0,
        };
        let cfg = PickConfig::default();
        let mask = NodeMask::all_visible();
        let c = cam(1.0);
        assert_eq!(resolve_pointer(&t, &c, &[label], (400.0, 300.0), &mask, &cfg), PickTarget::Label(1));
        assert_eq!(resolve_pointer(&t, &c, &[], (400.0, 300.0), &mask, &cfg), PickTarget::Node(0));
        assert_eq!(resolve_pointer(&t, &c, &[], (10.0, 10.0), &mask, &cfg), PickTarget::Empty);
    }

    #[test]
    fn regions_take_precedence_over_nodes() {
        let t = tile().with_compare_overlay(overlay());
        let c = cam(1.0);
        let target = resolve_pointer(&t, &c, &[], (400.0, 100.0), &NodeMask::all_visible(), &PickConfig::default());
        assert_eq!(target, PickTarget::Region(Region::Overlap));
    }
}
