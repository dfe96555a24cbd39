//! Backend-neutral display list
//!
//! The scene turns its state into a flat list of screen-space primitives in
//! paint order. Backends only have to know how to draw these; every decision
//! about what is visible was already made.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::canvas::Canvas;
use crate::color::Rgba;
use crate::edges::{EdgeConfig, thinning_step};
use crate::labels::AtlasEntry;
use crate::tile::CompareOverlay;
use crate::trail::Trail;

/// How foreground node markers are sized and decorated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStyle {
    /// Markers never shrink below this many pixels
    pub min_radius_px: f32,
    /// Screen radius is `size * radius_scale`, independent of zoom
    pub radius_scale: f32,
    pub dim_alpha: f32,
    pub outline: Rgba,
    pub outline_width_px: f32,
    pub selection_color: Rgba,
    pub selection_gap_px: f32,
    pub selection_width_px: f32,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            min_radius_px: 2.0,
            radius_scale: 1.0,
            dim_alpha: 0.35,
            outline: Rgba::rgb8(0, 0, 0, 0.35),
            outline_width_px: 1.0,
            selection_color: Rgba::rgb8(255, 255, 255, 0.85),
            selection_gap_px: 4.0,
            selection_width_px: 2.0,
        }
    }
}

impl NodeStyle {
    pub fn radius_px(&self, size: f32) -> f32 {
        (size * self.radius_scale).max(self.min_radius_px)
    }
}

/// Colors for the compare overlay bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub first: Rgba,
    pub second: Rgba,
    pub overlap_first: Rgba,
    pub overlap_second: Rgba,
    /// Inner band radius never drops below this many pixels
    pub min_radius_px: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            first: Rgba::rgb8(122, 110, 228, 0.30),
            second: Rgba::rgb8(122, 110, 228, 0.18),
            overlap_first: Rgba::rgb8(255, 195, 130, 0.26),
            overlap_second: Rgba::rgb8(255, 195, 130, 0.16),
            min_radius_px: 4.0,
        }
    }
}

/// A screen-space disk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    pub center: (f32, f32),
    pub radius: f32,
}

impl Disk {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        (x - self.center.0).hypot(y - self.center.1) <= self.radius
    }

    /// Inside the upper half (screen y grows downward)
    pub fn contains_upper(&self, x: f32, y: f32) -> bool {
        y <= self.center.1 && self.contains(x, y)
    }
}

/// One drawing primitive, in screen pixels
#[derive(Debug, Clone)]
pub enum DrawItem {
    /// Filled upper half of a disk
    HalfDisk { disk: Disk, color: Rgba },
    /// Intersection of two upper half-disks
    Lens { a: Disk, b: Disk, color: Rgba },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        color: Rgba,
    },
    DashedLine {
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        dash: (f32, f32),
        color: Rgba,
    },
    Circle {
        center: (f32, f32),
        radius: f32,
        fill: Rgba,
        outline: Option<(Rgba, f32)>,
    },
    /// Circular thumbnail drawn over a node marker
    Avatar {
        node: usize,
        center: (f32, f32),
        radius: f32,
        image: Arc<Canvas>,
    },
    /// A rectangle of the label atlas, top-left at `origin`
    AtlasQuad {
        origin: (f32, f32),
        entry: AtlasEntry,
        alpha: f32,
    },
}

impl DrawItem {
    /// Items sampled from the label atlas are batched after everything else
    pub fn uses_atlas(&self) -> bool {
        matches!(self, DrawItem::AtlasQuad { .. })
    }
}

/// Counters for one built frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub nodes: usize,
    pub edges: usize,
    pub labels: usize,
    pub avatars: usize,
    pub trail_entries: usize,
}

/// Everything one frame draws, in paint order
#[derive(Debug, Clone)]
pub struct FrameList {
    pub width: u32,
    pub height: u32,
    pub background: Rgba,
    pub items: Vec<DrawItem>,
    pub stats: FrameStats,
}

impl FrameList {
    pub fn new(width: u32, height: u32, background: Rgba) -> Self {
        Self {
            width,
            height,
            background,
            items: Vec::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn push(&mut self, item: DrawItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Trail snapshots, oldest first so newer history paints over older.
///
/// Each snapshot draws its edges and flat node circles, then a dashed
/// connector to the next newer center (the live foreground's for the newest).
pub fn push_trail(
    frame: &mut FrameList,
    trail: &Trail,
    camera: &Camera,
    foreground_center: Option<[f32; 2]>,
    edges: &EdgeConfig,
) {
    let cfg = trail.config();
    let entries = trail.entries();
    for (age, entry) in entries.iter().enumerate().rev() {
        let alpha = trail.alpha_for(age);
        let project = |[x, y]: [f32; 2]| camera.world_to_screen(x, y);

        let edge_cap = EdgeConfig {
            thin_threshold: cfg.edge_thin_cap,
            thin_cap: cfg.edge_thin_cap,
            ..edges.clone()
        };
        let (step, cap) = thinning_step(entry.edges.len(), usize::MAX, camera.scale, &edge_cap);
        let edge_color = entry.color.with_alpha(cfg.edge_alpha);
        for &[s, t] in entry.edges.iter().step_by(step).take(cap) {
            let (Some(&a), Some(&b)) = (entry.positions.get(s as usize), entry.positions.get(t as usize)) else {
                continue;
            };
            frame.push(DrawItem::Line {
                from: project(a),
                to: project(b),
                width: cfg.edge_width_px,
                color: edge_color,
            });
        }

        let fill = entry.color.with_alpha(cfg.node_fill_alpha * alpha);
        for (i, &p) in entry.positions.iter().enumerate() {
            if !(p[0].is_finite() && p[1].is_finite()) {
                continue;
            }
            let size = entry.sizes.get(i).copied().unwrap_or(crate::tile::NODE_SIZE);
            frame.push(DrawItem::Circle {
                center: project(p),
                radius: trail.radius_for(size, camera),
                fill,
                outline: None,
            });
        }

        let next = if age == 0 {
            foreground_center
        } else {
            entries.get(age - 1).map(|e| e.center)
        };
        if let Some(next) = next {
            frame.push(DrawItem::DashedLine {
                from: project(entry.center),
                to: project(next),
                width: cfg.connector_width_px,
                dash: (cfg.dash_on_px, cfg.dash_off_px),
                color: entry.color,
            });
        }
        frame.stats.trail_entries += 1;
    }
}

/// Compare-mode bands: both sides' outer then inner half-disks, then the
/// overlap lenses. Drawn only when both sides are present.
pub fn push_compare_overlay(frame: &mut FrameList, overlay: &CompareOverlay, camera: &Camera, style: &OverlayStyle) {
    let (Some(left), Some(right)) = (&overlay.regions.left, &overlay.regions.right) else {
        return;
    };
    let disks = |r: &crate::tile::RingRegion| {
        let center = camera.world_to_screen(r.cx, r.cy);
        let inner = (r.r1 * camera.scale).max(style.min_radius_px);
        let outer = (r.r2 * camera.scale).max(inner + 1.0);
        (Disk { center, radius: inner }, Disk { center, radius: outer })
    };
    let (left_inner, left_outer) = disks(left);
    let (right_inner, right_outer) = disks(right);

    for (inner, outer) in [(left_inner, left_outer), (right_inner, right_outer)] {
        frame.push(DrawItem::HalfDisk {
            disk: outer,
            color: style.second,
        });
        frame.push(DrawItem::HalfDisk {
            disk: inner,
            color: style.first,
        });
    }
    frame.push(DrawItem::Lens {
        a: left_inner,
        b: right_inner,
        color: style.overlap_first,
    });
    frame.push(DrawItem::Lens {
        a: left_outer,
        b: right_outer,
        color: style.overlap_second,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{CompareRegions, GraphTile, RingRegion};
    use crate::trail::{TrailConfig, TrailSnapshot};

    fn frame() -> FrameList {
        FrameList::new(800, 600, Rgba::rgb8(0, 0, 0, 1.0))
    }

    #[test]
    fn node_radius_is_zoom_independent_with_floor() {
        let style = NodeStyle::default();
        assert_eq!(style.radius_px(12.0), 12.0);
        assert_eq!(style.radius_px(0.5), 2.0);
    }

    #[test]
    fn trail_paints_oldest_first_with_connectors() {
        let mut trail = Trail::new(TrailConfig::default());
        let older = GraphTile::new(vec![[0.0, 0.0], [10.0, 0.0]]).with_edges(vec![[0, 1]]);
        let newer = GraphTile::new(vec![[50.0, 0.0]]);
        trail.push(TrailSnapshot::from_tile(&older));
        trail.push(TrailSnapshot::from_tile(&newer));

        let mut f = frame();
        push_trail(&mut f, &trail, &Camera::default(), Some([100.0, 0.0]), &EdgeConfig::default());
        assert_eq!(f.stats.trail_entries, 2);

        // older: 1 edge + 2 circles + connector, newer: 1 circle + connector
        assert_eq!(f.len(), 6);
        assert!(matches!(f.items[0], DrawItem::Line { .. }));
        match &f.items[3] {
            DrawItem::DashedLine { from, to, width, .. } => {
                assert_eq!(*from, (0.0, 0.0));
                assert_eq!(*to, (50.0, 0.0));
                assert_eq!(*width, 3.0);
            }
            other => panic!("expected connector, got {other:?}"),
        }
        match &f.items[5] {
            DrawItem::DashedLine { to, .. } => assert_eq!(*to, (100.0, 0.0)),
            other => panic!("expected connector, got {other:?}"),
        }
    }

    #[test]
    fn trail_circles_use_minimum_radius() {
        let mut trail = Trail::new(TrailConfig::default());
        trail.push(TrailSnapshot::from_tile(&GraphTile::new(vec![[0.0, 0.0]]).with_sizes(vec![1.0])));
        let mut f = frame();
        push_trail(&mut f, &trail, &Camera::default(), None, &EdgeConfig::default());
        match &f.items[0] {
            DrawItem::Circle { radius, fill, .. } => {
                assert_eq!(*radius, 6.0);
                assert!((fill.a - 0.6 * 0.55).abs() < 1e-5);
            }
            other => panic!("expected circle, got {other:?}"),
        }
        // No foreground center means no connector
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn overlay_needs_both_sides() {
        let ring = RingRegion {
            cx: 0.0,
            cy: 0.0,
            r1: 100.0,
            r2: 200.0,
        };
        let mut overlay = CompareOverlay {
            regions: CompareRegions {
                left: Some(ring),
                right: None,
                overlap: None,
            },
        };
        let mut f = frame();
        push_compare_overlay(&mut f, &overlay, &Camera::default(), &OverlayStyle::default());
        assert!(f.is_empty());

        overlay.regions.right = Some(RingRegion { cx: 150.0, ..ring });
        push_compare_overlay(&mut f, &overlay, &Camera::default(), &OverlayStyle::default());
        assert_eq!(f.len(), 6);
        assert!(matches!(f.items[4], DrawItem::Lens { .. }));
    }

    #[test]
    fn overlay_radii_keep_band_width() {
        let overlay = CompareOverlay {
            regions: CompareRegions {
                left: Some(RingRegion {
                    cx: 0.0,
                    cy: 0.0,
                    r1: 1.0,
                    r2: 1.0,
                }),
                right: Some(RingRegion {
                    cx: 0.0,
                    cy: 0.0,
                    r1: 1.0,
                    r2: 1.0,
                }),
                overlap: None,
            },
        };
        let mut f = frame();
        push_compare_overlay(&mut f, &overlay, &Camera::default(), &OverlayStyle::default());
        match (&f.items[0], &f.items[1]) {
            (DrawItem::HalfDisk { disk: outer, .. }, DrawItem::HalfDisk { disk: inner, .. }) => {
                assert_eq!(inner.radius, 4.0);
                assert_eq!(outer.radius, 5.0);
            }
            other => panic!("unexpected items {other:?}"),
        }
    }

    #[test]
    fn disk_upper_half_excludes_below_center() {
        let d = Disk {
            center: (10.0, 10.0),
            radius: 5.0,
        };
        assert!(d.contains_upper(10.0, 7.0));
        assert!(!d.contains_upper(10.0, 12.0));
        assert!(d.contains(10.0, 12.0));
    }
}
