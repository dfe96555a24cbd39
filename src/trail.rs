//! History trail of previously shown graphs
//!
//! When the foreground tile is replaced, the outgoing graph is kept as a
//! faded snapshot underneath the new one, with a dashed connector from each
//! snapshot's center to the next newer center. At most two snapshots are kept.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::Camera;
use crate::color::Rgba;
use crate::tile::GraphTile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailConfig {
    pub max_entries: usize,
    /// Colors by age, newest first
    pub colors: Vec<Rgba>,
    /// Used when there are more entries than colors
    pub fallback_color: Rgba,
    /// Node alpha of the newest entry
    pub base_alpha: f32,
    /// Alpha lost per step of age
    pub alpha_step: f32,
    /// Fill alpha applied on top of the per-entry alpha
    pub node_fill_alpha: f32,
    pub edge_alpha: f32,
    pub edge_width_px: f32,
    /// Zoomed-out edge cap, mirroring foreground thinning
    pub edge_thin_cap: usize,
    pub min_radius_px: f32,
    pub radius_scale: f32,
    pub connector_width_px: f32,
    pub dash_on_px: f32,
    pub dash_off_px: f32,
    /// Nodes sampled when comparing two graphs
    pub sample_count: usize,
    /// Mean absolute coordinate delta below which graphs count as the same
    pub sample_epsilon: f32,
    /// Bounding box width/height tolerance for the same-graph test
    pub bbox_epsilon: f32,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            max_entries: 2,
            colors: vec![Rgba::rgb8(0x5e, 0xc8, 0xff, 1.0), Rgba::rgb8(0xff, 0x8a, 0xc2, 1.0)],
            fallback_color: Rgba::rgb8(0x88, 0x88, 0xaa, 1.0),
            base_alpha: 0.55,
            alpha_step: 0.15,
            node_fill_alpha: 0.6,
            edge_alpha: 0.33,
            edge_width_px: 1.5,
            edge_thin_cap: 1500,
            min_radius_px: 6.0,
            radius_scale: 0.7,
            connector_width_px: 3.0,
            dash_on_px: 8.0,
            dash_off_px: 6.0,
            sample_count: 64,
            sample_epsilon: 0.5,
            bbox_epsilon: 1.0,
        }
    }
}

/// Owned copy of a former foreground's geometry
#[derive(Debug, Clone, PartialEq)]
pub struct TrailSnapshot {
    pub positions: Vec<[f32; 2]>,
    pub sizes: Vec<f32>,
    pub alphas: Vec<f32>,
    pub edges: Vec<[u32; 2]>,
    /// Focus point of the source tile, else its node 0, else the origin
    pub center: [f32; 2],
    pub color: Rgba,
}

impl TrailSnapshot {
    pub fn from_tile(tile: &GraphTile) -> Self {
        Self {
            positions: tile.positions.clone(),
            sizes: tile.sizes.clone(),
            alphas: tile.alphas.clone(),
            edges: tile.edges.clone(),
            center: tile.focus_or_anchor(),
            color: Rgba::WHITE,
        }
    }

    /// Rebuild a foreground tile. Labels and metadata were never kept.
    pub fn to_tile(&self) -> GraphTile {
        let mut tile = GraphTile {
            positions: self.positions.clone(),
            sizes: self.sizes.clone(),
            alphas: self.alphas.clone(),
            edges: self.edges.clone(),
            focus_point: Some(self.center),
            ..Default::default()
        };
        tile.validate();
        tile
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

/// Snapshots of previous graphs, newest first
#[derive(Debug, Clone)]
pub struct Trail {
    config: TrailConfig,
    entries: Vec<TrailSnapshot>,
}

impl Trail {
    pub fn new(config: TrailConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    pub fn config(&self) -> &TrailConfig {
        &self.config
    }

    pub fn entries(&self) -> &[TrailSnapshot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Prepend a snapshot, drop the oldest beyond the limit and recolor
    pub fn push(&mut self, snapshot: TrailSnapshot) {
        self.entries.insert(0, snapshot);
        self.entries.truncate(self.config.max_entries);
        self.recolor();
    }

    /// Snapshot `previous` when switching to `next`, unless both are the same
    /// graph. Returns true when a snapshot was taken.
    pub fn record_swap(&mut self, previous: &GraphTile, next: &GraphTile) -> bool {
        if previous.is_empty() || is_same_graph(previous, next, &self.config) {
            debug!(nodes = previous.count(), "same graph, trail unchanged");
            return false;
        }
        self.push(TrailSnapshot::from_tile(previous));
        true
    }

    /// Remove and return the newest snapshot
    pub fn pop_newest(&mut self) -> Option<TrailSnapshot> {
        if self.entries.is_empty() {
            return None;
        }
        let newest = self.entries.remove(0);
        self.recolor();
        Some(newest)
    }

    /// Node alpha for the entry at `age` (0 is newest)
    pub fn alpha_for(&self, age: usize) -> f32 {
        (self.config.base_alpha - self.config.alpha_step * age as f32).clamp(0.0, 1.0)
    }

    /// Screen radius of a trail node
    pub fn radius_for(&self, size: f32, camera: &Camera) -> f32 {
        (size * camera.scale * self.config.radius_scale).max(self.config.min_radius_px)
    }

    fn recolor(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.color = self
                .config
                .colors
                .get(i)
                .copied()
                .unwrap_or(self.config.fallback_color);
        }
    }
}

/// Whether two tiles show the same graph, so swapping between them should not
/// grow the trail.
///
/// Compares node counts, the mean absolute coordinate delta over evenly
/// spaced samples, and the bounding box size.
pub fn is_same_graph(a: &GraphTile, b: &GraphTile, config: &TrailConfig) -> bool {
    let n = a.count();
    if n != b.count() {
        return false;
    }
    if n == 0 {
        return true;
    }
    let samples = config.sample_count.clamp(1, n);
    let mut total = 0.0f64;
    let mut counted = 0usize;
    for k in 0..samples {
        let i = k * n / samples;
        let ([ax, ay], [bx, by]) = (a.positions[i], b.positions[i]);
        let d = (ax - bx).abs() + (ay - by).abs();
        if d.is_finite() {
            total += d as f64;
            counted += 1;
        }
    }
    let mean = if counted == 0 { 0.0 } else { total / (2 * counted) as f64 };
    if mean >= config.sample_epsilon as f64 {
        return false;
    }
    let (ba, bb) = (a.bounds(), b.bounds());
    if ba.is_empty() || bb.is_empty() {
        return ba.is_empty() == bb.is_empty();
    }
    (ba.width() - bb.width()).abs() <= config.bbox_epsilon
        && (ba.height() - bb.height()).abs() <= config.bbox_epsilon
}
