//! Deterministic re-layouts of the foreground graph
//!
//! Four fixed layouts computed from the tile's edges. Breadth-first layouts
//! grow from node 0; nodes it cannot reach are parked on one extra ring (or
//! layer) beyond the outermost.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::animation::{Tween, clamp_duration, ease_in_out_quad, lerp};
use crate::error::SceneError;
use crate::tile::GraphTile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Grid,
    Radial,
    Hierarchy,
    Concentric,
}

impl LayoutMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutMode::Grid => "grid",
            LayoutMode::Radial => "radial",
            LayoutMode::Hierarchy => "hierarchy",
            LayoutMode::Concentric => "concentric",
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutMode {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(LayoutMode::Grid),
            "radial" => Ok(LayoutMode::Radial),
            "hierarchy" => Ok(LayoutMode::Hierarchy),
            "concentric" => Ok(LayoutMode::Concentric),
            other => Err(SceneError::Config(format!("unknown layout mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub grid_spacing: f32,
    pub ring_spacing: f32,
    pub layer_spacing: f32,
    pub sibling_spacing: f32,
    /// Node capacity of each concentric ring; the last ring is unbounded
    pub concentric_capacities: Vec<usize>,
    pub default_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_spacing: 60.0,
            ring_spacing: 140.0,
            layer_spacing: 120.0,
            sibling_spacing: 80.0,
            concentric_capacities: vec![12, 36],
            default_duration_ms: 600.0,
            min_duration_ms: 120.0,
            max_duration_ms: 1200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReshapeOptions {
    pub animate: bool,
    pub duration_ms: Option<f64>,
}

/// Target positions for every node of `tile` under `mode`
pub fn compute_layout(tile: &GraphTile, mode: LayoutMode, config: &LayoutConfig) -> Vec<[f32; 2]> {
    let n = tile.count();
    if n == 0 {
        return Vec::new();
    }
    match mode {
        LayoutMode::Grid => grid(n, config.grid_spacing),
        LayoutMode::Radial => radial(&bfs_depths(tile), config.ring_spacing),
        LayoutMode::Hierarchy => hierarchy(&bfs_depths(tile), config),
        LayoutMode::Concentric => concentric(n, config),
    }
}

/// Hop distance from node 0, `None` when unreachable
fn bfs_depths(tile: &GraphTile) -> Vec<Option<usize>> {
    let adjacency = tile.adjacency();
    let mut depth = vec![None; tile.count()];
    let mut queue = VecDeque::new();
    depth[0] = Some(0);
    queue.push_back(0);
    while let Some(node) = queue.pop_front() {
        let next = depth[node].map_or(0, |d| d + 1);
        for &neighbor in &adjacency[node] {
            if depth[neighbor].is_none() {
                depth[neighbor] = Some(next);
                queue.push_back(neighbor);
            }
        }
    }
    depth
}

/// Group node indices by depth; unreachable nodes form one extra group
fn group_by_depth(depths: &[Option<usize>]) -> Vec<Vec<usize>> {
    let max_depth = depths.iter().flatten().copied().max().unwrap_or(0);
    let mut groups = vec![Vec::new(); max_depth + 1];
    let mut unreachable = Vec::new();
    for (i, d) in depths.iter().enumerate() {
        match d {
            Some(d) => groups[*d].push(i),
            None => unreachable.push(i),
        }
    }
    if !unreachable.is_empty() {
        groups.push(unreachable);
    }
    groups
}

fn grid(n: usize, spacing: f32) -> Vec<[f32; 2]> {
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let x_mid = (cols - 1) as f32 / 2.0;
    let y_mid = (rows - 1) as f32 / 2.0;
    (0..n)
        .map(|i| {
            let (row, col) = (i / cols, i % cols);
            [(col as f32 - x_mid) * spacing, (row as f32 - y_mid) * spacing]
        })
        .collect()
}

fn ring_positions(out: &mut [[f32; 2]], members: &[usize], radius: f32) {
    let count = members.len().max(1) as f32;
    for (k, &i) in members.iter().enumerate() {
        let angle = TAU * k as f32 / count;
        out[i] = [radius * angle.cos(), radius * angle.sin()];
    }
}

fn radial(depths: &[Option<usize>], spacing: f32) -> Vec<[f32; 2]> {
    let mut out = vec![[0.0, 0.0]; depths.len()];
    for (ring, members) in group_by_depth(depths).iter().enumerate() {
        ring_positions(&mut out, members, ring as f32 * spacing);
    }
    out
}

fn hierarchy(depths: &[Option<usize>], config: &LayoutConfig) -> Vec<[f32; 2]> {
    let mut out = vec![[0.0, 0.0]; depths.len()];
    for (layer, members) in group_by_depth(depths).iter().enumerate() {
        let mid = (members.len() as f32 - 1.0) / 2.0;
        for (k, &i) in members.iter().enumerate() {
            out[i] = [
                (k as f32 - mid) * config.sibling_spacing,
                layer as f32 * config.layer_spacing,
            ];
        }
    }
    out
}

fn concentric(n: usize, config: &LayoutConfig) -> Vec<[f32; 2]> {
    let mut out = vec![[0.0, 0.0]; n];
    let mut next = 1;
    let mut ring = 0;
    while next < n {
        let capacity = config
            .concentric_capacities
            .get(ring)
            .copied()
            .filter(|&c| c > 0)
            .unwrap_or(n - next);
        let end = (next + capacity).min(n);
        let members: Vec<usize> = (next..end).collect();
        ring_positions(&mut out, &members, (ring + 1) as f32 * config.ring_spacing);
        next = end;
        ring += 1;
    }
    out
}

/// An in-progress animated reshape
#[derive(Debug, Clone)]
pub struct LayoutTransition {
    mode: LayoutMode,
    from: Vec<[f32; 2]>,
    to: Vec<[f32; 2]>,
    tween: Tween,
}

impl LayoutTransition {
    pub fn new(
        mode: LayoutMode,
        from: Vec<[f32; 2]>,
        to: Vec<[f32; 2]>,
        duration_ms: Option<f64>,
        config: &LayoutConfig,
    ) -> Self {
        let duration = clamp_duration(
            duration_ms,
            config.default_duration_ms,
            config.min_duration_ms,
            config.max_duration_ms,
        );
        Self {
            mode,
            from,
            to,
            tween: Tween::new(duration),
        }
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn target(&self) -> &[[f32; 2]] {
        &self.to
    }

    /// Write interpolated positions into `positions`. Returns true once the
    /// transition has finished.
    pub fn step(&mut self, now_ms: f64, positions: &mut [[f32; 2]]) -> bool {
        let t = self.tween.progress(now_ms);
        if t >= 1.0 {
            for (out, to) in positions.iter_mut().zip(&self.to) {
                *out = *to;
            }
            return true;
        }
        let e = ease_in_out_quad(t);
        for ((out, from), to) in positions.iter_mut().zip(&self.from).zip(&self.to) {
            *out = [lerp(from[0], to[0], e), lerp(from[1], to[1], e)];
        }
        t >= 1.0
    }
}
