//! Graph tiles: the unit of renderable state
//!
//! A tile is handed to the engine by the data layer and stays immutable per
//! frame. Two wire shapes are accepted: the JSON tile document and the compact
//! binary tile. Both decoders are forgiving: structural problems (short arrays,
//! out-of-range edge endpoints, non-numeric entries) are repaired or dropped by
//! [`GraphTile::validate`] instead of failing the whole tile.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::camera::WorldBounds;
use crate::error::{SceneError, SceneResult};

/// Hard cap on nodes accepted from the wire
pub const MAX_NODES: usize = 20_000;

/// Hard cap on edges accepted from the wire
pub const MAX_EDGES: usize = 60_000;

/// Default radius hint for the anchor node (index 0)
pub const ANCHOR_SIZE: f32 = 12.0;

/// Default radius hint for other nodes
pub const NODE_SIZE: f32 = 4.0;

/// Default opacity for nodes other than the anchor
pub const NODE_ALPHA: f32 = 0.85;

/// Advisory rendering hint carried by a tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileMode {
    PersonEgo,
    Compare,
    Flows,
    Graph,
    Other(String),
}

impl TileMode {
    pub fn as_str(&self) -> &str {
        match self {
            TileMode::PersonEgo => "person",
            TileMode::Compare => "compare",
            TileMode::Flows => "flows",
            TileMode::Graph => "graph",
            TileMode::Other(s) => s,
        }
    }
}

impl From<&str> for TileMode {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "person" | "person-ego" | "ego" => TileMode::PersonEgo,
            "compare" => TileMode::Compare,
            "flows" => TileMode::Flows,
            "graph" => TileMode::Graph,
            _ => TileMode::Other(s.to_string()),
        }
    }
}

impl fmt::Display for TileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TileMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TileMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TileMode::from(s.as_str()))
    }
}

/// Display attributes attached to a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeMeta {
    #[serde(deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    #[serde(alias = "avatar", alias = "avatar_url")]
    pub avatar_url: Option<String>,
    pub degree: Option<u32>,
    pub distance: Option<f32>,
    pub group: Option<u16>,
    /// Anything else the data layer attached
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One ring-shaped hit region of a compare overlay, in world units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingRegion {
    pub cx: f32,
    pub cy: f32,
    /// Inner radius
    pub r1: f32,
    /// Outer radius
    pub r2: f32,
}

impl Default for RingRegion {
    fn default() -> Self {
        Self {
            cx: 0.0,
            cy: 0.0,
            r1: 200.0,
            r2: 360.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareRegions {
    pub left: Option<RingRegion>,
    pub right: Option<RingRegion>,
    pub overlap: Option<RingRegion>,
}

/// Left/right/overlap regions drawn and hit-tested in compare mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOverlay {
    pub regions: CompareRegions,
}

/// What [`GraphTile::validate`] had to repair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub dropped_edges: usize,
    pub dropped_weights: bool,
    pub repaired_node_arrays: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Immutable-per-frame snapshot of nodes, edges, labels and metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphTile {
    pub positions: Vec<[f32; 2]>,
    pub sizes: Vec<f32>,
    pub alphas: Vec<f32>,
    pub groups: Vec<u16>,
    pub edges: Vec<[u32; 2]>,
    /// Empty, or one weight per edge
    pub edge_weights: Vec<f32>,
    /// Empty, or one optional label per node
    pub labels: Vec<Option<String>>,
    /// Empty, or one optional metadata record per node
    pub metadata: Vec<Option<NodeMeta>>,
    pub focus_point: Option<[f32; 2]>,
    pub mode: Option<TileMode>,
    pub compare_overlay: Option<CompareOverlay>,
}

impl GraphTile {
    /// Create a tile with default sizes, alphas and groups
    pub fn new(positions: Vec<[f32; 2]>) -> Self {
        let mut tile = Self {
            positions,
            ..Default::default()
        };
        tile.validate();
        tile
    }

    pub fn with_edges(mut self, edges: Vec<[u32; 2]>) -> Self {
        self.edges = edges;
        self.validate();
        self
    }

    pub fn with_edge_weights(mut self, weights: Vec<f32>) -> Self {
        self.edge_weights = weights;
        self.validate();
        self
    }

    pub fn with_labels(mut self, labels: Vec<Option<String>>) -> Self {
        self.labels = labels;
        self.validate();
        self
    }

    pub fn with_sizes(mut self, sizes: Vec<f32>) -> Self {
        self.sizes = sizes;
        self.validate();
        self
    }

    pub fn with_alphas(mut self, alphas: Vec<f32>) -> Self {
        self.alphas = alphas;
        self.validate();
        self
    }

    pub fn with_groups(mut self, groups: Vec<u16>) -> Self {
        self.groups = groups;
        self.validate();
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<Option<NodeMeta>>) -> Self {
        self.metadata = metadata;
        self.validate();
        self
    }

    pub fn with_focus_point(mut self, x: f32, y: f32) -> Self {
        self.focus_point = Some([x, y]);
        self
    }

    pub fn with_mode(mut self, mode: TileMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_compare_overlay(mut self, overlay: CompareOverlay) -> Self {
        self.compare_overlay = Some(overlay);
        self
    }

    /// Number of nodes
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, index: usize) -> Option<[f32; 2]> {
        self.positions.get(index).copied()
    }

    pub fn size(&self, index: usize) -> f32 {
        self.sizes.get(index).copied().unwrap_or(NODE_SIZE)
    }

    pub fn alpha(&self, index: usize) -> f32 {
        self.alphas.get(index).copied().unwrap_or(1.0)
    }

    pub fn group(&self, index: usize) -> u16 {
        self.groups.get(index).copied().unwrap_or(0)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels
            .get(index)
            .and_then(|l| l.as_deref())
            .filter(|l| !l.is_empty())
    }

    pub fn meta(&self, index: usize) -> Option<&NodeMeta> {
        self.metadata.get(index).and_then(|m| m.as_ref())
    }

    /// Avatar reference for a node, if its metadata carries one
    pub fn avatar_ref(&self, index: usize) -> Option<&str> {
        self.meta(index)
            .and_then(|m| m.avatar_url.as_deref())
            .filter(|r| !r.is_empty())
    }

    pub fn edge_weight(&self, edge: usize) -> Option<f32> {
        self.edge_weights.get(edge).copied()
    }

    pub fn is_person_mode(&self) -> bool {
        matches!(self.mode, Some(TileMode::PersonEgo))
    }

    /// The point the camera should frame: the focus point, else node 0, else
    /// the origin
    pub fn focus_or_anchor(&self) -> [f32; 2] {
        self.focus_point
            .or_else(|| self.position(0))
            .unwrap_or([0.0, 0.0])
    }

    /// Bounding box of all finite positions
    pub fn bounds(&self) -> WorldBounds {
        let mut bounds = WorldBounds::empty();
        for &[x, y] in &self.positions {
            if x.is_finite() && y.is_finite() {
                bounds.include_point(x, y);
            }
        }
        bounds
    }

    /// Undirected adjacency lists built from the (validated) edges
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.count()];
        for &[s, t] in &self.edges {
            let (s, t) = (s as usize, t as usize);
            if s == t {
                continue;
            }
            adjacency[s].push(t);
            adjacency[t].push(s);
        }
        adjacency
    }

    /// Repair length mismatches and drop out-of-range edges in place.
    ///
    /// Never fails; the returned report says what was changed.
    pub fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();
        if self.positions.len() > MAX_NODES {
            self.positions.truncate(MAX_NODES);
        }
        let n = self.count();

        report.repaired_node_arrays += fit_length(&mut self.sizes, n, |i| {
            if i == 0 { ANCHOR_SIZE } else { NODE_SIZE }
        }) as usize;
        report.repaired_node_arrays += fit_length(&mut self.alphas, n, |i| {
            if i == 0 { 1.0 } else { NODE_ALPHA }
        }) as usize;
        report.repaired_node_arrays += fit_length(&mut self.groups, n, |_| 0) as usize;
        for alpha in &mut self.alphas {
            *alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 1.0 };
        }
        if !self.labels.is_empty() {
            report.repaired_node_arrays += fit_length(&mut self.labels, n, |_| None) as usize;
        }
        if !self.metadata.is_empty() {
            report.repaired_node_arrays += fit_length(&mut self.metadata, n, |_| None) as usize;
        }

        if self.edges.len() > MAX_EDGES {
            self.edges.truncate(MAX_EDGES);
        }
        let weighted = !self.edge_weights.is_empty() && self.edge_weights.len() == self.edges.len();
        if !self.edge_weights.is_empty() && !weighted {
            self.edge_weights.clear();
            report.dropped_weights = true;
        }

        let before = self.edges.len();
        if weighted {
            let mut kept_weights = Vec::with_capacity(self.edge_weights.len());
            let mut kept_edges = Vec::with_capacity(self.edges.len());
            for (edge, weight) in self.edges.iter().zip(&self.edge_weights) {
                if (edge[0] as usize) < n && (edge[1] as usize) < n {
                    kept_edges.push(*edge);
                    kept_weights.push(*weight);
                }
            }
            self.edges = kept_edges;
            self.edge_weights = kept_weights;
        } else {
            self.edges
                .retain(|e| (e[0] as usize) < n && (e[1] as usize) < n);
        }
        report.dropped_edges = before - self.edges.len();

        if !report.is_clean() {
            warn!(
                dropped_edges = report.dropped_edges,
                dropped_weights = report.dropped_weights,
                repaired_arrays = report.repaired_node_arrays,
                "repaired malformed graph tile"
            );
        }
        report
    }

    /// Load a tile from disk, choosing the decoder by extension (`.bin` is
    /// binary, everything else is JSON)
    pub fn from_path(path: &Path) -> SceneResult<Self> {
        let is_binary = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("bin"));
        if is_binary {
            Ok(Self::from_binary(&std::fs::read(path)?))
        } else {
            Self::from_json_str(&std::fs::read_to_string(path)?)
        }
    }

    /// Decode a JSON tile document
    pub fn from_json_str(content: &str) -> SceneResult<Self> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| SceneError::Parse(e.to_string()))?;
        Ok(Self::from_json_value(&value))
    }

    /// Decode an already-parsed JSON tile document.
    ///
    /// Unknown shapes decode to an empty tile rather than an error.
    pub fn from_json_value(value: &Value) -> Self {
        let doc: TileDocument = serde_json::from_value(value.clone()).unwrap_or_default();

        let count = doc.coords.nodes.len().min(MAX_NODES);
        let positions: Vec<[f32; 2]> = doc.coords.nodes[..count]
            .iter()
            .map(|p| [number_at(p, 0).unwrap_or(0.0), number_at(p, 1).unwrap_or(0.0)])
            .collect();

        let edge_count = doc.coords.edges.len().min(MAX_EDGES);
        let mut edges = Vec::with_capacity(edge_count);
        let mut weights = Vec::with_capacity(edge_count);
        let mut any_weight = false;
        for raw in &doc.coords.edges[..edge_count] {
            let s = number_at(raw, 0).unwrap_or(0.0);
            let t = number_at(raw, 1).unwrap_or(0.0);
            if s < 0.0 || t < 0.0 {
                continue;
            }
            let w = number_at(raw, 2);
            any_weight |= w.is_some();
            edges.push([s as u32, t as u32]);
            weights.push(w.unwrap_or(0.0).clamp(0.0, 255.0));
        }

        let metadata: Vec<Option<NodeMeta>> = doc
            .meta
            .as_ref()
            .map(|m| {
                m.nodes
                    .iter()
                    .take(count)
                    .map(|v| serde_json::from_value::<NodeMeta>(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let labels: Vec<Option<String>> = match &doc.labels {
            Some(labels) => labels
                .iter()
                .take(count)
                .map(|l| l.as_str().map(str::to_string))
                .collect(),
            None if !metadata.is_empty() => metadata
                .iter()
                .map(|m| m.as_ref().and_then(|m| m.name.clone()))
                .collect(),
            None => Vec::new(),
        };

        let groups: Vec<u16> = match &doc.group {
            Some(groups) => groups.iter().map(|g| *g as u16).collect(),
            None if metadata.iter().any(|m| m.as_ref().is_some_and(|m| m.group.is_some())) => {
                metadata
                    .iter()
                    .map(|m| m.as_ref().and_then(|m| m.group).unwrap_or(0))
                    .collect()
            }
            None => Vec::new(),
        };

        let mode = doc
            .mode
            .or_else(|| doc.meta.as_ref().and_then(|m| m.mode.clone()))
            .map(|m| TileMode::from(m.as_str()));

        let mut tile = GraphTile {
            positions,
            sizes: doc.size.unwrap_or_default(),
            alphas: doc.alpha.unwrap_or_default(),
            groups,
            edges,
            edge_weights: if any_weight { weights } else { Vec::new() },
            labels,
            metadata,
            focus_point: doc.focus_world.map(|p| [p.x, p.y]),
            mode,
            compare_overlay: doc.compare_overlay,
        };
        tile.validate();
        debug!(
            nodes = tile.count(),
            edges = tile.edges.len(),
            "decoded JSON tile"
        );
        tile
    }

    /// Decode a binary tile.
    ///
    /// Layout (little-endian): `count:i32, dims:i32, group_off:i32,
    /// flags_off:i32`, then `count*dims` f32 coordinates, `count` u16 groups at
    /// `16 + group_off`, `count` u8 flags at `16 + flags_off`, then optional u32
    /// edge pairs aligned to 4 bytes. Short or corrupt buffers decode to an
    /// empty tile.
    pub fn from_binary(buf: &[u8]) -> Self {
        let Some(tile) = decode_binary(buf) else {
            warn!(bytes = buf.len(), "binary tile too short, using empty tile");
            return GraphTile::default();
        };
        tile
    }
}

fn decode_binary(buf: &[u8]) -> Option<GraphTile> {
    let read_i32 = |at: usize| -> Option<i32> {
        buf.get(at..at + 4)
            .and_then(|b| b.try_into().ok())
            .map(i32::from_le_bytes)
    };
    let read_u32 = |at: usize| -> Option<u32> {
        buf.get(at..at + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    };

    let count = (read_i32(0)?.max(0) as usize).min(MAX_NODES);
    let dims = match read_i32(4)? {
        d @ 1..=4 => d as usize,
        _ => 2,
    };
    let group_off = match read_i32(8)? {
        off if off >= 0 => off as usize,
        _ => count * dims * 4,
    };
    // Header word 3 locates the per-node flag bytes, which carry nothing the
    // scene draws. The block still counts toward the minimum length.

    let min_bytes = 16 + count * dims * 4 + count * 2 + count;
    if buf.len() < min_bytes {
        return None;
    }

    let mut positions = Vec::with_capacity(count);
    for i in 0..count {
        let base = 16 + i * dims * 4;
        let x = f32::from_bits(read_u32(base)?);
        let y = if dims > 1 {
            f32::from_bits(read_u32(base + 4)?)
        } else {
            0.0
        };
        positions.push([x, y]);
    }

    let mut groups = Vec::with_capacity(count);
    for i in 0..count {
        let at = 16 + group_off + i * 2;
        let bytes = buf.get(at..at + 2)?;
        groups.push(u16::from_le_bytes([bytes[0], bytes[1]]));
    }

    let mut edges = Vec::new();
    if buf.len() > min_bytes {
        let start = (min_bytes + 3) & !3;
        let words = buf.len().saturating_sub(start) / 4;
        if words > 0 && words % 2 == 0 {
            for pair in 0..(words / 2).min(MAX_EDGES) {
                let at = start + pair * 8;
                edges.push([read_u32(at)?, read_u32(at + 4)?]);
            }
        }
    }

    let sizes = (0..count).map(|i| if i == 0 { ANCHOR_SIZE } else { 3.5 }).collect();
    let alphas = (0..count).map(|i| if i == 0 { 1.0 } else { 0.9 }).collect();

    let mut tile = GraphTile {
        positions,
        sizes,
        alphas,
        groups,
        edges,
        ..Default::default()
    };
    tile.validate();
    Some(tile)
}

/// Encode a tile in the binary layout read by [`GraphTile::from_binary`].
///
/// Only positions, groups and edges survive the round trip.
pub fn encode_binary(tile: &GraphTile) -> Vec<u8> {
    let count = tile.count();
    let mut buf = Vec::with_capacity(16 + count * 11 + tile.edges.len() * 8 + 3);
    buf.extend_from_slice(&(count as i32).to_le_bytes());
    buf.extend_from_slice(&2i32.to_le_bytes());
    buf.extend_from_slice(&((count * 8) as i32).to_le_bytes());
    buf.extend_from_slice(&((count * 10) as i32).to_le_bytes());
    for &[x, y] in &tile.positions {
        buf.extend_from_slice(&x.to_le_bytes());
        buf.extend_from_slice(&y.to_le_bytes());
    }
    for i in 0..count {
        buf.extend_from_slice(&tile.group(i).to_le_bytes());
    }
    buf.extend(std::iter::repeat_n(0u8, count));
    if !tile.edges.is_empty() {
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
        for &[s, t] in &tile.edges {
            buf.extend_from_slice(&s.to_le_bytes());
            buf.extend_from_slice(&t.to_le_bytes());
        }
    }
    buf
}

/// Truncate or pad `values` to `len`. Returns true when a change was needed.
fn fit_length<T>(values: &mut Vec<T>, len: usize, fill: impl Fn(usize) -> T) -> bool {
    if values.len() == len {
        return false;
    }
    let was_empty = values.is_empty();
    values.truncate(len);
    while values.len() < len {
        let i = values.len();
        values.push(fill(i));
    }
    // Filling an absent optional array is not a repair
    !was_empty
}

fn number_at(value: &Value, index: usize) -> Option<f32> {
    value
        .as_array()
        .and_then(|a| a.get(index))
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .filter(|v| v.is_finite())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TileDocument {
    coords: CoordsDocument,
    labels: Option<Vec<Value>>,
    meta: Option<MetaDocument>,
    size: Option<Vec<f32>>,
    alpha: Option<Vec<f32>>,
    group: Option<Vec<u32>>,
    focus_world: Option<PointDocument>,
    compare_overlay: Option<CompareOverlay>,
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoordsDocument {
    nodes: Vec<Value>,
    edges: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetaDocument {
    mode: Option<String>,
    nodes: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PointDocument {
    x: f32,
    y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========== Construction Tests ==========

    #[test]
    fn new_fills_defaults_per_node() {
        let tile = GraphTile::new(vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
        assert_eq!(tile.count(), 3);
        assert_eq!(tile.sizes, vec![ANCHOR_SIZE, NODE_SIZE, NODE_SIZE]);
        assert_eq!(tile.alphas, vec![1.0, NODE_ALPHA, NODE_ALPHA]);
        assert_eq!(tile.groups, vec![0, 0, 0]);
        assert!(tile.labels.is_empty());
    }

    #[test]
    fn focus_falls_back_to_anchor_then_origin() {
        let tile = GraphTile::new(vec![[5.0, 6.0]]);
        assert_eq!(tile.focus_or_anchor(), [5.0, 6.0]);
        assert_eq!(tile.clone().with_focus_point(1.0, 2.0).focus_or_anchor(), [1.0, 2.0]);
        assert_eq!(GraphTile::default().focus_or_anchor(), [0.0, 0.0]);
    }

    #[test]
    fn empty_labels_are_treated_as_missing() {
        let tile = GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0]])
            .with_labels(vec![Some(String::new()), Some("B".into())]);
        assert_eq!(tile.label(0), None);
        assert_eq!(tile.label(1), Some("B"));
        assert_eq!(tile.label(7), None);
    }

    // ========== Validation Tests ==========

    #[test]
    fn validate_drops_out_of_range_edges() {
        let mut tile = GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0]]);
        tile.edges = vec![[0, 1], [1, 5], [9, 0]];
        let report = tile.validate();
        assert_eq!(tile.edges, vec![[0, 1]]);
        assert_eq!(report.dropped_edges, 2);
    }

    #[test]
    fn validate_keeps_weights_aligned_with_surviving_edges() {
        let mut tile = GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        tile.edges = vec![[0, 1], [0, 9], [1, 2]];
        tile.edge_weights = vec![10.0, 20.0, 30.0];
        tile.validate();
        assert_eq!(tile.edges, vec![[0, 1], [1, 2]]);
        assert_eq!(tile.edge_weights, vec![10.0, 30.0]);
    }

    #[test]
    fn validate_drops_mismatched_weights() {
        let mut tile = GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0]]);
        tile.edges = vec![[0, 1]];
        tile.edge_weights = vec![1.0, 2.0];
        let report = tile.validate();
        assert!(tile.edge_weights.is_empty());
        assert!(report.dropped_weights);
    }

    #[test]
    fn validate_pads_and_truncates_node_arrays() {
        let mut tile = GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        tile.labels = vec![Some("a".into())];
        tile.sizes = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        tile.alphas = vec![7.0, f32::NAN, 0.5];
        let report = tile.validate();
        assert_eq!(tile.labels.len(), 3);
        assert_eq!(tile.sizes, vec![1.0, 2.0, 3.0]);
        assert_eq!(tile.alphas, vec![1.0, 1.0, 0.5]);
        assert_eq!(report.repaired_node_arrays, 2);
    }

    // ========== JSON Tests ==========

    #[test]
    fn json_tile_decodes_coords_edges_and_meta() {
        let doc = json!({
            "coords": {
                "nodes": [[0, 0], [100, 0], [200, "bad"]],
                "edges": [[0, 1, 40], [1, 2, 999], [0, 7, 1]]
            },
            "meta": {
                "mode": "person",
                "nodes": [
                    {"id": 42, "name": "Ada", "avatarUrl": "ada.png", "group": 0},
                    {"id": "7", "name": "Bob", "group": 1},
                    null
                ]
            },
            "focusWorld": {"x": 100, "y": 0}
        });
        let tile = GraphTile::from_json_value(&doc);

        assert_eq!(tile.count(), 3);
        assert_eq!(tile.positions[2], [200.0, 0.0]);
        assert_eq!(tile.edges, vec![[0, 1], [1, 2]]);
        assert_eq!(tile.edge_weights, vec![40.0, 255.0]);
        assert_eq!(tile.mode, Some(TileMode::PersonEgo));
        assert_eq!(tile.focus_point, Some([100.0, 0.0]));
        assert_eq!(tile.label(0), Some("Ada"));
        assert_eq!(tile.label(2), None);
        assert_eq!(tile.avatar_ref(0), Some("ada.png"));
        assert_eq!(tile.meta(0).and_then(|m| m.id.clone()), Some("42".to_string()));
        assert_eq!(tile.groups, vec![0, 1, 0]);
        assert_eq!(tile.sizes[0], ANCHOR_SIZE);
        assert_eq!(tile.alphas[1], NODE_ALPHA);
    }

    #[test]
    fn json_labels_take_precedence_over_names() {
        let doc = json!({
            "coords": {"nodes": [[0, 0], [1, 1]]},
            "labels": ["X", 5],
            "meta": {"nodes": [{"name": "ignored"}]}
        });
        let tile = GraphTile::from_json_value(&doc);
        assert_eq!(tile.label(0), Some("X"));
        assert_eq!(tile.label(1), None);
    }

    #[test]
    fn json_without_coords_is_empty_tile() {
        let tile = GraphTile::from_json_value(&json!({"hello": "world"}));
        assert!(tile.is_empty());
        let tile = GraphTile::from_json_value(&json!([1, 2, 3]));
        assert!(tile.is_empty());
    }

    #[test]
    fn json_syntax_error_is_reported() {
        let err = GraphTile::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SceneError::Parse(_)));
    }

    #[test]
    fn json_compare_overlay_uses_ring_defaults() {
        let doc = json!({
            "coords": {"nodes": [[0, 0]]},
            "compareOverlay": {"regions": {"left": {"cx": -300}, "right": {"cx": 300, "r1": 100, "r2": 250}}}
        });
        let tile = GraphTile::from_json_value(&doc);
        let regions = tile.compare_overlay.map(|o| o.regions).unwrap_or_default();
        assert_eq!(regions.left.map(|r| (r.cx, r.r1, r.r2)), Some((-300.0, 200.0, 360.0)));
        assert_eq!(regions.right.map(|r| r.r2), Some(250.0));
        assert!(regions.overlap.is_none());
    }

    #[test]
    fn json_node_count_is_clamped() {
        let nodes: Vec<Value> = (0..MAX_NODES + 10).map(|i| json!([i, 0])).collect();
        let tile = GraphTile::from_json_value(&json!({"coords": {"nodes": nodes}}));
        assert_eq!(tile.count(), MAX_NODES);
    }

    // ========== Binary Tests ==========

    #[test]
    fn binary_roundtrip_keeps_positions_groups_and_edges() {
        let tile = GraphTile::new(vec![[1.5, -2.0], [3.0, 4.0], [5.0, 6.0]])
            .with_groups(vec![0, 1, 2])
            .with_edges(vec![[0, 1], [1, 2]]);
        let decoded = GraphTile::from_binary(&encode_binary(&tile));
        assert_eq!(decoded.positions, tile.positions);
        assert_eq!(decoded.groups, tile.groups);
        assert_eq!(decoded.edges, tile.edges);
        assert_eq!(decoded.sizes, vec![ANCHOR_SIZE, 3.5, 3.5]);
        assert_eq!(decoded.alphas, vec![1.0, 0.9, 0.9]);
    }

    #[test]
    fn binary_short_buffer_is_empty_tile() {
        let mut buf = encode_binary(&GraphTile::new(vec![[1.0, 1.0], [2.0, 2.0]]));
        buf.truncate(20);
        assert!(GraphTile::from_binary(&buf).is_empty());
        assert!(GraphTile::from_binary(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn binary_negative_count_is_empty() {
        let mut buf = Vec::new();
        for v in [-5i32, 2, -1, -1] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert!(GraphTile::from_binary(&buf).is_empty());
    }

    #[test]
    fn binary_odd_trailing_words_are_ignored() {
        let mut buf = encode_binary(&GraphTile::new(vec![[0.0, 0.0], [1.0, 0.0]]));
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
        buf.extend_from_slice(&7u32.to_le_bytes());
        let tile = GraphTile::from_binary(&buf);
        assert_eq!(tile.count(), 2);
        assert!(tile.edges.is_empty());
    }

    // ========== Misc Tests ==========

    #[test]
    fn tile_mode_parses_aliases() {
        assert_eq!(TileMode::from("Person"), TileMode::PersonEgo);
        assert_eq!(TileMode::from("compare"), TileMode::Compare);
        assert_eq!(TileMode::from("sankey"), TileMode::Other("sankey".into()));
        assert_eq!(TileMode::Flows.to_string(), "flows");
    }

    #[test]
    fn adjacency_is_undirected_and_skips_self_loops() {
        let tile = GraphTile::new(vec![[0.0, 0.0]; 3]).with_edges(vec![[0, 1], [1, 2], [2, 2]]);
        let adj = tile.adjacency();
        assert_eq!(adj[0], vec![1]);
        assert_eq!(adj[1], vec![0, 2]);
        assert_eq!(adj[2], vec![1]);
    }

    #[test]
    fn from_path_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("tile.json");
        std::fs::write(&json_path, r#"{"coords":{"nodes":[[1,2]]}}"#).unwrap();
        assert_eq!(GraphTile::from_path(&json_path).unwrap().count(), 1);

        let bin_path = dir.path().join("tile.bin");
        let tile = GraphTile::new(vec![[0.0, 0.0], [1.0, 1.0]]);
        std::fs::write(&bin_path, encode_binary(&tile)).unwrap();
        assert_eq!(GraphTile::from_path(&bin_path).unwrap().count(), 2);
    }
}
