//! Greedy label placement over a screen-space collision grid
//!
//! Candidates are visited in priority order (selection, anchors, then
//! everything else) and each one is either accepted, claiming the grid cells
//! its box covers, or rejected. The label budget bounds how many candidates
//! are considered at all, so the cost per frame is fixed regardless of tile
//! size.

use super::LabelConfig;
use super::atlas::LabelAtlas;
use crate::camera::{Camera, Viewport};
use crate::host::{MaskMode, NodeMask};
use crate::tile::GraphTile;

/// A label accepted for this frame. Coordinates are the box center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelRecord {
    pub node_index: usize,
    pub screen_x: f32,
    pub screen_y: f32,
    pub width: f32,
    pub height: f32,
    pub alpha: f32,
}

impl LabelRecord {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        (x - self.screen_x).abs() <= self.width / 2.0 && (y - self.screen_y).abs() <= self.height / 2.0
    }

    /// Inclusive grid cell range `(x0, x1, y0, y1)` covered by the box
    pub fn cells(&self, cell_size: f32) -> (i32, i32, i32, i32) {
        (
            ((self.screen_x - self.width / 2.0) / cell_size).floor() as i32,
            ((self.screen_x + self.width / 2.0) / cell_size).floor() as i32,
            ((self.screen_y - self.height / 2.0) / cell_size).floor() as i32,
            ((self.screen_y + self.height / 2.0) / cell_size).floor() as i32,
        )
    }
}

/// Occupancy grid over the viewport
#[derive(Debug, Clone)]
pub struct CollisionGrid {
    cell_size: f32,
    cols: usize,
    rows: usize,
    occupied: Vec<bool>,
}

impl CollisionGrid {
    pub fn new(viewport: Viewport, cell_size: f32) -> Self {
        let cell_size = cell_size.max(1.0);
        let cols = (viewport.width / cell_size).ceil() as usize;
        let rows = (viewport.height / cell_size).ceil() as usize;
        Self {
            cell_size,
            cols,
            rows,
            occupied: vec![false; cols * rows],
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Claim the cells under `record` unless any is out of the grid or taken
    pub fn try_claim(&mut self, record: &LabelRecord) -> bool {
        let (x0, x1, y0, y1) = record.cells(self.cell_size);
        if x0 < 0 || y0 < 0 || x1 >= self.cols as i32 || y1 >= self.rows as i32 {
            return false;
        }
        let (x0, x1, y0, y1) = (x0 as usize, x1 as usize, y0 as usize, y1 as usize);
        for y in y0..=y1 {
            if self.occupied[y * self.cols + x0..=y * self.cols + x1].contains(&true) {
                return false;
            }
        }
        for y in y0..=y1 {
            self.occupied[y * self.cols + x0..=y * self.cols + x1].fill(true);
        }
        true
    }
}

/// Per-frame inputs for [`LabelPlacer::place`]
#[derive(Debug, Clone, Copy)]
pub struct PlacementInput<'a> {
    pub tile: &'a GraphTile,
    pub camera: Camera,
    pub viewport: Viewport,
    pub max_labels: usize,
    pub mask: NodeMask<'a>,
    pub selected: Option<usize>,
    pub now_ms: f64,
}

/// Places labels frame to frame, carrying the dense-thinning stride
#[derive(Debug, Clone)]
pub struct LabelPlacer {
    config: LabelConfig,
    stride: usize,
    last_stride_update: Option<f64>,
}

impl LabelPlacer {
    pub fn new(config: LabelConfig) -> Self {
        Self {
            config,
            stride: 1,
            last_stride_update: None,
        }
    }

    /// Current hash-thinning stride (1 means no thinning)
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn reset(&mut self) {
        self.stride = 1;
        self.last_stride_update = None;
    }

    /// Choose this frame's labels, packing any new strings into `atlas`
    pub fn place(&mut self, input: &PlacementInput<'_>, atlas: &mut LabelAtlas) -> Vec<LabelRecord> {
        let tile = input.tile;
        let n = tile.count();
        if tile.labels.is_empty() || n == 0 || input.max_labels == 0 {
            return Vec::new();
        }
        let cfg = self.config.clone();
        let selected = input.selected.filter(|&s| s < n);
        let (w, h) = (input.viewport.width, input.viewport.height);
        let mut grid = CollisionGrid::new(input.viewport, cfg.cell_size);

        let mut order = Vec::with_capacity(n + 1);
        order.extend(selected);
        order.extend((0..n.min(2)).filter(|&i| Some(i) != selected));
        order.extend((2..n).filter(|&i| Some(i) != selected));

        let in_view = |i: usize| -> Option<(f32, f32)> {
            let [x, y] = tile.position(i)?;
            let (sx, sy) = input.camera.world_to_screen(x, y);
            let m = cfg.offscreen_margin;
            (sx >= -m && sx <= w + m && sy >= -m && sy <= h + m).then_some((sx, sy))
        };
        let eligible = |i: usize| !input.mask.is_hidden(i) && tile.label(i).is_some();

        let visible = (0..n).filter(|&i| eligible(i) && in_view(i).is_some()).count();
        self.update_stride(visible, grid.cell_count(), input.now_ms);
        let stride = self.stride;

        let mut records = Vec::new();
        let mut budget = input.max_labels;
        for i in order {
            if budget == 0 {
                break;
            }
            if !eligible(i) {
                continue;
            }
            let Some((sx, sy)) = in_view(i) else {
                continue;
            };
            let pinned = i < 2 || Some(i) == selected;
            if !pinned && stride > 1 && label_hash(i) % stride != 0 {
                continue;
            }
            let Some(text) = tile.label(i) else {
                continue;
            };
            let entry = atlas.ensure(text);
            let (bw, bh) = (entry.width as f32, entry.height as f32);
            let margin = cfg.edge_margin;
            let cx = sx.max(bw / 2.0 + margin).min(w - bw / 2.0 - margin);
            let cy = (sy - cfg.offset_y)
                .max(bh / 2.0 + margin)
                .min(h - bh / 2.0 - margin);

            let dimmed = input.mask.mode() == MaskMode::Dim
                && (input.mask.is_dimmed(i) || selected.is_some_and(|s| s != i));
            let record = LabelRecord {
                node_index: i,
                screen_x: cx,
                screen_y: cy,
                width: bw,
                height: bh,
                alpha: if dimmed { cfg.dim_alpha } else { 1.0 },
            };
            budget -= 1;
            if grid.try_claim(&record) {
                records.push(record);
            }
        }
        records
    }

    /// Move the stride one step toward `ceil(visible / target)`, at most
    /// once per `stride_interval_ms`
    fn update_stride(&mut self, visible: usize, cells: usize, now_ms: f64) {
        if self
            .last_stride_update
            .is_some_and(|last| now_ms - last < self.config.stride_interval_ms)
        {
            return;
        }
        self.last_stride_update = Some(now_ms);
        let target = (cells / self.config.cells_per_label.max(1)).max(1);
        let desired = visible.div_ceil(target).max(1);
        if desired > self.stride {
            self.stride += 1;
        } else if desired < self.stride {
            self.stride -= 1;
        }
    }
}

/// Stable per-index hash for dense thinning
fn label_hash(index: usize) -> usize {
    let mut x = index as u32;
    x = (x ^ (x >> 16)).wrapping_mul(0x045d_9f3b);
    x = (x ^ (x >> 16)).wrapping_mul(0x045d_9f3b);
    (x ^ (x >> 16)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostProps;
    use crate::labels::MonospaceText;
    use proptest::prelude::*;

    fn atlas() -> LabelAtlas {
        LabelAtlas::new(LabelConfig::default(), Box::new(MonospaceText))
    }

    fn input<'a>(tile: &'a GraphTile, max_labels: usize) -> PlacementInput<'a> {
        PlacementInput {
            tile,
            camera: Camera::default(),
            viewport: Viewport::new(800.0, 600.0),
            max_labels,
            mask: NodeMask::all_visible(),
            selected: None,
            now_ms: 0.0,
        }
    }

    fn labelled(positions: Vec<[f32; 2]>) -> GraphTile {
        let labels = (0..positions.len()).map(|i| Some(format!("n{i}"))).collect();
        GraphTile::new(positions).with_labels(labels)
    }

    fn overlaps(a: &LabelRecord, b: &LabelRecord, cell: f32) -> bool {
        let (ax0, ax1, ay0, ay1) = a.cells(cell);
        let (bx0, bx1, by0, by1) = b.cells(cell);
        ax0 <= bx1 && bx0 <= ax1 && ay0 <= by1 && by0 <= ay1
    }

    // ========== Placement Tests ==========

    #[test]
    fn two_labels_without_edges_both_place() {
        let tile = GraphTile::new(vec![[100.0, 100.0], [400.0, 300.0]])
            .with_labels(vec![Some("X".into()), Some("Y".into())]);
        let records = LabelPlacer::new(LabelConfig::default()).place(&input(&tile, 220), &mut atlas());
        assert_eq!(records.len(), 2);
        assert!(!overlaps(&records[0], &records[1], 20.0));
        assert_eq!(records[0].node_index, 0);
        assert_eq!((records[0].screen_x, records[0].screen_y), (100.0, 84.0));
    }

    #[test]
    fn selected_label_wins_collisions() {
        // All three nodes stack on the same spot
        let tile = labelled(vec![[300.0, 300.0]; 3]);
        let mut inp = input(&tile, 220);
        inp.selected = Some(2);
        let records = LabelPlacer::new(LabelConfig::default()).place(&inp, &mut atlas());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node_index, 2);
    }

    #[test]
    fn budget_counts_rejected_candidates() {
        let tile = labelled(vec![[300.0, 300.0], [300.0, 300.0], [600.0, 100.0]]);
        // The second candidate collides and still uses up the budget
        let records = LabelPlacer::new(LabelConfig::default()).place(&input(&tile, 2), &mut atlas());
        assert_eq!(records.len(), 1);
        let records = LabelPlacer::new(LabelConfig::default()).place(&input(&tile, 3), &mut atlas());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn boxes_are_clamped_inside_the_viewport() {
        let tile = labelled(vec![[-20.0, 5.0]]);
        let records = LabelPlacer::new(LabelConfig::default()).place(&input(&tile, 10), &mut atlas());
        let r = records[0];
        assert_eq!(r.screen_x - r.width / 2.0, 8.0);
        assert_eq!(r.screen_y - r.height / 2.0, 8.0);
    }

    #[test]
    fn far_offscreen_candidates_are_skipped() {
        let tile = labelled(vec![[-41.0, 100.0], [100.0, 641.0]]);
        let records = LabelPlacer::new(LabelConfig::default()).place(&input(&tile, 10), &mut atlas());
        assert!(records.is_empty());
    }

    #[test]
    fn hidden_nodes_get_no_label_and_dim_lowers_alpha() {
        let tile = labelled(vec![[100.0, 100.0], [400.0, 100.0], [700.0, 100.0]]);
        let hidden = HostProps {
            visibility_mask: Some(vec![true, false, true]),
            ..Default::default()
        };
        let dimmed = HostProps {
            mask_mode: MaskMode::Dim,
            ..hidden.clone()
        };
        let mut inp = input(&tile, 10);
        inp.mask = hidden.mask(3);
        let records = LabelPlacer::new(LabelConfig::default()).place(&inp, &mut atlas());
        assert_eq!(records.iter().map(|r| r.node_index).collect::<Vec<_>>(), vec![0, 2]);

        inp.mask = dimmed.mask(3);
        inp.selected = Some(2);
        let records = LabelPlacer::new(LabelConfig::default()).place(&inp, &mut atlas());
        let alpha: Vec<_> = records.iter().map(|r| (r.node_index, r.alpha)).collect();
        assert_eq!(alpha, vec![(2, 1.0), (0, 0.35), (1, 0.35)]);
    }

    #[test]
    fn unlabelled_tile_places_nothing() {
        let tile = GraphTile::new(vec![[10.0, 10.0]]);
        let records = LabelPlacer::new(LabelConfig::default()).place(&input(&tile, 10), &mut atlas());
        assert!(records.is_empty());
    }

    // ========== Stride Tests ==========

    #[test]
    fn stride_moves_one_step_per_interval() {
        let mut placer = LabelPlacer::new(LabelConfig::default());
        // 40 x 30 cells, target 200 labels; 2000 visible wants stride 10
        placer.update_stride(2000, 1200, 0.0);
        assert_eq!(placer.stride(), 2);
        placer.update_stride(2000, 1200, 50.0);
        assert_eq!(placer.stride(), 2);
        placer.update_stride(2000, 1200, 100.0);
        assert_eq!(placer.stride(), 3);
        placer.update_stride(10, 1200, 200.0);
        assert_eq!(placer.stride(), 2);
        placer.update_stride(10, 1200, 300.0);
        assert_eq!(placer.stride(), 1);
        placer.update_stride(10, 1200, 400.0);
        assert_eq!(placer.stride(), 1);
    }

    #[test]
    fn dense_tiles_thin_non_anchor_labels() {
        let positions: Vec<[f32; 2]> = (0..3000)
            .map(|i| [(i % 60) as f32 * 13.0, (i / 60) as f32 * 12.0])
            .collect();
        let tile = labelled(positions);
        let mut placer = LabelPlacer::new(LabelConfig::default());
        let mut atlas = atlas();
        for frame in 0..5 {
            let mut inp = input(&tile, 1200);
            inp.now_ms = frame as f64 * 100.0;
            placer.place(&inp, &mut atlas);
        }
        assert!(placer.stride() > 1);
        let mut inp = input(&tile, 1200);
        inp.now_ms = 450.0;
        let records = placer.place(&inp, &mut atlas);
        let stride = placer.stride();
        assert!(
            records
                .iter()
                .all(|r| r.node_index < 2 || label_hash(r.node_index) % stride == 0)
        );
    }

    proptest! {
        /// Accepted labels never share a grid cell.
        #[test]
        fn prop_placed_labels_never_overlap(
            positions in proptest::collection::vec((-100.0f32..900.0, -100.0f32..700.0), 1..150),
            selected in proptest::option::of(0usize..150),
            max_labels in 1usize..300,
        ) {
            let tile = labelled(positions.into_iter().map(|(x, y)| [x, y]).collect());
            let mut inp = input(&tile, max_labels);
            inp.selected = selected;
            let records = LabelPlacer::new(LabelConfig::default()).place(&inp, &mut atlas());
            prop_assert!(records.len() <= max_labels);
            for (i, a) in records.iter().enumerate() {
                for b in &records[i + 1..] {
                    prop_assert!(!overlaps(a, b, 20.0));
                }
            }
        }
    }
}
