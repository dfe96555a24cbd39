//! Backend-agnostic scene state
//!
//! Everything a frame depends on lives here: the foreground tile, camera,
//! budget, trail, labels, avatars and pointer state. Renderers only see the
//! [`FrameList`] built from it, so both backends share one behavior.

use tracing::{debug, info};

use crate::budget::BudgetController;
use crate::camera::{Camera, CameraController, CenterOptions, Viewport, WorldBounds};
use crate::color::Rgba;
use crate::config::EngineConfig;
use crate::edges::{EdgeQuery, node_color, select_edges};
use crate::engine::{BoundsOptions, CameraSnapshot, FocusOptions, ForegroundOptions, KeyInput, SceneStats, Visibility};
use crate::events::{EventBus, SceneEvent, canonical_entity_id};
use crate::frame::{DrawItem, FrameList, FrameStats, push_compare_overlay, push_trail};
use crate::host::{HostCallbacks, HostProps, NoopCallbacks};
use crate::labels::{LabelAtlas, LabelPlacer, LabelRecord, PlacementInput, load_text_rasterizer};
use crate::layout::{LayoutMode, LayoutTransition, ReshapeOptions, compute_layout};
use crate::picking::{PickTarget, pick_node, resolve_pointer};
use crate::resources::AvatarLoader;
use crate::tile::GraphTile;
use crate::trail::{Trail, TrailSnapshot};

/// Camera glide used when a trail entry is promoted back to the foreground
pub const PROMOTE_DURATION_MS: f64 = 460.0;

/// Frame deltas are capped here before they reach the budget, so one long
/// pause moves the average no further than a single very slow frame
const MAX_OBSERVED_FRAME_MS: f64 = 250.0;

const KEY_ZOOM_IN: f32 = 1.1;
const KEY_ZOOM_OUT: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Drag {
    Idle,
    Node { index: usize, last: (f32, f32) },
    Pan { last: (f32, f32) },
}

/// Scene state shared by every backend
pub struct SceneState {
    config: EngineConfig,
    camera: CameraController,
    budget: BudgetController,
    foreground: Option<GraphTile>,
    trail: Trail,
    atlas: LabelAtlas,
    placer: LabelPlacer,
    avatars: AvatarLoader,
    props: HostProps,
    labels: Vec<LabelRecord>,
    layout: Option<LayoutTransition>,
    layout_mode: Option<LayoutMode>,
    drag: Drag,
    events: EventBus,
    inbox: EventBus,
    callbacks: Box<dyn HostCallbacks>,
    last_frame_ms: Option<f64>,
    last_camera: Camera,
    fps: f32,
    dirty: bool,
    last_stats: FrameStats,
}

impl std::fmt::Debug for SceneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneState")
            .field("camera", &self.camera)
            .field("nodes", &self.foreground.as_ref().map_or(0, GraphTile::count))
            .field("trail", &self.trail.len())
            .field("layout_mode", &self.layout_mode)
            .field("avatars", &self.avatars)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl SceneState {
    pub fn new(config: EngineConfig) -> Self {
        let viewport = Viewport::new(config.viewport.width.max(1) as f32, config.viewport.height.max(1) as f32);
        let camera = CameraController::new(viewport, config.camera.clone());
        let last_camera = camera.camera();
        Self {
            budget: BudgetController::new(config.budget.clone()),
            trail: Trail::new(config.trail.clone()),
            atlas: LabelAtlas::new(config.labels.clone(), load_text_rasterizer(config.fonts.as_deref())),
            placer: LabelPlacer::new(config.labels.clone()),
            avatars: AvatarLoader::from_config(config.avatars.clone()),
            camera,
            foreground: None,
            props: HostProps::default(),
            labels: Vec::new(),
            layout: None,
            layout_mode: None,
            drag: Drag::Idle,
            events: EventBus::new(),
            inbox: EventBus::new(),
            callbacks: Box::new(NoopCallbacks),
            last_frame_ms: None,
            last_camera,
            fps: 0.0,
            dirty: true,
            last_stats: FrameStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn foreground(&self) -> Option<&GraphTile> {
        self.foreground.as_ref()
    }

    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    pub fn labels(&self) -> &[LabelRecord] {
        &self.labels
    }

    pub fn layout_mode(&self) -> Option<LayoutMode> {
        self.layout_mode
    }

    pub fn atlas_mut(&mut self) -> &mut LabelAtlas {
        &mut self.atlas
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn inbox(&self) -> &EventBus {
        &self.inbox
    }

    fn node_count(&self) -> usize {
        self.foreground.as_ref().map_or(0, GraphTile::count)
    }

    // ----- foreground lifecycle -----

    /// Install a new foreground tile, snapshotting the outgoing one onto the
    /// trail unless it shows the same graph
    pub fn set_foreground(&mut self, mut tile: GraphTile, options: ForegroundOptions) {
        tile.validate();
        if !options.skip_trail_snapshot {
            if let Some(previous) = &self.foreground {
                self.trail.record_swap(previous, &tile);
            }
        }
        info!(
            nodes = tile.count(),
            edges = tile.edges.len(),
            mode = tile.mode.as_ref().map_or("none", |m| m.as_str()),
            trail = self.trail.len(),
            "installing foreground"
        );
        self.install(tile, None);
    }

    fn install(&mut self, tile: GraphTile, center_duration_ms: Option<f64>) {
        self.avatars.reset();
        self.placer.reset();
        self.labels.clear();
        self.layout = None;
        self.layout_mode = None;
        self.drag = Drag::Idle;

        if !tile.is_empty() {
            let (padding, max_scale) = (self.config.camera.fit_padding, self.config.camera.fit_max_scale);
            self.camera.fit_to_bounds(&tile.bounds(), padding, max_scale);
            let [fx, fy] = tile.focus_or_anchor();
            self.camera.center_on_world(
                fx,
                fy,
                CenterOptions {
                    zoom: None,
                    animate: true,
                    duration_ms: center_duration_ms,
                },
            );
        }
        self.foreground = Some(tile);
        self.dirty = true;
    }

    /// Drop the foreground and the trail, and reset the camera
    pub fn clear(&mut self) {
        info!("clearing scene");
        self.foreground = None;
        self.trail.clear();
        self.camera.reset();
        self.avatars.reset();
        self.placer.reset();
        self.labels.clear();
        self.layout = None;
        self.layout_mode = None;
        self.drag = Drag::Idle;
        self.dirty = true;
    }

    /// Center the camera on node `index`. Unknown indices are ignored.
    pub fn focus_index(&mut self, index: usize, options: FocusOptions) {
        let Some([x, y]) = self.foreground.as_ref().and_then(|t| t.position(index)) else {
            debug!(index, "focus target out of range");
            return;
        };
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        let cfg = self.camera.config();
        let (lo, hi) = (cfg.focus_min_zoom.max(cfg.min_zoom), cfg.max_zoom);
        let current = self.camera.camera().scale;
        let target = options
            .zoom
            .unwrap_or_else(|| current * options.zoom_multiplier.unwrap_or(1.0));
        let zoom = if target.is_finite() { target.clamp(lo, hi) } else { current };
        self.camera.center_on_world(
            x,
            y,
            CenterOptions {
                zoom: Some(zoom),
                animate: options.animate,
                duration_ms: options.duration_ms,
            },
        );
        self.dirty = true;
    }

    /// Move the foreground nodes into `mode`'s arrangement
    pub fn reshape_layout(&mut self, mode: LayoutMode, options: ReshapeOptions) {
        let Some(tile) = self.foreground.as_mut() else {
            return;
        };
        if tile.is_empty() {
            return;
        }
        let targets = compute_layout(tile, mode, &self.config.layout);
        debug!(%mode, nodes = targets.len(), animate = options.animate, "reshaping layout");
        if options.animate {
            self.layout = Some(LayoutTransition::new(
                mode,
                tile.positions.clone(),
                targets,
                options.duration_ms,
                &self.config.layout,
            ));
        } else {
            tile.positions = targets;
            self.layout = None;
            self.events.publish(SceneEvent::LayoutChanged { mode });
        }
        self.layout_mode = Some(mode);
        self.dirty = true;
    }

    /// Swap the newest trail entry back into the foreground. The current
    /// foreground takes its place on the trail.
    pub fn promote_trail_previous(&mut self) -> bool {
        let Some(previous) = self.trail.pop_newest() else {
            return false;
        };
        if let Some(current) = self.foreground.take().filter(|t| !t.is_empty()) {
            self.trail.push(TrailSnapshot::from_tile(&current));
        }
        let tile = previous.to_tile();
        info!(nodes = tile.count(), trail = self.trail.len(), "promoting trail entry");
        self.install(tile, Some(PROMOTE_DURATION_MS));
        true
    }

    // ----- queries -----

    pub fn camera_snapshot(&self) -> CameraSnapshot {
        let camera = self.camera.camera();
        CameraSnapshot {
            scale: camera.scale,
            translate_x: camera.translate_x,
            translate_y: camera.translate_y,
            viewport: self.camera.viewport(),
            viewport_world: self.camera.viewport_world_bounds(),
        }
    }

    /// World bounds of the visible foreground, optionally restricted to one
    /// group and trimmed by a percentile on each side
    pub fn measure_bounds(&self, group: Option<u16>, options: &BoundsOptions) -> Option<WorldBounds> {
        let tile = self.foreground.as_ref()?;
        let n = tile.count();
        let mask = options
            .mask
            .as_deref()
            .filter(|m| m.len() == n)
            .or_else(|| self.props.visibility_mask.as_deref().filter(|m| m.len() == n));

        let (mut xs, mut ys) = (Vec::new(), Vec::new());
        for (i, &[x, y]) in tile.positions.iter().enumerate() {
            if mask.is_some_and(|m| !m[i]) || group.is_some_and(|g| tile.group(i) != g) {
                continue;
            }
            if x.is_finite() && y.is_finite() {
                xs.push(x);
                ys.push(y);
            }
        }
        if xs.is_empty() {
            return None;
        }
        let (min_x, max_x) = trimmed_range(&mut xs, options.drop_percentile);
        let (min_y, max_y) = trimmed_range(&mut ys, options.drop_percentile);
        Some(WorldBounds::new(min_x, max_x, min_y, max_y))
    }

    /// Fraction of `bounds` inside the current viewport
    pub fn visibility_for_bounds(&self, bounds: &WorldBounds) -> Visibility {
        let viewport = self.camera.viewport_world_bounds();
        let visible_fraction = if bounds.is_empty() {
            0.0
        } else {
            let area = (bounds.width() * bounds.height()).max(1e-3);
            (bounds.intersection_area(&viewport) / area).clamp(0.0, 1.0)
        };
        Visibility {
            visible_fraction,
            viewport,
        }
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            fps: self.fps,
            node_count: self.node_count(),
            edge_count: self.foreground.as_ref().map_or(0, |t| t.edges.len()),
            frame: self.last_stats,
            budget: self.budget.state(),
            trail_len: self.trail.len(),
            atlas_entries: self.atlas.len(),
            atlas_resets: self.atlas.resets(),
            label_stride: self.placer.stride(),
            avatars_cached: self.avatars.cached(),
            avatars_in_flight: self.avatars.in_flight(),
        }
    }

    pub fn needs_redraw(&self) -> bool {
        self.dirty || self.camera.is_animating() || self.layout.is_some() || self.avatars.in_flight() > 0
    }

    // ----- host wiring -----

    pub fn set_props(&mut self, props: HostProps) {
        self.props = props;
        self.dirty = true;
    }

    pub fn props(&self) -> &HostProps {
        &self.props
    }

    pub fn set_callbacks(&mut self, callbacks: Box<dyn HostCallbacks>) {
        self.callbacks = callbacks;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width.max(1) as f32, height.max(1) as f32);
        self.placer.reset();
        self.dirty = true;
    }

    // ----- input -----

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        let camera = self.camera.camera();
        let target = match &self.foreground {
            Some(tile) => resolve_pointer(
                tile,
                &camera,
                &self.labels,
                (x, y),
                &self.props.mask(tile.count()),
                &self.config.picking,
            ),
            None => PickTarget::Empty,
        };
        debug!(?target, x, y, "pointer down");
        self.drag = match target {
            PickTarget::Label(index) => {
                self.callbacks.on_pick(index);
                Drag::Idle
            }
            PickTarget::Node(index) => {
                self.callbacks.on_pick(index);
                Drag::Node { index, last: (x, y) }
            }
            PickTarget::Region(region) => {
                self.callbacks.on_region_click(region);
                Drag::Idle
            }
            PickTarget::Empty => {
                if self.props.selected(self.node_count()).is_some() {
                    self.callbacks.on_unselect();
                }
                Drag::Pan { last: (x, y) }
            }
        };
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        match self.drag {
            Drag::Idle => {}
            Drag::Node { index, last } => {
                let scale = self.camera.camera().scale;
                if let Some(p) = self.foreground.as_mut().and_then(|t| t.positions.get_mut(index)) {
                    p[0] += (x - last.0) / scale;
                    p[1] += (y - last.1) / scale;
                    self.dirty = true;
                }
                self.drag = Drag::Node { index, last: (x, y) };
            }
            Drag::Pan { last } => {
                self.camera.pan(x - last.0, y - last.1);
                self.drag = Drag::Pan { last: (x, y) };
                self.dirty = true;
            }
        }
    }

    pub fn pointer_up(&mut self, _x: f32, _y: f32) {
        self.drag = Drag::Idle;
    }

    /// Double-clicking a node asks the host to insert its canonical entity id
    pub fn double_click(&mut self, x: f32, y: f32) {
        let Some(tile) = &self.foreground else {
            return;
        };
        let mask = self.props.mask(tile.count());
        let Some(index) = pick_node(tile, &self.camera.camera(), (x, y), &mask, &self.config.picking) else {
            return;
        };
        let raw = tile
            .meta(index)
            .and_then(|m| m.id.clone())
            .or_else(|| tile.label(index).filter(|l| is_entity_label(l)).map(str::to_string));
        let Some(id) = raw.and_then(|raw| canonical_entity_id(&raw, tile.group(index), index, tile.mode.as_ref()))
        else {
            debug!(index, "double-clicked node has no entity id");
            return;
        };
        info!(index, %id, "insert requested");
        self.callbacks.on_insert_request(&id);
        self.events.publish(SceneEvent::InsertId { id });
    }

    pub fn wheel(&mut self, x: f32, y: f32, delta_y: f32) {
        let factor = (-delta_y * self.config.camera.wheel_sensitivity).exp();
        if factor.is_finite() && factor > 0.0 {
            self.camera.zoom_at(x, y, factor);
            self.dirty = true;
        }
    }

    pub fn key(&mut self, key: KeyInput) {
        let scale = self.camera.camera().scale;
        let cfg = self.camera.config();
        match key {
            KeyInput::ZoomIn => {
                let target = (scale * KEY_ZOOM_IN).min(cfg.max_zoom);
                self.camera.set_zoom(target);
            }
            KeyInput::ZoomOut => {
                let target = (scale * KEY_ZOOM_OUT).max(cfg.focus_min_zoom);
                self.camera.set_zoom(target);
            }
            KeyInput::Fit => self.fit_to_content(),
            KeyInput::Reset => self.camera.reset(),
            KeyInput::Escape => self.callbacks.on_clear(),
        }
        self.dirty = true;
    }

    /// Fit the camera to the visible foreground nodes
    pub fn fit_to_content(&mut self) {
        let Some(bounds) = self.measure_bounds(None, &BoundsOptions::default()) else {
            return;
        };
        let (padding, max_scale) = (self.config.camera.fit_padding, self.config.camera.fit_max_scale);
        self.camera.fit_to_bounds(&bounds, padding, max_scale);
        self.dirty = true;
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.camera.pan(dx, dy);
        self.dirty = true;
    }

    pub fn zoom_at(&mut self, x: f32, y: f32, factor: f32) {
        self.camera.zoom_at(x, y, factor);
        self.dirty = true;
    }

    // ----- frame loop -----

    /// Per-frame bookkeeping before drawing: budget, inbound events,
    /// animations and finished avatar loads
    pub fn advance(&mut self, now_ms: f64) {
        if let Some(last) = self.last_frame_ms {
            let delta = (now_ms - last).min(MAX_OBSERVED_FRAME_MS);
            let trend = self.budget.observe(delta);
            debug!(?trend, delta, "frame budget");
        }
        self.last_frame_ms = Some(now_ms);
        let ema = self.budget.state().frame_time_ema;
        self.fps = if ema > 0.0 { (1000.0 / ema) as f32 } else { 0.0 };

        if self.avatars.drain() > 0 {
            self.dirty = true;
        }

        for event in self.inbox.drain() {
            match event {
                SceneEvent::InsertId { id } => self.callbacks.on_insert_request(&id),
                other => debug!(?other, "ignoring inbound event"),
            }
        }

        if self.camera.step(now_ms) {
            self.dirty = true;
        }

        if let Some(mut transition) = self.layout.take() {
            if let Some(tile) = self.foreground.as_mut() {
                let done = transition.step(now_ms, &mut tile.positions);
                self.dirty = true;
                if done {
                    self.events.publish(SceneEvent::LayoutChanged {
                        mode: transition.mode(),
                    });
                } else {
                    self.layout = Some(transition);
                }
            }
        }

        let camera = self.camera.camera();
        if camera != self.last_camera {
            self.events.publish(SceneEvent::CameraChanged {
                scale: camera.scale,
                translate_x: camera.translate_x,
                translate_y: camera.translate_y,
            });
            self.last_camera = camera;
            self.dirty = true;
        }

        let nodes = self.node_count();
        self.callbacks.on_stats(self.fps, nodes);
    }

    /// Build this frame's display list.
    ///
    /// Paint order: trail, compare overlay, edges, nodes, avatars, then
    /// atlas quads (score pills and labels).
    pub fn build_frame(&mut self, now_ms: f64) -> FrameList {
        let viewport = self.camera.viewport();
        let camera = self.camera.camera();
        let mut frame = FrameList::new(
            viewport.width as u32,
            viewport.height as u32,
            self.config.background,
        );
        let foreground_center = self.foreground.as_ref().filter(|t| !t.is_empty()).map(|t| t.focus_or_anchor());
        push_trail(&mut frame, &self.trail, &camera, foreground_center, &self.config.edges);

        let Some(tile) = self.foreground.as_ref() else {
            self.labels.clear();
            return frame;
        };
        if let Some(overlay) = &tile.compare_overlay {
            push_compare_overlay(&mut frame, overlay, &camera, &self.config.overlay);
        }

        let n = tile.count();
        let budget = self.budget.state();
        let mask = self.props.mask(n);
        let selected = self.props.selected(n);

        // Edges
        let segments = select_edges(
            &EdgeQuery {
                tile,
                camera,
                viewport,
                max_edges: budget.max_edges,
                mask,
                degree: self.props.degree_highlight,
            },
            &self.config.edges,
        );
        for segment in &segments {
            frame.push(DrawItem::Line {
                from: segment.from,
                to: segment.to,
                width: self.config.edges.line_width_px,
                color: segment.channel.color(),
            });
        }
        frame.stats.edges = segments.len();

        // Nodes
        let style = &self.config.nodes;
        let stride = budget.node_stride.max(1);
        let mut avatar_draws = Vec::new();
        for i in 0..n {
            if mask.is_hidden(i) {
                continue;
            }
            let pinned = i < 2 || Some(i) == selected;
            if !pinned && i % stride != 0 {
                continue;
            }
            let Some([x, y]) = tile.position(i) else {
                continue;
            };
            let center = camera.world_to_screen(x, y);
            let radius = style.radius_px(tile.size(i));
            if !(center.0.is_finite() && center.1.is_finite())
                || center.0 < -radius
                || center.0 > viewport.width + radius
                || center.1 < -radius
                || center.1 > viewport.height + radius
            {
                continue;
            }
            let mut fill = node_color(tile.group(i)).with_alpha(tile.alpha(i));
            if mask.is_dimmed(i) {
                fill = fill.fade(style.dim_alpha);
            }
            frame.push(DrawItem::Circle {
                center,
                radius,
                fill,
                outline: Some((style.outline, style.outline_width_px)),
            });
            if Some(i) == selected {
                frame.push(DrawItem::Circle {
                    center,
                    radius: radius + style.selection_gap_px,
                    fill: Rgba::TRANSPARENT,
                    outline: Some((style.selection_color, style.selection_width_px)),
                });
            }
            frame.stats.nodes += 1;

            if radius >= self.avatars.config().min_draw_px {
                if let Some(reference) = tile.avatar_ref(i) {
                    avatar_draws.push((i, center, radius, reference));
                }
            }
        }

        // Avatars
        for (i, center, radius, reference) in avatar_draws {
            match self.avatars.get(i) {
                Some(image) => {
                    frame.push(DrawItem::Avatar {
                        node: i,
                        center,
                        radius,
                        image: image.clone(),
                    });
                    frame.stats.avatars += 1;
                }
                None => {
                    self.avatars.request(i, reference);
                }
            }
        }

        // Score pills, then labels, all sampled from the atlas
        let mut texts: Vec<(String, (f32, f32), f32)> = Vec::new();
        if camera.scale >= self.config.edges.score_min_zoom {
            for segment in segments.iter().take(self.config.edges.max_score_pills) {
                if let Some(weight) = segment.weight {
                    texts.push((format_score(weight), segment.midpoint(), 1.0));
                }
            }
        }

        self.labels = self.placer.place(
            &PlacementInput {
                tile,
                camera,
                viewport,
                max_labels: budget.max_labels,
                mask,
                selected,
                now_ms,
            },
            &mut self.atlas,
        );
        for record in &self.labels {
            if let Some(text) = tile.label(record.node_index) {
                texts.push((text.to_string(), (record.screen_x, record.screen_y), record.alpha));
            }
        }
        frame.stats.labels = self.labels.len();

        let resets = self.atlas.resets();
        let mut entries: Vec<_> = texts.iter().map(|(t, _, _)| self.atlas.ensure(t)).collect();
        if self.atlas.resets() != resets {
            // The atlas filled up mid-frame; earlier entries point at cleared
            // space, so pack everything again into the fresh generation
            debug!(texts = texts.len(), "atlas reset while building frame");
            entries = texts.iter().map(|(t, _, _)| self.atlas.ensure(t)).collect();
        }
        for ((_, (cx, cy), alpha), entry) in texts.iter().zip(entries) {
            frame.push(DrawItem::AtlasQuad {
                origin: (cx - entry.width as f32 / 2.0, cy - entry.height as f32 / 2.0),
                entry,
                alpha: *alpha,
            });
        }

        frame
    }

    /// Record the drawn frame's counters and clear the redraw flag
    pub fn finish_frame(&mut self, stats: FrameStats) {
        self.last_stats = stats;
        self.dirty = false;
    }
}

/// Sort `values` and return the range left after trimming `percentile` from
/// each end. Percentiles outside `(0, 0.5)` keep the full range.
fn trimmed_range(values: &mut [f32], percentile: Option<f32>) -> (f32, f32) {
    values.sort_by(f32::total_cmp);
    let len = values.len();
    let mut k = match percentile {
        Some(p) if p > 0.0 && p < 0.5 => (p * len as f32).floor() as usize,
        _ => 0,
    };
    if 2 * k >= len {
        k = (len - 1) / 2;
    }
    (values[k], values[len - 1 - k])
}

/// Labels of the form `person:N` or `company:N`
fn is_entity_label(label: &str) -> bool {
    label.split_once(':').is_some_and(|(prefix, digits)| {
        (prefix.eq_ignore_ascii_case("person") || prefix.eq_ignore_ascii_case("company"))
            && !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
    })
}

fn format_score(weight: f32) -> String {
    if weight.fract() == 0.0 {
        format!("{weight:.0}")
    } else {
        format!("{weight:.2}")
    }
}
