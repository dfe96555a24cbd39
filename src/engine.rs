//! The engine handle hosts talk to
//!
//! [`SceneEngine`] is the whole command surface. Both backends implement it
//! through [`Scene`], which pairs the backend-agnostic [`SceneState`] with a
//! [`FrameRenderer`]. Hosts normally hold a `Box<dyn SceneEngine>` from
//! [`build_engine`] and never name a backend type.

use std::path::Path;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::budget::BudgetState;
use crate::camera::{Viewport, WorldBounds};
use crate::canvas::Canvas;
use crate::config::{Backend, EngineConfig};
use crate::error::SceneResult;
use crate::events::SceneEvent;
use crate::frame::{FrameList, FrameStats};
use crate::host::{HostCallbacks, HostProps};
use crate::labels::LabelAtlas;
use crate::layout::{LayoutMode, ReshapeOptions};
use crate::raster::RasterRenderer;
use crate::scene::SceneState;
use crate::tile::GraphTile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForegroundOptions {
    /// Install the tile without pushing the outgoing one onto the trail
    pub skip_trail_snapshot: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusOptions {
    /// Absolute target zoom; wins over `zoom_multiplier`
    pub zoom: Option<f32>,
    /// Target zoom relative to the current one
    pub zoom_multiplier: Option<f32>,
    pub animate: bool,
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsOptions {
    /// Overrides the host visibility mask when its length matches the tile
    pub mask: Option<Vec<bool>>,
    pub group: Option<u16>,
    /// Fraction trimmed from each end of x and y, in `(0, 0.5)`
    pub drop_percentile: Option<f32>,
}

/// How much of a world rectangle the viewport currently shows
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Visibility {
    pub visible_fraction: f32,
    pub viewport: WorldBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraSnapshot {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
    pub viewport: Viewport,
    pub viewport_world: WorldBounds,
}

/// Keyboard shortcuts the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyInput {
    ZoomIn,
    ZoomOut,
    Fit,
    Reset,
    Escape,
}

impl KeyInput {
    /// Map a DOM-style key name
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "+" | "=" => Some(KeyInput::ZoomIn),
            "-" | "_" => Some(KeyInput::ZoomOut),
            "r" | "R" => Some(KeyInput::Fit),
            "c" | "C" => Some(KeyInput::Reset),
            "Escape" | "Esc" => Some(KeyInput::Escape),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SceneStats {
    pub fps: f32,
    pub node_count: usize,
    pub edge_count: usize,
    pub frame: FrameStats,
    pub budget: BudgetState,
    pub trail_len: usize,
    pub atlas_entries: usize,
    pub atlas_resets: u64,
    pub label_stride: usize,
    pub avatars_cached: usize,
    pub avatars_in_flight: usize,
}

/// The command surface shared by every backend
pub trait SceneEngine: Send {
    fn backend(&self) -> Backend;

    fn set_foreground(&mut self, tile: GraphTile, options: ForegroundOptions);
    fn clear(&mut self);
    fn focus_index(&mut self, index: usize, options: FocusOptions);
    fn reshape_layout(&mut self, mode: LayoutMode, options: ReshapeOptions);
    /// Swap the newest trail entry back in. False when the trail is empty.
    fn promote_trail_previous(&mut self) -> bool;

    fn camera(&self) -> CameraSnapshot;
    fn measure_foreground_bounds(&self, options: &BoundsOptions) -> Option<WorldBounds>;
    fn measure_group_bounds(&self, group: u16, options: &BoundsOptions) -> Option<WorldBounds>;
    fn visibility_for_bounds(&self, bounds: &WorldBounds) -> Visibility;

    fn set_props(&mut self, props: HostProps);
    fn props(&self) -> &HostProps;
    fn set_callbacks(&mut self, callbacks: Box<dyn HostCallbacks>);
    fn resize(&mut self, width: u32, height: u32);

    fn pointer_down(&mut self, x: f32, y: f32);
    fn pointer_move(&mut self, x: f32, y: f32);
    fn pointer_up(&mut self, x: f32, y: f32);
    fn double_click(&mut self, x: f32, y: f32);
    fn wheel(&mut self, x: f32, y: f32, delta_y: f32);
    fn key(&mut self, key: KeyInput);
    fn fit_to_content(&mut self);
    fn pan(&mut self, dx: f32, dy: f32);
    fn zoom_at(&mut self, x: f32, y: f32, factor: f32);

    /// Advance animations and draw one frame at host time `now_ms`
    fn frame(&mut self, now_ms: f64);
    /// True when something changed since the last drawn frame
    fn needs_redraw(&self) -> bool;
    fn stats(&self) -> SceneStats;
    /// Outbound events: camera and layout changes
    fn events(&self) -> Receiver<SceneEvent>;
    /// Inbound events, drained at the start of every frame
    fn inbox(&self) -> Sender<SceneEvent>;
    /// The last rendered frame
    fn pixels(&self) -> &Canvas;

    fn save_png(&self, path: &Path) -> SceneResult<()> {
        self.pixels().save_png(path)
    }
}

/// Turns display lists into pixels
pub trait FrameRenderer: Send {
    fn backend(&self) -> Backend;
    fn resize(&mut self, width: u32, height: u32);
    /// Draw `frame`. The atlas is mutable so uploads can clear its dirty flag.
    fn render(&mut self, frame: &FrameList, atlas: &mut LabelAtlas);
    fn pixels(&self) -> &Canvas;
}

/// An engine: shared scene state plus one renderer
pub struct Scene<R> {
    state: SceneState,
    renderer: R,
}

pub type RasterScene = Scene<RasterRenderer>;

#[cfg(feature = "gpu")]
pub type GpuScene = Scene<crate::gpu::GpuRenderer>;

impl<R: FrameRenderer> Scene<R> {
    pub fn with_renderer(config: EngineConfig, renderer: R) -> Self {
        Self {
            state: SceneState::new(config),
            renderer,
        }
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SceneState {
        &mut self.state
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

impl RasterScene {
    pub fn new(config: EngineConfig) -> Self {
        let renderer = RasterRenderer::new(config.viewport.width, config.viewport.height);
        Self::with_renderer(config, renderer)
    }
}

#[cfg(feature = "gpu")]
impl GpuScene {
    /// Create a device and a renderer sized to the configured viewport
    pub fn create(config: EngineConfig) -> SceneResult<Self> {
        let renderer = crate::gpu::GpuRenderer::create(
            config.viewport.width,
            config.viewport.height,
            config.labels.atlas_size,
        )?;
        Ok(Self::with_renderer(config, renderer))
    }
}

impl<R: FrameRenderer> SceneEngine for Scene<R> {
    fn backend(&self) -> Backend {
        self.renderer.backend()
    }

    fn set_foreground(&mut self, tile: GraphTile, options: ForegroundOptions) {
        self.state.set_foreground(tile, options);
    }

    fn clear(&mut self) {
        self.state.clear();
    }

    fn focus_index(&mut self, index: usize, options: FocusOptions) {
        self.state.focus_index(index, options);
    }

    fn reshape_layout(&mut self, mode: LayoutMode, options: ReshapeOptions) {
        self.state.reshape_layout(mode, options);
    }

    fn promote_trail_previous(&mut self) -> bool {
        self.state.promote_trail_previous()
    }

    fn camera(&self) -> CameraSnapshot {
        self.state.camera_snapshot()
    }

    fn measure_foreground_bounds(&self, options: &BoundsOptions) -> Option<WorldBounds> {
        self.state.measure_bounds(options.group, options)
    }

    fn measure_group_bounds(&self, group: u16, options: &BoundsOptions) -> Option<WorldBounds> {
        self.state.measure_bounds(Some(group), options)
    }

    fn visibility_for_bounds(&self, bounds: &WorldBounds) -> Visibility {
        self.state.visibility_for_bounds(bounds)
    }

    fn set_props(&mut self, props: HostProps) {
        self.state.set_props(props);
    }

    fn props(&self) -> &HostProps {
        self.state.props()
    }

    fn set_callbacks(&mut self, callbacks: Box<dyn HostCallbacks>) {
        self.state.set_callbacks(callbacks);
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.state.resize(width, height);
        self.renderer.resize(width, height);
    }

    fn pointer_down(&mut self, x: f32, y: f32) {
        self.state.pointer_down(x, y);
    }

    fn pointer_move(&mut self, x: f32, y: f32) {
        self.state.pointer_move(x, y);
    }

    fn pointer_up(&mut self, x: f32, y: f32) {
        self.state.pointer_up(x, y);
    }

    fn double_click(&mut self, x: f32, y: f32) {
        self.state.double_click(x, y);
    }

    fn wheel(&mut self, x: f32, y: f32, delta_y: f32) {
        self.state.wheel(x, y, delta_y);
    }

    fn key(&mut self, key: KeyInput) {
        self.state.key(key);
    }

    fn fit_to_content(&mut self) {
        self.state.fit_to_content();
    }

    fn pan(&mut self, dx: f32, dy: f32) {
        self.state.pan(dx, dy);
    }

    fn zoom_at(&mut self, x: f32, y: f32, factor: f32) {
        self.state.zoom_at(x, y, factor);
    }

    fn frame(&mut self, now_ms: f64) {
        self.state.advance(now_ms);
        let list = self.state.build_frame(now_ms);
        self.renderer.render(&list, self.state.atlas_mut());
        self.state.finish_frame(list.stats);
    }

    fn needs_redraw(&self) -> bool {
        self.state.needs_redraw()
    }

    fn stats(&self) -> SceneStats {
        self.state.stats()
    }

    fn events(&self) -> Receiver<SceneEvent> {
        self.state.events().receiver()
    }

    fn inbox(&self) -> Sender<SceneEvent> {
        self.state.inbox().sender()
    }

    fn pixels(&self) -> &Canvas {
        self.renderer.pixels()
    }
}

/// Build the engine named by `config.backend`
pub fn build_engine(config: &EngineConfig) -> SceneResult<Box<dyn SceneEngine>> {
    info!(backend = %config.backend, width = config.viewport.width, height = config.viewport.height, "creating scene engine");
    match config.backend {
        Backend::Cpu => Ok(Box::new(RasterScene::new(config.clone()))),
        #[cfg(feature = "gpu")]
        Backend::Gpu => Ok(Box::new(GpuScene::create(config.clone())?)),
        #[cfg(not(feature = "gpu"))]
        Backend::Gpu => Err(crate::error::SceneError::Unsupported(
            "the gpu backend needs the `gpu` cargo feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SceneError;

    fn engine() -> Box<dyn SceneEngine> {
        let config = EngineConfig {
            viewport: crate::config::ViewportConfig {
                width: 200,
                height: 100,
            },
            ..Default::default()
        };
        build_engine(&config).unwrap()
    }

    #[test]
    fn cpu_backend_builds_and_renders_background() {
        let mut engine = engine();
        assert_eq!(engine.backend(), Backend::Cpu);
        engine.frame(0.0);
        let pixels = engine.pixels();
        assert_eq!((pixels.width(), pixels.height()), (200, 100));
        assert_eq!(pixels.pixel(10, 10), Some(EngineConfig::default().background.to_rgba8()));
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_backend_without_feature_is_unsupported() {
        let config = EngineConfig {
            backend: Backend::Gpu,
            ..Default::default()
        };
        assert!(matches!(build_engine(&config), Err(SceneError::Unsupported(_))));
    }

    #[test]
    fn frame_draws_foreground_nodes() {
        let mut engine = engine();
        let tile = GraphTile::new(vec![[0.0, 0.0], [40.0, 0.0]]).with_edges(vec![[0, 1]]);
        engine.set_foreground(tile, ForegroundOptions::default());
        assert!(engine.needs_redraw());
        engine.frame(0.0);
        engine.frame(2000.0);
        assert!(!engine.needs_redraw());
        let stats = engine.stats();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.frame.nodes, 2);
        assert_eq!(stats.frame.edges, 1);

        let background = EngineConfig::default().background.to_rgba8();
        let drawn = engine.pixels().as_bytes().chunks(4).filter(|p| *p != background).count();
        assert!(drawn > 0, "expected node pixels");
    }

    #[test]
    fn resize_reaches_renderer_and_camera() {
        let mut engine = engine();
        engine.resize(64, 0);
        engine.frame(0.0);
        assert_eq!(engine.pixels().width(), 64);
        assert_eq!(engine.pixels().height(), 1);
        assert_eq!(engine.camera().viewport.width, 64.0);
    }

    #[test]
    fn png_output_is_written() {
        let mut engine = engine();
        engine.frame(0.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        engine.save_png(&path).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (200, 100));
    }

    #[test]
    fn key_names_map_to_inputs() {
        assert_eq!(KeyInput::from_key("="), Some(KeyInput::ZoomIn));
        assert_eq!(KeyInput::from_key("-"), Some(KeyInput::ZoomOut));
        assert_eq!(KeyInput::from_key("Escape"), Some(KeyInput::Escape));
        assert_eq!(KeyInput::from_key("x"), None);
    }
}
