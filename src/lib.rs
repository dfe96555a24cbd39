//! graphscene - A rendering and interaction engine for large graph scenes.
//!
//! The engine owns a camera, a frame budget, label and avatar resources, a
//! short trail of previous scenes and layout transitions. Each frame it builds
//! a backend-neutral display list that a CPU rasterizer or a wgpu renderer
//! (feature `gpu`) turns into pixels.

pub mod animation;
pub mod budget;
pub mod camera;
pub mod canvas;
pub mod color;
pub mod command;
pub mod config;
pub mod edges;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod host;
pub mod labels;
pub mod layout;
pub mod picking;
pub mod raster;
pub mod resources;
pub mod scene;
pub mod tile;
pub mod trail;

pub use camera::{Camera, CameraController, Viewport, WorldBounds};
pub use command::EngineCommand;
pub use config::{Backend, EngineConfig};
pub use engine::{
    BoundsOptions, CameraSnapshot, FocusOptions, ForegroundOptions, KeyInput, RasterScene, SceneEngine,
    SceneStats, Visibility, build_engine,
};
#[cfg(feature = "gpu")]
pub use engine::GpuScene;
pub use error::{SceneError, SceneResult};
pub use events::SceneEvent;
pub use host::{DegreeHighlight, HostCallbacks, HostProps, MaskMode, Region};
pub use layout::{LayoutMode, ReshapeOptions};
pub use tile::GraphTile;
