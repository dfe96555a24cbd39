//! Engine configuration
//!
//! One document with a section per subsystem. Every section carries serde
//! defaults, so a config file only has to name what it changes. YAML and JSON
//! are accepted, chosen by file extension.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::budget::BudgetConfig;
use crate::camera::CameraConfig;
use crate::color::Rgba;
use crate::edges::EdgeConfig;
use crate::error::{SceneError, SceneResult};
use crate::frame::{NodeStyle, OverlayStyle};
use crate::labels::LabelConfig;
use crate::layout::LayoutConfig;
use crate::picking::PickConfig;
use crate::resources::AvatarConfig;
use crate::trail::TrailConfig;

/// Which renderer draws the display list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Software rasterizer, always available
    #[default]
    Cpu,
    /// wgpu renderer, requires the `gpu` feature
    Gpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Cpu => "cpu",
            Backend::Gpu => "gpu",
        })
    }
}

impl FromStr for Backend {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "canvas" | "raster" => Ok(Backend::Cpu),
            "gpu" | "wgpu" => Ok(Backend::Gpu),
            other => Err(SceneError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Initial output size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub viewport: ViewportConfig,
    pub camera: CameraConfig,
    pub budget: BudgetConfig,
    pub labels: LabelConfig,
    pub trail: TrailConfig,
    pub picking: PickConfig,
    pub avatars: AvatarConfig,
    pub layout: LayoutConfig,
    pub edges: EdgeConfig,
    pub nodes: NodeStyle,
    pub overlay: OverlayStyle,
    pub backend: Backend,
    pub background: Rgba,
    /// Directory searched for a label font; labels fall back to block glyphs
    /// when absent
    pub fonts: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: ViewportConfig::default(),
            camera: CameraConfig::default(),
            budget: BudgetConfig::default(),
            labels: LabelConfig::default(),
            trail: TrailConfig::default(),
            picking: PickConfig::default(),
            avatars: AvatarConfig::default(),
            layout: LayoutConfig::default(),
            edges: EdgeConfig::default(),
            nodes: NodeStyle::default(),
            overlay: OverlayStyle::default(),
            backend: Backend::Cpu,
            background: Rgba::rgb8(11, 11, 16, 1.0),
            fonts: None,
        }
    }
}

impl EngineConfig {
    /// Load a config file, dispatching on its extension
    pub fn from_path(path: &Path) -> SceneResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| SceneError::Config(format!("could not determine format of {}", path.display())))?;
        let content = std::fs::read_to_string(path)?;
        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(SceneError::Config(format!("unsupported config format '.{other}'"))),
        }
    }

    pub fn from_yaml_str(content: &str) -> SceneResult<Self> {
        serde_yaml::from_str(content).map_err(|e| SceneError::Parse(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> SceneResult<Self> {
        serde_json::from_str(content).map_err(|e| SceneError::Parse(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> SceneResult<String> {
        serde_yaml::to_string(self).map_err(|e| SceneError::Parse(e.to_string()))
    }
}
