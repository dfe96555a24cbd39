use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use graphscene::{Backend, EngineConfig, ForegroundOptions, GraphTile, LayoutMode, SceneEngine, build_engine};

/// Render and serve large graph scenes.
#[derive(Parser)]
#[command(name = "graphscene")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Options shared by every command that builds an engine
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Graph tile to load (.json or .bin)
    #[arg(short, long)]
    pub tile: PathBuf,

    /// Engine config (.yaml, .yml or .json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Renderer backend
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Output width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Directory holding a label font
    #[arg(long)]
    pub fonts: Option<PathBuf>,

    /// Root directory for node avatars
    #[arg(long)]
    pub avatars: Option<PathBuf>,
}

impl EngineArgs {
    /// The config file, if any, with command-line overrides applied
    pub fn load_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_path(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(width) = self.width {
            config.viewport.width = width;
        }
        if let Some(height) = self.height {
            config.viewport.height = height;
        }
        if let Some(fonts) = &self.fonts {
            config.fonts = Some(fonts.clone());
        }
        if let Some(avatars) = &self.avatars {
            config.avatars.root = Some(avatars.clone());
        }
        Ok(config)
    }

    /// Build an engine with the tile installed as foreground
    pub fn build(&self) -> anyhow::Result<Box<dyn SceneEngine>> {
        let config = self.load_config()?;
        let tile = GraphTile::from_path(&self.tile)
            .with_context(|| format!("failed to load tile {}", self.tile.display()))?;
        let mut engine = build_engine(&config)?;
        engine.set_foreground(tile, ForegroundOptions::default());
        Ok(engine)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a tile to a PNG
    Render {
        #[command(flatten)]
        engine: EngineArgs,

        /// Output PNG file
        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,

        /// Number of simulated 16 ms frames to run before writing
        #[arg(short = 'n', long, default_value = "90")]
        frames: u32,

        /// Reshape the tile before rendering
        #[arg(short, long, value_enum)]
        layout: Option<LayoutMode>,

        /// Center the camera on this node index
        #[arg(short, long)]
        focus: Option<usize>,
    },
    /// Keep an engine alive and serve its frames with live commands
    Serve {
        #[command(flatten)]
        engine: EngineArgs,

        /// Output directory for rendered frames
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Port to run the server on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}
