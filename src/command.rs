//! Serializable commands for driving an engine from outside the process
//!
//! The dev server accepts these as JSON on `POST /command`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{FocusOptions, KeyInput, SceneEngine};
use crate::host::{DegreeHighlight, MaskMode};
use crate::layout::{LayoutMode, ReshapeOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineCommand {
    Focus {
        index: usize,
        #[serde(default)]
        options: FocusOptions,
    },
    Reshape {
        mode: LayoutMode,
        #[serde(default)]
        options: ReshapeOptions,
    },
    Promote,
    Clear,
    Key {
        key: KeyInput,
    },
    Pan {
        dx: f32,
        dy: f32,
    },
    Zoom {
        x: f32,
        y: f32,
        factor: f32,
    },
    Fit,
    Resize {
        width: u32,
        height: u32,
    },
    /// `None` clears the selection
    Select {
        index: Option<usize>,
    },
    MaskMode {
        mode: MaskMode,
    },
    DegreeHighlight {
        highlight: DegreeHighlight,
    },
}

impl EngineCommand {
    /// Apply the command. Returns false only when it had nothing to act on.
    pub fn apply(&self, engine: &mut dyn SceneEngine) -> bool {
        debug!(command = ?self, "applying command");
        match self {
            EngineCommand::Focus { index, options } => engine.focus_index(*index, *options),
            EngineCommand::Reshape { mode, options } => engine.reshape_layout(*mode, *options),
            EngineCommand::Promote => return engine.promote_trail_previous(),
            EngineCommand::Clear => engine.clear(),
            EngineCommand::Key { key } => engine.key(*key),
            EngineCommand::Pan { dx, dy } => engine.pan(*dx, *dy),
            EngineCommand::Zoom { x, y, factor } => engine.zoom_at(*x, *y, *factor),
            EngineCommand::Fit => engine.fit_to_content(),
            EngineCommand::Resize { width, height } => engine.resize(*width, *height),
            EngineCommand::Select { index } => {
                let mut props = engine.props().clone();
                props.selected_index = *index;
                engine.set_props(props);
            }
            EngineCommand::MaskMode { mode } => {
                let mut props = engine.props().clone();
                props.mask_mode = *mode;
                engine.set_props(props);
            }
            EngineCommand::DegreeHighlight { highlight } => {
                let mut props = engine.props().clone();
                props.degree_highlight = *highlight;
                engine.set_props(props);
            }
        }
        true
    }
}
