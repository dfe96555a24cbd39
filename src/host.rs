//! Contracts between the engine and the host UI
//!
//! The host pushes display props in and receives callbacks out. It never
//! reaches into engine state.

use serde::{Deserialize, Serialize};

/// How nodes outside the visibility mask are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    /// Excluded from drawing, picking and labels
    #[default]
    Hide,
    /// Drawn at reduced alpha, still pickable
    Dim,
}

/// Which edges to keep in person mode, by hop distance from node 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegreeHighlight {
    #[default]
    All,
    First,
    Second,
}

/// Compare-mode hit regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Left,
    Right,
    Overlap,
}

/// Display props re-applied on every tile swap or change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProps {
    pub visibility_mask: Option<Vec<bool>>,
    pub mask_mode: MaskMode,
    pub selected_index: Option<usize>,
    pub degree_highlight: DegreeHighlight,
}

impl HostProps {
    /// A mask view for a tile of `count` nodes. Masks of the wrong length are
    /// ignored.
    pub fn mask(&self, count: usize) -> NodeMask<'_> {
        NodeMask {
            mask: self
                .visibility_mask
                .as_deref()
                .filter(|m| m.len() == count),
            mode: self.mask_mode,
        }
    }

    /// Selected node, if it exists in a tile of `count` nodes
    pub fn selected(&self, count: usize) -> Option<usize> {
        self.selected_index.filter(|&i| i < count)
    }
}

/// Per-frame view of the visibility mask
#[derive(Debug, Clone, Copy)]
pub struct NodeMask<'a> {
    mask: Option<&'a [bool]>,
    mode: MaskMode,
}

impl NodeMask<'_> {
    /// A mask that lets everything through
    pub fn all_visible() -> Self {
        NodeMask {
            mask: None,
            mode: MaskMode::Hide,
        }
    }

    pub fn mode(&self) -> MaskMode {
        self.mode
    }

    fn masked_out(&self, index: usize) -> bool {
        self.mask.is_some_and(|m| !m.get(index).copied().unwrap_or(true))
    }

    /// Excluded from drawing, picking and labels
    pub fn is_hidden(&self, index: usize) -> bool {
        self.mode == MaskMode::Hide && self.masked_out(index)
    }

    /// Drawn at reduced alpha
    pub fn is_dimmed(&self, index: usize) -> bool {
        self.mode == MaskMode::Dim && self.masked_out(index)
    }
}

/// Callbacks from the engine to the host. Every method defaults to a no-op.
pub trait HostCallbacks: Send {
    /// Called once per frame with the measured frame rate
    fn on_stats(&mut self, _fps: f32, _node_count: usize) {}
    fn on_pick(&mut self, _index: usize) {}
    fn on_clear(&mut self) {}
    fn on_region_click(&mut self, _region: Region) {}
    fn on_unselect(&mut self) {}
    /// An external "insert this entity id" request arrived on the event bus
    fn on_insert_request(&mut self, _id: &str) {}
}

/// Callbacks that ignore everything
#[derive(Debug, Default)]
pub struct NoopCallbacks;

impl HostCallbacks for NoopCallbacks {}
