//! Frame-time budget controller
//!
//! A feedback loop over an exponential moving average of frame time. When
//! frames run long the label and edge budgets shrink and the node stride grows;
//! when they run short the budgets creep back up. Between the two thresholds
//! nothing changes, which keeps the loop from oscillating.

use serde::{Deserialize, Serialize};

/// Tuning for the budget controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub initial_labels: usize,
    pub initial_edges: usize,
    /// Seed value for the frame-time average
    pub initial_frame_ms: f64,
    /// Weight of the previous average in each update
    pub ema_decay: f64,
    /// Degrade when the average exceeds this
    pub upper_threshold_ms: f64,
    /// Improve when the average drops below this
    pub lower_threshold_ms: f64,
    pub shrink_factor: f64,
    pub stride_growth: f64,
    pub label_step: usize,
    pub edge_step: usize,
    pub min_labels: usize,
    pub max_labels: usize,
    pub min_edges: usize,
    pub max_edges: usize,
    pub max_stride: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            initial_labels: 220,
            initial_edges: 8000,
            initial_frame_ms: 16.0,
            ema_decay: 0.9,
            upper_threshold_ms: 18.0,
            lower_threshold_ms: 14.0,
            shrink_factor: 0.9,
            stride_growth: 1.25,
            label_step: 20,
            edge_step: 1000,
            min_labels: 50,
            max_labels: 1200,
            min_edges: 2000,
            max_edges: 60_000,
            max_stride: 8,
        }
    }
}

/// What the current frame is allowed to draw
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub max_labels: usize,
    pub max_edges: usize,
    pub node_stride: usize,
    pub frame_time_ema: f64,
}

/// Direction of the last adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetTrend {
    Degrade,
    Hold,
    Improve,
}

#[derive(Debug, Clone)]
pub struct BudgetController {
    config: BudgetConfig,
    state: BudgetState,
}

impl BudgetController {
    pub fn new(config: BudgetConfig) -> Self {
        let state = BudgetState {
            max_labels: config.initial_labels,
            max_edges: config.initial_edges,
            node_stride: 1,
            frame_time_ema: config.initial_frame_ms,
        };
        Self { config, state }
    }

    pub fn state(&self) -> BudgetState {
        self.state
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Fold the previous frame's wall-clock delta into the average and adjust
    /// the budgets. Non-finite or negative deltas are ignored.
    pub fn observe(&mut self, frame_ms: f64) -> BudgetTrend {
        if !frame_ms.is_finite() || frame_ms < 0.0 {
            return BudgetTrend::Hold;
        }
        let cfg = &self.config;
        let s = &mut self.state;
        s.frame_time_ema = cfg.ema_decay * s.frame_time_ema + (1.0 - cfg.ema_decay) * frame_ms;

        if s.frame_time_ema > cfg.upper_threshold_ms {
            s.max_labels = scale_down(s.max_labels, cfg.shrink_factor).max(cfg.min_labels);
            s.max_edges = scale_down(s.max_edges, cfg.shrink_factor).max(cfg.min_edges);
            let grown = ((s.node_stride as f64) * cfg.stride_growth).ceil() as usize;
            s.node_stride = grown.max(s.node_stride + 1).min(cfg.max_stride).max(1);
            BudgetTrend::Degrade
        } else if s.frame_time_ema < cfg.lower_threshold_ms {
            s.max_labels = (s.max_labels + cfg.label_step).min(cfg.max_labels);
            s.max_edges = (s.max_edges + cfg.edge_step).min(cfg.max_edges);
            s.node_stride = s.node_stride.saturating_sub(1).max(1);
            BudgetTrend::Improve
        } else {
            BudgetTrend::Hold
        }
    }
}

fn scale_down(value: usize, factor: f64) -> usize {
    ((value as f64) * factor).floor() as usize
}
