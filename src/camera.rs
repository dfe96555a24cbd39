//! Camera and viewport calculations for 2D rendering
//!
//! The camera maps world coordinates to screen pixels with
//! `screen = world * scale + translate`. Everything here is pure calculation so
//! it can be tested without a backend.

use serde::{Deserialize, Serialize};

use crate::animation::{Tween, clamp_duration, ease_in_out_quad, lerp};

/// Camera tuning, exposed through the engine config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Minimum zoom level
    pub min_zoom: f32,
    /// Maximum zoom level
    pub max_zoom: f32,
    /// Lower zoom clamp applied to `focus_index` and keyboard zoom
    pub focus_min_zoom: f32,
    /// Duration used when a centering request does not name one
    pub default_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    /// Targets closer than this to the center glide instead of zooming
    pub glide_radius_px: f32,
    /// Residual error tolerated before snap-correction kicks in
    pub snap_tolerance_px: f32,
    /// World-unit padding added around content when fitting
    pub fit_padding: f32,
    /// Largest scale `fit_to_bounds` will choose
    pub fit_max_scale: f32,
    /// Wheel zoom factor is `exp(-delta_y * wheel_sensitivity)`
    pub wheel_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.02,
            max_zoom: 3.5,
            focus_min_zoom: 0.2,
            default_duration_ms: 700.0,
            min_duration_ms: 200.0,
            max_duration_ms: 1200.0,
            glide_radius_px: 60.0,
            snap_tolerance_px: 0.5,
            fit_padding: 140.0,
            fit_max_scale: 1.4,
            wheel_sensitivity: 0.0015,
        }
    }
}

/// The world-to-screen transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }
}

impl Camera {
    /// Convert world coordinates to screen coordinates
    pub fn world_to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.translate_x,
            y * self.scale + self.translate_y,
        )
    }

    /// Convert screen coordinates to world coordinates
    pub fn screen_to_world(&self, sx: f32, sy: f32) -> (f32, f32) {
        (
            (sx - self.translate_x) / self.scale,
            (sy - self.translate_y) / self.scale,
        )
    }
}

/// Size of the drawing surface in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }
}

/// Axis-aligned rectangle in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl WorldBounds {
    /// Create an empty bounding box
    pub fn empty() -> Self {
        Self {
            min_x: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            min_y: f32::INFINITY,
            max_y: f32::NEG_INFINITY,
        }
    }

    pub fn new(min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Check if the bounding box is empty
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Expand the bounding box to include a point
    pub fn include_point(&mut self, x: f32, y: f32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Grow every side by `amount`
    pub fn padded(&self, amount: f32) -> Self {
        Self::new(
            self.min_x - amount,
            self.max_x + amount,
            self.min_y - amount,
            self.max_y + amount,
        )
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Area of the overlap with `other` (zero when disjoint)
    pub fn intersection_area(&self, other: &WorldBounds) -> f32 {
        let ix = (self.max_x.min(other.max_x) - self.min_x.max(other.min_x)).max(0.0);
        let iy = (self.max_y.min(other.max_y) - self.min_y.max(other.min_y)).max(0.0);
        ix * iy
    }
}

/// Options for [`CameraController::center_on_world`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CenterOptions {
    /// Target zoom; keeps the current scale when absent
    pub zoom: Option<f32>,
    pub animate: bool,
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum CameraAnimation {
    /// Move the target's screen position to the center while easing the scale
    Center {
        world: (f32, f32),
        start_scale: f32,
        end_scale: f32,
        start_screen: (f32, f32),
        tween: Tween,
    },
    /// Pure translation for targets that are already near the center
    Glide {
        world: (f32, f32),
        start: (f32, f32),
        end: (f32, f32),
        tween: Tween,
    },
}

/// Owns the camera, the viewport and any running camera animation
#[derive(Debug, Clone)]
pub struct CameraController {
    camera: Camera,
    viewport: Viewport,
    config: CameraConfig,
    animation: Option<CameraAnimation>,
}

impl CameraController {
    pub fn new(viewport: Viewport, config: CameraConfig) -> Self {
        Self {
            camera: Camera::default(),
            viewport,
            config,
            animation: None,
        }
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Clamp a scale into the configured zoom range
    pub fn clamp_zoom(&self, scale: f32) -> f32 {
        if scale.is_finite() {
            scale.clamp(self.config.min_zoom, self.config.max_zoom)
        } else {
            self.camera.scale
        }
    }

    /// Resize the viewport dimensions
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport = Viewport::new(width, height);
    }

    /// Pan the view by delta pixels
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.animation = None;
        self.camera.translate_x += dx;
        self.camera.translate_y += dy;
    }

    /// Zoom by `factor` keeping the world point under `(sx, sy)` fixed
    pub fn zoom_at(&mut self, sx: f32, sy: f32, factor: f32) {
        self.animation = None;
        let (wx, wy) = self.camera.screen_to_world(sx, sy);
        let scale = self.clamp_zoom(self.camera.scale * factor);
        self.camera = Camera {
            scale,
            translate_x: sx - wx * scale,
            translate_y: sy - wy * scale,
        };
    }

    /// Set an absolute scale about the viewport center
    pub fn set_zoom(&mut self, scale: f32) {
        let (cx, cy) = self.viewport.center();
        let factor = self.clamp_zoom(scale) / self.camera.scale;
        self.zoom_at(cx, cy, factor);
    }

    /// Reset view to scale 1 with no translation
    pub fn reset(&mut self) {
        self.animation = None;
        self.camera = Camera::default();
    }

    /// Frame `bounds` (padded by `padding` world units) in the viewport.
    ///
    /// The scale is capped at `max_scale` and then clamped to the zoom range.
    pub fn fit_to_bounds(&mut self, bounds: &WorldBounds, padding: f32, max_scale: f32) {
        if bounds.is_empty() {
            return;
        }
        self.animation = None;
        let padded = bounds.padded(padding);
        let sx = self.viewport.width / padded.width().max(1e-3);
        let sy = self.viewport.height / padded.height().max(1e-3);
        let scale = self.clamp_zoom(sx.min(sy).min(max_scale));
        let (cx, cy) = padded.center();
        let (vx, vy) = self.viewport.center();
        self.camera = Camera {
            scale,
            translate_x: vx - cx * scale,
            translate_y: vy - cy * scale,
        };
    }

    /// Center the camera on a world point.
    ///
    /// Without animation the translation is solved directly and snap-corrected.
    /// With animation a new tween replaces whatever was running, starting from
    /// the current camera.
    pub fn center_on_world(&mut self, x: f32, y: f32, options: CenterOptions) {
        let end_scale = self.clamp_zoom(options.zoom.unwrap_or(self.camera.scale));
        let (vx, vy) = self.viewport.center();

        if !options.animate {
            self.animation = None;
            self.camera = Camera {
                scale: end_scale,
                translate_x: vx - x * end_scale,
                translate_y: vy - y * end_scale,
            };
            self.snap_correct(x, y);
            return;
        }

        let duration = clamp_duration(
            options.duration_ms,
            self.config.default_duration_ms,
            self.config.min_duration_ms,
            self.config.max_duration_ms,
        );
        let start_screen = self.camera.world_to_screen(x, y);
        let distance = (start_screen.0 - vx).hypot(start_screen.1 - vy);
        let zoom_unchanged = (end_scale - self.camera.scale).abs() < 0.01;

        self.animation = Some(if distance < self.config.glide_radius_px && zoom_unchanged {
            let start = (self.camera.translate_x, self.camera.translate_y);
            CameraAnimation::Glide {
                world: (x, y),
                start,
                end: (start.0 + (vx - start_screen.0), start.1 + (vy - start_screen.1)),
                tween: Tween::new(duration),
            }
        } else {
            CameraAnimation::Center {
                world: (x, y),
                start_scale: self.camera.scale,
                end_scale,
                start_screen,
                tween: Tween::new(duration),
            }
        });
    }

    /// Advance the running animation. Returns true when the camera moved.
    pub fn step(&mut self, now_ms: f64) -> bool {
        let Some(mut animation) = self.animation.take() else {
            return false;
        };
        let (vx, vy) = self.viewport.center();

        let (t, world) = match &mut animation {
            CameraAnimation::Center {
                world,
                start_scale,
                end_scale,
                start_screen,
                tween,
            } => {
                let t = tween.progress(now_ms);
                let e = ease_in_out_quad(t);
                let scale = lerp(*start_scale, *end_scale, e);
                let anchor_x = lerp(start_screen.0, vx, e);
                let anchor_y = lerp(start_screen.1, vy, e);
                self.camera = Camera {
                    scale,
                    translate_x: anchor_x - world.0 * scale,
                    translate_y: anchor_y - world.1 * scale,
                };
                (t, *world)
            }
            CameraAnimation::Glide {
                world,
                start,
                end,
                tween,
            } => {
                let t = tween.progress(now_ms);
                let e = ease_in_out_quad(t);
                self.camera.translate_x = lerp(start.0, end.0, e);
                self.camera.translate_y = lerp(start.1, end.1, e);
                (t, *world)
            }
        };

        if t < 1.0 {
            self.animation = Some(animation);
        } else {
            self.snap_correct(world.0, world.1);
        }
        true
    }

    /// Remove residual floating-point error so `(x, y)` projects exactly to
    /// the viewport center. Returns true when a correction was applied.
    pub fn snap_correct(&mut self, x: f32, y: f32) -> bool {
        let (vx, vy) = self.viewport.center();
        let (sx, sy) = self.camera.world_to_screen(x, y);
        let dx = vx - sx;
        let dy = vy - sy;
        let tolerance = self.config.snap_tolerance_px;
        if dx.abs() > tolerance || dy.abs() > tolerance {
            self.camera.translate_x += dx;
            self.camera.translate_y += dy;
            return true;
        }
        false
    }

    /// The part of the world currently visible in the viewport
    pub fn viewport_world_bounds(&self) -> WorldBounds {
        let Camera {
            scale,
            translate_x,
            translate_y,
        } = self.camera;
        WorldBounds::new(
            -translate_x / scale,
            (self.viewport.width - translate_x) / scale,
            -translate_y / scale,
            (self.viewport.height - translate_y) / scale,
        )
    }
}
