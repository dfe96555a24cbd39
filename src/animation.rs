//! Easing and per-frame tweening
//!
//! Animations in the engine are never blocking waits. They are a start time, a
//! duration and an easing curve, advanced once per frame by whoever owns them.

/// Quadratic ease-in-out on `t` in `[0, 1]`.
pub fn ease_in_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        -1.0 + (4.0 - 2.0 * t) * t
    }
}

/// Linear interpolation between `a` and `b`.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Resolve a requested duration against a default and a clamp window.
pub fn clamp_duration(requested: Option<f64>, default_ms: f64, min_ms: f64, max_ms: f64) -> f64 {
    requested
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .unwrap_or(default_ms)
        .clamp(min_ms, max_ms)
}

/// A time window that starts on the first frame that observes it.
///
/// Commands do not know the frame clock, so the start time is latched lazily by
/// the first call to [`Tween::progress`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    start_ms: Option<f64>,
    duration_ms: f64,
}

impl Tween {
    /// Create a tween lasting `duration_ms`
    pub fn new(duration_ms: f64) -> Self {
        Self {
            start_ms: None,
            duration_ms: duration_ms.max(1.0),
        }
    }

    /// Linear progress in `[0, 1]` at `now_ms`
    pub fn progress(&mut self, now_ms: f64) -> f32 {
        let start = *self.start_ms.get_or_insert(now_ms);
        (((now_ms - start) / self.duration_ms).clamp(0.0, 1.0)) as f32
    }

    /// Eased progress at `now_ms`
    pub fn eased(&mut self, now_ms: f64) -> f32 {
        ease_in_out_quad(self.progress(now_ms))
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easing_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_quad(0.0), 0.0);
        assert_eq!(ease_in_out_quad(1.0), 1.0);
        assert!((ease_in_out_quad(0.5) - 0.5).abs() < 1e-6);
        assert!((ease_in_out_quad(0.25) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn easing_clamps_out_of_range_input() {
        assert_eq!(ease_in_out_quad(-3.0), 0.0);
        assert_eq!(ease_in_out_quad(7.0), 1.0);
    }

    #[test]
    fn easing_is_monotonic() {
        let mut prev = 0.0;
        for i in 0..=100 {
            let v = ease_in_out_quad(i as f32 / 100.0);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn duration_clamps_and_defaults() {
        assert_eq!(clamp_duration(None, 700.0, 200.0, 1200.0), 700.0);
        assert_eq!(clamp_duration(Some(50.0), 700.0, 200.0, 1200.0), 200.0);
        assert_eq!(clamp_duration(Some(5000.0), 700.0, 200.0, 1200.0), 1200.0);
        assert_eq!(clamp_duration(Some(f64::NAN), 700.0, 200.0, 1200.0), 700.0);
    }

    #[test]
    fn tween_latches_start_on_first_frame() {
        let mut tween = Tween::new(100.0);
        assert_eq!(tween.progress(1000.0), 0.0);
        assert!((tween.progress(1050.0) - 0.5).abs() < 1e-6);
        assert_eq!(tween.progress(1100.0), 1.0);
        assert_eq!(tween.progress(5000.0), 1.0);
    }
}
