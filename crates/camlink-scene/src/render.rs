//! Render loop bookkeeping and viewport

use serde::{Deserialize, Serialize};

/// Renderer output size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// Continuous render loop that pauses while the surface is hidden.
///
/// Hiding does not stop the scheduled ticks, it only makes them no-ops, so
/// showing the surface again resumes rendering without re-initialization.
#[derive(Debug, Clone)]
pub struct RenderLoop {
    visible: bool,
    frames_rendered: u64,
    ticks_skipped: u64,
    time: f64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            visible: true,
            frames_rendered: 0,
            ticks_skipped: 0,
            time: 0.0,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Advance one tick. Returns `true` if a frame should be rendered.
    pub fn tick(&mut self) -> bool {
        if !self.visible {
            self.ticks_skipped += 1;
            return false;
        }
        self.time += 0.01;
        self.frames_rendered += 1;
        true
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped
    }

    /// Animation clock, advanced only by rendered frames
    pub fn time(&self) -> f64 {
        self.time
    }
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_ticks_are_skipped_then_resume() {
        let mut render_loop = RenderLoop::new();
        assert!(render_loop.tick());
        render_loop.set_visible(false);
        assert!(!render_loop.tick());
        assert!(!render_loop.tick());
        render_loop.set_visible(true);
        assert!(render_loop.tick());

        assert_eq!(render_loop.frames_rendered(), 2);
        assert_eq!(render_loop.ticks_skipped(), 2);
        assert!((render_loop.time() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_viewport_aspect() {
        assert_eq!(Viewport::new(800.0, 400.0).aspect(), 2.0);
        assert_eq!(Viewport::new(800.0, 0.0).aspect(), 1.0);
    }
}
