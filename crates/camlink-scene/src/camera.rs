//! Perspective camera and orbit controls

use bevy_math::{DMat4, DVec3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::warn;

/// Smallest polar angle kept away from the poles
const POLAR_EPSILON: f64 = 1e-6;
/// Movement below this is not reported as a change
const CHANGE_EPSILON: f64 = 1e-6;
/// Residual input below this is dropped
const INPUT_EPSILON: f64 = 1e-9;

/// Perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub position: DVec3,
    /// Vertical field of view in degrees
    pub fov: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    projection: DMat4,
}

impl PerspectiveCamera {
    pub fn new(position: DVec3, fov: f64, aspect: f64) -> Self {
        let mut camera = Self {
            position,
            fov,
            aspect,
            near: 0.1,
            far: 1000.0,
            projection: DMat4::IDENTITY,
        };
        camera.update_projection();
        camera
    }

    /// Recompute the projection after changing fov, aspect or clip planes
    pub fn update_projection(&mut self) {
        self.projection =
            DMat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far);
    }

    pub fn projection(&self) -> DMat4 {
        self.projection
    }

    pub fn set_aspect(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
            self.update_projection();
        }
    }
}

/// Orbit controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitSettings {
    pub min_distance: f64,
    pub max_distance: f64,
    /// Fraction of remaining input consumed per update; 0 disables damping
    pub damping_factor: f64,
    pub rotate_speed: f64,
    pub pan_speed: f64,
    pub zoom_speed: f64,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            min_distance: 2.0,
            max_distance: 20.0,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            pan_speed: 2.0,
            zoom_speed: 1.0,
        }
    }
}

impl OrbitSettings {
    /// Settings `update` can always apply: non-finite values fall back to
    /// the defaults, an inverted distance range is swapped and damping is
    /// kept within 0..=1.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let finite_or = |value: f64, fallback: f64| if value.is_finite() { value } else { fallback };

        let a = finite_or(self.min_distance, defaults.min_distance).max(0.0);
        let b = finite_or(self.max_distance, defaults.max_distance).max(0.0);
        Self {
            min_distance: a.min(b),
            max_distance: a.max(b),
            damping_factor: finite_or(self.damping_factor, defaults.damping_factor).clamp(0.0, 1.0),
            rotate_speed: finite_or(self.rotate_speed, defaults.rotate_speed),
            pan_speed: finite_or(self.pan_speed, defaults.pan_speed),
            zoom_speed: finite_or(self.zoom_speed, defaults.zoom_speed),
        }
    }
}

/// Orbit / pan / zoom controls around a target point (y-up).
///
/// Input accumulates until [`update`](Self::update) moves the camera. With
/// damping, each update applies a decaying share of the input, so the camera
/// keeps moving for a few frames after the pointer stops.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    settings: OrbitSettings,
    target: DVec3,
    target_resets: u64,
    theta_delta: f64,
    phi_delta: f64,
    pan_offset: DVec3,
    scale: f64,
    interacting: bool,
}

impl OrbitControls {
    pub fn new(settings: OrbitSettings) -> Self {
        let sanitized = settings.clone().sanitized();
        if sanitized != settings {
            warn!(?settings, ?sanitized, "Adjusted unusable orbit settings");
        }
        Self {
            settings: sanitized,
            target: DVec3::ZERO,
            target_resets: 0,
            theta_delta: 0.0,
            phi_delta: 0.0,
            pan_offset: DVec3::ZERO,
            scale: 1.0,
            interacting: false,
        }
    }

    pub fn settings(&self) -> &OrbitSettings {
        &self.settings
    }

    pub fn target(&self) -> DVec3 {
        self.target
    }

    /// Explicitly place the target
    pub fn set_target(&mut self, target: DVec3) {
        self.target = target;
        self.target_resets += 1;
    }

    /// How many times the target was explicitly placed
    pub fn target_resets(&self) -> u64 {
        self.target_resets
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    pub fn begin(&mut self) {
        self.interacting = true;
    }

    /// Finish an interaction. Returns `true` if one was in progress.
    pub fn end(&mut self) -> bool {
        std::mem::replace(&mut self.interacting, false)
    }

    /// Drop any pending or damped input
    pub fn stop(&mut self) {
        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.pan_offset = DVec3::ZERO;
        self.scale = 1.0;
    }

    /// Rotate by a pointer drag in pixels. A drag across the full viewport
    /// height turns a full circle.
    pub fn rotate(&mut self, dx: f64, dy: f64, viewport_height: f64) {
        let height = viewport_height.max(1.0);
        let k = 2.0 * PI * self.settings.rotate_speed / height;
        self.theta_delta -= dx * k;
        self.phi_delta -= dy * k;
    }

    /// Pan by a pointer drag in pixels. Target and camera move together in
    /// the view plane; the step scales with distance and field of view.
    pub fn pan(&mut self, dx: f64, dy: f64, camera: &PerspectiveCamera, viewport_height: f64) {
        let height = viewport_height.max(1.0);
        let offset = camera.position - self.target;
        let target_distance = offset.length() * (camera.fov.to_radians() / 2.0).tan();

        let forward = (-offset).normalize_or_zero();
        let right = forward.cross(DVec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();

        let step = 2.0 * target_distance / height * self.settings.pan_speed;
        self.pan_offset += right * (-dx * step);
        self.pan_offset += up * (dy * step);
    }

    /// Multiply the orbit distance by `factor` (< 1 moves closer)
    pub fn zoom(&mut self, factor: f64) {
        if factor > 0.0 && factor.is_finite() {
            self.scale *= factor.powf(self.settings.zoom_speed);
        }
    }

    pub fn has_pending_input(&self) -> bool {
        self.theta_delta != 0.0
            || self.phi_delta != 0.0
            || self.pan_offset != DVec3::ZERO
            || self.scale != 1.0
    }

    /// Apply pending input to `camera`. Returns `true` if the camera moved.
    /// Without pending input the camera is left exactly where it is.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        if !self.has_pending_input() {
            return false;
        }

        let offset = camera.position - self.target;
        let radius = offset.length();
        let (mut theta, mut phi) = if radius > 0.0 {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, PI / 2.0)
        };

        let damping = self.settings.damping_factor;
        let share = if damping > 0.0 { damping } else { 1.0 };

        theta += self.theta_delta * share;
        phi = (phi + self.phi_delta * share).clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        let scale = 1.0 + (self.scale - 1.0) * share;
        let radius = (radius.max(INPUT_EPSILON) * scale)
            .clamp(self.settings.min_distance, self.settings.max_distance);
        self.target += self.pan_offset * share;

        let new_position = self.target
            + DVec3::new(
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
                radius * phi.sin() * theta.cos(),
            );

        if damping > 0.0 {
            let keep = 1.0 - damping;
            self.theta_delta *= keep;
            self.phi_delta *= keep;
            self.pan_offset *= keep;
            self.scale = 1.0 + (self.scale - 1.0) * keep;
            self.drop_residual_input();
        } else {
            self.stop();
        }

        let moved = new_position.distance(camera.position) > CHANGE_EPSILON;
        camera.position = new_position;
        moved
    }

    fn drop_residual_input(&mut self) {
        if self.theta_delta.abs() < INPUT_EPSILON {
            self.theta_delta = 0.0;
        }
        if self.phi_delta.abs() < INPUT_EPSILON {
            self.phi_delta = 0.0;
        }
        if self.pan_offset.length() < INPUT_EPSILON {
            self.pan_offset = DVec3::ZERO;
        }
        if (self.scale - 1.0).abs() < INPUT_EPSILON {
            self.scale = 1.0;
        }
    }
}
