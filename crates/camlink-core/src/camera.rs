//! Camera state shared by the host and the render surface

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default camera position (scene space)
pub const DEFAULT_POSITION: [f64; 3] = [-4.0, 3.5, 4.0];

/// Default field of view in degrees
pub const DEFAULT_FOV: f64 = 75.0;

/// Point the camera orbits around
pub const ORBIT_TARGET: [f64; 3] = [0.0, 0.6, 0.0];

/// Field of view range enforced by the UI
pub const FOV_RANGE: (f64, f64) = (10.0, 120.0);

/// Camera position and field of view.
///
/// Each side of the link holds its own copy. The copies are only eventually
/// consistent; neither side reads the other's copy directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraState {
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub field_of_view: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position_x: DEFAULT_POSITION[0],
            position_y: DEFAULT_POSITION[1],
            position_z: DEFAULT_POSITION[2],
            field_of_view: DEFAULT_FOV,
        }
    }
}

impl CameraState {
    pub fn new(x: f64, y: f64, z: f64, fov: f64) -> Self {
        Self {
            position_x: x,
            position_y: y,
            position_z: z,
            field_of_view: fov,
        }
    }

    pub fn position(&self) -> [f64; 3] {
        [self.position_x, self.position_y, self.position_z]
    }

    pub fn get(&self, field: CameraField) -> f64 {
        match field {
            CameraField::X => self.position_x,
            CameraField::Y => self.position_y,
            CameraField::Z => self.position_z,
            CameraField::Fov => self.field_of_view,
        }
    }

    pub fn set(&mut self, field: CameraField, value: f64) {
        match field {
            CameraField::X => self.position_x = value,
            CameraField::Y => self.position_y = value,
            CameraField::Z => self.position_z = value,
            CameraField::Fov => self.field_of_view = value,
        }
    }

    /// Quantize for transmission: position to 2 decimals, FOV to an integer
    pub fn rounded(&self) -> Self {
        Self {
            position_x: round_to_hundredths(self.position_x),
            position_y: round_to_hundredths(self.position_y),
            position_z: round_to_hundredths(self.position_z),
            field_of_view: self.field_of_view.round(),
        }
    }

    /// Clamp every component into its UI-enforced domain
    pub fn clamped(&self) -> Self {
        let mut out = *self;
        for field in CameraField::ALL {
            out.set(field, field.clamp(self.get(field)));
        }
        out
    }
}

/// Round to two decimal places
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One of the four camera-related parameter fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraField {
    X,
    Y,
    Z,
    Fov,
}

impl CameraField {
    pub const ALL: [CameraField; 4] = [Self::X, Self::Y, Self::Z, Self::Fov];

    /// Name of the parameter field on the host
    pub fn field_name(self) -> &'static str {
        match self {
            Self::X => "camera_x",
            Self::Y => "camera_y",
            Self::Z => "camera_z",
            Self::Fov => "fov",
        }
    }

    /// Name of the field in wire messages
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::X => "cameraX",
            Self::Y => "cameraY",
            Self::Z => "cameraZ",
            Self::Fov => "fov",
        }
    }

    /// Look up a host field name. Returns `None` for unrelated fields.
    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.field_name() == name)
    }

    pub fn default_value(self) -> f64 {
        match self {
            Self::X => DEFAULT_POSITION[0],
            Self::Y => DEFAULT_POSITION[1],
            Self::Z => DEFAULT_POSITION[2],
            Self::Fov => DEFAULT_FOV,
        }
    }

    /// Inclusive (min, max) range enforced by the host UI
    pub fn range(self) -> (f64, f64) {
        match self {
            Self::X | Self::Z => (-20.0, 20.0),
            Self::Y => (-10.0, 20.0),
            Self::Fov => FOV_RANGE,
        }
    }

    pub fn clamp(self, value: f64) -> f64 {
        let (min, max) = self.range();
        let value = value.clamp(min, max);
        if self == Self::Fov {
            value.round()
        } else {
            value
        }
    }
}

impl fmt::Display for CameraField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_contract() {
        let state = CameraState::new(1.23456, 2.0, 3.0, 74.6).rounded();
        assert_eq!(state.position_x, 1.23);
        assert_eq!(state.position_y, 2.0);
        assert_eq!(state.position_z, 3.0);
        assert_eq!(state.field_of_view, 75.0);

        let state = CameraState::new(-4.045072549097186, 3.5591969500617946, 4.159183210195669, 75.0)
            .rounded();
        assert_eq!(state.position(), [-4.05, 3.56, 4.16]);
    }

    #[test]
    fn test_field_names() {
        assert_eq!(CameraField::from_field_name("camera_x"), Some(CameraField::X));
        assert_eq!(CameraField::from_field_name("fov"), Some(CameraField::Fov));
        assert_eq!(CameraField::from_field_name("seed"), None);
        assert_eq!(CameraField::Y.wire_name(), "cameraY");
    }

    #[test]
    fn test_clamp_domains() {
        let state = CameraState::new(-25.0, -12.0, 30.0, 121.4).clamped();
        assert_eq!(state.position(), [-20.0, -10.0, 20.0]);
        assert_eq!(state.field_of_view, 120.0);

        // Zero is inside every position domain and stays zero
        let state = CameraState::new(0.0, 0.0, 0.0, 50.2).clamped();
        assert_eq!(state.position(), [0.0, 0.0, 0.0]);
        assert_eq!(state.field_of_view, 50.0);
    }

    #[test]
    fn test_default_state() {
        let state = CameraState::default();
        assert_eq!(state.position(), DEFAULT_POSITION);
        assert_eq!(state.field_of_view, 75.0);
        for field in CameraField::ALL {
            assert_eq!(state.get(field), field.default_value());
        }
    }
}
