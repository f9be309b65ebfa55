//! Cross-boundary message schema
//!
//! Messages are tagged by a `type` field and carry plain numbers (or a single
//! string for images). Numeric fields are optional on the wire: a field that
//! is absent, `null`, or not a number decodes as `None` and is replaced by its
//! documented default when resolved. A literal `0` is a real value.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::camera::{CameraField, CameraState};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Every message that crosses the host/surface boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// surface -> host: one-shot readiness announcement
    ViewerReady,
    /// host -> surface: full camera state, normalises the orbit target
    Init(CameraPayload),
    /// host -> surface: position and FOV only, orbit target untouched
    SyncCamera(CameraPayload),
    /// host -> surface: viewport dimensions
    Resize(ResizePayload),
    /// host -> surface: image source to load as a texture
    UpdateImage(ImageSource),
    /// surface -> host: camera state at the end of an interaction
    CameraUpdate(CameraPayload),
    /// Any other `type`; always ignored by the receiver
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn init(state: &CameraState) -> Self {
        Self::Init(CameraPayload::from_state(state))
    }

    pub fn sync_camera(state: &CameraState) -> Self {
        Self::SyncCamera(CameraPayload::from_state(state))
    }

    /// Build a camera report. Position is rounded to 2 decimals and FOV to
    /// an integer before it leaves the surface.
    pub fn camera_update(state: &CameraState) -> Self {
        Self::CameraUpdate(CameraPayload::from_state(&state.rounded()))
    }

    pub fn resize(width: f64, height: f64) -> Self {
        Self::Resize(ResizePayload {
            width: Some(width),
            height: Some(height),
        })
    }

    pub fn update_image(image_url: impl Into<String>) -> Self {
        Self::UpdateImage(ImageSource {
            image_url: Some(image_url.into()),
        })
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ViewerReady => "VIEWER_READY",
            Self::Init(_) => "INIT",
            Self::SyncCamera(_) => "SYNC_CAMERA",
            Self::Resize(_) => "RESIZE",
            Self::UpdateImage(_) => "UPDATE_IMAGE",
            Self::CameraUpdate(_) => "CAMERA_UPDATE",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Camera fields as they appear on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraPayload {
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub camera_x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub camera_y: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub camera_z: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub fov: Option<f64>,
}

impl CameraPayload {
    pub fn from_state(state: &CameraState) -> Self {
        Self {
            camera_x: Some(state.position_x),
            camera_y: Some(state.position_y),
            camera_z: Some(state.position_z),
            fov: Some(state.field_of_view),
        }
    }

    pub fn field(&self, field: CameraField) -> Option<f64> {
        match field {
            CameraField::X => self.camera_x,
            CameraField::Y => self.camera_y,
            CameraField::Z => self.camera_z,
            CameraField::Fov => self.fov,
        }
    }

    /// Fill absent fields with their defaults
    pub fn resolve(&self) -> CameraState {
        let mut state = CameraState::default();
        for field in CameraField::ALL {
            if let Some(value) = self.field(field) {
                state.set(field, value);
            }
        }
        state
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResizePayload {
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl ResizePayload {
    /// Both dimensions, if present and positive
    pub fn dimensions(&self) -> Option<(f64, f64)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some((w, h)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ImageSource {
    /// The source, if present and non-empty
    pub fn url(&self) -> Option<&str> {
        self.image_url.as_deref().filter(|url| !url.is_empty())
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|v| v.is_finite()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}
