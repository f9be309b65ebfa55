//! Image payloads produced by node execution

use serde::{Deserialize, Serialize};

/// Image source handed to the render surface (URL or inline data URL)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePayload(pub String);

impl ImagePayload {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the payload carries its data inline
    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }
}

/// `image_base64` may be a bare string or a list of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// UI portion of an execution result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<OneOrMany>,
}

impl ExecutionOutput {
    pub fn with_image(source: impl Into<String>) -> Self {
        Self {
            image_base64: Some(OneOrMany::Many(vec![source.into()])),
        }
    }

    /// Zero or one payload: the first entry of a list, or the bare string.
    /// Only the first entry is looked at, so a leading empty string means no
    /// payload even when later entries are set.
    pub fn image(&self) -> Option<ImagePayload> {
        let source = match self.image_base64.as_ref()? {
            OneOrMany::One(s) => s.as_str(),
            OneOrMany::Many(list) => list.first()?.as_str(),
        };
        if source.is_empty() {
            None
        } else {
            Some(ImagePayload::new(source))
        }
    }

    /// Extract the payload from an untyped result. Anything that does not
    /// look like an execution output yields `None`.
    pub fn image_from_value(value: &serde_json::Value) -> Option<ImagePayload> {
        serde_json::from_value::<ExecutionOutput>(value.clone())
            .ok()
            .and_then(|output| output.image())
    }
}
