//! Scene content: the subject cube and its face materials

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::texture::Texture;

/// Face of the subject that displays the image payload
pub const IMAGE_FACE: usize = 4;

/// RGB color packed as 0xRRGGBB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xffffff);
    /// Tint shown when the image failed to load
    pub const ERROR: Color = Color(0xff6b6b);
    pub const BACKGROUND: Color = Color(0x1a1a1a);
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

/// Material of one cube face
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMaterial {
    pub color: Color,
    pub texture: Option<Arc<Texture>>,
    /// Bumped on every change so the renderer re-uploads the material
    pub version: u64,
}

impl FaceMaterial {
    fn new(color: u32) -> Self {
        Self {
            color: Color(color),
            texture: None,
            version: 0,
        }
    }
}

/// The scene: background plus a cube whose faces carry their own materials
#[derive(Debug, Clone)]
pub struct Scene {
    pub background: Color,
    faces: [FaceMaterial; 6],
}

impl Scene {
    pub fn new() -> Self {
        Self {
            background: Color::BACKGROUND,
            faces: [
                FaceMaterial::new(0xff6b6b), // +x
                FaceMaterial::new(0x4ecdc4), // -x
                FaceMaterial::new(0x45b7d1), // +y
                FaceMaterial::new(0x96ceb4), // -y
                FaceMaterial::new(0xfeca57), // +z (front)
                FaceMaterial::new(0xff9ff3), // -z
            ],
        }
    }

    pub fn faces(&self) -> &[FaceMaterial; 6] {
        &self.faces
    }

    pub fn image_face(&self) -> &FaceMaterial {
        &self.faces[IMAGE_FACE]
    }

    /// Show `texture` on the image face with a neutral tint
    pub fn apply_texture(&mut self, texture: Arc<Texture>) {
        let face = &mut self.faces[IMAGE_FACE];
        face.texture = Some(texture);
        face.color = Color::WHITE;
        face.version += 1;
    }

    /// Clear the image face and tint it to signal a failed load
    pub fn apply_texture_error(&mut self) {
        let face = &mut self.faces[IMAGE_FACE];
        face.texture = None;
        face.color = Color::ERROR;
        face.version += 1;
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
