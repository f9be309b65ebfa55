//! camlink Scene - Render-surface side of the camera link
//!
//! This crate provides the render surface that owns the orbit camera:
//! - Perspective camera with y-up orbit, pan and zoom controls
//! - Scene model with a designated image face
//! - Texture loading from data URLs, http(s) URLs and local files
//! - Render loop that pauses while hidden
//! - Surface actor that applies host messages and reports camera changes

pub mod camera;
pub mod render;
pub mod scene;
pub mod surface;
pub mod texture;

pub use camera::{OrbitControls, OrbitSettings, PerspectiveCamera};
pub use render::{RenderLoop, Viewport};
pub use scene::{Color, FaceMaterial, Scene, IMAGE_FACE};
pub use surface::{Interaction, Readout, RenderSurface, SurfaceConfig, TextureLoad, RESET_POSITION};
pub use texture::{SourceLoader, Texture, TextureError, TextureLoader};
