//! camlink Core - Shared camera state and message schema
//!
//! This crate provides the types both halves of the camera link agree on:
//! - Camera state, field names, defaults and UI domains
//! - The tagged message schema exchanged between host and render surface
//! - Origin-tagged channels (shared bus and per-surface inbox)
//! - Image payload extraction from execution results
//! - Camera view descriptions with a bounded per-node cache

pub mod camera;
pub mod channel;
pub mod describe;
pub mod message;
pub mod payload;

pub use camera::{CameraField, CameraState, DEFAULT_FOV, DEFAULT_POSITION, ORBIT_TARGET};
pub use channel::{inbox, ContextId, Envelope, Listener, MessageBus, Outlet};
pub use describe::{describe, DescriptionCache, ViewDescription};
pub use message::{CameraPayload, ImageSource, Message, ProtocolError, ResizePayload};
pub use payload::{ExecutionOutput, ImagePayload};
