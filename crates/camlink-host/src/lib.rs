//! camlink Host - Parameter-field side of the camera link
//!
//! This crate provides the host controller that owns the camera parameter
//! fields and synchronizes them with a render surface:
//! - Field registry and dirty notification hooks
//! - Readiness gating with a single pending image payload
//! - Debounced resize forwarding
//! - Surface mounting and teardown with transient resource release

pub mod controller;
pub mod debounce;
pub mod fields;
pub mod surface;

pub use controller::{Delivery, HostCommand, HostConfig, HostController, HostStatus, Readiness};
pub use debounce::Debouncer;
pub use fields::{DirtyFlag, DirtyNotifier, FieldRegistry, ParamFields};
pub use surface::{SurfaceMount, TransientResource};
