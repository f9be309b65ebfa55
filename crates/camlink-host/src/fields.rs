//! Host parameter fields and redraw notification

use camlink_core::{CameraField, CameraState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lookup of the host's numeric parameter fields by name
pub trait FieldRegistry {
    /// Current value, or `None` if no such field exists
    fn value(&self, name: &str) -> Option<f64>;

    /// Overwrite a field. Returns `false` if the field does not exist.
    fn set_value(&mut self, name: &str, value: f64) -> bool;
}

/// Redraw / dirty-flag hook of the host
pub trait DirtyNotifier {
    fn mark_dirty(&self);
}

impl<F: Fn()> DirtyNotifier for F {
    fn mark_dirty(&self) {
        self()
    }
}

/// Read the camera fields. A missing field takes its default; a present
/// field is used as is, including zero.
pub fn snapshot<R: FieldRegistry + ?Sized>(registry: &R) -> CameraState {
    let mut state = CameraState::default();
    for field in CameraField::ALL {
        if let Some(value) = registry.value(field.field_name()) {
            state.set(field, value);
        }
    }
    state
}

/// Write the camera fields, skipping any the registry does not have.
/// Returns the number of fields written.
pub fn apply<R: FieldRegistry + ?Sized>(registry: &mut R, state: &CameraState) -> usize {
    let mut applied = 0;
    for field in CameraField::ALL {
        if registry.set_value(field.field_name(), state.get(field)) {
            applied += 1;
        } else {
            debug!(field = %field, "Field not registered, skipping update");
        }
    }
    applied
}

/// In-memory field registry. Camera fields are clamped to their UI domains on write.
#[derive(Debug, Clone, Default)]
pub struct ParamFields {
    values: HashMap<String, f64>,
}

impl ParamFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four camera fields at their defaults
    pub fn with_camera_defaults() -> Self {
        let mut fields = Self::new();
        for field in CameraField::ALL {
            fields.insert(field.field_name(), field.default_value());
        }
        fields
    }

    /// Register (or replace) a field
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.values.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl FieldRegistry for ParamFields {
    fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    fn set_value(&mut self, name: &str, value: f64) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = match CameraField::from_field_name(name) {
                    Some(field) => field.clamp(value),
                    None => value,
                };
                true
            }
            None => false,
        }
    }
}

/// Shared counter of dirty notifications
#[derive(Debug, Clone, Default)]
pub struct DirtyFlag {
    count: Arc<AtomicU64>,
}

impl DirtyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl DirtyNotifier for DirtyFlag {
    fn mark_dirty(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
