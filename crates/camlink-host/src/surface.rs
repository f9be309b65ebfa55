//! Handle to a mounted render surface

use camlink_core::{ContextId, Message, Outlet};
use std::fmt;
use tracing::debug;

/// Externally allocated resource tied to a surface's lifetime (for example a
/// blob-backed document URL). Released at most once.
pub struct TransientResource {
    url: String,
    release: Option<Box<dyn FnOnce(&str) + Send>>,
}

impl TransientResource {
    pub fn new<F>(url: impl Into<String>, release: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        Self {
            url: url.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Release the resource. Returns `false` if it was already released.
    pub fn revoke(&mut self) -> bool {
        match self.release.take() {
            Some(release) => {
                debug!(url = %self.url, "Revoking transient resource");
                release(&self.url);
                true
            }
            None => false,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for TransientResource {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for TransientResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientResource")
            .field("url", &self.url)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

/// A render surface as seen from the host: its identity, a way to post to
/// it, and the resources to release on teardown.
#[derive(Debug)]
pub struct SurfaceMount {
    id: ContextId,
    outlet: Outlet,
    resource: Option<TransientResource>,
}

impl SurfaceMount {
    /// `id` is the surface's own identity (messages from it carry this
    /// source); `outlet` posts into the surface's inbox.
    pub fn new(id: ContextId, outlet: Outlet) -> Self {
        Self {
            id,
            outlet,
            resource: None,
        }
    }

    pub fn with_resource(mut self, resource: TransientResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn post(&self, message: Message) -> bool {
        self.outlet.post(message)
    }

    pub(crate) fn outlet(&self) -> &Outlet {
        &self.outlet
    }

    /// Release the transient resource, if any
    pub(crate) fn release(&mut self) {
        if let Some(resource) = self.resource.as_mut() {
            resource.revoke();
        }
    }
}
