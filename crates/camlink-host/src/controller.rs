//! Host controller
//!
//! Owns the camera parameter fields and keeps them in step with one render
//! surface:
//! 1. Field edits become `SYNC_CAMERA` messages once the surface is ready
//! 2. `CAMERA_UPDATE` reports overwrite the fields and mark the host dirty
//! 3. Image payloads are held back until `VIEWER_READY`, latest one wins
//! 4. Resize notifications are coalesced into a single `RESIZE`

use camlink_core::{
    CameraField, ContextId, Envelope, ExecutionOutput, ImagePayload, Listener, Message,
    MessageBus,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::debounce::Debouncer;
use crate::fields::{self, DirtyNotifier, FieldRegistry};
use crate::surface::SurfaceMount;

/// Host controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Quiet period before a resize is forwarded
    pub resize_debounce: Duration,
    /// Size changes smaller than this on both axes are ignored
    pub resize_threshold: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            resize_debounce: Duration::from_millis(50),
            resize_threshold: 1.0,
        }
    }
}

/// Where the controller is in a surface's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// No surface mounted
    Detached,
    /// Surface mounted, readiness announcement not yet received
    AwaitingSurface,
    /// Surface announced readiness; sync is live
    Ready,
}

/// What happened to an image payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Buffered,
    Dropped,
}

/// Point-in-time view of the controller, for inspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostStatus {
    pub readiness: Readiness,
    pub surface: Option<ContextId>,
    pub camera: camlink_core::CameraState,
    pub pending_payload: bool,
}

/// Requests handled by [`HostController::run`]
#[derive(Debug)]
pub enum HostCommand {
    FieldChanged { name: String, value: f64 },
    PayloadAvailable(ImagePayload),
    Executed(serde_json::Value),
    Resized { width: f64, height: f64 },
    Inspect(oneshot::Sender<HostStatus>),
    Teardown,
}

pub struct HostController<F, D> {
    id: ContextId,
    config: HostConfig,
    bus: MessageBus,
    fields: F,
    dirty: D,
    surface: Option<SurfaceMount>,
    listener: Option<Listener>,
    readiness: Readiness,
    pending: Option<ImagePayload>,
    resize: Debouncer,
    last_size: Option<(f64, f64)>,
}

impl<F, D> HostController<F, D>
where
    F: FieldRegistry,
    D: DirtyNotifier,
{
    pub fn new(config: HostConfig, bus: MessageBus, fields: F, dirty: D) -> Self {
        let resize = Debouncer::new(config.resize_debounce);
        Self {
            id: ContextId::new(),
            config,
            bus,
            fields,
            dirty,
            surface: None,
            listener: None,
            readiness: Readiness::Detached,
            pending: None,
            resize,
            last_size: None,
        }
    }

    /// Identity this host posts under
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn pending_payload(&self) -> Option<&ImagePayload> {
        self.pending.as_ref()
    }

    pub fn fields(&self) -> &F {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut F {
        &mut self.fields
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            readiness: self.readiness,
            surface: self.surface.as_ref().map(SurfaceMount::id),
            camera: fields::snapshot(&self.fields),
            pending_payload: self.pending.is_some(),
        }
    }

    /// Mount a render surface and start listening for its messages.
    ///
    /// The listener subscribes here, so the surface must not announce
    /// readiness before this call. Any previously mounted surface is torn
    /// down first.
    pub fn initialize(&mut self, mount: SurfaceMount) {
        if self.surface.is_some() {
            self.teardown();
        }
        info!(host = %self.id, surface = %mount.id(), "Render surface mounted");
        self.listener = Some(self.bus.subscribe());
        self.surface = Some(mount);
        self.readiness = Readiness::AwaitingSurface;
        self.pending = None;
        self.last_size = None;
    }

    /// A field was edited by the user. The value is written to the field;
    /// camera fields are then synced to the surface if it is ready.
    /// Returns `true` if a `SYNC_CAMERA` was sent.
    pub fn on_field_changed(&mut self, name: &str, value: f64) -> bool {
        if !self.fields.set_value(name, value) {
            debug!(field = name, "Edited field is not registered");
        }
        let Some(field) = CameraField::from_field_name(name) else {
            return false;
        };
        if !self.is_ready() {
            trace!(field = %field, "Surface not ready, skipping sync");
            return false;
        }
        let state = fields::snapshot(&self.fields);
        self.post(Message::sync_camera(&state))
    }

    /// A new payload is available. Sent now if the surface is ready,
    /// otherwise it replaces any payload already waiting.
    pub fn on_payload_available(&mut self, payload: ImagePayload) -> Delivery {
        match self.readiness {
            Readiness::Ready => {
                self.post(Message::update_image(payload.0));
                Delivery::Sent
            }
            Readiness::AwaitingSurface => {
                if self.pending.replace(payload).is_some() {
                    debug!(host = %self.id, "Replaced pending payload");
                } else {
                    debug!(host = %self.id, "Buffered payload until surface is ready");
                }
                Delivery::Buffered
            }
            Readiness::Detached => {
                debug!(host = %self.id, "No surface mounted, dropping payload");
                Delivery::Dropped
            }
        }
    }

    /// Execution result hook: forwards the result's image, if it has one
    pub fn on_executed(&mut self, output: &serde_json::Value) -> Option<Delivery> {
        let payload = ExecutionOutput::image_from_value(output)?;
        Some(self.on_payload_available(payload))
    }

    /// The surface container changed size. Sends one `RESIZE` after the
    /// quiet period with the last size seen.
    pub fn on_surface_resized(&mut self, width: f64, height: f64) {
        let Some(surface) = self.surface.as_ref() else {
            return;
        };
        if let Some((last_w, last_h)) = self.last_size {
            let threshold = self.config.resize_threshold;
            if (width - last_w).abs() < threshold && (height - last_h).abs() < threshold {
                return;
            }
        }
        self.last_size = Some((width, height));

        let outlet = surface.outlet().clone();
        trace!(width, height, "Resize scheduled");
        self.resize.schedule(move || {
            outlet.post(Message::resize(width, height));
        });
    }

    /// Entry point for everything arriving on the bus. Messages from any
    /// context other than the mounted surface are dropped.
    pub fn handle_inbound(&mut self, envelope: Envelope) {
        let Some(surface) = self.surface.as_ref() else {
            return;
        };
        if envelope.source != surface.id() {
            trace!(
                host = %self.id,
                source = %envelope.source,
                kind = envelope.message.kind(),
                "Ignoring message from foreign context"
            );
            return;
        }
        self.handle_message(envelope.message);
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::ViewerReady => {
                if self.is_ready() {
                    debug!(host = %self.id, "Duplicate readiness announcement");
                } else {
                    info!(host = %self.id, "Render surface ready");
                }
                self.readiness = Readiness::Ready;
                if let Some(payload) = self.pending.take() {
                    debug!(host = %self.id, "Delivering pending payload");
                    self.post(Message::update_image(payload.0));
                }
                let state = fields::snapshot(&self.fields);
                self.post(Message::init(&state));
            }
            Message::CameraUpdate(payload) => {
                let state = payload.resolve();
                let applied = fields::apply(&mut self.fields, &state);
                debug!(
                    x = state.position_x,
                    y = state.position_y,
                    z = state.position_z,
                    fov = state.field_of_view,
                    applied,
                    "Camera updated from surface"
                );
                self.dirty.mark_dirty();
            }
            other => {
                debug!(kind = other.kind(), "Ignoring unexpected message");
            }
        }
    }

    /// Release the surface and everything tied to it. Safe to call at any
    /// point and any number of times.
    pub fn teardown(&mut self) {
        self.resize.cancel();
        self.listener = None;
        self.pending = None;
        self.last_size = None;
        if let Some(mut surface) = self.surface.take() {
            surface.release();
            info!(host = %self.id, surface = %surface.id(), "Render surface torn down");
        }
        self.readiness = Readiness::Detached;
    }

    fn post(&self, message: Message) -> bool {
        match self.surface.as_ref() {
            Some(surface) => surface.post(message),
            None => false,
        }
    }

    /// Apply one command (everything except `Teardown`, which ends [`run`](Self::run))
    pub fn apply(&mut self, command: HostCommand) {
        match command {
            HostCommand::FieldChanged { name, value } => {
                self.on_field_changed(&name, value);
            }
            HostCommand::PayloadAvailable(payload) => {
                self.on_payload_available(payload);
            }
            HostCommand::Executed(output) => {
                self.on_executed(&output);
            }
            HostCommand::Resized { width, height } => self.on_surface_resized(width, height),
            HostCommand::Inspect(reply) => {
                let _ = reply.send(self.status());
            }
            HostCommand::Teardown => self.teardown(),
        }
    }

    /// Process bus messages and commands until `Teardown` arrives or the
    /// command channel closes. The controller is torn down on exit and
    /// handed back.
    pub async fn run(mut self, mut commands: mpsc::Receiver<HostCommand>) -> Self {
        loop {
            tokio::select! {
                received = next_envelope(&mut self.listener) => match received {
                    Some(envelope) => self.handle_inbound(envelope),
                    None => {
                        debug!("Message bus closed");
                        self.listener = None;
                    }
                },
                command = commands.recv() => match command {
                    Some(HostCommand::Teardown) | None => break,
                    Some(command) => self.apply(command),
                },
            }
        }
        self.teardown();
        self
    }
}

async fn next_envelope(listener: &mut Option<Listener>) -> Option<Envelope> {
    match listener {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{DirtyFlag, ParamFields};
    use crate::surface::TransientResource;
    use camlink_core::{inbox, CameraState, ImageSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        host: HostController<ParamFields, DirtyFlag>,
        dirty: DirtyFlag,
        surface_id: ContextId,
        to_surface: UnboundedReceiver<Envelope>,
    }

    fn harness() -> Harness {
        let bus = MessageBus::new();
        let dirty = DirtyFlag::new();
        let mut host = HostController::new(
            HostConfig::default(),
            bus,
            ParamFields::with_camera_defaults(),
            dirty.clone(),
        );
        let surface_id = ContextId::new();
        let (outlet, to_surface) = inbox(host.id());
        host.initialize(SurfaceMount::new(surface_id, outlet));
        Harness {
            host,
            dirty,
            surface_id,
            to_surface,
        }
    }

    impl Harness {
        fn from_surface(&mut self, message: Message) {
            self.host.handle_inbound(Envelope {
                source: self.surface_id,
                message,
            });
        }

        fn sent(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(envelope) = self.to_surface.try_recv() {
                out.push(envelope.message);
            }
            out
        }
    }

    #[test]
    fn test_field_edit_before_ready_is_not_synced() {
        let mut h = harness();
        assert!(!h.host.on_field_changed("fov", 50.0));
        assert!(h.sent().is_empty());

        h.from_surface(Message::ViewerReady);
        let sent = h.sent();
        assert_eq!(sent, vec![Message::init(&CameraState::new(-4.0, 3.5, 4.0, 50.0))]);

        assert!(h.host.on_field_changed("fov", 60.0));
        assert_eq!(
            h.sent(),
            vec![Message::sync_camera(&CameraState::new(-4.0, 3.5, 4.0, 60.0))]
        );
    }

    #[test]
    fn test_unrelated_field_never_syncs() {
        let mut h = harness();
        h.host.fields_mut().insert("seed", 1.0);
        h.from_surface(Message::ViewerReady);
        h.sent();

        assert!(!h.host.on_field_changed("seed", 7.0));
        assert!(h.sent().is_empty());
        assert_eq!(h.host.fields().value("seed"), Some(7.0));
    }

    #[test]
    fn test_only_latest_pending_payload_is_delivered() {
        let mut h = harness();
        assert_eq!(h.host.on_payload_available(ImagePayload::new("a")), Delivery::Buffered);
        assert_eq!(h.host.on_payload_available(ImagePayload::new("b")), Delivery::Buffered);
        assert_eq!(h.host.on_payload_available(ImagePayload::new("c")), Delivery::Buffered);
        assert!(h.sent().is_empty());

        h.from_surface(Message::ViewerReady);
        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], Message::update_image("c"));
        assert!(matches!(sent[1], Message::Init(_)));
        assert!(h.host.pending_payload().is_none());

        // After readiness every payload goes out on its own
        assert_eq!(h.host.on_payload_available(ImagePayload::new("d")), Delivery::Sent);
        assert_eq!(h.host.on_payload_available(ImagePayload::new("e")), Delivery::Sent);
        assert_eq!(h.sent(), vec![Message::update_image("d"), Message::update_image("e")]);
    }

    #[test]
    fn test_init_uses_defaults_for_missing_fields_but_keeps_zero() {
        let bus = MessageBus::new();
        let mut fields = ParamFields::new();
        fields.insert("camera_x", 0.0);
        fields.insert("camera_z", 0.0);
        let mut host = HostController::new(HostConfig::default(), bus, fields, DirtyFlag::new());
        let surface_id = ContextId::new();
        let (outlet, mut rx) = inbox(host.id());
        host.initialize(SurfaceMount::new(surface_id, outlet));

        host.handle_inbound(Envelope {
            source: surface_id,
            message: Message::ViewerReady,
        });
        let sent = rx.try_recv().unwrap().message;
        assert_eq!(sent, Message::init(&CameraState::new(0.0, 3.5, 0.0, 75.0)));
    }

    #[test]
    fn test_camera_update_overwrites_fields_and_marks_dirty() {
        let mut h = harness();
        h.from_surface(Message::ViewerReady);
        h.from_surface(Message::camera_update(&CameraState::new(1.23456, 2.0, 3.0, 48.6)));

        let status = h.host.status();
        assert_eq!(status.camera, CameraState::new(1.23, 2.0, 3.0, 49.0));
        assert_eq!(h.dirty.count(), 1);
        // No echo back to the surface
        assert_eq!(h.sent().len(), 1);
    }

    #[test]
    fn test_camera_update_partial_registry() {
        let mut h = harness();
        h.host.fields_mut().remove("camera_z");
        h.from_surface(Message::camera_update(&CameraState::new(1.0, 2.0, 3.0, 40.0)));
        assert_eq!(h.host.fields().value("camera_x"), Some(1.0));
        assert_eq!(h.host.fields().value("camera_z"), None);
        assert_eq!(h.host.fields().value("fov"), Some(40.0));
        assert_eq!(h.dirty.count(), 1);
    }

    #[test]
    fn test_foreign_messages_are_ignored() {
        let mut h = harness();
        let stranger = ContextId::new();
        h.host.handle_inbound(Envelope {
            source: stranger,
            message: Message::ViewerReady,
        });
        h.host.handle_inbound(Envelope {
            source: stranger,
            message: Message::camera_update(&CameraState::new(9.0, 9.0, 9.0, 20.0)),
        });

        assert_eq!(h.host.readiness(), Readiness::AwaitingSurface);
        assert_eq!(h.host.status().camera, CameraState::default());
        assert_eq!(h.dirty.count(), 0);
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_unknown_and_host_bound_types_are_ignored() {
        let mut h = harness();
        h.from_surface(Message::Unknown);
        h.from_surface(Message::SyncCamera(Default::default()));
        h.from_surface(Message::UpdateImage(ImageSource::default()));
        assert_eq!(h.host.readiness(), Readiness::AwaitingSurface);
        assert_eq!(h.dirty.count(), 0);
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_executed_hook() {
        let mut h = harness();
        let output = serde_json::json!({"image_base64": ["data:image/png;base64,AAAA"]});
        assert_eq!(h.host.on_executed(&output), Some(Delivery::Buffered));
        assert_eq!(h.host.on_executed(&serde_json::json!({"image_base64": [""]})), None);

        h.from_surface(Message::ViewerReady);
        assert_eq!(h.sent()[0], Message::update_image("data:image/png;base64,AAAA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_burst_sends_one_message() {
        let mut h = harness();
        h.host.on_surface_resized(300.0, 200.0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.host.on_surface_resized(310.0, 210.0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.host.on_surface_resized(320.0, 400.0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.sent(), vec![Message::resize(320.0, 400.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subpixel_resize_is_ignored() {
        let mut h = harness();
        h.host.on_surface_resized(300.0, 200.0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.sent().len(), 1);

        h.host.on_surface_resized(300.4, 200.6);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_resize_and_revokes_once() {
        let revoked = Arc::new(AtomicUsize::new(0));
        let counter = revoked.clone();
        let bus = MessageBus::new();
        let mut host = HostController::new(
            HostConfig::default(),
            bus,
            ParamFields::with_camera_defaults(),
            DirtyFlag::new(),
        );
        let (outlet, mut rx) = inbox(host.id());
        let resource = TransientResource::new("blob:viewer", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        host.initialize(SurfaceMount::new(ContextId::new(), outlet).with_resource(resource));
        host.on_payload_available(ImagePayload::new("pending"));
        host.on_surface_resized(500.0, 500.0);

        host.teardown();
        host.teardown();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(revoked.load(Ordering::SeqCst), 1);
        assert_eq!(host.readiness(), Readiness::Detached);
        assert!(host.pending_payload().is_none());
    }

    #[test]
    fn test_teardown_without_surface_is_safe() {
        let mut host = HostController::new(
            HostConfig::default(),
            MessageBus::default(),
            ParamFields::with_camera_defaults(),
            DirtyFlag::new(),
        );
        host.teardown();
        assert_eq!(host.on_payload_available(ImagePayload::new("x")), Delivery::Dropped);
        host.on_surface_resized(10.0, 10.0);
        assert!(!host.on_field_changed("fov", 30.0));
    }

    #[tokio::test]
    async fn test_run_loop_filters_by_origin() {
        let bus = MessageBus::new();
        let dirty = DirtyFlag::new();
        let mut host = HostController::new(
            HostConfig::default(),
            bus.clone(),
            ParamFields::with_camera_defaults(),
            dirty.clone(),
        );
        let surface_id = ContextId::new();
        let (outlet, mut to_surface) = inbox(host.id());
        host.initialize(SurfaceMount::new(surface_id, outlet));

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(host.run(rx));

        bus.outlet(ContextId::new())
            .post(Message::camera_update(&CameraState::new(5.0, 5.0, 5.0, 30.0)));
        bus.outlet(surface_id).post(Message::ViewerReady);
        let init = to_surface.recv().await.unwrap();
        assert!(matches!(init.message, Message::Init(_)));

        let (reply, status) = oneshot::channel();
        tx.send(HostCommand::Inspect(reply)).await.unwrap();
        let status = status.await.unwrap();
        assert_eq!(status.readiness, Readiness::Ready);
        assert_eq!(status.camera, CameraState::default());
        assert_eq!(dirty.count(), 0);

        tx.send(HostCommand::Teardown).await.unwrap();
        let host = task.await.unwrap();
        assert_eq!(host.readiness(), Readiness::Detached);
    }
}
