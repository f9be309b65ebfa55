//! Render surface actor
//!
//! Owns the orbit camera and the scene. Applies host messages from its inbox,
//! reports the camera back over the shared bus when an interaction ends, and
//! loads image textures in the background.

use bevy_math::DVec3;
use camlink_core::{
    CameraField, CameraState, ContextId, Envelope, Message, Outlet, DEFAULT_FOV, DEFAULT_POSITION,
    ORBIT_TARGET,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::camera::{OrbitControls, OrbitSettings, PerspectiveCamera};
use crate::render::{RenderLoop, Viewport};
use crate::scene::Scene;
use crate::texture::{Texture, TextureError, TextureLoader};

/// Camera position restored by the reset control
pub const RESET_POSITION: [f64; 3] = [-4.045072549097186, 3.5591969500617946, 4.159183210195669];

/// Render surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Render loop ticks per second
    pub frame_rate: u32,
    pub orbit: OrbitSettings,
    /// Initial viewport
    pub viewport: Viewport,
    pub texture_timeout: Duration,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            orbit: OrbitSettings::default(),
            viewport: Viewport::new(320.0, 400.0),
            texture_timeout: Duration::from_secs(30),
        }
    }
}

impl SurfaceConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }
}

/// Local user input on the surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interaction {
    /// Pointer down on the canvas
    Start,
    /// Drag in pixels
    Rotate { dx: f64, dy: f64 },
    Pan { dx: f64, dy: f64 },
    /// Dolly factor, < 1 moves closer
    Zoom { factor: f64 },
    /// Pointer released
    End,
    /// FOV slider
    SetFov { value: f64 },
    /// Reset button
    Reset,
    /// Page visibility
    Visibility { visible: bool },
}

/// Human-readable camera values shown next to the canvas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub x: String,
    pub y: String,
    pub z: String,
    pub fov: String,
}

impl Readout {
    pub fn from_state(state: &CameraState) -> Self {
        Self {
            x: format!("{:.2}", state.position_x),
            y: format!("{:.2}", state.position_y),
            z: format!("{:.2}", state.position_z),
            fov: format!("{}", state.field_of_view.round() as i64),
        }
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X: {}  Y: {}  Z: {}  FOV: {}°",
            self.x, self.y, self.z, self.fov
        )
    }
}

/// Completed texture load
#[derive(Debug)]
pub struct TextureLoad {
    pub source: String,
    pub result: Result<Texture, TextureError>,
}

/// The render-surface side of the camera link
pub struct RenderSurface<L> {
    id: ContextId,
    config: SurfaceConfig,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    scene: Scene,
    viewport: Viewport,
    render_loop: RenderLoop,
    readout: Readout,
    /// Posts into the shared bus
    bus: Outlet,
    ready_announced: bool,
    loader: Arc<L>,
    loads_tx: mpsc::UnboundedSender<TextureLoad>,
    loads_rx: mpsc::UnboundedReceiver<TextureLoad>,
    loads_started: u64,
    reports_sent: u64,
}

impl<L: TextureLoader + 'static> RenderSurface<L> {
    /// Build the camera, controls and scene, then announce readiness.
    ///
    /// `bus` must post as this surface's identity.
    pub fn initialize_scene(config: SurfaceConfig, bus: Outlet, loader: Arc<L>) -> Self {
        let default = CameraState::default();
        let viewport = config.viewport;
        let camera = PerspectiveCamera::new(
            DVec3::from_array(DEFAULT_POSITION),
            DEFAULT_FOV,
            viewport.aspect(),
        );
        let mut controls = OrbitControls::new(config.orbit.clone());
        controls.set_target(DVec3::from_array(ORBIT_TARGET));

        let (loads_tx, loads_rx) = mpsc::unbounded_channel();
        let mut surface = Self {
            id: bus.source(),
            config,
            camera,
            controls,
            scene: Scene::new(),
            viewport,
            render_loop: RenderLoop::new(),
            readout: Readout::from_state(&default),
            bus,
            ready_announced: false,
            loader,
            loads_tx,
            loads_rx,
            loads_started: 0,
            reports_sent: 0,
        };
        info!(surface = %surface.id, "Scene initialized");
        surface.announce_ready();
        surface
    }

    /// Post VIEWER_READY. Only the first call sends anything.
    pub fn announce_ready(&mut self) -> bool {
        if self.ready_announced {
            return false;
        }
        self.ready_announced = true;
        debug!(surface = %self.id, "Announcing readiness");
        self.bus.post(Message::ViewerReady);
        true
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    pub fn readout(&self) -> &Readout {
        &self.readout
    }

    /// Number of CAMERA_UPDATE reports posted so far
    pub fn reports_sent(&self) -> u64 {
        self.reports_sent
    }

    pub fn loads_started(&self) -> u64 {
        self.loads_started
    }

    /// Unrounded local camera state
    pub fn camera_state(&self) -> CameraState {
        let p = self.camera.position;
        CameraState::new(p.x, p.y, p.z, self.camera.fov)
    }

    pub fn handle_inbound(&mut self, envelope: Envelope) {
        trace!(surface = %self.id, from = %envelope.source, kind = envelope.message.kind(), "Inbound");
        self.handle_message(envelope.message);
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Init(payload) => {
                self.apply_camera(&payload.resolve());
                let target = DVec3::from_array(ORBIT_TARGET);
                if self.controls.target() != target {
                    debug!(surface = %self.id, "Restoring orbit target");
                    self.controls.set_target(target);
                }
            }
            Message::SyncCamera(payload) => {
                self.apply_camera(&payload.resolve());
            }
            Message::Resize(payload) => match payload.dimensions() {
                Some((width, height)) => {
                    self.viewport = Viewport::new(width, height);
                    self.camera.set_aspect(width, height);
                    debug!(surface = %self.id, width, height, "Viewport resized");
                }
                None => debug!(surface = %self.id, ?payload, "Ignoring invalid resize"),
            },
            Message::UpdateImage(source) => match source.url() {
                Some(url) => self.start_texture_load(url.to_string()),
                None => debug!(surface = %self.id, "Ignoring image update without source"),
            },
            other => {
                debug!(surface = %self.id, kind = other.kind(), "Ignoring message");
            }
        }
    }

    /// Set position and FOV. Any damped motion is discarded so the camera
    /// stays exactly where it was placed.
    fn apply_camera(&mut self, state: &CameraState) {
        self.controls.stop();
        self.camera.position = DVec3::from_array(state.position());
        self.camera.fov = state.field_of_view;
        self.camera.update_projection();
        self.refresh_readout();
    }

    fn start_texture_load(&mut self, source: String) {
        self.loads_started += 1;
        let loader = Arc::clone(&self.loader);
        let tx = self.loads_tx.clone();
        tokio::spawn(async move {
            let result = loader.load(&source).await;
            let _ = tx.send(TextureLoad { source, result });
        });
    }

    /// Apply a finished load. Failures are shown as an error tint and never
    /// reported to the host.
    pub fn apply_texture(&mut self, load: TextureLoad) {
        match load.result {
            Ok(texture) => {
                debug!(surface = %self.id, source = %short(&load.source), bytes = texture.bytes.len(), "Texture applied");
                self.scene.apply_texture(Arc::new(texture));
            }
            Err(e) => {
                warn!(surface = %self.id, source = %short(&load.source), "Failed to load texture: {}", e);
                self.scene.apply_texture_error();
            }
        }
    }

    /// Wait for the next finished texture load
    pub async fn next_texture(&mut self) -> Option<TextureLoad> {
        self.loads_rx.recv().await
    }

    /// Handle local input. Returns `true` if a CAMERA_UPDATE was posted.
    pub fn handle_interaction(&mut self, interaction: Interaction) -> bool {
        match interaction {
            Interaction::Start => {
                self.controls.begin();
                false
            }
            Interaction::Rotate { dx, dy } => {
                self.controls.begin();
                self.controls.rotate(dx, dy, self.viewport.height);
                false
            }
            Interaction::Pan { dx, dy } => {
                self.controls.begin();
                self.controls.pan(dx, dy, &self.camera, self.viewport.height);
                false
            }
            Interaction::Zoom { factor } => {
                self.controls.begin();
                self.controls.zoom(factor);
                false
            }
            Interaction::End => {
                if !self.controls.end() {
                    return false;
                }
                if self.controls.update(&mut self.camera) {
                    self.refresh_readout();
                }
                self.report_camera();
                true
            }
            Interaction::SetFov { value } => {
                if !value.is_finite() {
                    return false;
                }
                self.camera.fov = CameraField::Fov.clamp(value);
                self.camera.update_projection();
                self.refresh_readout();
                self.report_camera();
                true
            }
            Interaction::Reset => {
                self.controls.stop();
                self.camera.position = DVec3::from_array(RESET_POSITION);
                self.camera.fov = CameraField::Fov.default_value();
                self.camera.update_projection();
                self.controls.set_target(DVec3::from_array(ORBIT_TARGET));
                self.refresh_readout();
                self.report_camera();
                true
            }
            Interaction::Visibility { visible } => {
                debug!(surface = %self.id, visible, "Visibility changed");
                self.render_loop.set_visible(visible);
                false
            }
        }
    }

    /// One render loop tick. Returns `true` if the camera moved.
    pub fn tick(&mut self) -> bool {
        if !self.render_loop.tick() {
            return false;
        }
        let moved = self.controls.update(&mut self.camera);
        if moved {
            self.refresh_readout();
        }
        moved
    }

    fn refresh_readout(&mut self) {
        self.readout = Readout::from_state(&self.camera_state());
    }

    fn report_camera(&mut self) {
        let state = self.camera_state();
        trace!(surface = %self.id, ?state, "Reporting camera");
        self.bus.post(Message::camera_update(&state));
        self.reports_sent += 1;
    }

    /// Run until the host side of the inbox goes away.
    ///
    /// Closing `input` only stops local interaction; the surface keeps
    /// rendering and applying host messages.
    pub async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Envelope>,
        mut input: mpsc::Receiver<Interaction>,
    ) -> Self {
        let mut ticker = tokio::time::interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut input_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.handle_inbound(envelope),
                    None => {
                        debug!(surface = %self.id, "Host disconnected");
                        break;
                    }
                },
                interaction = input.recv(), if input_open => match interaction {
                    Some(interaction) => {
                        self.handle_interaction(interaction);
                    }
                    None => input_open = false,
                },
                Some(load) = self.loads_rx.recv() => self.apply_texture(load),
            }
        }
        info!(surface = %self.id, frames = self.render_loop.frames_rendered(), "Surface stopped");
        self
    }
}

/// Keep inline data sources out of the logs
fn short(source: &str) -> &str {
    if source.starts_with("data:") {
        source.split(',').next().unwrap_or("data:")
    } else {
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Color;
    use camlink_core::{inbox, CameraPayload, ImageSource, MessageBus, ResizePayload};
    use futures_util::future::BoxFuture;

    struct MockLoader;

    impl TextureLoader for MockLoader {
        fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Texture, TextureError>> {
            Box::pin(async move {
                if source.starts_with("good") {
                    Ok(Texture {
                        source: source.to_string(),
                        mime: Some("image/png".to_string()),
                        bytes: vec![1, 2, 3],
                    })
                } else {
                    Err(TextureError::Status(404))
                }
            })
        }
    }

    fn setup() -> (RenderSurface<MockLoader>, mpsc::UnboundedReceiver<Envelope>) {
        let bus = MessageBus::new();
        let rx = bus.subscribe();
        let surface = RenderSurface::initialize_scene(
            SurfaceConfig::default(),
            bus.outlet(ContextId::new()),
            Arc::new(MockLoader),
        );
        (surface, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope.message);
        }
        out
    }

    fn camera_update(messages: &[Message]) -> CameraPayload {
        match messages {
            [Message::CameraUpdate(payload)] => *payload,
            other => panic!("expected one CAMERA_UPDATE, got {:?}", other),
        }
    }

    #[test]
    fn test_ready_announced_once() {
        let (mut surface, mut rx) = setup();
        assert!(!surface.announce_ready());

        let messages = drain(&mut rx);
        assert_eq!(messages, vec![Message::ViewerReady]);
        assert_eq!(surface.controls().target(), DVec3::new(0.0, 0.6, 0.0));
        assert_eq!(surface.controls().target_resets(), 1);
    }

    #[test]
    fn test_init_applies_exact_values() {
        let (mut surface, _rx) = setup();
        surface.handle_message(Message::init(&CameraState::new(-4.0, 3.5, 4.0, 75.0)));

        assert_eq!(surface.camera_state(), CameraState::new(-4.0, 3.5, 4.0, 75.0));
        assert_eq!(surface.readout().x, "-4.00");
        assert_eq!(surface.readout().fov, "75");
        // A render tick must not drift the camera
        surface.tick();
        assert_eq!(surface.camera_state(), CameraState::new(-4.0, 3.5, 4.0, 75.0));
    }

    #[test]
    fn test_init_keeps_zero_and_defaults_missing() {
        let (mut surface, _rx) = setup();
        surface.handle_message(Message::Init(CameraPayload {
            camera_x: Some(0.0),
            camera_y: None,
            camera_z: Some(5.0),
            fov: None,
        }));
        assert_eq!(surface.camera_state(), CameraState::new(0.0, 3.5, 5.0, 75.0));
    }

    #[test]
    fn test_repeated_init_does_not_touch_target() {
        let (mut surface, _rx) = setup();
        for _ in 0..3 {
            surface.handle_message(Message::init(&CameraState::default()));
        }
        assert_eq!(surface.controls().target_resets(), 1);
    }

    #[test]
    fn test_init_restores_panned_target() {
        let (mut surface, _rx) = setup();
        surface.handle_interaction(Interaction::Pan { dx: 40.0, dy: 10.0 });
        surface.handle_interaction(Interaction::End);
        assert_ne!(surface.controls().target(), DVec3::new(0.0, 0.6, 0.0));

        surface.handle_message(Message::init(&CameraState::default()));
        assert_eq!(surface.controls().target(), DVec3::new(0.0, 0.6, 0.0));
        assert_eq!(surface.controls().target_resets(), 2);
    }

    #[test]
    fn test_sync_preserves_target() {
        let (mut surface, _rx) = setup();
        surface.handle_interaction(Interaction::Pan { dx: -30.0, dy: 5.0 });
        surface.handle_interaction(Interaction::End);
        let target = surface.controls().target();

        surface.handle_message(Message::sync_camera(&CameraState::new(1.0, 2.0, 3.0, 60.0)));
        assert_eq!(surface.controls().target(), target);
        assert_eq!(surface.camera_state(), CameraState::new(1.0, 2.0, 3.0, 60.0));
        assert_eq!(surface.camera().fov, 60.0);
    }

    #[test]
    fn test_interaction_end_reports_rounded_camera() {
        let (mut surface, mut rx) = setup();
        drain(&mut rx);

        surface.handle_interaction(Interaction::Start);
        surface.camera.position = DVec3::new(1.23456, 2.0, 3.0);
        surface.camera.fov = 74.6;
        assert!(drain(&mut rx).is_empty());
        assert!(surface.handle_interaction(Interaction::End));

        let payload = camera_update(&drain(&mut rx));
        assert_eq!(payload.camera_x, Some(1.23));
        assert_eq!(payload.camera_y, Some(2.0));
        assert_eq!(payload.camera_z, Some(3.0));
        assert_eq!(payload.fov, Some(75.0));
    }

    #[test]
    fn test_drag_reports_only_on_end() {
        let (mut surface, mut rx) = setup();
        drain(&mut rx);

        surface.handle_interaction(Interaction::Start);
        for _ in 0..5 {
            surface.handle_interaction(Interaction::Rotate { dx: 12.0, dy: -3.0 });
            surface.tick();
        }
        assert!(drain(&mut rx).is_empty());

        surface.handle_interaction(Interaction::End);
        let payload = camera_update(&drain(&mut rx));
        for value in [payload.camera_x, payload.camera_y, payload.camera_z] {
            let value = value.unwrap();
            assert!((value * 100.0 - (value * 100.0).round()).abs() < 1e-9);
        }
        assert_eq!(payload.fov.unwrap().fract(), 0.0);

        // A second end without a new interaction sends nothing
        assert!(!surface.handle_interaction(Interaction::End));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_damped_glide_after_end_is_not_reported() {
        let (mut surface, mut rx) = setup();
        drain(&mut rx);

        surface.handle_interaction(Interaction::Rotate { dx: 200.0, dy: 0.0 });
        assert!(surface.handle_interaction(Interaction::End));
        let reported = camera_update(&drain(&mut rx));
        assert!(surface.controls().has_pending_input());

        let mut ticks = 0;
        while surface.controls().has_pending_input() && ticks < 10_000 {
            surface.tick();
            ticks += 1;
        }
        assert!(!surface.controls().has_pending_input());

        // The resting position only reaches the local readout
        assert!(drain(&mut rx).is_empty());
        assert_eq!(surface.reports_sent(), 1);
        assert_ne!(surface.readout().x, format!("{:.2}", reported.camera_x.unwrap()));
    }

    #[test]
    fn test_fov_slider_and_reset_report_immediately() {
        let (mut surface, mut rx) = setup();
        drain(&mut rx);

        assert!(surface.handle_interaction(Interaction::SetFov { value: 500.0 }));
        assert_eq!(camera_update(&drain(&mut rx)).fov, Some(120.0));

        surface.handle_interaction(Interaction::Pan { dx: 10.0, dy: 0.0 });
        assert!(surface.handle_interaction(Interaction::Reset));
        let payload = camera_update(&drain(&mut rx));
        assert_eq!(payload.camera_x, Some(-4.05));
        assert_eq!(payload.camera_y, Some(3.56));
        assert_eq!(payload.camera_z, Some(4.16));
        assert_eq!(payload.fov, Some(75.0));
        assert_eq!(surface.controls().target(), DVec3::new(0.0, 0.6, 0.0));
        assert!(!surface.controls().has_pending_input());
    }

    #[test]
    fn test_resize_updates_aspect_and_ignores_invalid() {
        let (mut surface, _rx) = setup();
        surface.handle_message(Message::resize(800.0, 400.0));
        assert_eq!(surface.viewport(), Viewport::new(800.0, 400.0));
        assert_eq!(surface.camera().aspect, 2.0);

        surface.handle_message(Message::Resize(ResizePayload {
            width: Some(0.0),
            height: Some(100.0),
        }));
        surface.handle_message(Message::Resize(ResizePayload {
            width: None,
            height: Some(100.0),
        }));
        assert_eq!(surface.viewport(), Viewport::new(800.0, 400.0));
        assert_eq!(surface.camera().aspect, 2.0);
    }

    #[test]
    fn test_hidden_surface_pauses_damping() {
        let (mut surface, _rx) = setup();
        surface.handle_interaction(Interaction::Rotate { dx: 100.0, dy: 0.0 });
        surface.handle_interaction(Interaction::Visibility { visible: false });

        let before = surface.camera().position;
        for _ in 0..10 {
            assert!(!surface.tick());
        }
        assert_eq!(surface.camera().position, before);
        assert_eq!(surface.render_loop().ticks_skipped(), 10);

        surface.handle_interaction(Interaction::Visibility { visible: true });
        assert!(surface.tick());
        assert_ne!(surface.camera().position, before);
    }

    #[tokio::test]
    async fn test_failed_image_sets_error_tint_silently() {
        let (mut surface, mut rx) = setup();
        drain(&mut rx);

        surface.handle_message(Message::update_image("good.png"));
        let load = surface.next_texture().await.unwrap();
        surface.apply_texture(load);
        assert_eq!(surface.scene().image_face().color, Color::WHITE);

        surface.handle_message(Message::update_image("not-a-url"));
        let load = surface.next_texture().await.unwrap();
        surface.apply_texture(load);
        assert_eq!(surface.scene().image_face().color, Color::ERROR);
        assert!(surface.scene().image_face().texture.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_empty_image_source_is_ignored() {
        let (mut surface, _rx) = setup();
        surface.handle_message(Message::UpdateImage(ImageSource { image_url: None }));
        surface.handle_message(Message::update_image(""));
        assert_eq!(surface.loads_started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_messages_and_stops_with_host() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe();
        let surface = RenderSurface::initialize_scene(
            SurfaceConfig::default(),
            bus.outlet(ContextId::new()),
            Arc::new(MockLoader),
        );
        let (to_surface, surface_inbox) = inbox(ContextId::new());
        let (input_tx, input_rx) = mpsc::channel(8);

        let handle = tokio::spawn(surface.run(surface_inbox, input_rx));

        to_surface.post(Message::init(&CameraState::new(0.0, 2.0, 5.0, 40.0)));
        to_surface.post(Message::update_image("good-image"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        input_tx.send(Interaction::Start).await.unwrap();
        input_tx.send(Interaction::End).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(to_surface);

        let surface = handle.await.unwrap();
        assert_eq!(surface.camera_state(), CameraState::new(0.0, 2.0, 5.0, 40.0));
        assert_eq!(surface.scene().image_face().color, Color::WHITE);
        assert!(surface.render_loop().frames_rendered() > 0);

        let messages = drain(&mut rx);
        assert_eq!(messages[0], Message::ViewerReady);
        let payload = camera_update(&messages[1..]);
        assert_eq!(payload.camera_x, Some(0.0));
        assert_eq!(payload.fov, Some(40.0));
    }
}
