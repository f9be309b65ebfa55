//! Session driver
//!
//! Wires host/surface pairs onto one shared message bus and drives them from
//! a stream of JSON command lines, one command per line:
//!
//! ```text
//! {"cmd": "set", "field": "fov", "value": 60}
//! {"cmd": "orbit", "instance": 1, "dx": 40, "dy": 0}
//! {"cmd": "end", "instance": 1}
//! ```

use anyhow::{anyhow, Context, Result};
use camlink_core::{inbox, ContextId, DescriptionCache, ExecutionOutput, ImagePayload, MessageBus};
use camlink_host::{
    DirtyFlag, DirtyNotifier, HostCommand, HostController, HostStatus, ParamFields, SurfaceMount,
    TransientResource,
};
use camlink_scene::{Interaction, RenderSurface, SourceLoader};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;

/// One input line
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandLine {
    /// Target instance
    #[serde(default)]
    pub instance: usize,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Edit a host field
    Set { field: String, value: f64 },
    /// Container resize observed by the host
    Resize { width: f64, height: f64 },
    /// New image payload on the host
    Image { url: String },
    /// Run the view description and deliver its output to the host
    Execute {
        #[serde(default)]
        node: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
    Orbit { dx: f64, dy: f64 },
    Pan { dx: f64, dy: f64 },
    Zoom { factor: f64 },
    End,
    /// Surface FOV slider
    Fov { value: f64 },
    Reset,
    Visibility { visible: bool },
    Sleep { ms: u64 },
    Show,
    Teardown,
    Quit,
}

/// Whether to keep reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Dirty notifier that counts and logs
#[derive(Debug, Clone)]
struct LoggedDirty {
    instance: usize,
    flag: DirtyFlag,
}

impl DirtyNotifier for LoggedDirty {
    fn mark_dirty(&self) {
        self.flag.mark_dirty();
        info!(instance = self.instance, "Host fields updated from surface");
    }
}

type Host = HostController<ParamFields, LoggedDirty>;

struct Instance {
    host_tx: mpsc::Sender<HostCommand>,
    input_tx: Option<mpsc::Sender<Interaction>>,
    host_task: JoinHandle<Host>,
    surface_task: JoinHandle<RenderSurface<SourceLoader>>,
    dirty: DirtyFlag,
    torn_down: bool,
}

/// Final state of one instance after shutdown
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub instance: usize,
    pub host: HostStatus,
    pub dirty_count: u64,
    pub frames_rendered: u64,
    pub reports_sent: u64,
}

/// Running host/surface pairs
pub struct Session {
    instances: Vec<Instance>,
    descriptions: DescriptionCache,
}

impl Session {
    /// Spawn `config.session.instances` host/surface pairs on one bus
    pub fn start(config: &Config) -> Result<Self> {
        let bus = MessageBus::new();
        let host_config = config.to_host_config();
        let surface_config = config.to_surface_config();
        let loader = Arc::new(
            SourceLoader::new(surface_config.texture_timeout)
                .context("Failed to create texture loader")?,
        );

        let mut instances = Vec::with_capacity(config.session.instances);
        for index in 0..config.session.instances {
            let dirty = DirtyFlag::new();
            let mut host = HostController::new(
                host_config.clone(),
                bus.clone(),
                ParamFields::with_camera_defaults(),
                LoggedDirty {
                    instance: index,
                    flag: dirty.clone(),
                },
            );

            // The host must be listening before the surface announces readiness
            let surface_id = ContextId::new();
            let (to_surface, surface_inbox) = inbox(host.id());
            let resource = TransientResource::new(
                format!("blob:camlink/{}", surface_id),
                |url: &str| debug!(url, "Released surface document"),
            );
            host.initialize(SurfaceMount::new(surface_id, to_surface).with_resource(resource));

            let surface = RenderSurface::initialize_scene(
                surface_config.clone(),
                bus.outlet(surface_id),
                loader.clone(),
            );

            let (host_tx, host_rx) = mpsc::channel(32);
            let (input_tx, input_rx) = mpsc::channel(32);
            info!(instance = index, host = %host.id(), surface = %surface_id, "Instance started");

            instances.push(Instance {
                host_tx,
                input_tx: Some(input_tx),
                host_task: tokio::spawn(host.run(host_rx)),
                surface_task: tokio::spawn(surface.run(surface_inbox, input_rx)),
                dirty,
                torn_down: false,
            });
        }

        Ok(Self {
            instances,
            descriptions: DescriptionCache::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Read and execute command lines until EOF or `quit`.
    /// Malformed lines are logged and skipped.
    pub async fn run<R>(&mut self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read command")? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: CommandLine = match serde_json::from_str(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(line, "Skipping malformed command: {}", e);
                    continue;
                }
            };
            match self.execute(parsed).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => warn!("Command failed: {:#}", e),
            }
        }
        Ok(())
    }

    pub async fn execute(&mut self, line: CommandLine) -> Result<Flow> {
        let index = line.instance;
        match line.command {
            Command::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::Set { field, value } => {
                self.send_host(index, HostCommand::FieldChanged { name: field, value })
                    .await?;
            }
            Command::Resize { width, height } => {
                self.send_host(index, HostCommand::Resized { width, height })
                    .await?;
            }
            Command::Image { url } => {
                self.send_host(index, HostCommand::PayloadAvailable(ImagePayload::new(url)))
                    .await?;
            }
            Command::Execute { node, image } => {
                let status = self.status(index).await?;
                let node = node.unwrap_or_else(|| format!("instance-{}", index));
                let description = self.descriptions.describe(Some(&node), &status.camera);
                println!("{}", serde_json::to_string(&description)?);

                let output = match image {
                    Some(image) => ExecutionOutput::with_image(image),
                    None => ExecutionOutput::default(),
                };
                self.send_host(index, HostCommand::Executed(serde_json::to_value(&output)?))
                    .await?;
            }
            Command::Show => {
                let status = self.status(index).await?;
                println!("{}", serde_json::to_string(&status)?);
            }
            Command::Teardown => {
                self.send_host(index, HostCommand::Teardown).await?;
                let instance = self.instance_mut(index)?;
                instance.torn_down = true;
                instance.input_tx = None;
                info!(instance = index, "Instance torn down");
            }
            Command::Orbit { dx, dy } => self.send_input(index, Interaction::Rotate { dx, dy }).await?,
            Command::Pan { dx, dy } => self.send_input(index, Interaction::Pan { dx, dy }).await?,
            Command::Zoom { factor } => self.send_input(index, Interaction::Zoom { factor }).await?,
            Command::End => self.send_input(index, Interaction::End).await?,
            Command::Fov { value } => self.send_input(index, Interaction::SetFov { value }).await?,
            Command::Reset => self.send_input(index, Interaction::Reset).await?,
            Command::Visibility { visible } => {
                self.send_input(index, Interaction::Visibility { visible })
                    .await?
            }
        }
        Ok(Flow::Continue)
    }

    /// Current host status of an instance
    pub async fn status(&self, index: usize) -> Result<HostStatus> {
        let (reply, status) = oneshot::channel();
        self.send_host(index, HostCommand::Inspect(reply)).await?;
        status
            .await
            .map_err(|_| anyhow!("instance {} did not answer", index))
    }

    /// Number of dirty notifications an instance's host has raised
    #[cfg(test)]
    pub fn dirty_count(&self, index: usize) -> Option<u64> {
        self.instances.get(index).map(|i| i.dirty.count())
    }

    fn instance(&self, index: usize) -> Result<&Instance> {
        let instance = self
            .instances
            .get(index)
            .ok_or_else(|| anyhow!("no instance {}", index))?;
        if instance.torn_down {
            return Err(anyhow!("instance {} was torn down", index));
        }
        Ok(instance)
    }

    fn instance_mut(&mut self, index: usize) -> Result<&mut Instance> {
        self.instances
            .get_mut(index)
            .ok_or_else(|| anyhow!("no instance {}", index))
    }

    async fn send_host(&self, index: usize, command: HostCommand) -> Result<()> {
        self.instance(index)?
            .host_tx
            .send(command)
            .await
            .map_err(|_| anyhow!("host {} has stopped", index))
    }

    async fn send_input(&self, index: usize, interaction: Interaction) -> Result<()> {
        let input = self
            .instance(index)?
            .input_tx
            .as_ref()
            .ok_or_else(|| anyhow!("instance {} takes no input", index))?;
        input
            .send(interaction)
            .await
            .map_err(|_| anyhow!("surface {} has stopped", index))
    }

    /// Tear down every instance and wait for both sides to stop
    pub async fn shutdown(self) -> Result<Vec<InstanceReport>> {
        let mut reports = Vec::with_capacity(self.instances.len());
        for (index, instance) in self.instances.into_iter().enumerate() {
            let Instance {
                host_tx,
                input_tx,
                host_task,
                surface_task,
                dirty,
                torn_down,
            } = instance;

            if !torn_down {
                // The host may already be gone; nothing to tear down then
                let _ = host_tx.send(HostCommand::Teardown).await;
            }
            drop(host_tx);
            drop(input_tx);

            let host = host_task.await.context("Host task failed")?;
            let surface = surface_task.await.context("Surface task failed")?;
            let report = InstanceReport {
                instance: index,
                host: host.status(),
                dirty_count: dirty.count(),
                frames_rendered: surface.render_loop().frames_rendered(),
                reports_sent: surface.reports_sent(),
            };
            info!(
                instance = index,
                frames = report.frames_rendered,
                reports = report.reports_sent,
                dirty = report.dirty_count,
                "Instance stopped"
            );
            reports.push(report);
        }
        Ok(reports)
    }
}
