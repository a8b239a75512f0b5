/// Orchestrator module - the coordinating task
///
/// The orchestrator is the only place the device registry is mutated:
/// - Fires scheduler ticks at the configured cadence
/// - Applies probe results delivered by the executor
/// - Serves add/remove/label/settings commands from the front end
/// - Rewrites the persisted document after every change
///
/// Tick timing and result delivery are independent: a tick never waits for
/// a probe, and a slow probe never delays the next tick.


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::monitoring::registry::RegistryError;
use crate::monitoring::types::{Device, DisplayGroup, ProbeOutcome};
use crate::monitoring::{ProbeExecutor, Prober, Scheduler, StatusListener, StatusSink, TickOutcome};
use crate::store::{Document, Labels, Settings};

/// Capacity of the worker to coordinator delivery channel
const DELIVERY_CHANNEL_SIZE: usize = 100;
const COMMAND_CHANNEL_SIZE: usize = 32;

/// Requests served by the coordinating task
#[derive(Debug)]
pub enum Command {
    AddDevice {
        id: String,
        address: String,
        group: DisplayGroup,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    RemoveDevice {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    SetLabel {
        group: DisplayGroup,
        text: String,
    },
    UpdateSettings {
        settings: Settings,
    },
    Snapshot {
        reply: oneshot::Sender<DashboardSnapshot>,
    },
    Shutdown,
}

/// Point-in-time copy of everything the dashboard shows
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    /// Registry insertion order
    pub devices: Vec<Device>,
    pub labels: Labels,
    pub settings: Settings,
}

/// Main orchestrator for the NMS service
pub struct Orchestrator {
    scheduler: Scheduler,
    delivery_rx: mpsc::Receiver<ProbeOutcome>,
    command_rx: mpsc::Receiver<Command>,
    document: Document,
    store_path: PathBuf,
    /// The single pending tick, if any
    next_tick: Option<Instant>,
}

/// Front-end side of a running orchestrator
pub struct OrchestratorHandle {
    command_tx: mpsc::Sender<Command>,
    join: JoinHandle<()>,
}

impl Orchestrator {
    /// Build an orchestrator seeded from `document`.
    ///
    /// The returned handle is the only way to talk to it once spawned.
    pub fn new(
        config: &Config,
        prober: Arc<dyn Prober>,
        listener: Arc<dyn StatusListener>,
        document: Document,
        store_path: PathBuf,
    ) -> (Self, mpsc::Sender<Command>) {
        let (delivery_tx, delivery_rx) = mpsc::channel::<ProbeOutcome>(DELIVERY_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel::<Command>(COMMAND_CHANNEL_SIZE);

        let executor = Arc::new(ProbeExecutor::new(prober, delivery_tx, config.executor_settings()));
        let mut scheduler = Scheduler::new(executor, StatusSink::new(listener), config.cadence());

        for stored in &document.devices {
            if let Err(e) = scheduler.add_device(&stored.id, &stored.address, stored.display_group) {
                warn!("Skipping stored device: {}", e);
            }
        }

        let next_tick = (!scheduler.registry().is_empty()).then(Instant::now);

        let orchestrator = Self {
            scheduler,
            delivery_rx,
            command_rx,
            document,
            store_path,
            next_tick,
        };
        (orchestrator, command_tx)
    }

    /// Create the orchestrator and run it on its own task
    pub fn spawn(
        config: &Config,
        prober: Arc<dyn Prober>,
        listener: Arc<dyn StatusListener>,
        document: Document,
        store_path: PathBuf,
    ) -> OrchestratorHandle {
        let (orchestrator, command_tx) = Self::new(config, prober, listener, document, store_path);
        let join = tokio::spawn(orchestrator.run());
        OrchestratorHandle { command_tx, join }
    }

    /// Run until a `Shutdown` command arrives or every handle is dropped
    pub async fn run(mut self) {
        info!(
            devices = self.scheduler.registry().len(),
            cadence_ms = self.scheduler.cadence().as_millis() as u64,
            "Starting NMS orchestrator"
        );
        let listener = self.listener();
        listener.on_settings_changed(&self.document.settings);
        listener.on_labels_changed(&self.document.labels);

        loop {
            let next_tick = self.next_tick;
            let tick = async move {
                match next_tick {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = tick => self.on_tick(),
                Some(outcome) = self.delivery_rx.recv() => {
                    self.scheduler.apply_outcome(outcome, Utc::now());
                }
                command = self.command_rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        info!("Orchestrator stopped");
    }

    fn on_tick(&mut self) {
        let started = Instant::now();
        self.next_tick = match self.scheduler.tick(started) {
            TickOutcome::Probed { id, next_tick } => {
                debug!(id = %id, "Probe dispatched");
                Some(next_tick)
            }
            TickOutcome::Idle => None,
        };
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddDevice { id, address, group, reply } => {
                let result = self.scheduler.add_device(id, address, group).map(|wake| {
                    if wake && self.next_tick.is_none() {
                        self.next_tick = Some(Instant::now());
                    }
                });
                if result.is_ok() {
                    self.persist();
                }
                let _ = reply.send(result);
            }
            Command::RemoveDevice { id, reply } => {
                let removed = self.scheduler.remove_device(&id);
                if removed {
                    self.persist();
                }
                let _ = reply.send(removed);
            }
            Command::SetLabel { group, text } => {
                self.document.labels.set(group, text);
                self.listener().on_labels_changed(&self.document.labels);
                self.persist();
            }
            Command::UpdateSettings { settings } => {
                self.document.settings = settings;
                self.listener().on_settings_changed(&self.document.settings);
                self.persist();
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(DashboardSnapshot {
                    devices: self.scheduler.registry().iter().cloned().collect(),
                    labels: self.document.labels.clone(),
                    settings: self.document.settings.clone(),
                });
            }
            // handled by the run loop
            Command::Shutdown => {}
        }
    }

    /// Write the full document. Failures are reported, never fatal.
    fn persist(&mut self) {
        self.document.sync_devices(self.scheduler.registry());
        if let Err(e) = self.document.save(&self.store_path) {
            error!("Failed to save devices: {}", e);
            self.listener().on_store_error(&e.to_string());
        }
    }

    fn listener(&self) -> Arc<dyn StatusListener> {
        Arc::clone(self.scheduler.sink().listener())
    }
}

impl OrchestratorHandle {
    pub async fn add_device(
        &self,
        id: impl Into<String>,
        address: impl Into<String>,
        group: DisplayGroup,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddDevice { id: id.into(), address: address.into(), group, reply }).await?;
        rx.await.map_err(|_| anyhow!("Orchestrator dropped the request"))??;
        Ok(())
    }

    pub async fn remove_device(&self, id: impl Into<String>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RemoveDevice { id: id.into(), reply }).await?;
        rx.await.map_err(|_| anyhow!("Orchestrator dropped the request"))
    }

    pub async fn set_label(&self, group: DisplayGroup, text: impl Into<String>) -> Result<()> {
        self.send(Command::SetLabel { group, text: text.into() }).await
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<()> {
        self.send(Command::UpdateSettings { settings }).await
    }

    pub async fn snapshot(&self) -> Result<DashboardSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| anyhow!("Orchestrator dropped the request"))
    }

    /// Stop the coordinating task and wait for it to finish
    pub async fn shutdown(self) -> Result<()> {
        // already stopped is fine
        let _ = self.command_tx.send(Command::Shutdown).await;
        self.join.await?;
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).await.map_err(|_| anyhow!("Orchestrator is not running"))
    }
}
