// ── Bridge facade ──
//
// Wires the MQTT session, device cache and hub gateway together. A
// single processor task consumes both MQTT session events and API
// commands, which makes it the only writer of the device cache.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::DISCOVERY_WILDCARD;
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::{BridgeConfig, MqttSettings};
use crate::connection::{
    ConnectionManager, ConnectionState, InboundMessage, MqttLink, Payload, SessionEvent,
};
use crate::context::SyncContext;
use crate::discovery::DiscoveryProcessor;
use crate::error::CoreError;
use crate::hub::HubGateway;
use crate::model::discovery::is_discovery_topic;
use crate::model::{
    BridgeEvent, ControlDirective, ControlResponse, DeviceSummary, DiscoveryMessage, MacAddress,
};
use crate::ops::Operations;
use crate::reconciler::StateReconciler;
use crate::settings::SettingsStore;
use crate::store::DeviceRegistry;

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

type ProcessorChannels = (
    mpsc::UnboundedReceiver<SessionEvent>,
    mpsc::Receiver<CommandEnvelope>,
);

// ── Bridge ───────────────────────────────────────────────────────────

/// Entry point for the daemon and the CLI.
///
/// Cheaply cloneable. Nothing runs until [`start`](Self::start) or
/// [`set_mqtt_broker`](Self::set_mqtt_broker) is called.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    ctx: Arc<SyncContext>,
    connection: ConnectionManager,
    command_tx: mpsc::Sender<CommandEnvelope>,
    pending: Mutex<Option<ProcessorChannels>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, settings: Arc<dyn SettingsStore>) -> Result<Self, CoreError> {
        Ok(Self::with_gateway(HubGateway::new(config, settings)?))
    }

    pub fn with_gateway(hub: HubGateway) -> Self {
        let (connection, session_rx) = ConnectionManager::new(hub.config().mqtt.clone());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let mqtt: Arc<dyn MqttLink> = Arc::new(connection.clone());

        Self {
            inner: Arc::new(BridgeInner {
                ctx: Arc::new(SyncContext {
                    registry: Arc::new(DeviceRegistry::new()),
                    hub: Arc::new(hub),
                    mqtt,
                    events,
                }),
                connection,
                command_tx,
                pending: Mutex::new(Some((session_rx, command_rx))),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        self.inner.ctx.hub.config()
    }

    /// Subscribe to UI events.
    pub fn events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.ctx.events.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.state()
    }

    /// Topic filters held by the current session.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.connection.subscriptions()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start processing and connect with the stored broker settings.
    pub async fn start(&self) -> Result<(), CoreError> {
        let settings = self.mqtt_broker()?;
        self.spawn_processor().await;
        self.connect(&settings).await?;
        info!("bridge started");
        Ok(())
    }

    /// Stop the MQTT session and the processor task.
    pub async fn shutdown(&self) {
        self.inner.connection.stop().await;
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }
        info!("bridge stopped");
    }

    /// Start, run `f`, shut down.
    pub async fn oneshot<F, Fut, T>(
        config: BridgeConfig,
        settings: Arc<dyn SettingsStore>,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Bridge) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let bridge = Bridge::new(config, settings)?;
        if let Err(e) = bridge.start().await {
            bridge.shutdown().await;
            return Err(e);
        }
        let result = f(bridge.clone()).await;
        bridge.shutdown().await;
        result
    }

    async fn spawn_processor(&self) {
        let Some((session_rx, command_rx)) = self.inner.pending.lock().await.take() else {
            return;
        };
        let handle = tokio::spawn(run_processor(
            Arc::clone(&self.inner.ctx),
            session_rx,
            command_rx,
            self.inner.cancel.clone(),
        ));
        *self.inner.task.lock().await = Some(handle);
    }

    async fn connect(&self, settings: &MqttSettings) -> Result<(), CoreError> {
        self.execute(Command::InvalidateCache).await?;
        self.inner.connection.start(settings).await?;
        self.inner.ctx.hub.settings().set_mqtt_settings(settings)?;
        Ok(())
    }

    async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx,
            })
            .await
            .map_err(|_| not_running())?;
        response_rx.await.map_err(|_| not_running())?
    }

    // ── Device operations ────────────────────────────────────────────

    pub async fn device_list(&self) -> Result<Vec<DeviceSummary>, CoreError> {
        match self.execute(Command::DeviceList).await? {
            CommandResult::Devices(devices) => Ok(devices),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn sync_device(&self, mac: &MacAddress) -> Result<(), CoreError> {
        self.execute(Command::SyncDevice(mac.clone())).await?;
        Ok(())
    }

    /// Returns the devices that were created.
    pub async fn sync_all(&self) -> Result<Vec<MacAddress>, CoreError> {
        match self.execute(Command::SyncAll).await? {
            CommandResult::Synced(macs) => Ok(macs),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn unsync_device(&self, mac: &MacAddress) -> Result<(), CoreError> {
        self.execute(Command::UnsyncDevice(mac.clone())).await?;
        Ok(())
    }

    /// Apply a hub control directive. Never fails: problems are reported
    /// in the returned envelope.
    pub async fn control_device(&self, directive: ControlDirective) -> ControlResponse {
        let message_id = directive.message_id().to_owned();
        match self.execute(Command::Control(Box::new(directive))).await {
            Ok(CommandResult::Control(response)) => response,
            Ok(other) => {
                warn!(error = %unexpected(&other), "control directive failed");
                ControlResponse::unreachable(&message_id)
            }
            Err(e) => {
                warn!(error = %e, "control directive failed");
                ControlResponse::unreachable(&message_id)
            }
        }
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub async fn acquire_token(&self) -> Result<(), CoreError> {
        self.inner.ctx.hub.acquire_token().await
    }

    pub fn auto_sync(&self) -> Result<bool, CoreError> {
        self.inner.ctx.hub.settings().auto_sync()
    }

    /// Changing the flag requires a stored hub token.
    pub fn set_auto_sync(&self, enabled: bool) -> Result<(), CoreError> {
        if !self.inner.ctx.hub.has_token()? {
            return Err(CoreError::HubAuthRequired {
                message: "acquire a hub token before changing auto-sync".into(),
            });
        }
        self.inner.ctx.hub.settings().set_auto_sync(enabled)?;
        info!(enabled, "auto-sync updated");
        Ok(())
    }

    pub fn mqtt_broker(&self) -> Result<MqttSettings, CoreError> {
        self.inner
            .ctx
            .hub
            .settings()
            .mqtt_settings()?
            .ok_or(CoreError::MqttNotConfigured)
    }

    /// Switch to a new broker. The settings are stored whatever the
    /// outcome; a failed attempt leaves no session behind.
    pub async fn set_mqtt_broker(&self, settings: MqttSettings) -> Result<(), CoreError> {
        self.spawn_processor().await;
        let result = self.connect(&settings).await;
        self.inner.ctx.hub.settings().set_mqtt_settings(&settings)?;
        result
    }
}

fn not_running() -> CoreError {
    CoreError::Internal("bridge processor is not running".into())
}

fn unexpected(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

// ── Processor task ───────────────────────────────────────────────────

struct Processor {
    ctx: Arc<SyncContext>,
    discovery: DiscoveryProcessor,
    reconciler: StateReconciler,
    ops: Operations,
    /// Whether the broker was reachable at the last transition.
    reachable: bool,
}

async fn run_processor(
    ctx: Arc<SyncContext>,
    mut session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    mut command_rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    let mut processor = Processor {
        discovery: DiscoveryProcessor::new(Arc::clone(&ctx)),
        reconciler: StateReconciler::new(Arc::clone(&ctx)),
        ops: Operations::new(Arc::clone(&ctx)),
        ctx,
        reachable: false,
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = session_rx.recv() => {
                let Some(event) = event else { break };
                processor.on_session(event).await;
            }
            envelope = command_rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = processor.route(envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
    debug!("bridge processor exiting");
}

impl Processor {
    async fn on_session(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => self.on_connected().await,
            SessionEvent::Message(msg) => self.on_message(&msg).await,
            SessionEvent::Lost { ack } => self.on_lost(ack).await,
        }
    }

    async fn on_connected(&mut self) {
        if let Err(e) = self.ctx.mqtt.subscribe(DISCOVERY_WILDCARD) {
            warn!(error = %e, "discovery subscription failed");
        }
        if self.reachable {
            return;
        }
        self.reachable = true;
        self.ctx.emit(BridgeEvent::MqttConnected {});
        let devices = self.ctx.registry.list();
        self.ctx.repair_online(&devices, false).await;
    }

    async fn on_lost(&mut self, ack: oneshot::Sender<()>) {
        let stale = self.ctx.registry.list();
        self.ctx.registry.clear();
        info!(dropped = stale.len(), "device cache invalidated");
        let _ = ack.send(());

        if !self.reachable {
            return;
        }
        self.reachable = false;
        self.ctx.emit(BridgeEvent::MqttDisconnected {});
        self.ctx.repair_online(&stale, true).await;
    }

    async fn on_message(&self, msg: &InboundMessage) {
        if !is_discovery_topic(&msg.topic) {
            self.reconciler.dispatch(msg).await;
            return;
        }

        let Payload::Json(value) = &msg.payload else {
            warn!(topic = %msg.topic, "discovery payload is not JSON");
            return;
        };
        match serde_json::from_value::<DiscoveryMessage>(value.clone()) {
            Ok(discovery) => self.discovery.process(&discovery).await,
            Err(e) => warn!(topic = %msg.topic, error = %e, "malformed discovery payload"),
        }
    }

    async fn route(&self, command: Command) -> Result<CommandResult, CoreError> {
        match command {
            Command::DeviceList => self.ops.device_list().await.map(CommandResult::Devices),
            Command::SyncDevice(mac) => {
                self.ops.sync_device(&mac).await?;
                Ok(CommandResult::Ok)
            }
            Command::SyncAll => self.ops.sync_all().await.map(CommandResult::Synced),
            Command::UnsyncDevice(mac) => {
                self.ops.unsync_device(&mac).await?;
                Ok(CommandResult::Ok)
            }
            Command::Control(directive) => {
                Ok(CommandResult::Control(self.ops.control_device(&directive)))
            }
            Command::InvalidateCache => {
                self.ctx.registry.clear();
                Ok(CommandResult::Ok)
            }
        }
    }
}
