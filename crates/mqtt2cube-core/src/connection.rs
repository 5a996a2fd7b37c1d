// ── MQTT connection manager ──
//
// Owns the single MQTT session. A background task drives the rumqttc
// event loop and turns its output into `SessionEvent`s for the bridge.
// Reconnects happen on a fixed delay until `stop()`; losing a live
// session is reported with an acknowledgement channel so the bridge can
// invalidate its cache before the next connection attempt is made.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::{DashMap, DashSet};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{MqttSettings, MqttTuning};
use crate::error::CoreError;

/// Request queue depth between `AsyncClient` and its event loop.
const CLIENT_CHANNEL_CAPACITY: usize = 64;

// ── Messages ─────────────────────────────────────────────────────────

/// Decoded inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// JSON when it parses, text otherwise. Empty payloads yield `None`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Some(match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        })
    }

    /// The payload as a plain string (text, or a JSON string literal).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(value) => value.as_str(),
        }
    }

    /// The payload as a JSON object.
    pub fn as_object(&self) -> Option<&serde_json::Map<String, Value>> {
        match self {
            Self::Json(value) => value.as_object(),
            Self::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Payload,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// What the session task reports to its owner.
#[derive(Debug)]
pub enum SessionEvent {
    /// The broker accepted a connection (first one or a reconnect).
    Connected,
    Message(InboundMessage),
    /// A live session dropped. No reconnect is attempted until `ack`
    /// is answered or dropped.
    Lost { ack: oneshot::Sender<()> },
}

// ── Link seam ────────────────────────────────────────────────────────

/// Outbound MQTT operations used by discovery, reconciliation and
/// device control.
pub trait MqttLink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Subscribe at QoS 2. No-op for an empty or already held filter.
    fn subscribe(&self, topic: &str) -> Result<(), CoreError>;

    /// No-op for an empty or unknown filter.
    fn unsubscribe(&self, topic: &str) -> Result<(), CoreError>;

    /// Publish at QoS 1, not retained.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError>;
}

// ── ConnectionState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

// ── ConnectionManager ────────────────────────────────────────────────

/// Cheaply cloneable handle to the MQTT session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    tuning: MqttTuning,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<Session>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Self-published topics and the instant their echo stops being
    /// suppressed.
    echoes: DashMap<String, Instant>,
    subscriptions: DashSet<String>,
    starting: AtomicBool,
}

struct Session {
    client: AsyncClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Clears the `starting` flag however `start` exits.
struct StartGuard<'a>(&'a AtomicBool);

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ConnectionManager {
    /// Create a manager and the receiver its session events go to.
    pub fn new(tuning: MqttTuning) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            inner: Arc::new(ConnInner {
                tuning,
                state,
                session: Mutex::new(None),
                events,
                echoes: DashMap::new(),
                subscriptions: DashSet::new(),
                starting: AtomicBool::new(false),
            }),
        };
        (manager, rx)
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Topic filters currently held.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut subs: Vec<String> = self
            .inner
            .subscriptions
            .iter()
            .map(|t| t.key().clone())
            .collect();
        subs.sort();
        subs
    }

    /// Open a session with `settings`, replacing any previous one.
    ///
    /// Resolves once the broker acknowledges the first connection. If
    /// that first attempt fails or exceeds the connect timeout, the
    /// session is torn down and no reconnect is scheduled.
    pub async fn start(&self, settings: &MqttSettings) -> Result<(), CoreError> {
        if self.inner.starting.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyConnecting);
        }
        let _guard = StartGuard(&self.inner.starting);

        self.inner.teardown().await;
        self.inner.subscriptions.clear();
        self.inner.state.send_replace(ConnectionState::Connecting);
        info!(host = %settings.host, port = settings.port, "connecting to MQTT broker");

        let mut options = MqttOptions::new(
            uuid::Uuid::new_v4().to_string(),
            settings.host.clone(),
            settings.port,
        );
        options.set_keep_alive(self.inner.tuning.keepalive);
        options.set_clean_session(true);
        if let Some((username, password)) = settings.credentials() {
            options.set_credentials(username, password.expose_secret());
        }

        let (client, eventloop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let (first_tx, first_rx) = oneshot::channel();
        let task = tokio::spawn(session_task(
            Arc::clone(&self.inner),
            eventloop,
            cancel.clone(),
            first_tx,
        ));
        self.inner.install(Session {
            client,
            cancel,
            task,
        })?;

        let timeout = self.inner.tuning.connect_timeout;
        let outcome = match tokio::time::timeout(timeout, first_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("session ended before connecting".to_owned()),
            Err(_) => Err(format!("no answer within {}s", timeout.as_secs())),
        };

        if let Err(reason) = outcome {
            warn!(host = %settings.host, port = settings.port, %reason, "MQTT connect failed");
            self.inner.teardown().await;
            self.inner.state.send_replace(ConnectionState::Disconnected);
            return Err(CoreError::MqttConnectFailed {
                host: settings.host.clone(),
                port: settings.port,
                reason,
            });
        }
        Ok(())
    }

    /// Close the session for good; no reconnect follows.
    pub async fn stop(&self) {
        self.inner.teardown().await;
        self.inner.subscriptions.clear();
        self.inner.state.send_replace(ConnectionState::Disconnected);
        info!("MQTT session stopped");
    }

    fn client(&self) -> Result<AsyncClient, CoreError> {
        if !self.is_connected() {
            return Err(CoreError::MqttDisconnected);
        }
        self.inner
            .session
            .lock()
            .map_err(|_| CoreError::Internal("MQTT session lock poisoned".into()))?
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(CoreError::MqttDisconnected)
    }
}

impl MqttLink for ConnectionManager {
    fn is_connected(&self) -> bool {
        self.current_state() == ConnectionState::Connected
    }

    fn subscribe(&self, topic: &str) -> Result<(), CoreError> {
        if topic.is_empty() || self.inner.subscriptions.contains(topic) {
            return Ok(());
        }
        self.client()?
            .try_subscribe(topic, QoS::ExactlyOnce)
            .map_err(|e| CoreError::Internal(format!("subscribe {topic}: {e}")))?;
        self.inner.subscriptions.insert(topic.to_owned());
        debug!(topic, "subscribed");
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
        if topic.is_empty() || !self.inner.subscriptions.contains(topic) {
            return Ok(());
        }
        self.client()?
            .try_unsubscribe(topic)
            .map_err(|e| CoreError::Internal(format!("unsubscribe {topic}: {e}")))?;
        self.inner.subscriptions.remove(topic);
        debug!(topic, "unsubscribed");
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError> {
        self.client()?
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| CoreError::PublishFailed {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })?;
        self.inner.remember_echo(topic);
        debug!(topic, payload, "published");
        Ok(())
    }
}

impl ConnInner {
    fn install(&self, session: Session) -> Result<(), CoreError> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| CoreError::Internal("MQTT session lock poisoned".into()))?;
        *slot = Some(session);
        Ok(())
    }

    /// Cancel the current session and wait for its task to exit, so it
    /// can no longer touch the state or emit events.
    async fn teardown(&self) {
        let previous = match self.session.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(session) = previous {
            session.cancel.cancel();
            let _ = session.client.try_disconnect();
            if let Err(e) = session.task.await {
                warn!(error = %e, "MQTT session task ended abnormally");
            }
            debug!("previous MQTT session torn down");
        }
    }

    fn remember_echo(&self, topic: &str) {
        let now = Instant::now();
        self.echoes.retain(|_, expires| *expires > now);
        self.echoes.insert(topic.to_owned(), now + self.tuning.echo_ttl);
    }

    /// Whether the next delivery on `topic` is our own publish coming back.
    /// Consumes the entry either way.
    fn take_echo(&self, topic: &str) -> bool {
        self.echoes
            .remove(topic)
            .is_some_and(|(_, expires)| expires > Instant::now())
    }

    fn deliver(&self, topic: &str, bytes: &[u8]) {
        if self.take_echo(topic) {
            debug!(topic, "ignoring echo of own publish");
            return;
        }
        let Some(payload) = Payload::decode(bytes) else {
            debug!(topic, "ignoring empty payload");
            return;
        };
        let _ = self
            .events
            .send(SessionEvent::Message(InboundMessage::new(topic, payload)));
    }
}

// ── Session task ─────────────────────────────────────────────────────

async fn session_task(
    inner: Arc<ConnInner>,
    mut eventloop: EventLoop,
    cancel: CancellationToken,
    first: oneshot::Sender<Result<(), String>>,
) {
    let mut first = Some(first);
    let mut live = false;

    loop {
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                live = true;
                if let Some(tx) = first.take() {
                    let _ = tx.send(Ok(()));
                }
                inner.state.send_replace(ConnectionState::Connected);
                info!("MQTT session established");
                let _ = inner.events.send(SessionEvent::Connected);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                inner.deliver(&publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(e.to_string()));
                    break;
                }

                if live {
                    live = false;
                    warn!(error = %e, "MQTT session lost");
                    inner.subscriptions.clear();
                    inner.state.send_replace(ConnectionState::Reconnecting);

                    let (ack, done) = oneshot::channel();
                    if inner.events.send(SessionEvent::Lost { ack }).is_ok() {
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            _ = done => {}
                        }
                    }
                } else {
                    debug!(error = %e, "MQTT reconnect attempt failed");
                }

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(inner.tuning.reconnect_delay) => {}
                }
            }
        }
    }

    debug!("MQTT session task exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> (ConnectionManager, mpsc::UnboundedReceiver<SessionEvent>) {
        ConnectionManager::new(MqttTuning {
            connect_timeout: Duration::from_secs(5),
            ..MqttTuning::default()
        })
    }

    fn next_message(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Option<InboundMessage> {
        match rx.try_recv() {
            Ok(SessionEvent::Message(msg)) => Some(msg),
            _ => None,
        }
    }

    #[test]
    fn payload_decoding() {
        assert_eq!(Payload::decode(b""), None);
        assert_eq!(
            Payload::decode(br#"{"POWER":"ON"}"#),
            Some(Payload::Json(json!({ "POWER": "ON" })))
        );
        assert_eq!(Payload::decode(b"Online"), Some(Payload::Text("Online".into())));
        assert_eq!(Payload::decode(b"Online").unwrap().as_str(), Some("Online"));
        assert_eq!(Payload::decode(br#""ON""#).unwrap().as_str(), Some("ON"));
    }

    #[test]
    fn empty_payload_is_dropped() {
        let (mgr, mut rx) = manager();
        mgr.inner.deliver("stat/dev/RESULT", b"");
        assert!(next_message(&mut rx).is_none());
    }

    #[test]
    fn own_publish_echo_is_suppressed_once() {
        let (mgr, mut rx) = manager();
        mgr.inner.remember_echo("stat/dev/POWER");

        mgr.inner.deliver("stat/dev/POWER", b"ON");
        assert!(next_message(&mut rx).is_none());

        mgr.inner.deliver("stat/dev/POWER", b"ON");
        let msg = next_message(&mut rx).unwrap();
        assert_eq!(msg.topic, "stat/dev/POWER");
    }

    #[test]
    fn expired_echo_is_not_suppressed() {
        let (mgr, mut rx) = ConnectionManager::new(MqttTuning {
            echo_ttl: Duration::ZERO,
            ..MqttTuning::default()
        });
        mgr.inner.remember_echo("stat/dev/POWER");
        mgr.inner.deliver("stat/dev/POWER", b"ON");
        assert!(next_message(&mut rx).is_some());
    }

    #[test]
    fn empty_topics_are_noops_even_when_disconnected() {
        let (mgr, _rx) = manager();
        mgr.subscribe("").unwrap();
        mgr.unsubscribe("").unwrap();
        mgr.unsubscribe("never/held").unwrap();
        assert!(mgr.subscriptions().is_empty());
    }

    #[test]
    fn publish_requires_connection() {
        let (mgr, _rx) = manager();
        let err = mgr.publish("cmnd/dev/POWER", "on").unwrap_err();
        assert_eq!(err.result_code(), 603);
        assert!(matches!(mgr.subscribe("a/b").unwrap_err(), CoreError::MqttDisconnected));
    }

    #[tokio::test]
    async fn teardown_waits_for_session_task() {
        let (mgr, _rx) = manager();
        let (client, _eventloop) =
            AsyncClient::new(MqttOptions::new("test", "127.0.0.1", 1), CLIENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = {
            let inner = Arc::clone(&mgr.inner);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                inner.state.send_replace(ConnectionState::Reconnecting);
            })
        };
        mgr.inner.install(Session { client, cancel, task }).unwrap();

        mgr.stop().await;
        // The late write landed before `stop` returned and was overwritten.
        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unreachable_broker_fails_start() {
        let (mgr, _rx) = manager();
        let err = mgr.start(&MqttSettings::new("127.0.0.1", 1)).await.unwrap_err();
        assert_eq!(err.result_code(), 1001);
        assert_eq!(mgr.current_state(), ConnectionState::Disconnected);
    }
}
