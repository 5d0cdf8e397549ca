//! MQTT Adapter
//!
//! Bus control surface: every message on the control topic becomes a
//! [`ControlEvent`] whose action is the payload text. The same client is the
//! transport for the retained status messages (see [`StatusSink`]).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnAck, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument, Span};

use crate::adapters::traits::StatusSink;
use crate::bus::{ControlEvent, EventBus};

pub const DEFAULT_URI: &str = "tcp://localhost:1883";
pub const DEFAULT_CLIENT_ID: &str = "mpd-controller";
pub const DEFAULT_CONTROL_TOPIC: &str = "home/media/control";

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_PAUSE: Duration = Duration::from_secs(5);
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 10;

/// Broker host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

/// Accepts `tcp://host:port`, `mqtt://host:port` or a bare `host[:port]`
pub fn parse_broker_uri(uri: &str) -> Result<BrokerAddress> {
    let trimmed = uri.trim();
    let rest = match trimmed.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some((scheme, _)) => bail!("unsupported MQTT scheme {:?} in {}", scheme, uri),
        None => trimmed,
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid MQTT port in {}", uri))?;
            (host, port)
        }
        None => (rest, DEFAULT_PORT),
    };

    if host.is_empty() {
        bail!("missing MQTT host in {:?}", uri);
    }
    Ok(BrokerAddress {
        host: host.to_string(),
        port,
    })
}

/// Connection settings for the adapter
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub uri: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub control_topic: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: None,
            password: None,
            control_topic: DEFAULT_CONTROL_TOPIC.to_string(),
        }
    }
}

impl MqttSettings {
    fn options(&self) -> Result<MqttOptions> {
        let broker = parse_broker_uri(&self.uri)?;
        let mut options = MqttOptions::new(&self.client_id, broker.host, broker.port);
        options.set_keep_alive(KEEP_ALIVE);

        // Credentials only when provided
        if let Some(user) = self.username.as_deref().filter(|u| !u.is_empty()) {
            options.set_credentials(user, self.password.as_deref().unwrap_or(""));
        }
        Ok(options)
    }
}

/// Event for one inbound control message
pub fn control_event(payload: &[u8]) -> ControlEvent {
    ControlEvent::bus(&String::from_utf8_lossy(payload))
}

/// MQTT Adapter
pub struct MqttAdapter {
    settings: MqttSettings,
    bus: EventBus,
    client: Arc<RwLock<Option<AsyncClient>>>,
    connected: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    span: Span,
}

impl MqttAdapter {
    pub fn new(settings: MqttSettings, bus: EventBus) -> Self {
        Self {
            settings,
            bus,
            client: Arc::new(RwLock::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
            shutdown: CancellationToken::new(),
            span: info_span!("mqtt"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect, wait for the broker's acknowledgement and subscribe.
    /// Failing to reach the broker here is fatal for the caller.
    async fn start_internal(&self) -> Result<()> {
        let options = self.settings.options()?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        tracing::info!(parent: &self.span, "MQTT connecting to {}...", self.settings.uri);
        let ack = tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| anyhow!("MQTT connect to {} timed out", self.settings.uri))?
            .with_context(|| format!("MQTT connect to {} failed", self.settings.uri))?;
        tracing::info!(parent: &self.span, "MQTT connected (code: {:?})", ack.code);
        self.connected.store(true, Ordering::SeqCst);

        client
            .subscribe(&self.settings.control_topic, QoS::AtMostOnce)
            .await
            .context("MQTT subscribe failed")?;
        tracing::info!(parent: &self.span, "Subscribed to {}", self.settings.control_topic);

        {
            let mut client_guard = self.client.write().await;
            *client_guard = Some(client.clone());
        }

        let handle = tokio::spawn(
            run_event_loop(
                eventloop,
                client,
                self.bus.clone(),
                self.settings.control_topic.clone(),
                self.connected.clone(),
                self.shutdown.clone(),
            )
            .instrument(self.span.clone()),
        );
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop_internal(&self) {
        let client = self.client.write().await.take();
        let task = self.task.lock().await.take();

        if let Some(client) = client {
            let _ = client.try_disconnect();
        }
        // Let the event loop flush the DISCONNECT, then force it down
        if let Some(mut task) = task {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                self.shutdown.cancel();
                let _ = task.await;
            }
        }
        self.shutdown.cancel();
        self.connected.store(false, Ordering::SeqCst);

        tracing::info!(parent: &self.span, "MQTT adapter stopped");
    }
}

crate::impl_startable!(MqttAdapter, "mqtt");

#[async_trait]
impl StatusSink for MqttAdapter {
    /// Queue a retained QoS 0 publish. Never waits on the network.
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let client = self.client.read().await.clone();
        let Some(client) = client else {
            bail!("MQTT client not running");
        };
        client
            .try_publish(topic, QoS::AtMostOnce, true, payload)
            .with_context(|| format!("publish to {}", topic))?;
        Ok(())
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<ConnAck> {
    loop {
        if let Event::Incoming(Incoming::ConnAck(ack)) = eventloop.poll().await? {
            return Ok(ack);
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    bus: EventBus,
    control_topic: String,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("MQTT event loop shutting down");
                break;
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        if publish.topic != control_topic {
                            tracing::debug!("Ignoring message on {}", publish.topic);
                            continue;
                        }
                        let event = control_event(&publish.payload);
                        tracing::debug!("MQTT control message: {}", event);

                        let sent = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            sent = bus.publish(event) => sent,
                        };
                        if let Err(e) = sent {
                            tracing::warn!("{}", e);
                        }
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        tracing::info!("MQTT reconnected (code: {:?})", ack.code);
                        connected.store(true, Ordering::SeqCst);
                        // Clean sessions drop subscriptions on reconnect
                        if let Err(e) = client.try_subscribe(&control_topic, QoS::AtMostOnce) {
                            tracing::error!("MQTT resubscribe to {} failed: {}", control_topic, e);
                        }
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => {
                        tracing::warn!("MQTT disconnected by broker");
                        connected.store(false, Ordering::SeqCst);
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        tracing::info!("MQTT disconnect sent");
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        tracing::error!("MQTT error: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        // Check shutdown before sleeping
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(RETRY_PAUSE) => {}
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}
