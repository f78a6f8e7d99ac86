// ── MQTT broker collaborator ──
//
// `BrokerLink` over rumqttc. `connect` waits for the broker's CONNACK and
// then runs two tasks: the event-loop task keeps the connection alive
// (and re-subscribes after a reconnect that lost the session), and
// forwards inbound publishes over a bounded channel to the dispatch task,
// which invokes topic handlers one message at a time in arrival order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::BrokerConfig;
use crate::error::CoreError;
use crate::link::{BrokerLink, MessageSink};

const REQUEST_CHANNEL_SIZE: usize = 64;
const INBOUND_CHANNEL_SIZE: usize = 256;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// How long `stop` waits for queued messages to drain after DISCONNECT.
const STOP_GRACE: Duration = Duration::from_secs(2);

struct Inbound {
    topic: String,
    payload: Vec<u8>,
}

/// Broker collaborator backed by rumqttc.
#[derive(Clone)]
pub struct MqttBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    client: AsyncClient,
    address: String,
    retain: bool,
    handlers: DashMap<String, Arc<dyn MessageSink>>,
    /// Topics to restore when a reconnect comes back without a session.
    subscriptions: DashSet<String>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MqttBroker {
    /// Connect to the broker and start the delivery loop.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, CoreError> {
        let address = config.address();
        let client_id = config.effective_client_id();
        info!(broker = %address, client_id = %client_id, "connecting to MQTT broker");

        let options = mqtt_options(config, client_id);
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_SIZE);

        match tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(CoreError::BrokerConnect { address, reason }),
            Err(_) => {
                return Err(CoreError::BrokerConnect {
                    address,
                    reason: format!("no CONNACK within {}s", config.connect_timeout.as_secs()),
                });
            }
        }
        info!(broker = %address, "connected to MQTT broker");

        let inner = Arc::new(BrokerInner {
            client,
            address,
            retain: config.retain,
            handlers: DashMap::new(),
            subscriptions: DashSet::new(),
            cancel: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        });

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
        {
            let mut handles = inner.task_handles.lock().await;
            handles.push(tokio::spawn(event_loop_task(
                Arc::clone(&inner),
                eventloop,
                tx,
            )));
            handles.push(tokio::spawn(dispatch_task(Arc::clone(&inner), rx)));
        }

        Ok(Self { inner })
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }
}

fn mqtt_options(config: &BrokerConfig, client_id: String) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, config.host.clone(), config.port);
    opts.set_keep_alive(config.keep_alive);
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        opts.set_credentials(user.clone(), pass.expose_secret().to_owned());
    }
    opts
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("connection refused: {:?}", ack.code))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
}

#[async_trait]
impl BrokerLink for MqttBroker {
    async fn subscribe(&self, topic: &str) -> Result<(), CoreError> {
        self.inner.subscriptions.insert(topic.to_owned());
        self.inner.client.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    fn register_topic_handler(&self, topic: &str, sink: Arc<dyn MessageSink>) {
        if self.inner.handlers.insert(topic.to_owned(), sink).is_some() {
            debug!(topic, "topic handler replaced");
        }
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError> {
        trace!(topic, payload, "publish");
        self.inner
            .client
            .publish(topic, QoS::AtMostOnce, self.inner.retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        if let Err(e) = self.inner.client.try_disconnect() {
            debug!(error = %e, "disconnect request not queued");
        }

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        let join = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "broker task ended abnormally");
                }
            }
        };
        if tokio::time::timeout(STOP_GRACE, join).await.is_err() {
            warn!(broker = %self.inner.address, "broker tasks did not drain in time");
        }
        self.inner.cancel.cancel();

        self.inner.handlers.clear();
        info!(broker = %self.inner.address, "MQTT broker stopped");
        Ok(())
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn event_loop_task(
    inner: Arc<BrokerInner>,
    mut eventloop: EventLoop,
    tx: mpsc::Sender<Inbound>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let event = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = Inbound {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                backoff = INITIAL_BACKOFF;
                info!(
                    broker = %inner.address,
                    session_present = ack.session_present,
                    "reconnected to MQTT broker"
                );
                if !ack.session_present {
                    resubscribe(&inner);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent, event loop ending");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    broker = %inner.address,
                    error = %e,
                    retry_in_secs = backoff.as_secs(),
                    "MQTT connection error"
                );
                tokio::select! {
                    biased;
                    () = inner.cancel.cancelled() => break,
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

fn resubscribe(inner: &BrokerInner) {
    for topic in inner.subscriptions.iter() {
        if let Err(e) = inner.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
            warn!(topic = topic.as_str(), error = %e, "resubscribe failed");
        }
    }
}

async fn dispatch_task(inner: Arc<BrokerInner>, mut rx: mpsc::Receiver<Inbound>) {
    loop {
        let msg = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        // Clone out of the map so no shard lock is held across the await.
        let sink = inner.handlers.get(&msg.topic).map(|h| Arc::clone(h.value()));
        match sink {
            Some(sink) => sink.on_message(&msg.topic, &msg.payload).await,
            None => trace!(topic = %msg.topic, "no handler for topic"),
        }
    }
}
