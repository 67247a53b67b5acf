//! rumqttc-backed transport for AWS IoT Core.
//!
//! [`RumqttConnector`] performs one handshake per call and, on success,
//! spawns a driver task that polls the event loop for the lifetime of the
//! session. rumqttc reconnects on its own after a network failure; the
//! driver reports those transitions as [`ChannelEvent`]s.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelEvent, Connector, Message, Session};
use crate::config::MqttConfig;
use crate::error::{
    ConnectionError, ConnectionResult, PublishError, PublishResult, SubscribeError,
    SubscribeResult,
};
use crate::tls;

/// Subscribe requests waiting for their SUBACK.
///
/// A request is queued when the client hands it to rumqttc, moves to
/// `in_flight` once the event loop assigns it a packet id, and resolves
/// when the matching SUBACK arrives. Dropping a waiter's sender reports the
/// session as gone.
#[derive(Default)]
struct PendingSubAcks {
    queued: VecDeque<oneshot::Sender<bool>>,
    in_flight: HashMap<u16, oneshot::Sender<bool>>,
}

impl PendingSubAcks {
    fn queue(&mut self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.queued.push_back(tx);
        rx
    }

    fn cancel_last(&mut self) {
        self.queued.pop_back();
    }

    fn sent(&mut self, pkid: u16) {
        if let Some(waiter) = self.queued.pop_front() {
            self.in_flight.insert(pkid, waiter);
        }
    }

    fn acked(&mut self, pkid: u16, accepted: bool) {
        if let Some(waiter) = self.in_flight.remove(&pkid) {
            let _ = waiter.send(accepted);
        }
    }

    fn abandon(&mut self) {
        self.queued.clear();
        self.in_flight.clear();
    }
}

type SharedSubAcks = Arc<Mutex<PendingSubAcks>>;

fn lock(pending: &SharedSubAcks) -> MutexGuard<'_, PendingSubAcks> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens sessions to the broker described by an [`MqttConfig`].
pub struct RumqttConnector {
    config: MqttConfig,
}

impl RumqttConnector {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> ConnectionResult<MqttOptions> {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keepalive_secs.into()));
        options.set_clean_session(self.config.clean_session);
        options.set_transport(tls::load_transport(&self.config)?);
        Ok(options)
    }
}

/// Poll until the broker answers CONNECT.
async fn handshake(eventloop: &mut EventLoop) -> ConnectionResult<bool> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(ack.session_present)
                } else {
                    Err(ConnectionError::Handshake(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(ConnectionError::Handshake(e.to_string())),
        }
    }
}

#[async_trait]
impl Connector for RumqttConnector {
    async fn connect(&self) -> ConnectionResult<Session> {
        let options = self.options()?;
        let (client, mut eventloop) = AsyncClient::new(options, self.config.request_capacity);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let session_present = match tokio::time::timeout(timeout, handshake(&mut eventloop)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectionError::Handshake(format!(
                    "no CONNACK within {}s",
                    timeout.as_secs()
                )));
            }
        };
        info!(
            broker = %self.config.broker_host,
            client_id = %self.config.client_id,
            session_present,
            "MQTT session established"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let pending: SharedSubAcks = Arc::default();
        let driver = tokio::spawn(drive(
            eventloop,
            tx,
            pending.clone(),
            Duration::from_secs(self.config.reconnect_delay_secs),
        ));

        Ok(Session {
            channel: Arc::new(RumqttChannel {
                client,
                pending,
                ack_timeout: timeout,
                driver: driver.abort_handle(),
            }),
            events: rx,
        })
    }
}

/// Poll the event loop for one session, translating transport activity into
/// channel events. Exits when the event receiver is gone.
async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<ChannelEvent>,
    pending: SharedSubAcks,
    reconnect_delay: Duration,
) {
    let mut online = true;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if online {
                    None
                } else {
                    online = true;
                    Some(ChannelEvent::Resumed {
                        session_present: ack.session_present,
                    })
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                Some(ChannelEvent::Message(Message::new(
                    publish.topic,
                    publish.payload.to_vec(),
                )))
            }
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                lock(&pending).sent(pkid);
                None
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let accepted = !ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                lock(&pending).acked(ack.pkid, accepted);
                None
            }
            Ok(Event::Incoming(Packet::Disconnect)) if online => {
                online = false;
                lock(&pending).abandon();
                Some(ChannelEvent::Interrupted {
                    reason: "broker sent DISCONNECT".into(),
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "MQTT event loop error");
                lock(&pending).abandon();
                let event = online.then(|| ChannelEvent::Interrupted {
                    reason: e.to_string(),
                });
                online = false;
                if let Some(event) = event {
                    if events.send(event).is_err() {
                        break;
                    }
                }
                tokio::time::sleep(reconnect_delay).await;
                None
            }
        };

        if let Some(event) = event {
            if events.send(event).is_err() {
                break;
            }
        }
        if events.is_closed() {
            break;
        }
    }
    debug!("MQTT driver stopped");
}

/// Outbound half of a rumqttc session.
pub struct RumqttChannel {
    client: AsyncClient,
    pending: SharedSubAcks,
    ack_timeout: Duration,
    driver: AbortHandle,
}

#[async_trait]
impl Channel for RumqttChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> PublishResult<()> {
        self.client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    // Callers serialize subscribes, so queue order matches packet id order.
    async fn subscribe(&self, filter: &str, qos: QoS) -> SubscribeResult<()> {
        let ack = lock(&self.pending).queue();

        if let Err(e) = self.client.subscribe(filter, qos).await {
            lock(&self.pending).cancel_last();
            warn!(filter, error = %e, "subscribe request not queued");
            return Err(SubscribeError::NotConnected);
        }

        match tokio::time::timeout(self.ack_timeout, ack).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(SubscribeError::Rejected {
                filter: filter.to_string(),
                reason: "broker answered SUBACK with a failure code".into(),
            }),
            Ok(Err(_)) => Err(SubscribeError::NotConnected),
            Err(_) => {
                warn!(filter, "no SUBACK within {}s", self.ack_timeout.as_secs());
                Err(SubscribeError::NotConnected)
            }
        }
    }

    async fn unsubscribe(&self, filter: &str) -> SubscribeResult<()> {
        self.client
            .unsubscribe(filter)
            .await
            .map_err(|_| SubscribeError::NotConnected)
    }

    async fn disconnect(&self) -> ConnectionResult<()> {
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| ConnectionError::Handshake(format!("disconnect failed: {e}")));
        self.driver.abort();
        result
    }
}

impl Drop for RumqttChannel {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
