//! In-memory broker for testing without a real endpoint.
//!
//! [`MockBroker`] implements [`Connector`] and hands out [`MockChannel`]
//! sessions. It records every handshake, publish and subscribe request,
//! loops publishes back to matching subscriptions, answers the reserved
//! shadow get/update topics like the managed shadow service, and lets tests
//! inject handshake failures, interruptions and subscription rejections.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fg_protocol::shadows::{ShadowDocument, ShadowGetRequest, ShadowRejection};
use fg_protocol::topics;
use rumqttc::QoS;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelEvent, Connector, Message, Session};
use crate::error::{
    ConnectionError, ConnectionResult, PublishError, PublishResult, SubscribeError,
    SubscribeResult,
};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl PublishedMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

struct LiveSession {
    id: u64,
    events: mpsc::UnboundedSender<ChannelEvent>,
    filters: BTreeSet<String>,
    online: bool,
}

#[derive(Default)]
struct BrokerState {
    next_session: u64,
    session: Option<LiveSession>,
    handshakes: u32,
    fail_next: u32,
    always_fail: bool,
    reject_publishes: bool,
    silent_shadow: bool,
    rejected_filters: HashSet<String>,
    published: Vec<PublishedMessage>,
    subscribe_requests: Vec<String>,
    disconnects: u32,
    shadows: HashMap<String, ShadowDocument>,
}

impl BrokerState {
    fn live(&mut self, id: u64) -> Option<&mut LiveSession> {
        self.session
            .as_mut()
            .filter(|s| s.id == id && s.online)
    }

    /// Deliver to the live session when one of its filters matches.
    fn deliver(&self, topic: &str, payload: Vec<u8>) {
        if let Some(session) = self.session.as_ref().filter(|s| s.online) {
            let subscribed = session
                .filters
                .iter()
                .any(|f| topics::matches_filter(f, topic));
            if subscribed {
                let _ = session
                    .events
                    .send(ChannelEvent::Message(Message::new(topic, payload)));
            }
        }
    }

    fn shadow_service(&mut self, topic: &str, payload: &[u8]) {
        let Some(shadow) = topics::parse_shadow_topic(topic) else {
            return;
        };
        match shadow.action.as_str() {
            "update" => {
                if let Ok(update) = ShadowDocument::from_payload(payload) {
                    self.shadows
                        .entry(shadow.thing_name)
                        .or_default()
                        .apply_update(&update);
                }
            }
            "get" if !self.silent_shadow => {
                let token = serde_json::from_slice::<ShadowGetRequest>(payload)
                    .ok()
                    .map(|r| r.client_token);
                match self.shadows.get(&shadow.thing_name) {
                    Some(doc) => {
                        let mut body = serde_json::to_value(doc).unwrap_or_default();
                        if let (Some(obj), Some(token)) = (body.as_object_mut(), token) {
                            obj.insert("clientToken".into(), token.into());
                        }
                        let body = serde_json::to_vec(&body).unwrap_or_default();
                        self.deliver(&topics::shadow_get_accepted(&shadow.thing_name), body);
                    }
                    None => {
                        let rejection = ShadowRejection {
                            code: 404,
                            message: format!("No shadow exists with name: '{}'", shadow.thing_name),
                            client_token: token,
                        };
                        let body = serde_json::to_vec(&rejection).unwrap_or_default();
                        self.deliver(&topics::shadow_get_rejected(&shadow.thing_name), body);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Cloneable handle to one simulated broker.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Failure injection ───

    /// Fail the next `n` handshakes.
    pub fn fail_next_handshakes(&self, n: u32) {
        self.state.lock().unwrap().fail_next = n;
    }

    /// Fail every handshake while set.
    pub fn fail_all_handshakes(&self, fail: bool) {
        self.state.lock().unwrap().always_fail = fail;
    }

    /// Refuse every publish while set.
    pub fn reject_publishes(&self, reject: bool) {
        self.state.lock().unwrap().reject_publishes = reject;
    }

    /// Refuse future subscribe requests for `filter`.
    pub fn reject_subscriptions_to(&self, filter: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_filters
            .insert(filter.to_string());
    }

    /// Stop answering shadow get requests.
    pub fn silence_shadow_service(&self, silent: bool) {
        self.state.lock().unwrap().silent_shadow = silent;
    }

    /// Drop the network under the live session.
    pub fn interrupt(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.session.as_mut() {
            session.online = false;
            let _ = session.events.send(ChannelEvent::Interrupted {
                reason: "simulated network loss".into(),
            });
        }
    }

    /// Bring the live session back. Without `session_present` the broker
    /// forgets every subscription, as after a clean-session reconnect.
    pub fn resume(&self, session_present: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.session.as_mut() {
            session.online = true;
            if !session_present {
                session.filters.clear();
            }
            let _ = session
                .events
                .send(ChannelEvent::Resumed { session_present });
        }
    }

    /// Tear the live session down for good, closing its event stream.
    pub fn close_session(&self) {
        self.state.lock().unwrap().session = None;
    }

    /// Publish from a device: delivered to matching subscriptions.
    pub fn inject(&self, topic: &str, payload: Vec<u8>) {
        self.state.lock().unwrap().deliver(topic, payload);
    }

    // ─── Shadow service ───

    pub fn put_shadow(&self, thing_name: &str, doc: ShadowDocument) {
        self.state
            .lock()
            .unwrap()
            .shadows
            .insert(thing_name.to_string(), doc);
    }

    pub fn shadow(&self, thing_name: &str) -> Option<ShadowDocument> {
        self.state.lock().unwrap().shadows.get(thing_name).cloned()
    }

    // ─── Inspection ───

    pub fn handshakes(&self) -> u32 {
        self.state.lock().unwrap().handshakes
    }

    pub fn disconnects(&self) -> u32 {
        self.state.lock().unwrap().disconnects
    }

    pub fn is_online(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .session
            .as_ref()
            .is_some_and(|s| s.online)
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Every subscribe request received, across sessions.
    pub fn subscribe_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().subscribe_requests.clone()
    }

    pub fn subscribe_count(&self, filter: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscribe_requests
            .iter()
            .filter(|f| *f == filter)
            .count()
    }

    /// Filters active on the live session.
    pub fn active_filters(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .session
            .as_ref()
            .map(|s| s.filters.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Clear recorded publishes and subscribe requests.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.published.clear();
        state.subscribe_requests.clear();
    }
}

#[async_trait]
impl Connector for MockBroker {
    async fn connect(&self) -> ConnectionResult<Session> {
        let mut state = self.state.lock().unwrap();
        state.handshakes += 1;

        if state.always_fail {
            return Err(ConnectionError::Handshake("connection refused".into()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ConnectionError::Handshake("connection refused".into()));
        }

        state.next_session += 1;
        let id = state.next_session;
        let (tx, rx) = mpsc::unbounded_channel();
        state.session = Some(LiveSession {
            id,
            events: tx,
            filters: BTreeSet::new(),
            online: true,
        });

        Ok(Session {
            channel: Arc::new(MockChannel {
                broker: self.clone(),
                session: id,
            }),
            events: rx,
        })
    }
}

/// Outbound half of a [`MockBroker`] session.
pub struct MockChannel {
    broker: MockBroker,
    session: u64,
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> PublishResult<()> {
        topics::validate_publish_topic(topic)
            .map_err(|e| PublishError::Rejected(e.to_string()))?;

        let mut state = self.broker.state.lock().unwrap();
        if state.live(self.session).is_none() {
            return Err(PublishError::NotConnected);
        }
        if state.reject_publishes {
            return Err(PublishError::Rejected("not authorized".into()));
        }

        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
            qos,
        });
        state.shadow_service(topic, &payload);
        state.deliver(topic, payload);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, _qos: QoS) -> SubscribeResult<()> {
        let mut state = self.broker.state.lock().unwrap();
        if state.live(self.session).is_none() {
            return Err(SubscribeError::NotConnected);
        }
        state.subscribe_requests.push(filter.to_string());
        if state.rejected_filters.contains(filter) {
            return Err(SubscribeError::Rejected {
                filter: filter.to_string(),
                reason: "not authorized".into(),
            });
        }
        if let Some(session) = state.live(self.session) {
            session.filters.insert(filter.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> SubscribeResult<()> {
        let mut state = self.broker.state.lock().unwrap();
        let session = state
            .live(self.session)
            .ok_or(SubscribeError::NotConnected)?;
        session.filters.remove(filter);
        Ok(())
    }

    async fn disconnect(&self) -> ConnectionResult<()> {
        let mut state = self.broker.state.lock().unwrap();
        state.disconnects += 1;
        if state.session.as_ref().is_some_and(|s| s.id == self.session) {
            state.session = None;
        }
        Ok(())
    }
}
