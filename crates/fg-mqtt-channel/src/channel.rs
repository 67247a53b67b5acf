//! Transport seam between the connection manager and a broker client.
//!
//! A [`Connector`] performs one handshake and, on success, yields a
//! [`Session`]: a [`Channel`] for outbound requests plus the stream of
//! [`ChannelEvent`]s the transport raises out of band (inbound messages,
//! interruptions, resumptions). The manager owns the event stream and is
//! its only consumer.

use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::QoS;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::{ConnectionResult, PublishResult, SubscribeResult};

/// An inbound publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// Out-of-band notifications raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(Message),
    /// The session dropped (network loss, broker-initiated disconnect).
    Interrupted { reason: String },
    /// The transport reconnected on its own.
    Resumed { session_present: bool },
}

/// Outbound half of an established broker session.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> PublishResult<()>;

    /// Subscribe to a topic filter. Resolves once the broker has accepted
    /// or refused it.
    async fn subscribe(&self, filter: &str, qos: QoS) -> SubscribeResult<()>;

    /// Remove a topic filter.
    async fn unsubscribe(&self, filter: &str) -> SubscribeResult<()>;

    /// Close the session. Pending publishes may be dropped.
    async fn disconnect(&self) -> ConnectionResult<()>;
}

/// A successfully established session.
pub struct Session {
    pub channel: Arc<dyn Channel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Performs one broker handshake (TLS + protocol-level accept).
///
/// Implementations must not retry; the connection manager owns retries.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> ConnectionResult<Session>;
}
