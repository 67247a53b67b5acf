use std::sync::Arc;

use chrono::{DateTime, Utc};
use fg_protocol::Command;
use tracing::info;

use crate::connection::ConnectionManager;
use crate::error::{PublishError, PublishResult};

/// Broker acceptance of a command publish.
///
/// Only says the broker took the message; no device-level acknowledgement
/// is awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    pub bytes: usize,
    pub accepted_at: DateTime<Utc>,
}

/// Validates, serializes and publishes actuation commands.
#[derive(Clone)]
pub struct CommandPublisher {
    manager: Arc<ConnectionManager>,
}

impl CommandPublisher {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Publish `command` on `topic` at-least-once. Not retried on failure.
    pub async fn send(&self, topic: &str, command: &Command) -> PublishResult<Ack> {
        command.validate_for(topic)?;
        let payload =
            serde_json::to_vec(command).map_err(|e| PublishError::Serialization(e.to_string()))?;
        let bytes = payload.len();

        self.manager.ensure_connected().await?;
        self.manager.publish(topic, payload).await?;
        info!(topic, kind = %command.kind, "command published");

        Ok(Ack {
            topic: topic.to_string(),
            bytes,
            accepted_at: Utc::now(),
        })
    }
}
