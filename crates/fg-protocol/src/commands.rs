use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::topics::{self, TopicError};

/// Fire-and-forget actuation message published to a device topic.
///
/// Wire shape: `{"type": string, "message": any, <context fields>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Type tag, e.g. "Control/Door".
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form payload.
    pub message: Value,
    /// Target identifiers and other context (`device_id`, `clientId`, ...).
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

impl Command {
    pub fn new(kind: impl Into<String>, message: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            context: Map::new(),
        }
    }

    /// Attach a context field. `type` and `message` are reserved.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Open/close the door of a device.
    pub fn door_control(device_id: &str, status: impl Into<Value>) -> Self {
        Self::new("Control/Door", status).with_context("device_id", device_id)
    }

    /// Ask the camera attached to a client to take a picture.
    pub fn camera_capture(client_id: &str) -> Self {
        Self::new("Control/Camera", "Take picture").with_context("clientId", client_id)
    }

    /// Check the command and the topic it is about to be published on.
    pub fn validate_for(&self, topic: &str) -> Result<(), CommandError> {
        topics::validate_publish_topic(topic)?;
        self.validate()
    }

    pub fn validate(&self) -> Result<(), CommandError> {
        if self.kind.trim().is_empty() {
            return Err(CommandError::MissingType);
        }
        if let Some(key) = ["type", "message"]
            .into_iter()
            .find(|k| self.context.contains_key(*k))
        {
            return Err(CommandError::ReservedContextKey(key.to_string()));
        }
        Ok(())
    }
}

/// Reasons a command is refused before it reaches the broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("invalid command topic: {0}")]
    Topic(#[from] TopicError),

    #[error("command type is empty")]
    MissingType,

    #[error("context field '{0}' is reserved")]
    ReservedContextKey(String),
}
