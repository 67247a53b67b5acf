//! Broker connection, publish, subscribe and shadow error types.

use fg_protocol::CommandError;
use thiserror::Error;

/// Failures of the physical broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Every connect attempt allowed by the retry policy failed.
    #[error("broker unreachable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The broker refused to restore a subscription after a reconnect.
    /// Fatal for the process.
    #[error("broker rejected resubscription to '{topic}'")]
    RejectedSubscription { topic: String },

    /// A single handshake attempt failed (TLS or protocol level).
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("TLS error: {0}")]
    Tls(String),

    /// The manager was shut down.
    #[error("connection manager shut down")]
    Shutdown,
}

/// Failures of a single publish. Never retried by the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("broker connection unavailable: {0}")]
    Connection(#[from] ConnectionError),

    #[error("publish rejected: {0}")]
    Rejected(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid command: {0}")]
    Invalid(#[from] CommandError),
}

/// Failures of a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("subscription to '{filter}' rejected: {reason}")]
    Rejected { filter: String, reason: String },
}

/// Failures of shadow reads and updates.
#[derive(Debug, Error)]
pub enum ShadowError {
    /// The thing has no shadow (never seeded or connected).
    #[error("no shadow exists for thing '{thing_name}'")]
    NotFound { thing_name: String },

    #[error("shadow request rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("no shadow response for '{thing_name}' within the response timeout")]
    Timeout { thing_name: String },

    #[error("section name must not be empty")]
    InvalidSection,

    #[error("malformed shadow payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("shadow publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Subscribe(#[from] SubscribeError),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;
pub type PublishResult<T> = Result<T, PublishError>;
pub type SubscribeResult<T> = Result<T, SubscribeError>;
pub type ShadowResult<T> = Result<T, ShadowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_mentions_attempts() {
        let err = ConnectionError::Exhausted {
            attempts: 5,
            last_error: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("5 attempts"), "{msg}");
        assert!(msg.contains("connection refused"), "{msg}");
    }

    #[test]
    fn publish_error_wraps_connection_error() {
        let err: PublishError = ConnectionError::Shutdown.into();
        assert!(matches!(err, PublishError::Connection(ConnectionError::Shutdown)));
    }

    #[test]
    fn shadow_not_found_names_thing() {
        let err = ShadowError::NotFound {
            thing_name: "face_DEV1".into(),
        };
        assert!(err.to_string().contains("face_DEV1"));
    }
}
