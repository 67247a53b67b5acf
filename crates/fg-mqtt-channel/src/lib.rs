//! Broker connectivity for the FaceGate control plane (AWS IoT Core).
//!
//! - `ConnectionManager` owns the single broker session: bounded connect
//!   retry, interruption tracking, resubscription after session loss
//! - `Connector`/`Channel` transport seam, with `RumqttConnector` (mTLS)
//!   for production and `MockBroker` for tests
//! - `ShadowSynchronizer` for device shadow reads and section updates
//! - `CommandPublisher` for validated actuation commands

pub mod channel;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod mock;
pub mod mqtt;
pub mod retry;
pub mod shadows;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, ChannelEvent, Connector, Message, Session};
pub use commands::{Ack, CommandPublisher};
pub use config::{CredentialKind, MqttConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{
    ConnectionError, ConnectionResult, PublishError, PublishResult, ShadowError, ShadowResult,
    SubscribeError, SubscribeResult,
};
pub use mock::MockBroker;
pub use mqtt::RumqttConnector;
pub use retry::RetryPolicy;
pub use rumqttc::QoS;
pub use shadows::ShadowSynchronizer;
