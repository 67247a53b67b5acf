//! Shared application state for the Axum server.
//!
//! Every component holds the same `ConnectionManager`, so the whole process
//! talks to the broker over one session.

use std::sync::Arc;
use std::time::Duration;

use fg_mqtt_channel::{
    CommandPublisher, ConnectionManager, MockBroker, RetryPolicy, ShadowSynchronizer,
};
use fg_provisioning::{
    IdentityControlPlane, MockControlPlane, ProvisioningConfig, ProvisioningWorkflow,
};

use crate::store::{DeviceStore, InMemoryDeviceStore};

/// Shared application state, cloned into each Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub shadows: Arc<ShadowSynchronizer>,
    pub commands: CommandPublisher,
    pub provisioning: Arc<ProvisioningWorkflow>,
    pub devices: Arc<dyn DeviceStore>,
}

impl AppState {
    /// Wire every component around `manager`.
    pub fn new(
        manager: Arc<ConnectionManager>,
        control_plane: Arc<dyn IdentityControlPlane>,
        devices: Arc<dyn DeviceStore>,
        provisioning: ProvisioningConfig,
        shadow_timeout: Duration,
    ) -> Self {
        let shadows = Arc::new(ShadowSynchronizer::with_timeout(
            manager.clone(),
            shadow_timeout,
        ));
        let commands = CommandPublisher::new(manager.clone());
        let provisioning = Arc::new(ProvisioningWorkflow::new(
            manager.clone(),
            shadows.clone(),
            control_plane,
            provisioning,
        ));

        Self {
            manager,
            shadows,
            commands,
            provisioning,
            devices,
        }
    }

    /// State backed by in-memory doubles (for tests and local development).
    pub fn with_mocks(
        broker: MockBroker,
        control_plane: Arc<MockControlPlane>,
        device_ids: &[&str],
    ) -> Self {
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(broker),
            RetryPolicy::new(Duration::from_millis(10), 3),
        ));
        Self::new(
            manager,
            control_plane,
            Arc::new(InMemoryDeviceStore::with_devices(device_ids)),
            ProvisioningConfig {
                template_name: "face_template".into(),
                policy_name: "FaceDevicePolicy".into(),
                thing_group_name: "face-doors".into(),
                region: None,
            },
            Duration::from_secs(2),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_mqtt_channel::ConnectionState;

    #[tokio::test]
    async fn components_share_one_session() {
        let broker = MockBroker::new();
        let state = AppState::with_mocks(broker.clone(), Arc::new(MockControlPlane::new()), &[]);

        state.manager.ensure_connected().await.unwrap();
        let cloned = state.clone();
        cloned.manager.ensure_connected().await.unwrap();

        assert_eq!(state.manager.state(), ConnectionState::Connected);
        assert_eq!(broker.handshakes(), 1);
    }

    #[test]
    fn thing_names_follow_template() {
        let state = AppState::with_mocks(MockBroker::new(), Arc::new(MockControlPlane::new()), &[]);
        assert_eq!(state.provisioning.thing_name("DEV123"), "face_template_DEV123");
    }
}
