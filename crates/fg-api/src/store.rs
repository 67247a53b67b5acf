//! Device-record store seam.
//!
//! The gateway only looks devices up and persists issued credentials.
//! `InMemoryDeviceStore` backs development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fg_protocol::{CertificateBundle, DeviceRecord};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("device '{0}' not found")]
    NotFound(String),

    #[error("device store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find(&self, device_id: &str) -> StoreResult<Option<DeviceRecord>>;

    /// Like `find`, but only devices in the active state.
    async fn find_active(&self, device_id: &str) -> StoreResult<Option<DeviceRecord>> {
        Ok(self.find(device_id).await?.filter(DeviceRecord::is_active))
    }

    /// Persist issued credentials and mark the device active.
    async fn save_credentials(
        &self,
        device_id: &str,
        bundle: &CertificateBundle,
    ) -> StoreResult<DeviceRecord>;
}

#[derive(Clone, Default)]
pub struct InMemoryDeviceStore {
    devices: Arc<RwLock<HashMap<String, DeviceRecord>>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with fresh records for `device_ids`.
    pub fn with_devices<S: AsRef<str>>(device_ids: &[S]) -> Self {
        let devices = device_ids
            .iter()
            .map(|id| (id.as_ref().to_string(), DeviceRecord::new(id.as_ref())))
            .collect();
        Self {
            devices: Arc::new(RwLock::new(devices)),
        }
    }

    pub async fn insert(&self, record: DeviceRecord) {
        self.devices
            .write()
            .await
            .insert(record.device_id.clone(), record);
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn find(&self, device_id: &str) -> StoreResult<Option<DeviceRecord>> {
        Ok(self.devices.read().await.get(device_id).cloned())
    }

    async fn save_credentials(
        &self,
        device_id: &str,
        bundle: &CertificateBundle,
    ) -> StoreResult<DeviceRecord> {
        let mut devices = self.devices.write().await;
        let record = devices
            .get_mut(device_id)
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))?;
        record.apply_credentials(bundle);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_protocol::{DeviceStatus, PrivateKeyPem};

    fn bundle() -> CertificateBundle {
        CertificateBundle {
            certificate_arn: "arn:aws:iot:ap-southeast-1:000000000000:cert/c1".into(),
            certificate_id: "c1".into(),
            certificate_pem: "CERT".into(),
            private_key: PrivateKeyPem::new("KEY"),
            public_key_pem: "PUB".into(),
        }
    }

    #[tokio::test]
    async fn find_known_device() {
        let store = InMemoryDeviceStore::with_devices(&["DEV123"]);
        let record = store.find("DEV123").await.unwrap().unwrap();
        assert_eq!(record.device_id, "DEV123");
        assert!(store.find("DEV999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_active_skips_inactive_devices() {
        let store = InMemoryDeviceStore::new();
        let mut record = DeviceRecord::new("DEV123");
        record.status = DeviceStatus::Inactive;
        store.insert(record).await;

        assert!(store.find("DEV123").await.unwrap().is_some());
        assert!(store.find_active("DEV123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_credentials_persists_bundle() {
        let store = InMemoryDeviceStore::with_devices(&["DEV123"]);
        let saved = store.save_credentials("DEV123", &bundle()).await.unwrap();

        assert!(saved.has_credentials());
        let stored = store.find("DEV123").await.unwrap().unwrap();
        assert_eq!(stored.private_key.map(|k| k.expose().to_string()), Some("KEY".into()));
    }

    #[tokio::test]
    async fn save_credentials_for_unknown_device() {
        let store = InMemoryDeviceStore::new();
        let err = store.save_credentials("DEV404", &bundle()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
