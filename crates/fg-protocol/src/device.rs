use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{CertificateBundle, PrivateKeyPem};

/// Device lifecycle status in the device-record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Active,
    Inactive,
}

/// A device as kept by the device-record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Internal record ID.
    pub id: Uuid,
    /// Device identifier printed on the hardware.
    pub device_id: String,
    pub status: DeviceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_pem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKeyPem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// A registered device with no credentials yet.
    pub fn new(device_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            device_id: device_id.into(),
            status: DeviceStatus::Active,
            certificate_arn: None,
            certificate_pem: None,
            private_key: None,
            public_key_pem: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }

    pub fn has_credentials(&self) -> bool {
        self.certificate_pem.is_some()
    }

    /// Take ownership of issued credentials and mark the device active.
    pub fn apply_credentials(&mut self, bundle: &CertificateBundle) {
        self.certificate_arn = Some(bundle.certificate_arn.clone());
        self.certificate_pem = Some(bundle.certificate_pem.clone());
        self.private_key = Some(bundle.private_key.clone());
        self.public_key_pem = Some(bundle.public_key_pem.clone());
        self.status = DeviceStatus::Active;
        self.updated_at = Utc::now();
    }
}
