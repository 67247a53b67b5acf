use std::fmt;

use serde::{Deserialize, Serialize};

/// Derive the broker-side thing name for a device.
pub fn thing_name(template_name: &str, device_id: &str) -> String {
    format!("{template_name}_{device_id}")
}

/// A device's registered identity at the broker's control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingIdentity {
    pub thing_name: String,
    pub certificate_arn: String,
    pub policy_name: String,
    pub thing_group: String,
}

/// PEM-encoded private key. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKeyPem(String);

impl PrivateKeyPem {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// Access the key material. Only for persisting it or returning it to
    /// the provisioning caller.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyPem(<redacted>)")
    }
}

impl fmt::Display for PrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Certificate material issued for one device during provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle {
    /// Broker handle of the certificate (e.g. its ARN).
    pub certificate_arn: String,
    pub certificate_id: String,
    pub certificate_pem: String,
    pub private_key: PrivateKeyPem,
    pub public_key_pem: String,
}
