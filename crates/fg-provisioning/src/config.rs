use serde::Deserialize;

/// Names of the broker-side resources every device is registered under.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Prefix of every thing name (`{template_name}_{device_id}`).
    pub template_name: String,
    /// Policy attached to each issued certificate.
    pub policy_name: String,
    /// Fleet group each thing joins.
    pub thing_group_name: String,
    /// AWS region of the IoT control plane. Falls back to the default chain.
    #[serde(default)]
    pub region: Option<String>,
}
