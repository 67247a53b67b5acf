//! Gateway configuration, loaded from a TOML file.

use std::time::Duration;

use fg_mqtt_channel::{MqttConfig, RetryPolicy};
use fg_provisioning::ProvisioningConfig;
use serde::Deserialize;

/// Path used when no config path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/facegate/gateway.toml";

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Device ids registered in the device store at startup.
    #[serde(default)]
    pub known_devices: Vec<String>,
    /// Broker connection settings.
    pub mqtt: MqttConfig,
    /// Connect retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Broker-side resource names used when onboarding devices.
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub shadow: ShadowConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShadowConfig {
    /// How long a shadow read waits for the broker's answer.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

impl ShadowConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: default_response_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_response_timeout() -> u64 {
    10
}

impl GatewayConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("invalid config '{path}': {e}"))?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_mqtt_channel::CredentialKind;

    const MINIMAL: &str = r#"
[mqtt]
broker_host = "a1b2c3-ats.iot.ap-southeast-1.amazonaws.com"
client_id = "face_template"
client_cert_path = "/etc/facegate/claim.pem.crt"
client_key_path = "/etc/facegate/claim.pem.key"
ca_cert_path = "/etc/facegate/AmazonRootCA1.pem"

[provisioning]
template_name = "face_template"
policy_name = "FaceDevicePolicy"
thing_group_name = "face-doors"
"#;

    #[test]
    fn deserialize_minimal_config() {
        let config: GatewayConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:8000");
        assert!(config.known_devices.is_empty());
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.mqtt.credential, CredentialKind::Bootstrap);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.shadow.response_timeout(), Duration::from_secs(10));
        assert!(config.provisioning.region.is_none());
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
host = "127.0.0.1"
port = 9000
known_devices = ["DEV123", "DEV456"]

[mqtt]
broker_host = "localhost"
broker_port = 1883
client_id = "gateway"
use_tls = false
keepalive_secs = 60
reconnect_delay_secs = 2

[retry]
delay_secs = 1
max_attempts = 3

[provisioning]
template_name = "face_template"
policy_name = "FaceDevicePolicy"
thing_group_name = "face-doors"
region = "ap-southeast-1"

[shadow]
response_timeout_secs = 3
"#;
        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
        assert_eq!(config.known_devices, vec!["DEV123", "DEV456"]);
        assert!(!config.mqtt.use_tls);
        assert_eq!(config.mqtt.reconnect_delay_secs, 2);
        assert_eq!(config.retry, RetryPolicy::new(Duration::from_secs(1), 3));
        assert_eq!(config.provisioning.region.as_deref(), Some("ap-southeast-1"));
        assert_eq!(config.shadow.response_timeout_secs, 3);
    }

    #[test]
    fn missing_provisioning_section_is_rejected() {
        let toml = r#"
[mqtt]
broker_host = "localhost"
client_id = "gateway"
"#;
        let err = toml::from_str::<GatewayConfig>(toml).unwrap_err();
        assert!(err.to_string().contains("provisioning"), "{err}");
    }

    #[test]
    fn from_file_reports_path() {
        let err = GatewayConfig::from_file("/nonexistent/gateway.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/gateway.toml"));
    }
}
