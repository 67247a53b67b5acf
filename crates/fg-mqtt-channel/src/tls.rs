//! TLS configuration for mTLS connections to AWS IoT Core.
//!
//! Loads the client certificate, private key, and CA certificate from PEM
//! files and configures rumqttc's TLS transport.

use rumqttc::Transport;

use crate::config::MqttConfig;
use crate::error::{ConnectionError, ConnectionResult};

fn read_pem(kind: &str, path: &str) -> ConnectionResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ConnectionError::Tls(format!("failed to read {kind} '{path}': {e}")))
}

/// Build the transport for `config`: mTLS from PEM files, or plain TCP when
/// TLS is disabled.
///
/// The key file is read into memory and handed to rustls; its content is
/// never logged.
pub fn load_transport(config: &MqttConfig) -> ConnectionResult<Transport> {
    if !config.use_tls {
        return Ok(Transport::Tcp);
    }

    let ca = read_pem("CA cert", &config.ca_cert_path)?;
    let client_cert = read_pem("client cert", &config.client_cert_path)?;
    let client_key = read_pem("client key", &config.client_key_path)?;

    Ok(Transport::tls_with_config(
        rumqttc::TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: Some((client_cert, client_key)),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CredentialKind;

    fn config(use_tls: bool) -> MqttConfig {
        MqttConfig {
            broker_host: "localhost".into(),
            broker_port: 8883,
            client_id: "test".into(),
            use_tls,
            client_cert_path: "/nonexistent/cert.pem".into(),
            client_key_path: "/nonexistent/key.pem".into(),
            ca_cert_path: "/nonexistent/ca.pem".into(),
            credential: CredentialKind::Bootstrap,
            keepalive_secs: 30,
            clean_session: true,
            connect_timeout_secs: 10,
            reconnect_delay_secs: 5,
            request_capacity: 64,
        }
    }

    #[test]
    fn missing_ca_cert_returns_error() {
        let err = load_transport(&config(true)).err().expect("should fail");
        let msg = err.to_string();
        assert!(
            msg.contains("CA cert"),
            "error should mention CA cert: {msg}"
        );
        assert!(matches!(err, ConnectionError::Tls(_)));
    }

    #[test]
    fn plaintext_skips_certificates() {
        assert!(matches!(load_transport(&config(false)), Ok(Transport::Tcp)));
    }
}
