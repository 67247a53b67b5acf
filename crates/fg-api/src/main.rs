//! FaceGate gateway - device control-plane REST server.
//!
//! Owns the single broker session for the process and exposes device
//! onboarding, shadow access and door/camera commands over HTTP.

use std::future::IntoFuture;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use fg_api::config::{DEFAULT_CONFIG_PATH, GatewayConfig};
use fg_api::state::AppState;
use fg_api::store::InMemoryDeviceStore;
use fg_api::{device_data, routes};
use fg_mqtt_channel::{ConnectionManager, CredentialKind, RumqttConnector};
use fg_provisioning::AwsIotControlPlane;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fg-api starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = GatewayConfig::from_file(&config_path)?;
    tracing::info!(
        broker = %config.mqtt.broker_host,
        client_id = %config.mqtt.client_id,
        known_devices = config.known_devices.len(),
        "config loaded"
    );
    if config.mqtt.credential != CredentialKind::Bootstrap {
        tracing::warn!(
            credential = ?config.mqtt.credential,
            "broker credential is not the bootstrap credential; provisioning may be refused"
        );
    }

    // ── Broker session ──────────────────────────────────────────
    let connector = Arc::new(RumqttConnector::new(config.mqtt.clone()));
    let manager = Arc::new(ConnectionManager::new(connector, config.retry));

    // ── Control plane + device store ────────────────────────────
    let control_plane =
        Arc::new(AwsIotControlPlane::from_env(config.provisioning.region.clone()).await);
    let devices = Arc::new(InMemoryDeviceStore::with_devices(config.known_devices.as_slice()));

    let state = AppState::new(
        manager.clone(),
        control_plane,
        devices,
        config.provisioning.clone(),
        config.shadow.response_timeout(),
    );

    device_data::observe(&manager).await?;

    let app = routes::build_router(state);
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .into_future();

    let outcome = tokio::select! {
        result = server => result.map_err(anyhow::Error::from),
        err = manager.fatal() => {
            tracing::error!(error = %err, "broker session unusable, stopping");
            Err(err.into())
        }
    };

    manager.shutdown().await;
    tracing::info!("fg-api stopped");
    outcome
}
