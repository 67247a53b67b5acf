//! Device onboarding endpoint.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::routes::envelope;
use crate::state::AppState;

/// POST /device/generate/certificate/{device_id}: issue and persist device credentials.
pub async fn generate_certificate(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if state.devices.find(&device_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("device '{device_id}' not found")));
    }

    let bundle = state.provisioning.provision(&device_id).await?;
    state.devices.save_credentials(&device_id, &bundle).await?;
    tracing::info!(
        device_id = %device_id,
        certificate_id = %bundle.certificate_id,
        "device credentials stored"
    );

    Ok(envelope(
        "Generate Certificate success!",
        json!({
            "cert_pem": bundle.certificate_pem,
            "private_key": bundle.private_key.expose(),
        }),
    ))
}
