//! Device shadow endpoints.

use axum::Json;
use axum::extract::{Path, State};
use fg_protocol::ShadowDocument;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::routes::envelope;
use crate::state::AppState;

/// Request body for updating one shadow section.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShadowRequest {
    /// Section to replace, e.g. "door".
    pub device_name: Option<String>,
    /// New value of the section.
    pub device_status: Option<Value>,
}

async fn thing_for_active_device(state: &AppState, device_id: &str) -> ApiResult<String> {
    match state.devices.find_active(device_id).await? {
        Some(_) => Ok(state.provisioning.thing_name(device_id)),
        None => Err(ApiError::NotFound(format!("no active device '{device_id}'"))),
    }
}

fn document_json(doc: &ShadowDocument) -> ApiResult<Value> {
    serde_json::to_value(doc).map_err(|e| ApiError::Internal(e.to_string()))
}

/// GET /device/shadow/{device_id}: current reported state of a device.
pub async fn get_shadow(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let thing_name = thing_for_active_device(&state, &device_id).await?;
    let doc = state.shadows.read(&thing_name).await?;
    Ok(envelope("Success", document_json(&doc)?))
}

/// PUT /device/shadow/update/{device_id}: replace one section of the shadow.
pub async fn update_shadow(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<UpdateShadowRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(section), Some(value)) = (req.device_name, req.device_status) else {
        return Err(ApiError::BadRequest(
            "deviceName and deviceStatus are required".into(),
        ));
    };

    let thing_name = thing_for_active_device(&state, &device_id).await?;
    let doc = state.shadows.update(&thing_name, &section, value).await?;
    tracing::info!(device_id = %device_id, section = %section, "shadow section updated");
    Ok(envelope("Success", document_json(&doc)?))
}
