//! Door and camera actuation endpoints.

use axum::Json;
use axum::extract::State;
use fg_protocol::{Command, topics};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::routes::envelope;
use crate::state::AppState;

/// Request body for POST /device/control/door.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorControlRequest {
    pub device_id: Option<String>,
    /// Passed through to the device as the command message, e.g. "open".
    pub door_status: Option<Value>,
}

/// Request body for POST /device/control/camera.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraControlRequest {
    pub client_id: Option<String>,
}

/// POST /device/control/door: open or close a door.
pub async fn control_door(
    State(state): State<AppState>,
    Json(req): Json<DoorControlRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(device_id), Some(door_status)) = (req.device_id, req.door_status) else {
        return Err(ApiError::BadRequest(
            "deviceId and doorStatus are required".into(),
        ));
    };

    if state.devices.find(&device_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("device '{device_id}' not found")));
    }

    let ack = state
        .commands
        .send(topics::DOOR_CONTROL, &Command::door_control(&device_id, door_status))
        .await?;
    Ok(envelope(
        "Success",
        json!({ "topic": ack.topic, "accepted_at": ack.accepted_at }),
    ))
}

/// POST /device/control/camera: ask a client's camera to take a picture.
pub async fn control_camera(
    State(state): State<AppState>,
    Json(req): Json<CameraControlRequest>,
) -> ApiResult<Json<Value>> {
    let Some(client_id) = req.client_id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::BadRequest("clientId is required".into()));
    };

    let ack = state
        .commands
        .send(topics::CAMERA_CONTROL, &Command::camera_capture(&client_id))
        .await?;
    Ok(envelope(
        "Success",
        json!({ "topic": ack.topic, "accepted_at": ack.accepted_at }),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use fg_mqtt_channel::MockBroker;
    use fg_protocol::topics;
    use fg_provisioning::MockControlPlane;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::routes::build_router;
    use crate::routes::tests::body_json;
    use crate::state::AppState;

    fn app(broker: &MockBroker) -> axum::Router {
        build_router(AppState::with_mocks(
            broker.clone(),
            Arc::new(MockControlPlane::new()),
            &["DEV123"],
        ))
    }

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn door_command_is_published() {
        let broker = MockBroker::new();
        let response = app(&broker)
            .oneshot(post(
                "/device/control/door",
                json!({"deviceId": "DEV123", "doorStatus": "open"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Success");
        assert_eq!(json["data"]["topic"], topics::DOOR_CONTROL);

        let published = broker.published_to(topics::DOOR_CONTROL);
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].json(),
            json!({"type": "Control/Door", "message": "open", "device_id": "DEV123"})
        );
    }

    #[tokio::test]
    async fn door_command_for_unknown_device() {
        let broker = MockBroker::new();
        let response = app(&broker)
            .oneshot(post(
                "/device/control/door",
                json!({"deviceId": "DEV999", "doorStatus": "open"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn door_command_requires_status() {
        let broker = MockBroker::new();
        let response = app(&broker)
            .oneshot(post("/device/control/door", json!({"deviceId": "DEV123"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn camera_command_is_published() {
        let broker = MockBroker::new();
        let response = app(&broker)
            .oneshot(post("/device/control/camera", json!({"clientId": "kiosk-7"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let published = broker.published_to(topics::CAMERA_CONTROL);
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].json(),
            json!({"type": "Control/Camera", "message": "Take picture", "clientId": "kiosk-7"})
        );
    }

    #[tokio::test]
    async fn rejected_publish_is_bad_gateway() {
        let broker = MockBroker::new();
        broker.reject_publishes(true);

        let response = app(&broker)
            .oneshot(post("/device/control/camera", json!({"clientId": "kiosk-7"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn unreachable_broker_is_unavailable() {
        let broker = MockBroker::new();
        broker.fail_all_handshakes(true);

        let response = app(&broker)
            .oneshot(post(
                "/device/control/door",
                json!({"deviceId": "DEV123", "doorStatus": "close"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
