//! Shared test harness for E2E integration tests.
//!
//! Wires the gateway routes, the provisioning workflow and the shadow and
//! command paths to one in-memory broker and control plane, exercising the
//! real code across crate boundaries.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use fg_api::routes::build_router;
use fg_api::state::AppState;
use fg_mqtt_channel::{ConnectionManager, ConnectionState, MockBroker, Message};
use fg_provisioning::MockControlPlane;
use tokio::sync::mpsc;

pub const TEMPLATE: &str = "face_template";

pub fn thing(device_id: &str) -> String {
    format!("{TEMPLATE}_{device_id}")
}

/// End-to-end harness: gateway state + router over a shared `MockBroker`.
pub struct TestHarness {
    pub broker: MockBroker,
    pub control_plane: Arc<MockControlPlane>,
    pub state: AppState,
    pub router: Router,
}

impl TestHarness {
    /// Harness whose device store knows DEV123 and DEV456.
    pub fn new() -> Self {
        Self::with_devices(&["DEV123", "DEV456"])
    }

    pub fn with_devices(device_ids: &[&str]) -> Self {
        let broker = MockBroker::new();
        let control_plane = Arc::new(MockControlPlane::new());
        let state = AppState::with_mocks(broker.clone(), control_plane.clone(), device_ids);
        let router = build_router(state.clone());

        Self {
            broker,
            control_plane,
            state,
            router,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.state.manager
    }

    /// Send a request through the router. Returns (status, JSON body).
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    /// POST /device/generate/certificate/{device_id}
    pub async fn generate_certificate(&self, device_id: &str) -> (StatusCode, Value) {
        self.request(
            Request::post(format!("/device/generate/certificate/{device_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// GET /device/shadow/{device_id}
    pub async fn get_shadow(&self, device_id: &str) -> (StatusCode, Value) {
        self.request(
            Request::get(format!("/device/shadow/{device_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// PUT /device/shadow/update/{device_id}
    pub async fn update_shadow(
        &self,
        device_id: &str,
        section: &str,
        value: Value,
    ) -> (StatusCode, Value) {
        self.send_json(
            "PUT",
            &format!("/device/shadow/update/{device_id}"),
            json!({"deviceName": section, "deviceStatus": value}),
        )
        .await
    }

    /// POST /device/control/door
    pub async fn control_door(&self, device_id: &str, door_status: &str) -> (StatusCode, Value) {
        self.send_json(
            "POST",
            "/device/control/door",
            json!({"deviceId": device_id, "doorStatus": door_status}),
        )
        .await
    }

    /// POST /device/control/camera
    pub async fn control_camera(&self, client_id: &str) -> (StatusCode, Value) {
        self.send_json("POST", "/device/control/camera", json!({"clientId": client_id}))
            .await
    }

    /// Register a test subscriber on `filter`, forwarding every delivery.
    pub async fn listen(&self, filter: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.manager().ensure_connected().await.unwrap();
        self.manager()
            .subscribe(filter, move |msg| {
                let _ = tx.send(msg);
            })
            .await
            .unwrap();
        rx
    }
}

/// Wait until `manager` reaches `state`, failing the test after two seconds.
pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut rx = manager.watch_state();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .unwrap();
}

/// Receive the next delivery, failing the test after two seconds.
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no message within 2s")
        .expect("subscriber channel closed")
}
