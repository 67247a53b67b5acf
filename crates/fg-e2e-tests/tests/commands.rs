//! E2E tests for door and camera commands: HTTP request through the
//! publisher to a subscriber on the device topic.

mod helpers;

use axum::http::StatusCode;
use fg_mqtt_channel::QoS;
use fg_protocol::{Command, topics};
use serde_json::{Value, json};

use helpers::{TestHarness, next_message};

/// A door command sent through the API reaches a device subscriber verbatim.
#[tokio::test]
async fn e2e_door_command_reaches_subscriber() {
    let h = TestHarness::new();
    let mut device = h.listen(topics::DOOR_CONTROL).await;

    let (status, json) = h.control_door("DEV123", "open").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Success");

    let msg = next_message(&mut device).await;
    assert_eq!(msg.topic, topics::DOOR_CONTROL);
    let payload: Value = msg.json().unwrap();
    assert_eq!(
        payload,
        json!({"type": "Control/Door", "message": "open", "device_id": "DEV123"})
    );
}

/// Camera triggers are published with the fixed message.
#[tokio::test]
async fn e2e_camera_command_reaches_subscriber() {
    let h = TestHarness::new();
    let mut device = h.listen(topics::CAMERA_CONTROL).await;

    let (status, _) = h.control_camera("kiosk-7").await;
    assert_eq!(status, StatusCode::OK);

    let payload: Command = next_message(&mut device).await.json().unwrap();
    assert_eq!(payload, Command::camera_capture("kiosk-7"));
}

/// A wildcard subscriber sees both command topics.
#[tokio::test]
async fn e2e_wildcard_subscriber_sees_all_controls() {
    let h = TestHarness::new();
    let mut controls = h.listen("pbl/device/control/+").await;

    h.control_door("DEV456", "close").await;
    h.control_camera("kiosk-1").await;

    assert_eq!(next_message(&mut controls).await.topic, topics::DOOR_CONTROL);
    assert_eq!(next_message(&mut controls).await.topic, topics::CAMERA_CONTROL);
}

/// Commands are published at-least-once and only once per request.
#[tokio::test]
async fn e2e_command_published_once_with_qos1() {
    let h = TestHarness::new();

    h.control_door("DEV123", "open").await;

    let published = h.broker.published_to(topics::DOOR_CONTROL);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
}

/// Publishing through the library directly connects on demand.
#[tokio::test]
async fn e2e_library_publish_connects_lazily() {
    let h = TestHarness::new();
    assert_eq!(h.broker.handshakes(), 0);

    let ack = h
        .state
        .commands
        .send(topics::DOOR_CONTROL, &Command::door_control("DEV123", "open"))
        .await
        .unwrap();

    assert_eq!(ack.topic, topics::DOOR_CONTROL);
    assert_eq!(h.broker.handshakes(), 1);
}
