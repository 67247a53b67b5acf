//! E2E tests for device shadow reads and section updates across the API,
//! the synchronizer and the broker's shadow service.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use fg_mqtt_channel::{ShadowError, ShadowSynchronizer};
use fg_protocol::{ShadowDocument, topics};
use serde_json::json;

use helpers::{TestHarness, thing};

/// Updating a section through the API returns and stores exactly that value.
#[tokio::test]
async fn e2e_update_round_trip() {
    let h = TestHarness::new();
    h.broker.put_shadow(&thing("DEV123"), ShadowDocument::initial());

    let (status, json) = h
        .update_shadow("DEV123", "light", json!({"status": "off"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["state"]["reported"]["light"], json!({"status": "off"}));

    let (_, json) = h.get_shadow("DEV123").await;
    let reported = &json["data"]["state"]["reported"];
    assert_eq!(reported["light"], json!({"status": "off"}));
    assert_eq!(reported["fan"], json!({"status": "off", "speed": 3}));
    assert_eq!(reported["door"], json!({"status": "off"}));
}

/// Concurrent updates to different sections both survive.
#[tokio::test]
async fn e2e_concurrent_section_updates() {
    let h = TestHarness::new();
    let thing_name = thing("DEV123");
    h.broker.put_shadow(&thing_name, ShadowDocument::initial());

    let shadows = h.state.shadows.clone();
    let (door, fan) = tokio::join!(
        shadows.update(&thing_name, "door", json!({"status": "on"})),
        shadows.update(&thing_name, "fan", json!({"status": "on", "speed": 5})),
    );
    door.unwrap();
    fan.unwrap();

    let stored = h.broker.shadow(&thing_name).unwrap();
    assert_eq!(stored.section("door"), Some(&json!({"status": "on"})));
    assert_eq!(stored.section("fan"), Some(&json!({"status": "on", "speed": 5})));
    assert_eq!(
        stored.section("light"),
        ShadowDocument::initial().section("light")
    );
}

/// Keys dropped from a section value disappear from the stored section.
#[tokio::test]
async fn e2e_update_replaces_rather_than_merges() {
    let h = TestHarness::new();
    h.broker.put_shadow(&thing("DEV123"), ShadowDocument::initial());

    let (status, _) = h
        .update_shadow("DEV123", "light", json!({"status": "on"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let stored = h.broker.shadow(&thing("DEV123")).unwrap();
    assert_eq!(stored.section("light"), Some(&json!({"status": "on"})));
}

/// Updates publish only the changed section.
#[tokio::test]
async fn e2e_update_payload_touches_one_section() {
    let h = TestHarness::new();
    h.broker.put_shadow(&thing("DEV123"), ShadowDocument::initial());

    h.update_shadow("DEV123", "door", json!({"status": "on"})).await;

    let published = h.broker.published_to(&topics::shadow_update(&thing("DEV123")));
    assert_eq!(published.len(), 1);
    let reported = &published[0].json()["state"]["reported"];
    assert_eq!(reported.as_object().unwrap().len(), 1);
    assert_eq!(reported["door"]["status"], "on");
}

/// Reading a thing with no shadow is a not-found, over HTTP and in the library.
#[tokio::test]
async fn e2e_missing_shadow_is_not_found() {
    let h = TestHarness::new();

    let (status, _) = h.get_shadow("DEV123").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let err = h.state.shadows.read(&thing("DEV123")).await.unwrap_err();
    assert!(matches!(err, ShadowError::NotFound { .. }));
}

/// Many parallel reads share one subscription to the response topics.
#[tokio::test]
async fn e2e_parallel_reads_share_subscription() {
    let h = TestHarness::new();
    h.broker.put_shadow(&thing("DEV123"), ShadowDocument::initial());
    h.broker.put_shadow(&thing("DEV456"), ShadowDocument::initial());

    let shadows = h.state.shadows.clone();
    let reads = (0..8).map(|i| {
        let shadows = shadows.clone();
        let name = if i % 2 == 0 { thing("DEV123") } else { thing("DEV456") };
        tokio::spawn(async move { shadows.read(&name).await })
    });
    for handle in reads.collect::<Vec<_>>() {
        assert_eq!(handle.await.unwrap().unwrap(), ShadowDocument::initial());
    }

    assert_eq!(h.broker.subscribe_count(&topics::shadow_get_responses()), 1);
}

/// A silent shadow service makes reads time out instead of hanging.
#[tokio::test]
async fn e2e_silent_shadow_service_times_out() {
    let h = TestHarness::new();
    h.broker.put_shadow(&thing("DEV123"), ShadowDocument::initial());
    h.broker.silence_shadow_service(true);

    let shadows = Arc::new(ShadowSynchronizer::with_timeout(
        h.manager().clone(),
        Duration::from_millis(100),
    ));
    let err = shadows.read(&thing("DEV123")).await.unwrap_err();
    assert!(matches!(err, ShadowError::Timeout { .. }));

    h.broker.silence_shadow_service(false);
    assert!(shadows.read(&thing("DEV123")).await.is_ok());
}
