//! Observer for data published by devices on `app/data`.
//!
//! Messages are only logged; nothing is persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fg_mqtt_channel::{ConnectionManager, Message};
use fg_protocol::topics;
use serde_json::Value;

/// Counters kept by the observer.
#[derive(Debug, Default)]
pub struct DeviceDataStats {
    received: AtomicU64,
    malformed: AtomicU64,
}

impl DeviceDataStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Connect if needed and subscribe the logging handler to `app/data`.
pub async fn observe(manager: &ConnectionManager) -> anyhow::Result<Arc<DeviceDataStats>> {
    manager.ensure_connected().await?;

    let stats = Arc::new(DeviceDataStats::default());
    let handler_stats = stats.clone();
    manager
        .subscribe(topics::DEVICE_DATA, move |msg| handle_incoming(&msg, &handler_stats))
        .await?;

    tracing::info!(topic = topics::DEVICE_DATA, "observing device data");
    Ok(stats)
}

/// Log one inbound device message.
pub fn handle_incoming(msg: &Message, stats: &DeviceDataStats) {
    stats.received.fetch_add(1, Ordering::Relaxed);

    let value: Value = match msg.json() {
        Ok(v) => v,
        Err(e) => {
            stats.malformed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(topic = %msg.topic, error = %e, "failed to parse device data payload");
            return;
        }
    };

    let device_id = value
        .get("device_id")
        .or_else(|| value.get("deviceId"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    tracing::info!(
        topic = %msg.topic,
        device_id,
        bytes = msg.payload.len(),
        "device data received"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_mqtt_channel::{MockBroker, RetryPolicy};
    use serde_json::json;
    use std::time::Duration;

    fn manager(broker: &MockBroker) -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(broker.clone()),
            RetryPolicy::new(Duration::from_millis(10), 3),
        )
    }

    #[tokio::test]
    async fn observe_subscribes_to_device_data() {
        let broker = MockBroker::new();
        let manager = manager(&broker);

        observe(&manager).await.unwrap();

        assert_eq!(broker.subscribe_count(topics::DEVICE_DATA), 1);
        assert_eq!(manager.subscriptions().await, vec![topics::DEVICE_DATA]);
    }

    #[tokio::test]
    async fn observed_messages_are_counted() {
        let broker = MockBroker::new();
        let manager = manager(&broker);
        let stats = observe(&manager).await.unwrap();

        broker.inject(
            topics::DEVICE_DATA,
            serde_json::to_vec(&json!({"device_id": "DEV123", "temp": 21})).unwrap(),
        );
        broker.inject(topics::DEVICE_DATA, b"not json".to_vec());

        for _ in 0..50 {
            if stats.received() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stats.received(), 2);
        assert_eq!(stats.malformed(), 1);
    }

    #[tokio::test]
    async fn observe_fails_when_broker_unreachable() {
        let broker = MockBroker::new();
        broker.fail_all_handshakes(true);
        let manager = manager(&broker);

        assert!(observe(&manager).await.is_err());
    }

    #[test]
    fn malformed_payload_is_tolerated() {
        let stats = DeviceDataStats::default();
        handle_incoming(&Message::new(topics::DEVICE_DATA, b"{".to_vec()), &stats);
        assert_eq!(stats.received(), 1);
        assert_eq!(stats.malformed(), 1);
    }
}
