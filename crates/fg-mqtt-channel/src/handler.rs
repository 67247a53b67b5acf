//! Subscription registry: topic filter → delivery handlers.
//!
//! The registry outlives individual sessions so subscriptions can be
//! replayed after the broker loses them.

use std::collections::BTreeMap;
use std::sync::Arc;

use fg_protocol::topics;

use crate::channel::Message;

/// Callback invoked for every inbound message matching its filter.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    filters: BTreeMap<String, Vec<MessageHandler>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.filters.contains_key(filter)
    }

    /// Register `handler` under `filter`. Returns `true` when the filter is new.
    pub fn insert(&mut self, filter: &str, handler: MessageHandler) -> bool {
        match self.filters.get_mut(filter) {
            Some(handlers) => {
                handlers.push(handler);
                false
            }
            None => {
                self.filters.insert(filter.to_string(), vec![handler]);
                true
            }
        }
    }

    /// Drop every handler registered under `filter`.
    pub fn remove(&mut self, filter: &str) -> bool {
        self.filters.remove(filter).is_some()
    }

    /// Registered filters, each listed once.
    pub fn filters(&self) -> Vec<String> {
        self.filters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Handlers whose filter matches `topic`.
    pub fn matching(&self, topic: &str) -> Vec<MessageHandler> {
        self.filters
            .iter()
            .filter(|(filter, _)| topics::matches_filter(filter, topic))
            .flat_map(|(_, handlers)| handlers.iter().cloned())
            .collect()
    }
}
