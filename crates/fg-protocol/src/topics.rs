//! MQTT topic builders, parsers, and filter matching.
//!
//! Topic structure:
//! ```text
//! $aws/things/{thing_name}/shadow/update
//! $aws/things/{thing_name}/shadow/get
//! $aws/things/{thing_name}/shadow/get/accepted
//! $aws/things/{thing_name}/shadow/get/rejected
//! pbl/device/control/door
//! pbl/device/control/camera
//! app/data
//! ```

use thiserror::Error;

const SHADOW_PREFIX: &str = "$aws/things";

/// Door actuation commands.
pub const DOOR_CONTROL: &str = "pbl/device/control/door";

/// Camera trigger commands.
pub const CAMERA_CONTROL: &str = "pbl/device/control/camera";

/// Data published by devices towards the backend.
pub const DEVICE_DATA: &str = "app/data";

// ─── Shadow topics ───

pub fn shadow_update(thing_name: &str) -> String {
    format!("{SHADOW_PREFIX}/{thing_name}/shadow/update")
}

pub fn shadow_get(thing_name: &str) -> String {
    format!("{SHADOW_PREFIX}/{thing_name}/shadow/get")
}

pub fn shadow_get_accepted(thing_name: &str) -> String {
    format!("{SHADOW_PREFIX}/{thing_name}/shadow/get/accepted")
}

pub fn shadow_get_rejected(thing_name: &str) -> String {
    format!("{SHADOW_PREFIX}/{thing_name}/shadow/get/rejected")
}

/// Filter covering get responses (accepted and rejected) of every thing.
pub fn shadow_get_responses() -> String {
    format!("{SHADOW_PREFIX}/+/shadow/get/+")
}

// ─── Topic parsing ───

/// Parsed shadow topic components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopic {
    pub thing_name: String,
    /// Everything after `shadow/`, e.g. `update` or `get/accepted`.
    pub action: String,
}

/// Parse a reserved shadow topic. Returns `None` for any other topic.
pub fn parse_shadow_topic(topic: &str) -> Option<ShadowTopic> {
    let rest = topic.strip_prefix(SHADOW_PREFIX)?.strip_prefix('/')?;
    let (thing_name, rest) = rest.split_once('/')?;
    let action = rest.strip_prefix("shadow/")?;

    if thing_name.is_empty() || action.is_empty() {
        return None;
    }

    Some(ShadowTopic {
        thing_name: thing_name.to_string(),
        action: action.to_string(),
    })
}

// ─── Filters ───

/// Check whether `topic` matches the MQTT subscription `filter`.
///
/// Supports the single-level `+` and multi-level `#` wildcards. Topics
/// starting with `$` are not matched by a leading wildcard.
pub fn matches_filter(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Reasons a topic cannot be used for a publish.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic is empty")]
    Empty,

    #[error("topic '{0}' contains a wildcard")]
    Wildcard(String),

    #[error("topic '{0}' contains a NUL character")]
    Nul(String),
}

/// Validate a concrete publish topic (no wildcards, not empty).
pub fn validate_publish_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.contains(['+', '#']) {
        return Err(TopicError::Wildcard(topic.to_string()));
    }
    if topic.contains('\0') {
        return Err(TopicError::Nul(topic.to_string()));
    }
    Ok(())
}
