use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Reported sub-sections keyed by name (e.g. "light", "door", "fan").
pub type Sections = Map<String, Value>;

/// A device's reported-state shadow document.
///
/// Wire shape: `{"state": {"reported": {section: {...}, ...}}}`. Fields the
/// broker adds on reads (`metadata`, `version`, `timestamp`, `desired`) are
/// ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShadowDocument {
    pub state: ReportedState,
}

/// The `state` object of a shadow document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportedState {
    #[serde(default)]
    pub reported: Sections,
}

impl ShadowDocument {
    pub fn new(reported: Sections) -> Self {
        Self {
            state: ReportedState { reported },
        }
    }

    /// Default reported state seeded for a freshly provisioned device.
    pub fn initial() -> Self {
        let mut reported = Sections::new();
        reported.insert("fan".into(), json!({"status": "off", "speed": 3}));
        reported.insert("door".into(), json!({"status": "off"}));
        reported.insert(
            "light".into(),
            json!({
                "status": "on",
                "brightness": 75,
                "automate": "off",
                "default_value": "19"
            }),
        );
        Self::new(reported)
    }

    pub fn sections(&self) -> &Sections {
        &self.state.reported
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.state.reported.get(name)
    }

    /// Return a copy of this document with `name` replaced wholesale.
    pub fn with_section(&self, name: &str, value: Value) -> Self {
        let mut reported = self.state.reported.clone();
        reported.insert(name.to_string(), value);
        Self::new(reported)
    }

    /// Build the partial update that turns this document's `name` section
    /// into `value` once merged by the shadow service.
    ///
    /// Keys present in the current section but absent from `value` are sent
    /// as `null` so the merge deletes them.
    pub fn section_patch(&self, name: &str, value: &Value) -> Self {
        let patch = match self.section(name) {
            Some(current) => replacement_patch(current, value),
            None => value.clone(),
        };
        let mut reported = Sections::new();
        reported.insert(name.to_string(), patch);
        Self::new(reported)
    }

    /// Merge a reported-state update into this document the way the shadow
    /// service does: objects merge recursively, `null` deletes a key, any
    /// other value replaces.
    pub fn apply_update(&mut self, update: &ShadowDocument) {
        merge_object(&mut self.state.reported, &update.state.reported);
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

fn replacement_patch(current: &Value, desired: &Value) -> Value {
    match (current, desired) {
        (Value::Object(current), Value::Object(desired)) => {
            let mut patch = Map::new();
            for key in current.keys() {
                if !desired.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, value) in desired {
                let entry = match current.get(key) {
                    Some(old) => replacement_patch(old, value),
                    None => value.clone(),
                };
                patch.insert(key.clone(), entry);
            }
            Value::Object(patch)
        }
        _ => desired.clone(),
    }
}

fn merge_object(target: &mut Map<String, Value>, update: &Map<String, Value>) {
    for (key, value) in update {
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(incoming) => match target.get_mut(key) {
                Some(Value::Object(existing)) => merge_object(existing, incoming),
                _ => {
                    let mut fresh = Map::new();
                    merge_object(&mut fresh, incoming);
                    target.insert(key.clone(), Value::Object(fresh));
                }
            },
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Body of a shadow get request; the token is echoed in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowGetRequest {
    #[serde(rename = "clientToken")]
    pub client_token: String,
}

/// Response published on `get/accepted`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShadowGetAccepted {
    #[serde(flatten)]
    pub document: ShadowDocument,
    #[serde(rename = "clientToken", default)]
    pub client_token: Option<String>,
}

/// Response published on `get/rejected` (404 when the shadow does not exist).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowRejection {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "clientToken", default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

impl ShadowRejection {
    pub fn is_not_found(&self) -> bool {
        self.code == 404
    }
}
