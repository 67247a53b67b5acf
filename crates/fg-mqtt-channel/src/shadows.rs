//! Device shadow reads and section updates over the shared connection.
//!
//! Reads are a request/reply on the reserved `get` topics, correlated by
//! client token. Updates read first and then publish a patch that replaces
//! exactly one section once the shadow service merges it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fg_protocol::shadows::{ShadowDocument, ShadowGetAccepted, ShadowGetRequest, ShadowRejection};
use fg_protocol::topics;
use serde_json::Value;
use tokio::sync::{OnceCell, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channel::Message;
use crate::connection::ConnectionManager;
use crate::error::{ShadowError, ShadowResult};

/// Default wait for a `get/accepted` or `get/rejected` response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum GetOutcome {
    Accepted(ShadowDocument),
    Rejected(ShadowRejection),
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<GetOutcome>>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<String, oneshot::Sender<GetOutcome>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Route a get response to the request waiting on its client token.
fn route_response(pending: &Pending, msg: Message) {
    let Some(topic) = topics::parse_shadow_topic(&msg.topic) else {
        return;
    };
    let parsed = match topic.action.as_str() {
        "get/accepted" => msg
            .json::<ShadowGetAccepted>()
            .map(|r| (r.client_token, GetOutcome::Accepted(r.document))),
        "get/rejected" => msg
            .json::<ShadowRejection>()
            .map(|r| (r.client_token.clone(), GetOutcome::Rejected(r))),
        _ => return,
    };

    match parsed {
        Ok((Some(token), outcome)) => {
            if let Some(waiter) = lock(pending).remove(&token) {
                let _ = waiter.send(outcome);
            }
        }
        Ok((None, _)) => debug!(topic = %msg.topic, "shadow response without client token"),
        Err(e) => debug!(topic = %msg.topic, error = %e, "undecodable shadow response"),
    }
}

pub struct ShadowSynchronizer {
    manager: Arc<ConnectionManager>,
    response_timeout: Duration,
    pending: Pending,
    listening: OnceCell<()>,
}

impl ShadowSynchronizer {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self::with_timeout(manager, DEFAULT_RESPONSE_TIMEOUT)
    }

    pub fn with_timeout(manager: Arc<ConnectionManager>, response_timeout: Duration) -> Self {
        Self {
            manager,
            response_timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
            listening: OnceCell::new(),
        }
    }

    /// Subscribe to get responses for every thing, once per synchronizer.
    async fn listen(&self) -> ShadowResult<()> {
        self.listening
            .get_or_try_init(|| async {
                let pending = self.pending.clone();
                self.manager
                    .subscribe(&topics::shadow_get_responses(), move |msg| {
                        route_response(&pending, msg)
                    })
                    .await
                    .map_err(ShadowError::from)
            })
            .await
            .map(|_| ())
    }

    /// Fetch the current reported document of `thing_name`.
    pub async fn read(&self, thing_name: &str) -> ShadowResult<ShadowDocument> {
        self.manager.ensure_connected().await?;
        self.listen().await?;

        let token = Uuid::now_v7().to_string();
        let request = serde_json::to_vec(&ShadowGetRequest {
            client_token: token.clone(),
        })
        .map_err(|e| ShadowError::Malformed(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(token.clone(), tx);

        if let Err(e) = self
            .manager
            .publish(&topics::shadow_get(thing_name), request)
            .await
        {
            lock(&self.pending).remove(&token);
            return Err(e.into());
        }

        let outcome = tokio::time::timeout(self.response_timeout, rx).await;
        lock(&self.pending).remove(&token);

        match outcome {
            Ok(Ok(GetOutcome::Accepted(doc))) => Ok(doc),
            Ok(Ok(GetOutcome::Rejected(rejection))) if rejection.is_not_found() => {
                Err(ShadowError::NotFound {
                    thing_name: thing_name.to_string(),
                })
            }
            Ok(Ok(GetOutcome::Rejected(rejection))) => Err(ShadowError::Rejected {
                code: rejection.code,
                message: rejection.message,
            }),
            Ok(Err(_)) | Err(_) => Err(ShadowError::Timeout {
                thing_name: thing_name.to_string(),
            }),
        }
    }

    /// Replace one section of the reported state and return the merged
    /// document. Other sections are left untouched at the broker. `null`
    /// leaves in `value` delete their key, so the returned document matches
    /// what the next read sees.
    ///
    /// Not serialized against concurrent updates of the same section; the
    /// later publish wins.
    pub async fn update(
        &self,
        thing_name: &str,
        section: &str,
        value: Value,
    ) -> ShadowResult<ShadowDocument> {
        if section.is_empty() {
            return Err(ShadowError::InvalidSection);
        }

        let mut merged = self.read(thing_name).await?;
        let patch = merged.section_patch(section, &value);
        let payload = patch
            .to_payload()
            .map_err(|e| ShadowError::Malformed(e.to_string()))?;

        self.manager
            .publish(&topics::shadow_update(thing_name), payload)
            .await?;
        info!(thing_name, section, "shadow section updated");

        merged.apply_update(&patch);
        Ok(merged)
    }

    /// Publish a whole reported document, creating the shadow if needed.
    pub async fn seed(&self, thing_name: &str, doc: &ShadowDocument) -> ShadowResult<()> {
        self.manager.ensure_connected().await?;
        let payload = doc
            .to_payload()
            .map_err(|e| ShadowError::Malformed(e.to_string()))?;
        self.manager
            .publish(&topics::shadow_update(thing_name), payload)
            .await?;
        info!(thing_name, sections = doc.sections().len(), "shadow seeded");
        Ok(())
    }
}
