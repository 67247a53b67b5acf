//! The process-wide broker connection.
//!
//! [`ConnectionManager`] owns the one physical session, its subscription
//! registry and the supervisor task that consumes transport events. Every
//! broker I/O in the control plane goes through one shared instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rumqttc::QoS;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelEvent, Connector, Message, Session};
use crate::error::{
    ConnectionError, ConnectionResult, PublishError, PublishResult, SubscribeError,
    SubscribeResult,
};
use crate::handler::{MessageHandler, SubscriptionRegistry};
use crate::retry::RetryPolicy;

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Interrupted,
    Resubscribing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Interrupted => "interrupted",
            Self::Resubscribing => "resubscribing",
        };
        f.write_str(s)
    }
}

/// Mutable connection internals, guarded by one mutex.
#[derive(Default)]
struct Inner {
    channel: Option<Arc<dyn Channel>>,
    registry: SubscriptionRegistry,
    supervisor: Option<AbortHandle>,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    fatal: watch::Sender<Option<ConnectionError>>,
    inner: Mutex<Inner>,
    shutdown: AtomicBool,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!(from = %prev, to = %next, "connection state changed");
        }
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn raise_fatal(&self, err: ConnectionError) {
        error!(error = %err, "fatal broker condition");
        self.fatal.send_replace(Some(err));
    }

    async fn dispatch(&self, msg: Message) {
        let handlers = self.inner.lock().await.registry.matching(&msg.topic);
        debug!(topic = %msg.topic, handlers = handlers.len(), "dispatching message");
        for handler in handlers {
            handler(msg.clone());
        }
    }

    /// Handle the transport's automatic reconnect. When the broker dropped
    /// the session, every registered filter is sent again, once, while the
    /// registry lock is held so no concurrent `subscribe` interleaves.
    async fn resume(&self, session_present: bool) {
        if session_present {
            info!("broker session resumed");
            self.set_state(ConnectionState::Connected);
            return;
        }

        self.set_state(ConnectionState::Resubscribing);
        let inner = self.inner.lock().await;
        let Some(channel) = inner.channel.clone() else {
            return;
        };

        for filter in inner.registry.filters() {
            debug!(filter = %filter, "resubscribing");
            match channel.subscribe(&filter, QoS::AtLeastOnce).await {
                Ok(()) => {}
                Err(SubscribeError::NotConnected) => {
                    warn!(filter = %filter, "session dropped during resubscription");
                    self.set_state(ConnectionState::Interrupted);
                    return;
                }
                Err(SubscribeError::Rejected { filter, reason }) => {
                    warn!(filter = %filter, reason = %reason, "resubscription rejected");
                    self.raise_fatal(ConnectionError::RejectedSubscription { topic: filter });
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
        }

        info!(
            subscriptions = inner.registry.len(),
            "subscriptions restored after session loss"
        );
        self.set_state(ConnectionState::Connected);
    }

    async fn transport_closed(&self, channel: &Arc<dyn Channel>) {
        let mut inner = self.inner.lock().await;
        let current = inner
            .channel
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(c, channel));
        if current {
            inner.channel = None;
            inner.supervisor = None;
            if !self.is_shutdown() {
                warn!("broker transport closed");
            }
            self.set_state(ConnectionState::Disconnected);
        }
    }
}

/// Consume transport events for one session until the stream ends.
async fn supervise(
    shared: Arc<Shared>,
    channel: Arc<dyn Channel>,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Message(msg) => shared.dispatch(msg).await,
            ChannelEvent::Interrupted { reason } => {
                warn!(reason = %reason, "broker connection interrupted");
                shared.set_state(ConnectionState::Interrupted);
            }
            ChannelEvent::Resumed { session_present } => shared.resume(session_present).await,
        }
    }
    shared.transport_closed(&channel).await;
}

/// Owner of the single broker connection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    connect_lock: Mutex<()>,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (fatal, _) = watch::channel(None);
        Self {
            connector,
            policy,
            connect_lock: Mutex::new(()),
            shared: Arc::new(Shared {
                state,
                fatal,
                inner: Mutex::new(Inner::default()),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The fatal condition raised so far, if any.
    pub fn fatal_error(&self) -> Option<ConnectionError> {
        self.shared.fatal.borrow().clone()
    }

    /// Resolve once a fatal condition (a rejected resubscription) is raised.
    ///
    /// The process is expected to stop when this resolves.
    pub async fn fatal(&self) -> ConnectionError {
        let mut rx = self.shared.fatal.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(err) => err.clone().unwrap_or(ConnectionError::Shutdown),
            Err(_) => ConnectionError::Shutdown,
        }
    }

    /// Make sure a broker session is up.
    ///
    /// Returns immediately when already connected. Otherwise performs at most
    /// one connect sequence at a time, retrying handshakes per the retry
    /// policy. While the transport is recovering from an interruption no new
    /// socket is opened; the call waits for the recovery instead, bounded by
    /// the policy's total budget.
    pub async fn ensure_connected(&self) -> ConnectionResult<()> {
        self.check_usable()?;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        self.check_usable()?;

        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Interrupted | ConnectionState::Resubscribing => {
                self.await_recovery().await
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                self.connect_with_retry().await
            }
        }
    }

    fn check_usable(&self) -> ConnectionResult<()> {
        if self.shared.is_shutdown() {
            return Err(ConnectionError::Shutdown);
        }
        match self.fatal_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn connect_with_retry(&self) -> ConnectionResult<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.shared.set_state(ConnectionState::Connecting);
            info!(
                attempt = attempts,
                max_attempts = self.policy.max_attempts,
                "connecting to broker"
            );

            let last_error = match self.connector.connect().await {
                Ok(session) => match self.install(session).await {
                    Ok(()) => return Ok(()),
                    Err(err @ ConnectionError::Handshake(_)) => err,
                    Err(err) => {
                        self.shared.set_state(ConnectionState::Disconnected);
                        return Err(err);
                    }
                },
                Err(err) => err,
            };
            warn!(attempt = attempts, error = %last_error, "broker connect attempt failed");

            if self.shared.is_shutdown() {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(ConnectionError::Shutdown);
            }

            match self.policy.next_delay(attempts) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    self.shared.set_state(ConnectionState::Disconnected);
                    error!(attempts, error = %last_error, "broker unreachable, giving up");
                    return Err(ConnectionError::Exhausted {
                        attempts,
                        last_error: last_error.to_string(),
                    });
                }
            }
        }
    }

    /// Adopt a fresh session: replay the registry, start the supervisor.
    async fn install(&self, session: Session) -> ConnectionResult<()> {
        let Session { channel, events } = session;
        let mut inner = self.shared.inner.lock().await;

        if self.shared.is_shutdown() {
            let _ = channel.disconnect().await;
            return Err(ConnectionError::Shutdown);
        }

        for filter in inner.registry.filters() {
            match channel.subscribe(&filter, QoS::AtLeastOnce).await {
                Ok(()) => {}
                Err(SubscribeError::NotConnected) => {
                    let _ = channel.disconnect().await;
                    return Err(ConnectionError::Handshake(format!(
                        "session lost while restoring '{filter}'"
                    )));
                }
                Err(SubscribeError::Rejected { filter, .. }) => {
                    let _ = channel.disconnect().await;
                    let err = ConnectionError::RejectedSubscription { topic: filter };
                    self.shared.raise_fatal(err.clone());
                    return Err(err);
                }
            }
        }

        if let Some(previous) = inner.supervisor.take() {
            previous.abort();
        }
        let task = tokio::spawn(supervise(self.shared.clone(), channel.clone(), events));
        inner.supervisor = Some(task.abort_handle());
        inner.channel = Some(channel);
        self.shared.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Wait for the transport's own reconnect to settle. A fatal condition
    /// raised meanwhile ends the wait with that error.
    async fn await_recovery(&self) -> ConnectionResult<()> {
        let budget = self.policy.total_budget();
        info!(budget_secs = budget.as_secs(), "waiting for broker connection to recover");

        let mut state_rx = self.watch_state();
        let mut fatal_rx = self.shared.fatal.subscribe();
        let settled = tokio::time::timeout(budget, async {
            tokio::select! {
                biased;
                fatal = fatal_rx.wait_for(Option::is_some) => {
                    Err(fatal.ok().and_then(|f| (*f).clone()).unwrap_or(ConnectionError::Shutdown))
                }
                state = state_rx.wait_for(|s| {
                    matches!(s, ConnectionState::Connected | ConnectionState::Disconnected)
                }) => Ok(state.map(|s| *s).ok()),
            }
        })
        .await;

        match settled {
            Ok(Err(fatal)) => Err(fatal),
            Ok(Ok(Some(ConnectionState::Connected))) => Ok(()),
            Ok(Ok(_)) => {
                self.check_usable()?;
                Err(ConnectionError::Exhausted {
                    attempts: self.policy.max_attempts,
                    last_error: "transport closed while recovering".into(),
                })
            }
            Err(_) => Err(ConnectionError::Exhausted {
                attempts: self.policy.max_attempts,
                last_error: format!("connection did not recover within {}s", budget.as_secs()),
            }),
        }
    }

    async fn connected_channel(&self) -> Option<Arc<dyn Channel>> {
        let inner = self.shared.inner.lock().await;
        if self.state() != ConnectionState::Connected {
            return None;
        }
        inner.channel.clone()
    }

    /// Publish at-least-once. Fails fast when no session is up; never retries.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> PublishResult<()> {
        self.publish_with_qos(topic, payload, QoS::AtLeastOnce).await
    }

    pub async fn publish_with_qos(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> PublishResult<()> {
        if self.shared.is_shutdown() {
            return Err(PublishError::NotConnected);
        }
        let channel = self
            .connected_channel()
            .await
            .ok_or(PublishError::NotConnected)?;
        debug!(topic, bytes = payload.len(), "publishing");
        channel.publish(topic, payload, qos).await
    }

    /// Register `handler` for every future message matching `filter`.
    ///
    /// The broker subscribe is sent the first time a filter is registered;
    /// the registration survives reconnects and is replayed when the broker
    /// loses the session. Requires a connected session.
    pub async fn subscribe<F>(&self, filter: &str, handler: F) -> SubscribeResult<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        let mut inner = self.shared.inner.lock().await;

        if self.shared.is_shutdown() || self.state() != ConnectionState::Connected {
            return Err(SubscribeError::NotConnected);
        }

        if !inner.registry.contains(filter) {
            let channel = inner.channel.clone().ok_or(SubscribeError::NotConnected)?;
            channel.subscribe(filter, QoS::AtLeastOnce).await?;
            info!(filter, "subscribed");
        }
        inner.registry.insert(filter, handler);
        Ok(())
    }

    /// Drop every handler for `filter` and unsubscribe at the broker.
    pub async fn unsubscribe(&self, filter: &str) -> SubscribeResult<()> {
        let mut inner = self.shared.inner.lock().await;
        if !inner.registry.remove(filter) {
            return Ok(());
        }
        if self.state() == ConnectionState::Connected {
            if let Some(channel) = inner.channel.clone() {
                channel.unsubscribe(filter).await?;
            }
        }
        info!(filter, "unsubscribed");
        Ok(())
    }

    /// Filters currently registered.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.shared.inner.lock().await.registry.filters()
    }

    /// Tear the connection down. Pending publishes may be dropped.
    pub async fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.shared.inner.lock().await;
        if let Some(task) = inner.supervisor.take() {
            task.abort();
        }
        if let Some(channel) = inner.channel.take() {
            if let Err(e) = channel.disconnect().await {
                warn!(error = %e, "disconnect failed");
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
        info!("connection manager shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.shared.inner.try_lock() {
            if let Some(task) = inner.supervisor.take() {
                task.abort();
            }
        }
    }
}
