//! Agent event stream client.
//!
//! [`ActivityStream`] keeps a best-effort feed connection open for one session
//! while the caller says a request is in flight, and folds every inbound
//! event into an [`ActivityState`] that subscribers observe through a
//! `tokio::sync::watch` channel.
//!
//! # Lifecycle
//!
//! The stream connects only while a session id is set **and** processing is
//! on. When that precondition becomes true, a worker task waits for the
//! settle delay, fetches credentials, opens the feed and reads frames until
//! the connection closes. A drop while processing schedules a reconnect with
//! exponential backoff, up to the policy's attempt budget. Credential
//! failures are terminal for the cycle.
//!
//! When the precondition becomes false, on [`ActivityStream::reset`], or when
//! the stream is dropped, the worker is aborted and the generation counter is
//! bumped; callbacks carrying an older generation are ignored, so a frame
//! from a superseded connection can never touch the state.
//!
//! No error is surfaced to the caller: failures show up only as
//! `is_connected == false`.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ActivityState, StreamSettings};
use crate::credentials::CredentialProvider;
use crate::events::AgentEvent;
use crate::transport::FeedTransport;

/// Live activity feed for one UI session.
///
/// Must be created inside a Tokio runtime.
pub struct ActivityStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ActivityStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("ActivityStream")
            .field("session_id", &inner.session_id)
            .field("is_connected", &inner.state.is_connected)
            .field("is_processing", &inner.state.is_processing)
            .field("events", &inner.state.events.len())
            .field("generation", &inner.generation)
            .finish()
    }
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ActivityState>,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn FeedTransport>,
    settings: StreamSettings,
}

#[derive(Default)]
struct Inner {
    state: ActivityState,
    session_id: Option<String>,
    /// Bumped on every teardown; workers carry the value they were started with.
    generation: u64,
    reconnect_attempts: u32,
    worker: Option<JoinHandle<()>>,
}

impl Inner {
    fn ready(&self) -> bool {
        self.session_id.is_some() && self.state.is_processing
    }

    /// Close the connection, cancel any pending timer and invalidate callbacks.
    fn teardown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.generation = self.generation.wrapping_add(1);
        self.state.is_connected = false;
    }
}

impl ActivityStream {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn FeedTransport>,
        settings: StreamSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(ActivityState::default());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                state_tx,
                credentials,
                transport,
                settings,
            }),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ActivityState {
        self.shared.lock().state.clone()
    }

    /// Observe state changes. Drop the receiver to unsubscribe.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ActivityState> {
        self.shared.state_tx.subscribe()
    }

    /// Bind to `session_id` and observe state changes.
    pub fn subscribe_to(&self, session_id: Option<String>) -> watch::Receiver<ActivityState> {
        self.set_session(session_id);
        self.subscribe()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.lock().session_id.clone()
    }

    /// Change the session the stream is bound to. `None` means no session yet.
    ///
    /// A change while connected closes the current connection and, if still
    /// processing, connects again for the new session after the settle delay.
    pub fn set_session(&self, session_id: Option<String>) {
        let mut inner = self.shared.lock();
        if inner.session_id == session_id {
            return;
        }
        let was_ready = inner.ready();
        inner.session_id = session_id;
        self.shared.transition(&mut inner, was_ready, true);
        self.shared.publish(&inner);
    }

    /// Signal whether a request is outstanding.
    ///
    /// `true` starts a connection cycle (once a session is set); `false`
    /// clears the active agent and closes any connection.
    pub fn set_processing(&self, processing: bool) {
        let mut inner = self.shared.lock();
        let was_ready = inner.ready();
        inner.state.is_processing = processing;
        if !processing {
            inner.state.clear_active_agent();
        }
        self.shared.transition(&mut inner, was_ready, false);
        self.shared.publish(&inner);
    }

    /// Clear all state, close any connection and cancel any pending reconnect.
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        debug!(name: "stream.reset", session_id = ?inner.session_id, "Resetting agent activity");
        inner.teardown();
        inner.state = ActivityState::default();
        inner.reconnect_attempts = 0;
        self.shared.publish(&inner);
    }
}

impl Drop for ActivityStream {
    fn drop(&mut self) {
        self.shared.lock().teardown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.state.clone());
    }

    /// React to a change of session or processing flag.
    fn transition(self: &Arc<Self>, inner: &mut Inner, was_ready: bool, session_changed: bool) {
        if !inner.ready() {
            inner.teardown();
            return;
        }
        if was_ready && !session_changed {
            return;
        }

        inner.teardown();
        inner.reconnect_attempts = 0;
        let generation = inner.generation;
        let delay = self.settings.settle_delay;
        inner.worker = Some(tokio::spawn(Arc::clone(self).run(generation, delay)));
    }

    /// One connection cycle: connect, read until close, back off, repeat.
    async fn run(self: Arc<Self>, generation: u64, first_delay: Duration) {
        let mut delay = first_delay;
        loop {
            tokio::time::sleep(delay).await;
            match self.attempt(generation).await {
                Some(next) => delay = next,
                None => return,
            }
        }
    }

    /// Returns the delay before the next reconnect, or `None` to stop.
    async fn attempt(&self, generation: u64) -> Option<Duration> {
        let session_id = self.live_session(generation)?;

        let credentials = match self.credentials.fetch(&session_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(
                    name: "stream.credentials.failed",
                    session_id = %session_id,
                    error = %e,
                    "Failed to get feed credentials"
                );
                self.on_error(generation);
                return None;
            }
        };

        let url = match credentials.feed_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(name: "stream.credentials.invalid", session_id = %session_id, error = %e, "Credential endpoint returned an unusable feed URL");
                self.on_error(generation);
                return None;
            }
        };

        info!(
            name: "stream.connecting",
            session_id = %session_id,
            host = url.host_str().unwrap_or_default(),
            "Connecting to agent event feed"
        );

        let mut feed = match self.transport.connect(&url).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!(name: "stream.connect.failed", session_id = %session_id, error = %e, "Feed connection failed");
                self.on_error(generation);
                return self.on_close(generation);
            }
        };

        if !self.on_open(generation) {
            return None;
        }

        while let Some(frame) = feed.next().await {
            match frame {
                Ok(text) => {
                    if self.on_message(generation, &text).is_break() {
                        return None;
                    }
                }
                Err(e) => {
                    warn!(name: "stream.error", session_id = %session_id, error = %e, "Feed transport error");
                    self.on_error(generation);
                }
            }
        }

        self.on_close(generation)
    }

    fn live_session(&self, generation: u64) -> Option<String> {
        let inner = self.lock();
        if inner.generation != generation || !inner.ready() {
            return None;
        }
        inner.session_id.clone()
    }

    fn on_open(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state.is_connected = true;
        inner.reconnect_attempts = 0;
        info!(name: "stream.connected", session_id = ?inner.session_id, "Agent event feed connected");
        self.publish(&inner);
        true
    }

    fn on_message(&self, generation: u64, frame: &str) -> ControlFlow<()> {
        let Some(event) = AgentEvent::parse(frame) else {
            debug!(name: "stream.message.discarded", bytes = frame.len(), "Discarding malformed feed message");
            return ControlFlow::Continue(());
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            return ControlFlow::Break(());
        }

        debug!(
            name: "stream.message",
            event_type = event.event_type.as_str(),
            feature = ?event.feature,
            status = ?event.status,
            agent_id = ?event.agent_id,
            "Agent event received"
        );

        let completed = inner.state.record(event, self.settings.limits);
        if completed {
            info!(name: "stream.generation.completed", session_id = ?inner.session_id, "Generation completed, closing feed");
            inner.state.stop_processing();
            inner.teardown();
            self.publish(&inner);
            return ControlFlow::Break(());
        }

        self.publish(&inner);
        ControlFlow::Continue(())
    }

    fn on_error(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || !inner.state.is_connected {
            return;
        }
        inner.state.is_connected = false;
        self.publish(&inner);
    }

    fn on_close(&self, generation: u64) -> Option<Duration> {
        let mut inner = self.lock();
        if inner.generation != generation {
            return None;
        }
        inner.state.is_connected = false;
        self.publish(&inner);

        let policy = self.settings.reconnect;
        if !inner.state.is_processing || !policy.allows(inner.reconnect_attempts) {
            info!(
                name: "stream.closed",
                session_id = ?inner.session_id,
                attempts = inner.reconnect_attempts,
                "Agent event feed closed"
            );
            return None;
        }

        let delay = policy.delay_for(inner.reconnect_attempts);
        inner.reconnect_attempts += 1;
        info!(
            name: "stream.reconnect.scheduled",
            session_id = ?inner.session_id,
            attempt = inner.reconnect_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting to agent event feed"
        );
        Some(delay)
    }
}
