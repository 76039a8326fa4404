//! Session registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::activity::{ActivityStream, StreamSettings};
use crate::credentials::CredentialProvider;
use crate::transport::FeedTransport;

/// Length of the random suffix in generated session ids.
const SESSION_SUFFIX_LEN: usize = 7;

/// Generate a client-style session id: `session_<unix-millis>_<7 alphanumerics>`.
#[must_use]
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "session_{}_{}",
        Utc::now().timestamp_millis(),
        &suffix[..SESSION_SUFFIX_LEN]
    )
}

/// One UI session and its activity stream.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    stream: ActivityStream,
    last_activity: RwLock<DateTime<Utc>>,
    /// Chat requests currently in flight against this session.
    requests: Mutex<usize>,
}

impl Session {
    fn new(id: String, stream: ActivityStream) -> Self {
        let now = Utc::now();
        stream.set_session(Some(id.clone()));
        Self {
            inner: Arc::new(SessionInner {
                id,
                stream,
                last_activity: RwLock::new(now),
                requests: Mutex::new(0),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The activity stream bound to this session.
    #[must_use]
    pub fn stream(&self) -> &ActivityStream {
        &self.inner.stream
    }

    /// Update the last activity timestamp.
    pub fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if the session has been idle longer than `timeout`.
    ///
    /// A session whose stream is still processing never expires.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        if self.inner.stream.snapshot().is_processing {
            return false;
        }
        // Negative duration means clock skew; treat as fresh.
        (Utc::now() - self.last_activity())
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }

    /// Mark an agent request as in flight until the returned guard drops.
    ///
    /// The stream is processing while at least one guard is alive, so
    /// overlapping requests keep it on until the last of them finishes,
    /// and a cancelled request still releases its hold.
    #[must_use]
    pub fn begin_request(&self) -> RequestGuard {
        let mut count = self
            .inner
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        if *count == 1 {
            self.inner.stream.set_processing(true);
        }
        RequestGuard {
            session: self.clone(),
        }
    }
}

/// In-flight agent request on a [`Session`]. See [`Session::begin_request`].
#[derive(Debug)]
pub struct RequestGuard {
    session: Session,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let inner = &self.session.inner;
        let mut count = inner
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            inner.stream.set_processing(false);
        }
    }
}

/// Thread-safe store for sessions.
///
/// Every session gets a fresh [`ActivityStream`] built from the store's
/// credential provider, transport and settings.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn FeedTransport>,
    settings: StreamSettings,
}

impl SessionStore {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn FeedTransport>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                credentials,
                transport,
                settings,
            }),
        }
    }

    /// Create a session with a freshly generated id.
    #[must_use]
    pub fn create(&self) -> Session {
        self.create_with_id(new_session_id())
    }

    /// Create a session with a specific id, replacing any existing one.
    #[must_use]
    pub fn create_with_id(&self, id: impl Into<String>) -> Session {
        let id = id.into();
        let stream = ActivityStream::new(
            Arc::clone(&self.inner.credentials),
            Arc::clone(&self.inner.transport),
            self.inner.settings,
        );
        let session = Session::new(id.clone(), stream);
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(id, session.clone());
        session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        let guard = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.get(id).cloned()
    }

    /// Get a session by id, creating it if it doesn't exist.
    #[must_use]
    pub fn get_or_create(&self, id: &str) -> Session {
        if let Some(session) = self.get(id) {
            return session;
        }

        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(id.to_string())
            .or_insert_with(|| {
                let stream = ActivityStream::new(
                    Arc::clone(&self.inner.credentials),
                    Arc::clone(&self.inner.transport),
                    self.inner.settings,
                );
                Session::new(id.to_string(), stream)
            })
            .clone()
    }

    /// Remove a session. Its stream is torn down once the last handle is dropped.
    pub fn remove(&self, id: &str) -> Option<Session> {
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }
}
