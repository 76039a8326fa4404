//! Per-session activity streams.
//!
//! Each browser page load generates an opaque session id and gets its own
//! [`ActivityStream`](crate::activity::ActivityStream). Sessions are kept in
//! memory and dropped after a period of inactivity; dropping a session tears
//! down its feed connection.
//!
//! # Architecture
//!
//! - [`Session`]: one session id bound to one activity stream
//! - [`SessionStore`]: thread-safe registry of live sessions
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pulse_dashboard::activity::StreamSettings;
//! use pulse_dashboard::credentials::LocalCredentialIssuer;
//! use pulse_dashboard::session::SessionStore;
//! use pulse_dashboard::transport::WebSocketTransport;
//!
//! # #[tokio::main] async fn main() {
//! let store = SessionStore::new(
//!     Arc::new(LocalCredentialIssuer::new("key", "wss://metrics.example.com/session")),
//!     Arc::new(WebSocketTransport),
//!     StreamSettings::default(),
//! );
//! let session = store.create();
//! session.stream().set_processing(true);
//! # }
//! ```

mod store;

pub use store::{RequestGuard, Session, SessionStore, new_session_id};
