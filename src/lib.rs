//! Pulse dashboard backend
//!
//! Serves the data a business metrics dashboard needs around its assistant
//! panel: ephemeral credentials for the agent event feed, a per-session live
//! view of what the agent is doing while a request is in flight, and the
//! request/response call to the agent itself.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP API with SSE for live activity
//! - **Stream client**: one feed connection per session, gated on an
//!   outstanding request, with bounded reconnects
//! - **Agent client**: tolerant extraction of the agent's structured reply
//!
//! # Modules
//!
//! - [`activity`]: activity state and the stream client
//! - [`events`]: agent event model and thinking classification
//! - [`credentials`]: feed credential issuing and fetching
//! - [`transport`]: WebSocket feed transport
//! - [`agent`]: agent chat client
//! - [`session`]: per-session stream registry

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod activity;
pub mod agent;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod server;
pub mod session;
pub mod transport;

use std::sync::Arc;

use crate::activity::StreamSettings;
use crate::agent::AgentClient;
use crate::config::AppConfig;
use crate::credentials::{CredentialProvider, HttpCredentialProvider, LocalCredentialIssuer};
use crate::session::SessionStore;
use crate::transport::{FeedTransport, WebSocketTransport};

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Live activity streams, one per UI session.
    pub sessions: SessionStore,
    pub agent: Arc<AgentClient>,
    /// Backs the credential endpoint.
    pub issuer: Arc<LocalCredentialIssuer>,
}

impl AppState {
    /// Production wiring: WebSocket feed, credentials issued in-process unless
    /// a remote credential endpoint is configured.
    pub fn from_config(config: Arc<AppConfig>) -> error::Result<Self> {
        Self::with_transport(config, Arc::new(WebSocketTransport))
    }

    /// Same as [`AppState::from_config`] with a custom feed transport.
    pub fn with_transport(
        config: Arc<AppConfig>,
        transport: Arc<dyn FeedTransport>,
    ) -> error::Result<Self> {
        let platform = &config.platform;
        let issuer = Arc::new(LocalCredentialIssuer::new(
            platform.api_key.clone(),
            platform.feed_base_url.clone(),
        ));

        let credentials: Arc<dyn CredentialProvider> = match &config.stream.credentials_url {
            Some(url) => Arc::new(HttpCredentialProvider::new(url)?),
            None => Arc::clone(&issuer) as Arc<dyn CredentialProvider>,
        };

        let agent = Arc::new(AgentClient::new(
            &platform.agent_api_url,
            platform.api_key.clone(),
            platform.user_id.clone(),
        )?);

        let sessions = SessionStore::new(
            credentials,
            transport,
            StreamSettings::from(&config.stream),
        );

        Ok(Self {
            config,
            sessions,
            agent,
            issuer,
        })
    }
}
