use crate::activity::{
    BufferLimits, MAX_EVENTS, MAX_RECONNECT_ATTEMPTS, MAX_THINKING_EVENTS, RECONNECT_BASE_DELAY_MS,
    RECONNECT_MAX_DELAY_MS, ReconnectPolicy, SETTLE_DELAY, StreamSettings,
};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Platform API key used for feed credentials and agent calls
    #[arg(long, env = "PLATFORM_API_KEY", hide_env_values = true)]
    pub platform_api_key: Option<String>,

    /// Agent answering dashboard questions
    #[arg(long, env = "AGENT_ID")]
    pub agent_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    pub stream: StreamConfig,
    pub sessions: SessionsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Deserialize, Clone)]
pub struct PlatformConfig {
    pub api_key: String,
    /// Feed URLs are `<feed_base_url>/<session_id>`.
    pub feed_base_url: String,
    pub agent_api_url: String,
    pub agent_id: String,
    pub user_id: String,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_key_set", &!self.api_key.is_empty())
            .field("feed_base_url", &self.feed_base_url)
            .field("agent_api_url", &self.agent_api_url)
            .field("agent_id", &self.agent_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    /// Remote credential endpoint. Unset means credentials are issued in-process.
    #[serde(default)]
    pub credentials_url: Option<String>,
    pub max_events: usize,
    pub max_thinking_events: usize,
    pub max_reconnect_attempts: u32,
    pub settle_delay_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl From<&StreamConfig> for StreamSettings {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            limits: BufferLimits {
                max_events: cfg.max_events,
                max_thinking_events: cfg.max_thinking_events,
            },
            reconnect: ReconnectPolicy {
                max_attempts: cfg.max_reconnect_attempts,
                base_delay_ms: cfg.reconnect_base_delay_ms,
                max_delay_ms: cfg.reconnect_max_delay_ms,
            },
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    pub idle_timeout_secs: u64,
}

impl SessionsConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Layered load: defaults, then the YAML file, then `PULSE_*` environment
    /// variables, then CLI flags (and the env vars clap binds to them).
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let settle_ms = u64::try_from(SETTLE_DELAY.as_millis()).unwrap_or(u64::MAX);

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("platform.api_key", "")?
            .set_default("platform.feed_base_url", "wss://metrics.studio.lyzr.ai/session")?
            .set_default(
                "platform.agent_api_url",
                "https://agent-prod.studio.lyzr.ai/v3/inference/chat/",
            )?
            .set_default("platform.agent_id", "")?
            .set_default("platform.user_id", "dashboard@local")?
            .set_default("stream.max_events", MAX_EVENTS as u64)?
            .set_default("stream.max_thinking_events", MAX_THINKING_EVENTS as u64)?
            .set_default("stream.max_reconnect_attempts", MAX_RECONNECT_ATTEMPTS)?
            .set_default("stream.settle_delay_ms", settle_ms)?
            .set_default("stream.reconnect_base_delay_ms", RECONNECT_BASE_DELAY_MS)?
            .set_default("stream.reconnect_max_delay_ms", RECONNECT_MAX_DELAY_MS)?
            .set_default("sessions.idle_timeout_secs", 1800)?;

        // 2. Config file: explicit path must exist, the cwd fallback may not
        builder = match cli.config.as_deref() {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        // 3. Environment, e.g. PULSE_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("PULSE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI overrides
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(key) = cli.platform_api_key {
            builder = builder.set_override("platform.api_key", key)?;
        }
        if let Some(agent_id) = cli.agent_id {
            builder = builder.set_override("platform.agent_id", agent_id)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_settings_from_config() {
        let cfg = StreamConfig {
            credentials_url: None,
            max_events: 10,
            max_thinking_events: 2,
            max_reconnect_attempts: 3,
            settle_delay_ms: 5,
            reconnect_base_delay_ms: 50,
            reconnect_max_delay_ms: 400,
        };
        let settings = StreamSettings::from(&cfg);
        assert_eq!(settings.limits.max_events, 10);
        assert_eq!(settings.limits.max_thinking_events, 2);
        assert_eq!(settings.reconnect.max_attempts, 3);
        assert_eq!(settings.reconnect.delay_for(4), Duration::from_millis(400));
        assert_eq!(settings.settle_delay, Duration::from_millis(5));
    }

    #[test]
    fn test_platform_debug_hides_key() {
        let platform = PlatformConfig {
            api_key: "sk-live".to_string(),
            feed_base_url: String::new(),
            agent_api_url: String::new(),
            agent_id: String::new(),
            user_id: String::new(),
        };
        assert!(!format!("{platform:?}").contains("sk-live"));
    }
}
