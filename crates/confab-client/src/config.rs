//! Client configuration
//!
//! Layered from built-in defaults, an optional `confab.toml`, and `CONFAB_*`
//! environment variables (`CONFAB_ENDPOINT__APP_ID=...`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::Result;

const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Remote SFU tenant
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SfuEndpoint {
    pub host: String,
    pub app_id: String,
    pub secret: String,
}

impl SfuEndpoint {
    pub fn new(host: impl Into<String>, app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            app_id: app_id.into(),
            secret: secret.into(),
        }
    }

    /// `{host}/v1/apps/{app_id}`, defaulting to https when no scheme is given
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        format!("{}/v1/apps/{}", host, self.app_id)
    }
}

impl fmt::Debug for SfuEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SfuEndpoint")
            .field("host", &self.host)
            .field("app_id", &self.app_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(url: impl Into<String>, username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

pub fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::stun(DEFAULT_STUN_SERVER)]
}

/// Per-connection parameters, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub local_user_id: String,
    pub room_id: String,
    pub ice_servers: Vec<IceServer>,
}

impl ConnectionOptions {
    pub fn new(local_user_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            room_id: room_id.into(),
            ice_servers: Vec::new(),
        }
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<IceServer>) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    /// Fall back to `defaults` when no ICE servers were given
    pub fn resolve_ice_servers(mut self, defaults: &[IceServer]) -> Self {
        if self.ice_servers.is_empty() {
            self.ice_servers = defaults.to_vec();
        }
        self
    }
}

fn default_discovery_interval_ms() -> u64 {
    3000
}

fn default_snapshot_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_negotiation_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoint: SfuEndpoint,
    #[serde(default = "default_ice_servers")]
    pub default_ice_servers: Vec<IceServer>,
    /// Interval between session discovery polls
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    /// Interval between remote stream snapshot reads in `RoomView`
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Bound on the whole `initialize()` sequence; 0 disables it
    #[serde(default = "default_negotiation_timeout_ms")]
    pub negotiation_timeout_ms: u64,
    /// Refetch track lists of already discovered sessions on every poll
    #[serde(default)]
    pub rescan_discovered_sessions: bool,
}

impl ClientConfig {
    pub fn new(endpoint: SfuEndpoint) -> Self {
        Self {
            endpoint,
            default_ice_servers: default_ice_servers(),
            discovery_interval_ms: default_discovery_interval_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            negotiation_timeout_ms: default_negotiation_timeout_ms(),
            rescan_discovered_sessions: false,
        }
    }

    /// Load from `confab.toml` (optional) and the environment
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name("confab").required(false))
            .add_source(
                Environment::with_prefix("CONFAB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    /// Parse an in-memory TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(contents, FileFormat::Toml));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: ClientConfig = builder.build()?.try_deserialize()?;
        tracing::debug!("Loaded client config for {:?}", config.endpoint);
        Ok(config)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn negotiation_timeout(&self) -> Option<Duration> {
        match self.negotiation_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
