//! Client configuration types.
//!
//! [`ClientConfig`] can be built in code or loaded with [`ClientConfig::load`]:
//! - An optional TOML file
//! - Environment variables with `MQISDP__` prefix (double underscore for nesting)
//!
//! Environment variable examples:
//! - `MQISDP__HOST=broker.local`
//! - `MQISDP__OPTIONS__KEEP_ALIVE=60`
//! - `MQISDP__OPTIONS__USERNAME=abcd`

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use config::{Environment, File, FileFormat};
use mqisdp_core::{check_string, LastWill, QoS};
use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Longest username or password this protocol profile accepts.
pub const MAX_CREDENTIAL_LEN: usize = 12;

pub const DEFAULT_KEEP_ALIVE: u16 = 30;
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Last Will and Testament message.
///
/// Published by the broker if the client goes away without sending
/// DISCONNECT. Topic and message always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Will {
    pub topic: String,
    pub message: String,
    #[serde(default)]
    pub qos: QoS,
    #[serde(default)]
    pub retain: bool,
}

impl Will {
    /// Create a new will message with QoS 0 and no retain.
    pub fn new(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub(crate) fn as_last_will(&self) -> LastWill<'_> {
        LastWill {
            topic: &self.topic,
            message: self.message.as_bytes(),
            qos: self.qos,
            retain: self.retain,
        }
    }
}

/// Session options sent in CONNECT.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Client identifier. Generated when not configured.
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds (at least 1).
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<Will>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            client_id: generate_client_id(),
            username: None,
            password: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: false,
            will: None,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set keep-alive interval in seconds.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    /// Check the client-side limits of the protocol profile.
    pub fn validate(&self) -> Result<()> {
        if self.username.as_ref().is_some_and(|u| u.len() > MAX_CREDENTIAL_LEN) {
            return Err(ClientError::InvalidOptions(
                "user names are kept to 12 characters or fewer".into(),
            ));
        }
        if self.password.as_ref().is_some_and(|p| p.len() > MAX_CREDENTIAL_LEN) {
            return Err(ClientError::InvalidOptions(
                "passwords are kept to 12 characters or fewer".into(),
            ));
        }
        if self.keep_alive == 0 {
            return Err(ClientError::InvalidOptions(
                "keep alive must be at least 1 second".into(),
            ));
        }
        if self.will.as_ref().is_some_and(|w| w.topic.is_empty()) {
            return Err(ClientError::InvalidOptions("will topic must not be empty".into()));
        }

        // Credentials are already bounded above; each string is at most
        // 65535 bytes, so CONNECT stays within the remaining-length limit.
        let mut strings = vec![("client id", self.client_id.as_bytes())];
        if let Some(will) = &self.will {
            strings.push(("will topic", will.topic.as_bytes()));
            strings.push(("will message", will.message.as_bytes()));
        }
        for (field, bytes) in strings {
            check_string(field, bytes).map_err(|e| ClientError::InvalidOptions(e.to_string()))?;
        }
        Ok(())
    }

    /// Interval between PINGRESP and the next PINGREQ: 60% of keep-alive.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive as u64 * 600)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive as u64)
    }
}

/// `a` followed by the current time in milliseconds and a sequence number.
fn generate_client_id() -> String {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("a{}{}", millis, SEQ.fetch_add(1, Ordering::Relaxed) % 1000)
}

/// Options for a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }
}

/// Broker address plus session options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub options: ConnectOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            options: ConnectOptions::default(),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// Config parsing/loading error.
    Config(config::ConfigError),
    /// Invalid configuration value.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("host", "localhost")?
            .set_default("port", DEFAULT_PORT as i64)?
            .set_default("connect_timeout_secs", DEFAULT_CONNECT_TIMEOUT_SECS as i64)?;

        let path = path.as_ref();
        if path.is_file() {
            let content = std::fs::read_to_string(path)?;
            builder = builder.add_source(File::from_str(&content, FileFormat::Toml));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("MQISDP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ClientConfig = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string. No environment overrides.
    pub fn parse(content: &str) -> std::result::Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)
            .map_err(|e| ConfigError::Validation(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".into()));
        }
        self.options
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }
}
