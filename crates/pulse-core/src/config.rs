use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Allowlist entry that admits every origin. Development only.
pub const WILDCARD_ORIGIN: &str = "*";
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PONG_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024; // inbound frames are control-only
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 15;

/// Top-level config (pulse.toml + PULSE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Streaming endpoint, hub and per-client pump settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Exact `Origin` values admitted at handshake time. `"*"` admits all.
    /// An empty list rejects every upgrade.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Outbound queue slots per client. A client whose queue is full when a
    /// broadcast arrives is disconnected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Silence from the peer longer than this closes the connection.
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            pong_timeout_secs: DEFAULT_PONG_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl StreamConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == WILDCARD_ORIGIN)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reject settings that would make the pumps misbehave.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.queue_capacity == 0 {
            return Err(crate::error::PulseError::Config(
                "stream.queue_capacity must be at least 1".into(),
            ));
        }
        if self.ping_interval_secs == 0 {
            return Err(crate::error::PulseError::Config(
                "stream.ping_interval_secs must be at least 1".into(),
            ));
        }
        if self.pong_timeout_secs < self.ping_interval_secs {
            return Err(crate::error::PulseError::Config(format!(
                "stream.pong_timeout_secs ({}) must not be shorter than stream.ping_interval_secs ({})",
                self.pong_timeout_secs, self.ping_interval_secs
            )));
        }
        if self.write_timeout_secs == 0 {
            return Err(crate::error::PulseError::Config(
                "stream.write_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Static bearer tokens, each bound to one tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tenants: Vec<TenantToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantToken {
    pub tenant: String,
    pub token: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_ping_interval_secs() -> u64 {
    DEFAULT_PING_INTERVAL_SECS
}
fn default_pong_timeout_secs() -> u64 {
    DEFAULT_PONG_TIMEOUT_SECS
}
fn default_write_timeout_secs() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}
fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}
fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

impl PulseConfig {
    /// Load config from a TOML file with PULSE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.pulse/pulse.toml
    ///
    /// Nested env keys use a double underscore, e.g.
    /// `PULSE_STREAM__QUEUE_CAPACITY=128`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PulseConfig = Figment::from(Serialized::defaults(PulseConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PULSE_").split("__"))
            .extract()
            .map_err(|e| crate::error::PulseError::Config(e.to_string()))?;

        config.stream.validate()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pulse/pulse.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PulseConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert!(cfg.stream.allowed_origins.is_empty());
        assert!(cfg.stream.validate().is_ok());
    }

    #[test]
    fn wildcard_detected() {
        let cfg = StreamConfig {
            allowed_origins: vec!["https://app.example.com".into(), "*".into()],
            ..Default::default()
        };
        assert!(cfg.allows_any_origin());

        let cfg = StreamConfig {
            allowed_origins: vec!["https://app.example.com".into()],
            ..Default::default()
        };
        assert!(!cfg.allows_any_origin());
    }

    #[test]
    fn zero_capacity_rejected() {
        let cfg = StreamConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn pong_timeout_shorter_than_ping_rejected() {
        let cfg = StreamConfig {
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("pong_timeout_secs"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: PulseConfig = Figment::from(Serialized::defaults(PulseConfig::default()))
            .merge(Toml::string(
                r#"
                [stream]
                allowed_origins = ["https://app.example.com"]
                queue_capacity = 8

                [[auth.tenants]]
                tenant = "acme"
                token = "secret"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(cfg.stream.queue_capacity, 8);
        assert_eq!(cfg.stream.ping_interval_secs, DEFAULT_PING_INTERVAL_SECS);
        assert_eq!(cfg.gateway.bind, DEFAULT_BIND);
        assert_eq!(
            cfg.auth.tenants,
            vec![TenantToken {
                tenant: "acme".into(),
                token: "secret".into()
            }]
        );
    }
}
