use std::{net::Ipv4Addr, path::Path, time::Duration};

use serde::Deserialize;

pub const EDGE_GAP_PX: f32 = 50.0;
pub const CLICK_THRESHOLD_PX: f64 = 10.0;
pub const REFERENCE_WIDTH: f64 = 1080.0;
pub const LIVENESS_TICK_MS: u64 = 10;
pub const STOP_GAP_MS: u64 = 300;
// Velocity is reported in px per this many milliseconds.
pub const VELOCITY_UNIT_MS: f32 = 10.0;
pub const DEFAULT_SCREEN_WIDTH: f32 = 1080.0;

pub const DISCOVERY_PORT: u16 = 9527;
pub const RECEIVE_PORT: u16 = 9528;
pub const IO_TIMEOUT_MS: u64 = 5_000;
pub const ACCEPT_TIMEOUT_MS: u64 = 5_000;
pub const ACCEPT_POLL_MS: u64 = 10;
pub const SNIFF_PREFIX: &str = "RequestServerForGesture";
pub const DEFAULT_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub screen_width: f32,
    pub edge_gap_px: f32,
    pub click_threshold_px: f64,
    pub reference_width: f64,
    pub liveness_tick_ms: u64,
    pub stop_gap_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            screen_width: DEFAULT_SCREEN_WIDTH,
            edge_gap_px: EDGE_GAP_PX,
            click_threshold_px: CLICK_THRESHOLD_PX,
            reference_width: REFERENCE_WIDTH,
            liveness_tick_ms: LIVENESS_TICK_MS,
            stop_gap_ms: STOP_GAP_MS,
        }
    }
}

impl CaptureConfig {
    pub fn with_screen_width(mut self, screen_width: f32) -> Self {
        self.screen_width = screen_width;
        self
    }

    pub fn liveness_tick(&self) -> Duration {
        Duration::from_millis(self.liveness_tick_ms.max(1))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Preconfigured `host:port` of the decode service; discovery fills it otherwise.
    pub server: Option<String>,
    pub discovery_port: u16,
    /// Sniff target. Derived from the local address and its netmask when unset.
    pub broadcast_addr: Option<Ipv4Addr>,
    /// Overrides the netmask read from the local interface.
    pub netmask: Option<Ipv4Addr>,
    /// Local reply port. `0` binds an ephemeral port and advertises whatever was bound.
    pub receive_port: u16,
    pub io_timeout_ms: u64,
    pub accept_timeout_ms: u64,
    pub sniff_prefix: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            server: None,
            discovery_port: DISCOVERY_PORT,
            broadcast_addr: None,
            netmask: None,
            receive_port: RECEIVE_PORT,
            io_timeout_ms: IO_TIMEOUT_MS,
            accept_timeout_ms: ACCEPT_TIMEOUT_MS,
            sniff_prefix: SNIFF_PREFIX.to_string(),
        }
    }
}

impl ProtocolConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms.max(1))
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms.max(1))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReplyPolicy {
    /// Only the reply to the newest outstanding request is delivered.
    #[default]
    Drop,
    Deliver,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Send `CMD_DECODE` instead of `DECODE`.
    pub command_mode: bool,
    /// Commit a lone candidate without opening the menu.
    pub auto_accept_single: bool,
    pub stale_replies: StaleReplyPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_mode: false,
            auto_accept_single: false,
            stale_replies: StaleReplyPolicy::Drop,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub protocol: ProtocolConfig,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_uses_defaults() {
        let config = Config::from_toml_str("").expect("empty config");
        assert_eq!(config, Config::default());
        assert_eq!(config.protocol.receive_port, 9528);
        assert_eq!(config.protocol.netmask, None);
        assert_eq!(config.capture.stop_gap_ms, 300);
    }

    #[test]
    fn partial_profile_overrides_named_fields_only() {
        let config = Config::from_toml_str(
            r#"
            [capture]
            screen_width = 1440.0

            [protocol]
            server = "10.0.0.5:10086"
            accept_timeout_ms = 2000
            broadcast_addr = "192.168.1.255"
            netmask = "255.255.0.0"

            [session]
            stale_replies = "deliver"
            "#,
        )
        .expect("partial config");

        assert_eq!(config.capture.screen_width, 1440.0);
        assert_eq!(config.capture.edge_gap_px, EDGE_GAP_PX);
        assert_eq!(config.protocol.server.as_deref(), Some("10.0.0.5:10086"));
        assert_eq!(config.protocol.accept_timeout(), Duration::from_millis(2000));
        assert_eq!(config.protocol.discovery_port, DISCOVERY_PORT);
        assert_eq!(
            config.protocol.broadcast_addr,
            Some(Ipv4Addr::new(192, 168, 1, 255))
        );
        assert_eq!(config.protocol.netmask, Some(Ipv4Addr::new(255, 255, 0, 0)));
        assert_eq!(config.session.stale_replies, StaleReplyPolicy::Deliver);
    }

    #[test]
    fn malformed_profile_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("[capture]\nscreen_width = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
