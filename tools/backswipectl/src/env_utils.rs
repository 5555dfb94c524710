use anyhow::{anyhow, Context, Result};
use backswipe::Config;

pub const SERVER_ENV: &str = "BACKSWIPE_SERVER";
pub const RECEIVE_PORT_ENV: &str = "BACKSWIPE_RECEIVE_PORT";
pub const TIMEOUT_SEC_ENV: &str = "BACKSWIPE_TIMEOUT_SEC";

fn lookup_env(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(raw) => Ok(Some(raw)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow!("{name} invalid: {err}")),
    }
}

fn parse_u16(name: &str, raw: Option<String>, default: u16) -> Result<u16> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("{name} must be a port number")),
        None => Ok(default),
    }
}

fn parse_f64(name: &str, raw: Option<String>, default: f64) -> Result<f64> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{name} must be a number")),
        None => Ok(default),
    }
}

/// Applies `BACKSWIPE_*` overrides on top of a loaded profile.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    apply_overrides(config, lookup_env)
}

pub(crate) fn apply_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Result<Option<String>>,
) -> Result<()> {
    if let Some(server) = lookup(SERVER_ENV)? {
        if !server.trim().is_empty() {
            config.protocol.server = Some(server.trim().to_string());
        }
    }

    let protocol = &mut config.protocol;
    protocol.receive_port = parse_u16(
        RECEIVE_PORT_ENV,
        lookup(RECEIVE_PORT_ENV)?,
        protocol.receive_port,
    )?;

    let default_timeout_s = protocol.accept_timeout_ms as f64 / 1_000.0;
    let timeout_s = parse_f64(TIMEOUT_SEC_ENV, lookup(TIMEOUT_SEC_ENV)?, default_timeout_s)?;
    let timeout_ms = (timeout_s.max(0.001) * 1_000.0) as u64;
    protocol.accept_timeout_ms = timeout_ms;
    protocol.io_timeout_ms = protocol.io_timeout_ms.max(timeout_ms);
    Ok(())
}
