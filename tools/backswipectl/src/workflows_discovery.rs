use std::{fs, path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use backswipe::{app::net::Endpoint, Config, DecodeClient};
use chrono::Utc;
use serde_json::json;

use crate::logging::ensure_parent_dir;

#[derive(Clone, Debug)]
pub struct DiscoverOptions {
    pub output_path: Option<PathBuf>,
}

pub fn run_discover(config: &Config, options: DiscoverOptions) -> Result<()> {
    let started = Instant::now();
    let endpoint = discover(config)?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    log::info!("discover: server_found endpoint={endpoint} elapsed_ms={elapsed_ms}");

    if let Some(path) = options.output_path {
        ensure_parent_dir(&path)?;
        let report = json!({
            "ts": Utc::now().to_rfc3339(),
            "endpoint": endpoint.to_string(),
            "elapsed_ms": elapsed_ms,
        });
        fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("discover: report path={}", path.display());
    }
    println!("{endpoint}");
    Ok(())
}

pub fn discover(config: &Config) -> Result<Endpoint> {
    let (client, _events) = DecodeClient::with_channel(config.protocol.clone())?;
    log::info!(
        "discover: sniffing port={} timeout_ms={}",
        config.protocol.discovery_port,
        config.protocol.accept_timeout_ms
    );
    client
        .discover_blocking()
        .context("decode service did not answer the sniff broadcast")
}
