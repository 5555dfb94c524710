use std::{
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use backswipe::app::net::stub::{StubConfig, StubDecodeService};
use serde::Deserialize;

#[derive(Clone, Debug)]
pub struct ServeStubOptions {
    pub decode_port: u16,
    pub sniff_port: Option<u16>,
    pub advertise_host: Option<String>,
    pub vocab_path: Option<PathBuf>,
    pub reply_delay_ms: u64,
    pub duration_s: Option<f64>,
}

/// Ranked word lists served by the stub, read from TOML.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Vocabulary {
    pub words: Vec<String>,
    pub command_words: Vec<String>,
}

pub fn load_vocabulary(path: &Path) -> Result<Vocabulary> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read vocabulary {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid vocabulary {}", path.display()))
}

pub fn stub_config(options: &ServeStubOptions) -> Result<StubConfig> {
    let mut config = StubConfig {
        decode_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, options.decode_port)),
        sniff_addr: options
            .sniff_port
            .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))),
        advertise_host: options.advertise_host.clone(),
        reply_delay: Duration::from_millis(options.reply_delay_ms),
        ..StubConfig::default()
    };
    if let Some(path) = &options.vocab_path {
        let vocab = load_vocabulary(path)?;
        if !vocab.words.is_empty() {
            config.words = vocab.words;
        }
        if !vocab.command_words.is_empty() {
            config.command_words = vocab.command_words;
        }
    }
    Ok(config)
}

pub fn run_serve_stub(options: ServeStubOptions) -> Result<()> {
    let config = stub_config(&options)?;
    let words = config.words.len();
    let service = StubDecodeService::start(config).context("failed to start stub service")?;
    log::info!(
        "serve-stub: listening decode={} sniff={:?} advertise={} words={words}",
        service.decode_addr(),
        service.sniff_addr(),
        service.endpoint()
    );

    let deadline = options
        .duration_s
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut seen = 0usize;
    while service.is_running() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        let received = service.received();
        for message in &received[seen..] {
            log::info!("serve-stub: received task={}", message.task());
        }
        seen = received.len();
        thread::sleep(Duration::from_millis(100));
    }

    log::info!("serve-stub: stopping messages={seen}");
    service.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    fn options(vocab_path: Option<PathBuf>) -> ServeStubOptions {
        ServeStubOptions {
            decode_port: 0,
            sniff_port: None,
            advertise_host: Some("10.0.0.7".to_string()),
            vocab_path,
            reply_delay_ms: 0,
            duration_s: Some(0.0),
        }
    }

    #[test]
    fn vocabulary_file_replaces_word_lists() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("vocab.toml");
        fs::write(&path, "words = [\"hello\", \"help\", \"helm\"]\n")?;

        let config = stub_config(&options(Some(path)))?;
        assert_eq!(config.words, vec!["hello", "help", "helm"]);
        assert_eq!(config.command_words, StubConfig::default().command_words);
        assert_eq!(config.advertise_host.as_deref(), Some("10.0.0.7"));
        assert!(config.sniff_addr.is_none());
        Ok(())
    }

    #[test]
    fn malformed_vocabulary_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("vocab.toml");
        fs::write(&path, "words = \"not a list\"\n")?;
        assert!(stub_config(&options(Some(path))).is_err());
        Ok(())
    }

    #[test]
    fn bounded_run_starts_and_stops() -> Result<()> {
        run_serve_stub(options(None))
    }
}
