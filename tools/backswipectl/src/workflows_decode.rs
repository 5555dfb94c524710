use std::{fs, path::Path, path::PathBuf};

use anyhow::{bail, Context, Result};
use backswipe::{
    app::{
        net::{DecodeRequest, DecodeTask, ProtocolMessage},
        text,
    },
    Config, DecodeClient, TouchPoint,
};
use chrono::Utc;
use serde_json::json;

use crate::logging::ensure_parent_dir;

#[derive(Clone, Debug)]
pub struct DecodeOptions {
    pub trace_path: PathBuf,
    pub command: bool,
    pub prev_text: String,
    pub banned: Vec<String>,
    pub output_path: Option<PathBuf>,
}

/// Reads a trace saved as a JSON array of points.
pub fn load_trace(path: &Path) -> Result<Vec<TouchPoint>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read trace {}", path.display()))?;
    let points: Vec<TouchPoint> = serde_json::from_str(&raw)
        .with_context(|| format!("trace {} is not a point array", path.display()))?;
    if points.len() < 2 {
        bail!("trace {} needs at least two points", path.display());
    }
    Ok(points)
}

pub fn build_request(points: Vec<TouchPoint>, options: &DecodeOptions) -> DecodeRequest {
    DecodeRequest {
        task: if options.command {
            DecodeTask::CmdDecode
        } else {
            DecodeTask::Decode
        },
        points,
        prev_word: text::prev_word(&options.prev_text),
        prev_text: text::prev_text(&options.prev_text),
        banned_words: options.banned.clone(),
        reply_port: 0,
    }
}

fn connected_client(config: &Config) -> Result<DecodeClient> {
    let (client, _events) = DecodeClient::with_channel(config.protocol.clone())?;
    if client.endpoint().is_none() {
        log::info!("decode: no server configured, discovering");
        client
            .discover_blocking()
            .context("decode service did not answer the sniff broadcast")?;
    }
    Ok(client)
}

pub fn run_decode(config: &Config, options: DecodeOptions) -> Result<()> {
    let points = load_trace(&options.trace_path)?;
    let request = build_request(points, &options);
    let client = connected_client(config)?;

    let candidates = client
        .decode_blocking(request)
        .context("decode request failed")?;
    log::info!("decode: candidates={}", candidates.len());
    for (rank, candidate) in candidates.iter().enumerate() {
        println!("{rank:>2} {:<16} {:.4}", candidate.word, candidate.score);
    }

    if let Some(path) = options.output_path {
        ensure_parent_dir(&path)?;
        let report = json!({
            "ts": Utc::now().to_rfc3339(),
            "trace": options.trace_path.display().to_string(),
            "task": if options.command { "CMD_DECODE" } else { "DECODE" },
            "candidates": candidates.iter().collect::<Vec<_>>(),
        });
        fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

pub fn run_notify(config: &Config, message: ProtocolMessage) -> Result<()> {
    let client = connected_client(config)?;
    client
        .notify_blocking(&message)
        .with_context(|| format!("{} notification failed", message.task()))?;
    log::info!("notify: sent task={}", message.task());
    Ok(())
}
