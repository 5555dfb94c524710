mod env_utils;
mod logging;
mod workflows_decode;
mod workflows_discovery;
mod workflows_stub;

use std::path::PathBuf;

use anyhow::{Context, Result};
use backswipe::{app::net::ProtocolMessage, Config};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use logging::Logger;

use workflows_decode::DecodeOptions;
use workflows_discovery::DiscoverOptions;
use workflows_stub::ServeStubOptions;

#[derive(Debug, Parser)]
#[command(name = "backswipectl")]
#[command(about = "Backswipe decode-service host CLI")]
struct Cli {
    /// TOML profile; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long = "log-level", global = true, default_value = "info")]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Discover(DiscoverArgs),
    Decode(DecodeArgs),
    Confirm(ConfirmArgs),
    Undo(UndoArgs),
    ServeStub(ServeStubArgs),
}

#[derive(Debug, Args)]
struct DiscoverArgs {
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DecodeArgs {
    /// JSON array of trace points.
    #[arg(long)]
    trace: PathBuf,
    #[arg(long)]
    command: bool,
    #[arg(long = "prev-text", default_value = "")]
    prev_text: String,
    #[arg(long = "banned", value_delimiter = ',')]
    banned: Vec<String>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ConfirmArgs {
    word: String,
}

#[derive(Debug, Args)]
struct UndoArgs {
    words: Vec<String>,
}

#[derive(Debug, Args)]
struct ServeStubArgs {
    #[arg(long = "decode-port", default_value_t = 10086)]
    decode_port: u16,
    #[arg(long = "sniff-port")]
    sniff_port: Option<u16>,
    #[arg(long = "advertise-host")]
    advertise_host: Option<String>,
    #[arg(long)]
    vocab: Option<PathBuf>,
    #[arg(long = "reply-delay-ms", default_value_t = 0)]
    reply_delay_ms: u64,
    /// Stop after this many seconds; runs until interrupted otherwise.
    #[arg(long)]
    duration: Option<f64>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load profile {}", path.display()))?,
        None => Config::default(),
    };
    env_utils::apply_env_overrides(&mut config)?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    Logger::from_env(cli.log_level)?.install()?;
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Discover(args) => workflows_discovery::run_discover(
            &config,
            DiscoverOptions {
                output_path: args.output,
            },
        ),
        Commands::Decode(args) => workflows_decode::run_decode(
            &config,
            DecodeOptions {
                trace_path: args.trace,
                command: args.command || config.session.command_mode,
                prev_text: args.prev_text,
                banned: args.banned,
                output_path: args.output,
            },
        ),
        Commands::Confirm(args) => {
            workflows_decode::run_notify(&config, ProtocolMessage::Confirm { word: args.word })
        }
        Commands::Undo(args) => workflows_decode::run_notify(
            &config,
            ProtocolMessage::Undo {
                banned_words: args.words,
            },
        ),
        Commands::ServeStub(args) => workflows_stub::run_serve_stub(ServeStubOptions {
            decode_port: args.decode_port,
            sniff_port: args.sniff_port.or(Some(config.protocol.discovery_port)),
            advertise_host: args.advertise_host,
            vocab_path: args.vocab,
            reply_delay_ms: args.reply_delay_ms,
            duration_s: args.duration,
        }),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
