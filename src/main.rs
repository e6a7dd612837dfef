//! vocab-voice command-line entry point
//!
//! Speaks the text given on the command line through the fallback chain.
//! The invocation itself counts as the user gesture that unlocks audio.

use anyhow::{bail, Context};
use log::{debug, error, info};
use std::path::PathBuf;
use std::process;
use vocab_voice::{Config, Orchestrator, PlaybackKind, RuntimeProbe};

const USAGE: &str = "Usage: vocab-voice [--debug] [--sentence] [--user-agent UA] \
[--config PATH] [--diagnostics] TEXT...";

#[derive(Debug, Default)]
struct Args {
    debug: bool,
    sentence: bool,
    user_agent: Option<String>,
    config: Option<PathBuf>,
    diagnostics: bool,
    text: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" | "-d" => parsed.debug = true,
            "--sentence" | "-s" => parsed.sentence = true,
            "--diagnostics" => parsed.diagnostics = true,
            "--user-agent" => {
                parsed.user_agent = Some(args.next().context("--user-agent needs a value")?)
            }
            "--config" => {
                parsed.config = Some(PathBuf::from(
                    args.next().context("--config needs a path")?,
                ))
            }
            "--help" | "-h" => bail!("{}", USAGE),
            "--" => parsed.text.extend(args.by_ref()),
            other if other.starts_with("--") => bail!("Unknown option {}\n{}", other, USAGE),
            other => parsed.text.push(other.to_string()),
        }
    }
    Ok(parsed)
}

fn init_logging(debug_mode: bool) {
    if debug_mode {
        // Debug mode: write to vocab-voice.log
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("vocab-voice.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to open vocab-voice.log for debug logging: {}",
                    e
                );
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }
        info!(
            "vocab-voice version {} starting (debug mode, logging to vocab-voice.log)",
            vocab_voice::VERSION
        );
    } else {
        // Errors only unless RUST_LOG says otherwise
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Error)
            .parse_default_env()
            .init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    init_logging(args.debug);

    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };
    info!("Config from {:?}", config.path());

    let mut probe = RuntimeProbe::from_host(&config);
    if let Some(user_agent) = args.user_agent {
        probe.user_agent = user_agent;
    }
    let orchestrator = Orchestrator::from_config(&config, &probe)?;
    debug!("Backend chain {:?}", orchestrator.chain());

    // Running the command is the gesture
    let state = orchestrator.user_gesture().await;
    info!("Audio permission: {:?}", state);

    let kind = if args.sentence {
        PlaybackKind::Sentence
    } else {
        PlaybackKind::Word
    };
    let text = args.text.join(" ");
    let report = orchestrator.play(&text, kind).await?;
    info!("Playback report: {:?}", report);

    if args.diagnostics {
        let output = serde_json::json!({
            "report": report,
            "profile": orchestrator.profile(),
            "summary": orchestrator.diagnostics().summary(),
            "attempts": orchestrator.diagnostics().attempts_for(report.play_id),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}
