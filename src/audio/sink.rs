//! Audio output primitives
//!
//! Sound leaves the process through an external player fed over stdin.
//! Players are spawned with `kill_on_drop`, so dropping a playback future
//! (timeout, `stop()`, a newer `play()`) silences it immediately.

use super::{encode_wav, PcmBuffer};
use crate::platform::{find_executable, pulse_server_override};
use crate::{Result, VoiceError};
use async_trait::async_trait;
use log::{debug, warn};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Something that can make PCM audible
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Play the buffer, resolving once playback has finished
    async fn play_pcm(&self, pcm: &PcmBuffer) -> Result<()>;
}

/// Known players that accept audio on stdin, in preference order
const PCM_PLAYERS: &[(&str, &[&str])] = &[
    ("paplay", &[]),
    ("aplay", &["-q", "-"]),
    ("play", &["-q", "-t", "wav", "-"]),
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet", "-i", "-"]),
];

/// Players that decode compressed formats (mp3, ogg) from stdin
const DECODING_PLAYERS: &[(&str, &[&str])] = &[
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet", "-i", "-"]),
    ("mpv", &["--no-video", "--really-quiet", "-"]),
];

/// External player invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl PlayerCommand {
    /// Pick a WAV player: the configured command line if given, otherwise
    /// the first known player found on PATH
    pub fn resolve(explicit: Option<&str>) -> Option<Self> {
        if let Some(line) = explicit {
            return Self::parse(line);
        }
        Self::first_available(PCM_PLAYERS)
    }

    /// Pick a player able to decode compressed audio
    pub fn resolve_decoder() -> Option<Self> {
        Self::first_available(DECODING_PLAYERS)
    }

    /// Parse a whitespace-separated command line, checking the program exists
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = find_executable(parts.next()?)?;
        Some(Self {
            program,
            args: parts.map(str::to_string).collect(),
        })
    }

    fn first_available(candidates: &[(&str, &[&str])]) -> Option<Self> {
        candidates.iter().find_map(|(name, args)| {
            find_executable(name).map(|program| Self {
                program,
                args: args.iter().map(|a| a.to_string()).collect(),
            })
        })
    }

    /// Pipe `bytes` into the player and wait for it to finish
    pub async fn play_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(server) = pulse_server_override() {
            cmd.env("PULSE_SERVER", server);
        }

        let mut child = cmd.spawn().map_err(|e| {
            VoiceError::Other(format!("Failed to start {:?}: {}", self.program, e))
        })?;
        debug!("Player {:?} started", self.program);

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(bytes).await {
                // The player may exit early on formats it can't read
                warn!("Writing audio to {:?} failed: {}", self.program, e);
            }
            drop(stdin);
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(VoiceError::Other(format!(
                "{:?} exited with {}",
                self.program, status
            )))
        }
    }
}

/// Sink that plays PCM by streaming a WAV file to an external player
pub struct ProcessSink {
    player: PlayerCommand,
    name: String,
}

impl ProcessSink {
    pub fn new(player: PlayerCommand) -> Self {
        let name = player
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "player".to_string());
        Self { player, name }
    }

    /// Sink for the configured or auto-detected player
    pub fn detect(explicit: Option<&str>) -> Result<Self> {
        PlayerCommand::resolve(explicit)
            .map(Self::new)
            .ok_or_else(|| {
                VoiceError::Other(
                    "No audio player found. Install pulseaudio-utils, alsa-utils, sox or ffmpeg"
                        .to_string(),
                )
            })
    }

    pub fn player(&self) -> &PlayerCommand {
        &self.player
    }
}

#[async_trait]
impl AudioSink for ProcessSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn play_pcm(&self, pcm: &PcmBuffer) -> Result<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        let wav = encode_wav(pcm)?;
        self.player.play_bytes(&wav).await
    }
}
