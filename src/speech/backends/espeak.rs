//! espeak-ng speech engine
//!
//! Speaks through an `espeak-ng` subprocess, one per utterance. Dropping a
//! `speak` future kills its own process only. On WSL the WSLg PulseAudio
//! server is passed to the child when `PULSE_SERVER` is not already set.
//!
//! Dependencies:
//! - espeak-ng (install with: sudo apt install espeak-ng)

use super::native::SpeechEngine;
use crate::platform::{find_executable, pulse_server_override};
use crate::request::PlaybackKind;
use crate::{Result, VoiceError};
use async_trait::async_trait;
use log::{debug, error};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Speech rate (0-100) for single words; slower so learners hear each sound
const WORD_RATE: u8 = 35;

/// Speech rate (0-100) for sentences
const SENTENCE_RATE: u8 = 50;

/// espeak-ng subprocess engine
pub struct EspeakEngine {
    /// Path to espeak-ng
    espeak_path: PathBuf,

    /// Volume setting (0-100)
    volume: u8,
}

impl EspeakEngine {
    /// Create an engine, verifying espeak-ng is installed
    pub fn new() -> Result<Self> {
        let espeak_path = Self::find_espeak()?;
        debug!("Found espeak-ng at: {:?}", espeak_path);
        Ok(Self::with_path(espeak_path))
    }

    /// Engine for a specific espeak-ng binary
    pub fn with_path(espeak_path: PathBuf) -> Self {
        Self {
            espeak_path,
            volume: 80,
        }
    }

    fn find_espeak() -> Result<PathBuf> {
        ["espeak-ng", "/usr/bin/espeak-ng"]
            .iter()
            .find_map(|name| find_executable(name))
            .ok_or_else(|| {
                VoiceError::Other(
                    "espeak-ng not found. Install with: sudo apt install espeak-ng".to_string(),
                )
            })
    }

    /// Convert rate (0-100) to espeak speed (80-450 wpm)
    fn rate_to_espeak_speed(rate: u8) -> u16 {
        80 + ((rate.min(100) as u16) * 370 / 100)
    }

    /// Convert volume (0-100) to espeak amplitude (0-200)
    fn volume_to_espeak_amplitude(volume: u8) -> u8 {
        ((volume.min(100) as u16 * 200) / 100) as u8
    }

    /// espeak voice for a voice profile identifier
    ///
    /// Profiles that look like language tags ("en-gb", "fr") pass through;
    /// anything else uses the default English voice.
    fn voice_for_profile(profile: &str) -> String {
        let lower = profile.trim().to_lowercase();
        let is_tag = !lower.is_empty()
            && lower.len() <= 12
            && lower
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && lower.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        if is_tag && lower != "default" {
            lower
        } else {
            "en".to_string()
        }
    }

    fn command(&self, text: &str, voice: &str, rate: u8, volume: u8) -> Command {
        let mut cmd = Command::new(&self.espeak_path);
        cmd.arg("-v")
            .arg(voice)
            .arg("-s")
            .arg(Self::rate_to_espeak_speed(rate).to_string())
            .arg("-a")
            .arg(Self::volume_to_espeak_amplitude(volume).to_string())
            .arg("--")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(server) = pulse_server_override() {
            cmd.env("PULSE_SERVER", server);
        }
        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<()> {
        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn espeak-ng: {}", e);
            VoiceError::Other(format!("Failed to start espeak-ng: {}", e))
        })?;
        debug!("espeak-ng process {:?} started", child.id());

        // kill_on_drop ends the process if this future is abandoned
        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(VoiceError::Other(format!("espeak-ng exited with {}", status)))
        }
    }
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    fn name(&self) -> &str {
        "espeak-ng"
    }

    async fn speak(&self, text: &str, kind: PlaybackKind, voice_profile: &str) -> Result<()> {
        let rate = match kind {
            PlaybackKind::Word => WORD_RATE,
            PlaybackKind::Sentence => SENTENCE_RATE,
        };
        let voice = Self::voice_for_profile(voice_profile);
        debug!("Speaking with voice {}: {}", voice, text);
        self.run(self.command(text, &voice, rate, self.volume)).await
    }

    async fn probe(&self) -> Result<()> {
        self.run(self.command(" ", "en", SENTENCE_RATE, 0)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_conversion() {
        assert_eq!(EspeakEngine::rate_to_espeak_speed(0), 80);
        assert_eq!(EspeakEngine::rate_to_espeak_speed(50), 265);
        assert_eq!(EspeakEngine::rate_to_espeak_speed(100), 450);
        assert_eq!(EspeakEngine::rate_to_espeak_speed(255), 450);
    }

    #[test]
    fn test_volume_conversion() {
        assert_eq!(EspeakEngine::volume_to_espeak_amplitude(0), 0);
        assert_eq!(EspeakEngine::volume_to_espeak_amplitude(50), 100);
        assert_eq!(EspeakEngine::volume_to_espeak_amplitude(100), 200);
    }

    #[test]
    fn test_voice_selection() {
        assert_eq!(EspeakEngine::voice_for_profile("default"), "en");
        assert_eq!(EspeakEngine::voice_for_profile("en-GB"), "en-gb");
        assert_eq!(EspeakEngine::voice_for_profile("fr"), "fr");
        assert_eq!(EspeakEngine::voice_for_profile("warm narrator"), "en");
        assert_eq!(EspeakEngine::voice_for_profile(""), "en");
    }

    #[test]
    fn test_create_espeak_engine() {
        match EspeakEngine::new() {
            Ok(_) => println!("✓ espeak-ng available"),
            Err(e) => println!("⚠ espeak-ng not available: {}", e),
        }
    }

    /// Stand-in espeak-ng that ignores its arguments and talks for 400ms
    #[cfg(unix)]
    fn fake_espeak(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("espeak-ng");
        std::fs::write(&path, "#!/bin/sh\nsleep 0.4\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_utterance_spares_the_next() {
        use crate::request::PlaybackRequest;
        use crate::speech::backends::NativeSpeechBackend;
        use crate::speech::{AttemptOutcome, Backend, Deadline, FailureReason};
        use std::sync::Arc;
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(EspeakEngine::with_path(fake_espeak(dir.path())));
        let backend = NativeSpeechBackend::new(engine);
        let first = PlaybackRequest::new("a", PlaybackKind::Word, "default").unwrap();
        let second = PlaybackRequest::new("b", PlaybackKind::Word, "default").unwrap();
        let first_token = CancellationToken::new();
        let second_token = CancellationToken::new();
        let first_deadline = Deadline::after(Duration::from_secs(5));
        let second_deadline = Deadline::after(Duration::from_secs(5));

        let (a, b) = tokio::join!(
            backend.attempt(&first, &first_deadline, &first_token),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let speaking = backend.attempt(&second, &second_deadline, &second_token);
                tokio::pin!(speaking);
                // Second utterance is speaking before the first is abandoned
                let _ = tokio::time::timeout(Duration::from_millis(50), &mut speaking).await;
                first_token.cancel();
                speaking.await
            }
        );

        assert_eq!(a, AttemptOutcome::Failed(FailureReason::Cancelled));
        assert!(b.is_played(), "second utterance was silenced: {:?}", b);
    }
}
