//! Sensory-fallback backend
//!
//! When nothing audible worked the learner still gets feedback: a haptic
//! pulse and/or a transient glyph of the text. This backend never fails.

use crate::capability::CapabilityProfile;
use crate::request::PlaybackRequest;
use crate::speech::{AttemptOutcome, Backend, BackendId, Deadline};
use crate::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Length of the haptic pulse
const PULSE: Duration = Duration::from_millis(60);

/// How long the on-screen glyph is meant to stay visible
const GLYPH_DURATION: Duration = Duration::from_millis(1500);

/// Non-audio feedback channels
pub trait FeedbackSurface: Send + Sync {
    /// Vibrate following `pattern` (alternating on/off durations)
    fn vibrate(&self, pattern: &[Duration]) -> Result<()>;

    /// Show `text` briefly
    fn show_glyph(&self, text: &str, duration: Duration) -> Result<()>;
}

/// Terminal feedback: the bell stands in for vibration, stderr for the glyph
pub struct TerminalSurface;

impl FeedbackSurface for TerminalSurface {
    fn vibrate(&self, _pattern: &[Duration]) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }

    fn show_glyph(&self, text: &str, _duration: Duration) -> Result<()> {
        let mut stderr = std::io::stderr();
        writeln!(stderr, "\u{1F50A} {}", text)?;
        Ok(())
    }
}

/// Channels follow the capability profile, including later redetections
pub struct SensoryBackend {
    surface: Box<dyn FeedbackSurface>,
    vibration: AtomicBool,
    visual: AtomicBool,
}

impl SensoryBackend {
    pub fn new(surface: Box<dyn FeedbackSurface>, vibration: bool, visual: bool) -> Self {
        Self {
            surface,
            vibration: AtomicBool::new(vibration),
            visual: AtomicBool::new(visual),
        }
    }

    /// Use the channels `profile` says are available
    pub fn for_profile(surface: Box<dyn FeedbackSurface>, profile: &CapabilityProfile) -> Self {
        Self::new(
            surface,
            profile.supports_vibration,
            profile.supports_visual_fallback,
        )
    }
}

#[async_trait]
impl Backend for SensoryBackend {
    fn id(&self) -> BackendId {
        BackendId::Sensory
    }

    async fn attempt(
        &self,
        request: &PlaybackRequest,
        _deadline: &Deadline,
        _cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let vibration = self.vibration.load(Ordering::Relaxed);
        let visual = self.visual.load(Ordering::Relaxed);
        if vibration {
            if let Err(e) = self.surface.vibrate(&[PULSE]) {
                warn!("Haptic pulse failed: {}", e);
            }
        }
        if visual {
            if let Err(e) = self.surface.show_glyph(request.text().trim(), GLYPH_DURATION) {
                warn!("Visual cue failed: {}", e);
            }
        }
        if !vibration && !visual {
            info!("No feedback channel for {:?}", request.text());
        }
        AttemptOutcome::played()
    }

    fn apply_profile(&self, profile: &CapabilityProfile) {
        debug!(
            "Sensory channels: vibration={} visual={}",
            profile.supports_vibration, profile.supports_visual_fallback
        );
        self.vibration
            .store(profile.supports_vibration, Ordering::Relaxed);
        self.visual
            .store(profile.supports_visual_fallback, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PlaybackKind;
    use crate::VoiceError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct BrokenSurface {
        calls: Mutex<Vec<&'static str>>,
    }

    impl FeedbackSurface for BrokenSurface {
        fn vibrate(&self, _pattern: &[Duration]) -> Result<()> {
            self.calls.lock().push("vibrate");
            Err(VoiceError::Other("no motor".to_string()))
        }

        fn show_glyph(&self, _text: &str, _duration: Duration) -> Result<()> {
            self.calls.lock().push("glyph");
            Err(VoiceError::Other("no screen".to_string()))
        }
    }

    #[tokio::test]
    async fn test_never_fails() {
        let backend = SensoryBackend::new(Box::new(BrokenSurface::default()), true, true);
        let request = PlaybackRequest::new("tree", PlaybackKind::Word, "default").unwrap();
        let outcome = backend
            .attempt(&request, &Deadline::after(Duration::ZERO), &CancellationToken::new())
            .await;
        assert!(outcome.is_played());
    }

    #[tokio::test]
    async fn test_channels_follow_profile() {
        let surface = BrokenSurface::default();
        let backend = SensoryBackend::new(Box::new(surface), false, false);
        let mut profile = CapabilityProfile::sensory_only(crate::PlatformClass::AndroidGeneric);
        profile.supports_vibration = true;
        backend.apply_profile(&profile);

        let request = PlaybackRequest::new("tree", PlaybackKind::Word, "default").unwrap();
        backend
            .attempt(&request, &Deadline::after(Duration::ZERO), &CancellationToken::new())
            .await;
        assert!(backend.vibration.load(Ordering::Relaxed));
        assert!(!backend.visual.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_plays_without_channels() {
        let backend = SensoryBackend::new(Box::new(BrokenSurface::default()), false, false);
        let request = PlaybackRequest::new("tree", PlaybackKind::Word, "default").unwrap();
        let outcome = backend
            .attempt(&request, &Deadline::after(Duration::ZERO), &CancellationToken::new())
            .await;
        assert!(outcome.is_played());
    }
}
