//! Native speech backend
//!
//! Speaks through the platform's own synthesizer. Completion of a native
//! speech call is necessary but not sufficient evidence that anything was
//! heard: some platform/browser combinations finish "successfully" in
//! silence. Outcomes are therefore reported as unverified, and the capability
//! profile ranks this backend below tone synthesis where that defect is known.

use crate::request::{PlaybackKind, PlaybackRequest};
use crate::speech::{
    bounded_by, AttemptOutcome, Backend, BackendId, Bounded, Deadline, FailureReason,
};
use crate::{Result, VoiceError};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::espeak::EspeakEngine;

/// Platform speech synthesizer
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Speak `text`, resolving when the utterance has finished
    ///
    /// Dropping the future silences this utterance and leaves any newer one
    /// alone.
    async fn speak(&self, text: &str, kind: PlaybackKind, voice_profile: &str) -> Result<()>;

    /// Near-silent utterance used to obtain audio permission
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Create the best available speech engine for this host
///
/// With the `native-tts` feature the `tts` crate (Speech Dispatcher,
/// AVFoundation, WinRT) is tried first, then espeak-ng.
pub fn create_speech_engine() -> Result<Arc<dyn SpeechEngine>> {
    #[cfg(feature = "native-tts")]
    {
        info!("Trying native TTS engine...");
        match tts_engine::TtsCrateEngine::new() {
            Ok(engine) => {
                info!("✓ Successfully initialized native TTS engine");
                return Ok(Arc::new(engine));
            }
            Err(e) => {
                info!("✗ Native TTS engine unavailable: {}", e);
            }
        }
    }

    info!("Trying espeak-ng engine...");
    match EspeakEngine::new() {
        Ok(engine) => {
            info!("✓ Successfully initialized espeak-ng engine");
            Ok(Arc::new(engine))
        }
        Err(e) => Err(VoiceError::Other(format!(
            "No speech engine available on platform '{}': {}",
            std::env::consts::OS,
            e
        ))),
    }
}

/// Backend speaking through a [`SpeechEngine`]
pub struct NativeSpeechBackend {
    engine: Arc<dyn SpeechEngine>,
}

impl NativeSpeechBackend {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }
}

#[async_trait]
impl Backend for NativeSpeechBackend {
    fn id(&self) -> BackendId {
        BackendId::Native
    }

    async fn attempt(
        &self,
        request: &PlaybackRequest,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        // Engines give no start signal, so allow for the whole utterance
        deadline.extend_by(request.estimated_speech());
        let utterance = self
            .engine
            .speak(request.text(), request.kind(), request.voice_profile());

        // Timeout and cancellation drop the utterance, silencing it
        match bounded_by(deadline, cancel, utterance).await {
            Bounded::Done(Ok(())) => {
                debug!("{} finished speaking (audibility unverified)", self.engine.name());
                AttemptOutcome::Played {
                    asset: None,
                    verified: false,
                }
            }
            Bounded::Done(Err(e)) => AttemptOutcome::rejected(e),
            Bounded::TimedOut => {
                debug!("Abandoned {} utterance at deadline", self.engine.name());
                AttemptOutcome::Failed(FailureReason::Timeout)
            }
            Bounded::Cancelled => AttemptOutcome::Failed(FailureReason::Cancelled),
        }
    }

    async fn probe(&self, _budget: Duration) -> Result<()> {
        self.engine.probe().await
    }
}

#[cfg(feature = "native-tts")]
mod tts_engine {
    //! Speech through the `tts` crate
    //!
    //! Unified interface to Speech Dispatcher on Linux, AVFoundation on
    //! macOS/iOS and WinRT on Windows.

    use super::SpeechEngine;
    use crate::request::PlaybackKind;
    use crate::{Result, VoiceError};
    use async_trait::async_trait;
    use log::{debug, error, warn};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tts::Tts as TtsCrate;

    /// How often to check whether an utterance has finished
    const POLL_INTERVAL: Duration = Duration::from_millis(25);

    pub struct TtsCrateEngine {
        tts: Mutex<TtsCrate>,
        /// Sequence number of the utterance the platform is speaking
        current: AtomicU64,
    }

    /// Stops the platform voice when an utterance is dropped unfinished,
    /// unless a newer utterance has already replaced it
    struct StopIfCurrent<'a> {
        engine: &'a TtsCrateEngine,
        utterance: u64,
        finished: bool,
    }

    impl Drop for StopIfCurrent<'_> {
        fn drop(&mut self) {
            if self.finished {
                return;
            }
            let mut tts = self.engine.tts.lock();
            if self.engine.current.load(Ordering::SeqCst) != self.utterance {
                return;
            }
            debug!("Stopping abandoned utterance {}", self.utterance);
            if let Err(e) = tts.stop() {
                error!("Failed to cancel speech: {}", e);
            }
        }
    }

    impl TtsCrateEngine {
        pub fn new() -> Result<Self> {
            debug!("Creating native TTS engine");
            let tts = TtsCrate::default()
                .map_err(|e| VoiceError::Other(format!("Failed to initialize TTS: {}", e)))?;
            Ok(Self {
                tts: Mutex::new(tts),
                current: AtomicU64::new(0),
            })
        }

        /// Platform rate for a playback kind; words run at 80% of normal
        fn rate_for(tts: &TtsCrate, kind: PlaybackKind) -> f32 {
            let normal = tts.normal_rate();
            match kind {
                PlaybackKind::Word => (normal * 0.8).max(tts.min_rate()),
                PlaybackKind::Sentence => normal,
            }
        }
    }

    #[async_trait]
    impl SpeechEngine for TtsCrateEngine {
        fn name(&self) -> &str {
            "tts"
        }

        async fn speak(&self, text: &str, kind: PlaybackKind, _voice_profile: &str) -> Result<()> {
            let (utterance, can_poll) = {
                let mut tts = self.tts.lock();
                let features = tts.supported_features();
                if features.rate {
                    let rate = Self::rate_for(&tts, kind);
                    if let Err(e) = tts.set_rate(rate) {
                        warn!("Failed to set rate: {}", e);
                    }
                }
                tts.speak(text, true).map_err(|e| {
                    error!("Failed to speak: {}", e);
                    VoiceError::Other(format!("Speak failed: {}", e))
                })?;
                let utterance = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                (utterance, features.is_speaking)
            };

            let mut guard = StopIfCurrent {
                engine: self,
                utterance,
                finished: false,
            };
            if can_poll {
                loop {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    let speaking = self.tts.lock().is_speaking().unwrap_or(false);
                    if !speaking {
                        break;
                    }
                }
            }
            guard.finished = true;
            Ok(())
        }
    }
}
