//! Synthesized-tone backend
//!
//! The last backend that produces genuine audio. Needs nothing beyond a
//! working PCM output, so it anchors the chain when remote and native speech
//! are unavailable or untrustworthy.

use crate::audio::{decode_wav, encode_wav, AudioSink, PcmBuffer, ToneSynth};
use crate::request::PlaybackRequest;
use crate::speech::{bounded_by, AttemptOutcome, AudioAsset, Backend, BackendId, Deadline};
use crate::{Result, VoiceError};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ToneBackend {
    synth: ToneSynth,
    sink: Arc<dyn AudioSink>,
}

impl ToneBackend {
    pub fn new(synth: ToneSynth, sink: Arc<dyn AudioSink>) -> Self {
        Self { synth, sink }
    }
}

#[async_trait]
impl Backend for ToneBackend {
    fn id(&self) -> BackendId {
        BackendId::Tone
    }

    async fn attempt(
        &self,
        request: &PlaybackRequest,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let pcm = self.synth.render(request.text(), request.kind());
        if pcm.is_empty() {
            return AttemptOutcome::rejected("text produced no tones");
        }
        debug!(
            "Rendered {} tone samples ({:?}) for {:?}",
            pcm.samples.len(),
            pcm.duration(),
            request.text()
        );

        let work = async {
            deadline.extend_by(pcm.duration());
            self.sink.play_pcm(&pcm).await?;
            encode_wav(&pcm)
        };

        bounded_by(deadline, cancel, work)
            .await
            .into_outcome(|wav| AttemptOutcome::Played {
                asset: Some(AudioAsset::new(BackendId::Tone, wav)),
                verified: true,
            })
    }

    async fn replay(
        &self,
        _request: &PlaybackRequest,
        asset: &AudioAsset,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let work = async {
            let pcm = decode_wav(&asset.bytes)?;
            deadline.extend_by(pcm.duration());
            self.sink.play_pcm(&pcm).await?;
            Ok::<_, VoiceError>(())
        };
        bounded_by(deadline, cancel, work)
            .await
            .into_outcome(|_| AttemptOutcome::played())
    }

    async fn probe(&self, _budget: Duration) -> Result<()> {
        let rate = self.synth.settings().sample_rate;
        self.sink.play_pcm(&PcmBuffer::probe_blip(rate)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ToneSettings;
    use crate::request::PlaybackKind;
    use crate::speech::FailureReason;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<PcmBuffer>>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn play_pcm(&self, pcm: &PcmBuffer) -> Result<()> {
            self.played.lock().push(pcm.clone());
            Ok(())
        }
    }

    /// Sink that takes as long as the audio lasts
    struct RealtimeSink;

    #[async_trait]
    impl AudioSink for RealtimeSink {
        fn name(&self) -> &str {
            "realtime"
        }

        async fn play_pcm(&self, pcm: &PcmBuffer) -> Result<()> {
            tokio::time::sleep(pcm.duration()).await;
            Ok(())
        }
    }

    struct StuckSink;

    #[async_trait]
    impl AudioSink for StuckSink {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn play_pcm(&self, _pcm: &PcmBuffer) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn synth() -> ToneSynth {
        ToneSynth::new(ToneSettings {
            sample_rate: 8_000,
            note: Duration::from_millis(40),
            gap: Duration::from_millis(10),
            volume: 0.3,
            max_notes: 16,
        })
    }

    #[tokio::test]
    async fn test_played_tones_are_cacheable() {
        let sink = Arc::new(RecordingSink::default());
        let backend = ToneBackend::new(synth(), sink.clone());
        let request = PlaybackRequest::new("cat", PlaybackKind::Word, "default").unwrap();

        let outcome = backend
            .attempt(
                &request,
                &Deadline::after(Duration::from_secs(1)),
                &CancellationToken::new(),
            )
            .await;
        let AttemptOutcome::Played {
            asset: Some(asset), ..
        } = outcome
        else {
            panic!("expected a cacheable asset");
        };

        let replayed = backend
            .replay(
                &request,
                &asset,
                &Deadline::after(Duration::from_secs(1)),
                &CancellationToken::new(),
            )
            .await;
        assert!(replayed.is_played());

        let played = sink.played.lock();
        assert_eq!(played.len(), 2);
        assert_eq!(played[0], played[1]);
    }

    #[tokio::test]
    async fn test_stuck_output_times_out() {
        let backend = ToneBackend::new(synth(), Arc::new(StuckSink));
        let request = PlaybackRequest::new("dog", PlaybackKind::Word, "default").unwrap();
        let outcome = backend
            .attempt(
                &request,
                &Deadline::after(Duration::from_millis(20)),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome, AttemptOutcome::Failed(FailureReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_word_plays_past_budget() {
        let synth = ToneSynth::new(ToneSettings::default());
        let request = PlaybackRequest::new("vocabulary", PlaybackKind::Word, "default").unwrap();
        let budget = Duration::from_millis(200);
        assert!(synth.render(request.text(), request.kind()).duration() > budget);

        let backend = ToneBackend::new(synth, Arc::new(RealtimeSink));
        let outcome = backend
            .attempt(&request, &Deadline::after(budget), &CancellationToken::new())
            .await;
        assert!(outcome.is_played());
    }
}
