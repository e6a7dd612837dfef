//! Remote synthesis backend
//!
//! Sends text to an HTTP synthesis endpoint and plays the returned audio.
//! Whether a response can be played depends on which local playback
//! primitives work, independently of the endpoint, so the backend falls
//! through an ordered list of primitives before giving up.

use crate::audio::{decode_wav, encode_wav, AudioSink, PcmBuffer, PlayerCommand};
use crate::request::PlaybackRequest;
use crate::speech::{bounded_by, AttemptOutcome, AudioAsset, Backend, BackendId, Deadline};
use crate::{Result, VoiceError};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// External text-to-speech service
#[async_trait]
pub trait SynthesisEndpoint: Send + Sync {
    /// Synthesize `text`, returning encoded audio bytes
    async fn synthesize(&self, text: &str, voice_profile: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisPayload<'a> {
    text: &'a str,
    voice_profile: &'a str,
}

/// Synthesis endpoint reached with `POST {"text", "voiceProfile"}`
///
/// Dropping the future returned by `synthesize` aborts the request.
pub struct HttpSynthesisEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpSynthesisEndpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SynthesisEndpoint for HttpSynthesisEndpoint {
    async fn synthesize(&self, text: &str, voice_profile: &str) -> Result<Vec<u8>> {
        debug!("POST {} ({} chars)", self.url, text.chars().count());
        let response = self
            .client
            .post(&self.url)
            .json(&SynthesisPayload { text, voice_profile })
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

/// One way of turning encoded bytes into sound
#[async_trait]
pub trait PlaybackPrimitive: Send + Sync {
    fn name(&self) -> &str;

    /// Play encoded audio, resolving when it has finished
    async fn play(&self, audio: &[u8]) -> Result<()>;

    /// Play a near-silent blip to check output is permitted
    async fn probe(&self) -> Result<()>;
}

/// Decodes WAV in-process and writes PCM to an [`AudioSink`]
pub struct DecodedPlayback {
    sink: Arc<dyn AudioSink>,
}

impl DecodedPlayback {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl PlaybackPrimitive for DecodedPlayback {
    fn name(&self) -> &str {
        "decoded"
    }

    async fn play(&self, audio: &[u8]) -> Result<()> {
        let pcm = decode_wav(audio)?;
        self.sink.play_pcm(&pcm).await
    }

    async fn probe(&self) -> Result<()> {
        self.sink.play_pcm(&PcmBuffer::probe_blip(22_050)).await
    }
}

/// Hands the encoded bytes untouched to a decoding player process
pub struct EncodedPlayback {
    player: PlayerCommand,
}

impl EncodedPlayback {
    pub fn new(player: PlayerCommand) -> Self {
        Self { player }
    }

    /// Pass-through primitive for the first decoding player on PATH
    pub fn detect() -> Option<Self> {
        PlayerCommand::resolve_decoder().map(Self::new)
    }
}

#[async_trait]
impl PlaybackPrimitive for EncodedPlayback {
    fn name(&self) -> &str {
        "encoded"
    }

    async fn play(&self, audio: &[u8]) -> Result<()> {
        self.player.play_bytes(audio).await
    }

    async fn probe(&self) -> Result<()> {
        let blip = encode_wav(&PcmBuffer::probe_blip(22_050))?;
        self.player.play_bytes(&blip).await
    }
}

/// Backend playing audio synthesized by a remote endpoint
pub struct RemoteSynthesisBackend {
    endpoint: Arc<dyn SynthesisEndpoint>,
    primitives: Vec<Arc<dyn PlaybackPrimitive>>,
}

impl RemoteSynthesisBackend {
    pub fn new(
        endpoint: Arc<dyn SynthesisEndpoint>,
        primitives: Vec<Arc<dyn PlaybackPrimitive>>,
    ) -> Self {
        info!(
            "Remote synthesis backend with primitives: {}",
            primitives
                .iter()
                .map(|p| p.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            endpoint,
            primitives,
        }
    }

    /// Try each primitive in order until one plays the audio
    ///
    /// `deadline` is pushed back once by the length of the audio, exactly
    /// for WAV and estimated from the request text otherwise.
    async fn play_through_primitives(
        &self,
        request: &PlaybackRequest,
        audio: &[u8],
        deadline: &Deadline,
    ) -> Result<()> {
        let length = match decode_wav(audio) {
            Ok(pcm) => pcm.duration(),
            Err(_) => request.estimated_speech(),
        };
        deadline.extend_by(length);

        let mut last_error = None;
        for primitive in &self.primitives {
            match primitive.play(audio).await {
                Ok(()) => {
                    debug!("Played remote audio via {} primitive", primitive.name());
                    return Ok(());
                }
                Err(e) => {
                    debug!("{} primitive failed: {}", primitive.name(), e);
                    last_error = Some(format!("{}: {}", primitive.name(), e));
                }
            }
        }
        Err(VoiceError::BackendRejected {
            backend: BackendId::Remote.to_string(),
            reason: last_error.unwrap_or_else(|| "no playback primitive available".to_string()),
        })
    }
}

#[async_trait]
impl Backend for RemoteSynthesisBackend {
    fn id(&self) -> BackendId {
        BackendId::Remote
    }

    async fn attempt(
        &self,
        request: &PlaybackRequest,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let work = async {
            let audio = self
                .endpoint
                .synthesize(request.text(), request.voice_profile())
                .await?;
            if audio.is_empty() {
                return Err(VoiceError::BackendRejected {
                    backend: BackendId::Remote.to_string(),
                    reason: "endpoint returned an empty body".to_string(),
                });
            }
            self.play_through_primitives(request, &audio, deadline).await?;
            Ok::<_, VoiceError>(audio)
        };

        bounded_by(deadline, cancel, work)
            .await
            .into_outcome(|audio| AttemptOutcome::Played {
                asset: Some(AudioAsset::new(BackendId::Remote, audio)),
                verified: true,
            })
    }

    async fn replay(
        &self,
        request: &PlaybackRequest,
        asset: &AudioAsset,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let work = self.play_through_primitives(request, &asset.bytes, deadline);
        bounded_by(deadline, cancel, work)
            .await
            .into_outcome(|_| AttemptOutcome::played())
    }

    async fn probe(&self, _budget: Duration) -> Result<()> {
        let Some(primitive) = self.primitives.first() else {
            warn!("Remote backend has no playback primitive to probe");
            return Err(VoiceError::PermissionNotGranted);
        };
        primitive.probe().await
    }
}
