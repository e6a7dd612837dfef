//! Mock environment shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vocab_voice::audio::{encode_wav, AudioSink, PcmBuffer};
use vocab_voice::speech::backends::{FeedbackSurface, SpeechEngine, SynthesisEndpoint};
use vocab_voice::{PlaybackKind, Result, VoiceError};

/// A short valid WAV file
pub fn wav_bytes() -> Vec<u8> {
    let samples = (0..441).map(|i| ((i % 50) as i16 - 25) * 100).collect();
    encode_wav(&PcmBuffer::mono(samples, 22_050)).expect("encode test wav")
}

/// Synthesis endpoint returning a fixed WAV body
///
/// Requests for `hang_on` never complete.
pub struct MockEndpoint {
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
    hang_on: Option<String>,
    body: Vec<u8>,
}

impl MockEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            hang_on: None,
            body: wav_bytes(),
        })
    }

    pub fn hanging_on(text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            hang_on: Some(text.to_string()),
            body: wav_bytes(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisEndpoint for MockEndpoint {
    async fn synthesize(&self, text: &str, _voice_profile: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push(text.to_string());
        if self.hang_on.as_deref() == Some(text) {
            std::future::pending::<()>().await;
        }
        Ok(self.body.clone())
    }
}

/// Sink that records what it was asked to play
#[derive(Default)]
pub struct RecordingSink {
    pub played: Mutex<Vec<PcmBuffer>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.played.lock().len()
    }
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

/// Sink that takes as long as the audio lasts, like a real device
#[derive(Default)]
pub struct RealtimeSink {
    pub played: Mutex<Vec<PcmBuffer>>,
}

impl RealtimeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.played.lock().len()
    }
}

#[async_trait]
impl AudioSink for RealtimeSink {
    fn name(&self) -> &str {
        "realtime"
    }

    async fn play_pcm(&self, pcm: &PcmBuffer) -> Result<()> {
        tokio::time::sleep(pcm.duration()).await;
        self.played.lock().push(pcm.clone());
        Ok(())
    }
}

/// Speech engine that takes `delay` per utterance
///
/// Dropping an utterance before it finishes counts as abandoning it, and
/// only that utterance.
pub struct MockEngine {
    pub spoken: Mutex<Vec<String>>,
    pub finished: Arc<Mutex<Vec<String>>>,
    pub abandoned: Arc<AtomicUsize>,
    delay: Duration,
}

impl MockEngine {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            finished: Arc::new(Mutex::new(Vec::new())),
            abandoned: Arc::new(AtomicUsize::new(0)),
            delay,
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().clone()
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

struct Utterance {
    text: String,
    finished: Arc<Mutex<Vec<String>>>,
    abandoned: Arc<AtomicUsize>,
    done: bool,
}

impl Drop for Utterance {
    fn drop(&mut self) {
        if self.done {
            self.finished.lock().push(self.text.clone());
        } else {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl SpeechEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn speak(&self, text: &str, _kind: PlaybackKind, _voice_profile: &str) -> Result<()> {
        self.spoken.lock().push(text.to_string());
        let mut utterance = Utterance {
            text: text.to_string(),
            finished: self.finished.clone(),
            abandoned: self.abandoned.clone(),
            done: false,
        };
        tokio::time::sleep(self.delay).await;
        utterance.done = true;
        Ok(())
    }
}

/// Feedback surface that records calls, optionally failing them
#[derive(Default)]
pub struct RecordingSurface {
    pub events: Arc<Mutex<Vec<String>>>,
    pub broken: bool,
}

impl FeedbackSurface for RecordingSurface {
    fn vibrate(&self, pattern: &[Duration]) -> Result<()> {
        self.events.lock().push(format!("vibrate {}", pattern.len()));
        if self.broken {
            return Err(VoiceError::Other("no motor".to_string()));
        }
        Ok(())
    }

    fn show_glyph(&self, text: &str, _duration: Duration) -> Result<()> {
        self.events.lock().push(format!("glyph {}", text));
        if self.broken {
            return Err(VoiceError::Other("no display".to_string()));
        }
        Ok(())
    }
}
