//! Concrete playback backends

// Remote synthesis over HTTP, played through local primitives
pub mod remote;

// Platform speech engines (espeak-ng, tts crate)
pub mod native;

// espeak-ng subprocess engine
pub mod espeak;

// Locally generated tone sequences
pub mod tone;

// Haptic/visual substitute that never fails
pub mod sensory;

pub use espeak::EspeakEngine;
pub use native::{create_speech_engine, NativeSpeechBackend, SpeechEngine};
pub use remote::{
    DecodedPlayback, EncodedPlayback, HttpSynthesisEndpoint, PlaybackPrimitive,
    RemoteSynthesisBackend, SynthesisEndpoint,
};
pub use sensory::{FeedbackSurface, SensoryBackend, TerminalSurface};
pub use tone::ToneBackend;
