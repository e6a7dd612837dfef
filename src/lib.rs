//! vocab-voice - Adaptive audio playback for vocabulary pronunciation
//!
//! Turns a word or sentence into audible output on hosts where audio is
//! unreliable: it classifies the runtime, waits for a gesture-driven audio
//! permission, then walks a chain of fallback backends (remote synthesis,
//! native speech, generated tones, haptic/visual cues) until one works.

pub mod audio;
pub mod cache;
pub mod capability;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod request;
pub mod speech;
pub mod unlock;

pub use capability::{CapabilityDetector, CapabilityProfile, PlatformClass, RuntimeProbe};
pub use config::Config;
pub use diagnostics::{AttemptRecord, AttemptStatus, DiagnosticsReporter, DiagnosticsSummary};
pub use error::{Result, VoiceError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, PlaybackReport, PlaybackSettings};
pub use request::{PlaybackKind, PlaybackRequest};
pub use speech::{AttemptOutcome, AudioAsset, Backend, BackendId, Deadline, FailureReason};
pub use unlock::{UnlockState, Unlocker};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "vocab-voice";
