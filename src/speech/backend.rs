//! Playback backend abstraction
//!
//! Every way of making text perceivable (remote synthesis, native speech,
//! generated tones, haptic/visual cues) implements [`Backend`]. The
//! orchestrator walks them in the order the capability profile dictates.

use crate::capability::CapabilityProfile;
use crate::request::PlaybackRequest;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Identifies a backend in chains, cache keys and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Remote,
    Native,
    Tone,
    Sensory,
}

impl BackendId {
    pub const ALL: [BackendId; 4] = [
        BackendId::Remote,
        BackendId::Native,
        BackendId::Tone,
        BackendId::Sensory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Remote => "remote",
            BackendId::Native => "native",
            BackendId::Tone => "tone",
            BackendId::Sensory => "sensory",
        }
    }

    /// Whether this backend produces byte buffers worth caching
    pub fn produces_assets(&self) -> bool {
        matches!(self, BackendId::Remote | BackendId::Tone)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded audio produced by a backend, shareable with the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    pub backend: BackendId,
    pub bytes: Arc<[u8]>,
}

impl AudioAsset {
    pub fn new(backend: BackendId, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            backend,
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Why an attempt did not play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The attempt ran out of budget
    Timeout,
    /// The backend reported an error
    Rejected(String),
    /// `stop()` or a newer `play()` cut the attempt short
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::Rejected(detail) => write!(f, "rejected: {}", detail),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of one backend attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Played {
        /// Reusable audio, if the backend produced any
        asset: Option<AudioAsset>,
        /// False when completion does not prove anything was heard
        verified: bool,
    },
    Failed(FailureReason),
}

impl AttemptOutcome {
    pub fn played() -> Self {
        AttemptOutcome::Played {
            asset: None,
            verified: true,
        }
    }

    pub fn rejected(detail: impl fmt::Display) -> Self {
        AttemptOutcome::Failed(FailureReason::Rejected(detail.to_string()))
    }

    pub fn is_played(&self) -> bool {
        matches!(self, AttemptOutcome::Played { .. })
    }
}

/// A strategy for rendering text to sound or a sensory substitute
#[async_trait]
pub trait Backend: Send + Sync {
    fn id(&self) -> BackendId;

    /// Render `request`, giving up on its own once `deadline` passes or
    /// `cancel` fires
    ///
    /// The deadline bounds how long output may take to start. Backends push
    /// it back by the length of output they have begun, so audio that
    /// started in time plays to the end.
    async fn attempt(
        &self,
        request: &PlaybackRequest,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> AttemptOutcome;

    /// Play audio this backend produced earlier for `request`
    async fn replay(
        &self,
        _request: &PlaybackRequest,
        _asset: &AudioAsset,
        _deadline: &Deadline,
        _cancel: &CancellationToken,
    ) -> AttemptOutcome {
        AttemptOutcome::rejected(format!("{} cannot replay cached audio", self.id()))
    }

    /// Near-silent, near-instant output used to obtain audio permission
    async fn probe(&self, _budget: Duration) -> Result<()> {
        Ok(())
    }

    /// Follow a change of capability profile
    fn apply_profile(&self, _profile: &CapabilityProfile) {}
}

/// When an attempt gives up
///
/// Starts out as the attempt's budget. Clones share the same instant, so an
/// extension made by the backend is seen by whoever bounds the attempt.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Arc<watch::Sender<Instant>>,
    slack: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        let (at, _) = watch::channel(Instant::now() + budget);
        Self {
            at: Arc::new(at),
            slack: Duration::ZERO,
        }
    }

    /// The same deadline seen `slack` later
    pub fn with_slack(&self, slack: Duration) -> Self {
        Self {
            at: self.at.clone(),
            slack,
        }
    }

    /// Push the deadline back by `playing`, the length of output just started
    pub fn extend_by(&self, playing: Duration) {
        self.at.send_modify(|at| *at += playing);
    }
}

/// Run `fut` until it finishes, `deadline` passes or `cancel` fires
///
/// Extensions made while `fut` runs are honoured.
pub async fn bounded_by<F>(
    deadline: &Deadline,
    cancel: &CancellationToken,
    fut: F,
) -> Bounded<F::Output>
where
    F: Future,
{
    let mut changes = deadline.at.subscribe();
    tokio::pin!(fut);
    loop {
        let at = *changes.borrow_and_update() + deadline.slack;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Bounded::Cancelled,
            value = &mut fut => return Bounded::Done(value),
            _ = tokio::time::sleep_until(at) => return Bounded::TimedOut,
            Ok(()) = changes.changed() => {}
        }
    }
}

/// How a bounded future ended
#[derive(Debug)]
pub enum Bounded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Run `fut` until it finishes, `budget` elapses or `cancel` fires
///
/// On timeout or cancellation the future is dropped, which aborts in-flight
/// HTTP requests and kills spawned player processes.
pub async fn bounded<F>(budget: Duration, cancel: &CancellationToken, fut: F) -> Bounded<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        result = tokio::time::timeout(budget, fut) => match result {
            Ok(value) => Bounded::Done(value),
            Err(_) => Bounded::TimedOut,
        },
    }
}

impl<T, E: fmt::Display> Bounded<std::result::Result<T, E>> {
    /// Collapse into an attempt outcome, mapping `Ok` through `on_ok`
    pub fn into_outcome(self, on_ok: impl FnOnce(T) -> AttemptOutcome) -> AttemptOutcome {
        match self {
            Bounded::Done(Ok(value)) => on_ok(value),
            Bounded::Done(Err(e)) => AttemptOutcome::rejected(e),
            Bounded::TimedOut => AttemptOutcome::Failed(FailureReason::Timeout),
            Bounded::Cancelled => AttemptOutcome::Failed(FailureReason::Cancelled),
        }
    }
}
