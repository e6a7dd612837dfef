//! Playback orchestrator
//!
//! Owns the fallback chain. Each `play()` call waits briefly for audio
//! permission, replays cached audio when it can, then walks the backends in
//! profile order with one bounded attempt each until something plays. Only
//! one call is active at a time: starting a new one cancels the previous.

use crate::audio::{AudioSink, ProcessSink, ToneSettings, ToneSynth};
use crate::cache::{AssetCache, CacheKey};
use crate::capability::{CapabilityDetector, CapabilityProfile, RuntimeProbe};
use crate::config::{Config, MAX_PROBE_TIMEOUT_MS};
use crate::diagnostics::{AttemptRecord, DiagnosticsReporter, DEFAULT_CAPACITY};
use crate::request::{PlaybackKind, PlaybackRequest};
use crate::speech::backends::{
    create_speech_engine, DecodedPlayback, EncodedPlayback, HttpSynthesisEndpoint,
    NativeSpeechBackend, PlaybackPrimitive, RemoteSynthesisBackend, SensoryBackend,
    TerminalSurface, ToneBackend,
};
use crate::speech::{
    bounded, bounded_by, AttemptOutcome, Backend, BackendId, Bounded, Deadline, FailureReason,
};
use crate::unlock::{UnlockState, Unlocker};
use crate::{Result, VoiceError};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default total size of cached audio
pub const DEFAULT_CACHE_BYTES: usize = 8 * 1024 * 1024;

/// Timing and text limits for playback
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub voice_profile: String,
    /// Longest text sent to the remote endpoint, in characters
    pub max_remote_chars: usize,
    pub unlock_grace: Duration,
    pub budget_grace: Duration,
    pub remote_budget: Duration,
    pub native_budget: Duration,
    pub tone_budget: Duration,
    pub sensory_budget: Duration,
}

impl PlaybackSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            voice_profile: config.voice_profile(),
            max_remote_chars: config.max_remote_chars(),
            unlock_grace: config.unlock_grace(),
            budget_grace: config.budget_grace(),
            remote_budget: config.remote_budget(),
            native_budget: config.native_budget(),
            tone_budget: config.tone_budget(),
            sensory_budget: config.sensory_budget(),
        }
    }

    pub fn budget_for(&self, backend: BackendId) -> Duration {
        match backend {
            BackendId::Remote => self.remote_budget,
            BackendId::Native => self.native_budget,
            BackendId::Tone => self.tone_budget,
            BackendId::Sensory => self.sensory_budget,
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How a `play()` call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackReport {
    pub play_id: u64,
    /// Backend that produced the output, if any
    pub played_by: Option<BackendId>,
    pub from_cache: bool,
    /// Nothing audible was produced
    pub degraded: bool,
    /// Superseded by a newer call or stopped
    pub cancelled: bool,
}

impl PlaybackReport {
    fn played(play_id: u64, backend: BackendId, from_cache: bool) -> Self {
        Self {
            play_id,
            played_by: Some(backend),
            from_cache,
            degraded: backend == BackendId::Sensory,
            cancelled: false,
        }
    }

    fn cancelled(play_id: u64) -> Self {
        Self {
            play_id,
            played_by: None,
            from_cache: false,
            degraded: false,
            cancelled: true,
        }
    }

    fn exhausted(play_id: u64) -> Self {
        Self {
            play_id,
            played_by: None,
            from_cache: false,
            degraded: true,
            cancelled: false,
        }
    }
}

/// Lifecycle of one `play()` call, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPhase {
    AwaitingUnlock,
    RunningChain,
    Resolved,
    Rejected,
}

#[derive(Default)]
struct ActiveCall {
    last_id: u64,
    token: Option<CancellationToken>,
}

pub struct Orchestrator {
    settings: PlaybackSettings,
    detector: CapabilityDetector,
    profile: RwLock<CapabilityProfile>,
    backends: HashMap<BackendId, Arc<dyn Backend>>,
    unlocker: Arc<Unlocker>,
    cache: Mutex<AssetCache>,
    diagnostics: Arc<DiagnosticsReporter>,
    active: Mutex<ActiveCall>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Wire the production backends for this host
    ///
    /// Backends whose primitives are missing are left out; the sensory
    /// fallback is always present.
    pub fn from_config(config: &Config, probe: &RuntimeProbe) -> Result<Self> {
        let detector = CapabilityDetector::from_config(config);
        let profile = detector.detect(probe);

        let mut builder = OrchestratorBuilder::new()
            .settings(PlaybackSettings::from_config(config))
            .detector(detector)
            .profile(profile.clone())
            .unlocker(Arc::new(Unlocker::new(config.probe_timeout())))
            .cache_max_bytes(config.cache_max_bytes())
            .diagnostics_capacity(config.diagnostics_capacity());

        let player = config.player();
        let sink: Option<Arc<dyn AudioSink>> = match ProcessSink::detect(player.as_deref()) {
            Ok(sink) => {
                info!("Audio output through {}", sink.player().program.display());
                Some(Arc::new(sink))
            }
            Err(e) => {
                warn!("No audio output: {}", e);
                None
            }
        };

        if let Some(url) = config.remote_endpoint() {
            let endpoint = HttpSynthesisEndpoint::new(url, config.remote_request_timeout())?;
            let mut primitives: Vec<Arc<dyn PlaybackPrimitive>> = Vec::new();
            if let Some(sink) = &sink {
                primitives.push(Arc::new(DecodedPlayback::new(sink.clone())));
            }
            if let Some(encoded) = EncodedPlayback::detect() {
                primitives.push(Arc::new(encoded));
            }
            if primitives.is_empty() {
                warn!("Remote endpoint configured but nothing can play its audio");
            } else {
                builder = builder.backend(Arc::new(RemoteSynthesisBackend::new(
                    Arc::new(endpoint),
                    primitives,
                )));
            }
        }

        match create_speech_engine() {
            Ok(engine) => builder = builder.backend(Arc::new(NativeSpeechBackend::new(engine))),
            Err(e) => info!("Native speech disabled: {}", e),
        }

        if let Some(sink) = sink {
            let synth = ToneSynth::new(ToneSettings::from_config(config));
            builder = builder.backend(Arc::new(ToneBackend::new(synth, sink)));
        }

        builder = builder.backend(Arc::new(SensoryBackend::for_profile(
            Box::new(TerminalSurface),
            &profile,
        )));

        Ok(builder.build())
    }

    /// Play `text`, falling back through the chain until something works
    ///
    /// Only invalid input is an error. Backend failures end up in the
    /// diagnostics, and a superseded call resolves with `cancelled` set.
    pub async fn play(&self, text: &str, kind: PlaybackKind) -> Result<PlaybackReport> {
        let request = match PlaybackRequest::new(text, kind, &self.settings.voice_profile) {
            Ok(request) => request,
            Err(e) => {
                debug!("play {:?} {:?}: {}", text, CallPhase::Rejected, e);
                return Err(e);
            }
        };
        Ok(self.play_request(request).await)
    }

    /// Play an already validated request
    pub async fn play_request(&self, request: PlaybackRequest) -> PlaybackReport {
        let (play_id, token) = self.begin_call();
        debug!("play #{} {:?}: {:?}", play_id, request.kind(), request.text());

        if self.unlocker.state() != UnlockState::Unlocked {
            debug!("play #{} {:?}", play_id, CallPhase::AwaitingUnlock);
            let grace = self.settings.unlock_grace;
            match bounded(grace, &token, self.unlocker.ensure_unlocked()).await {
                Bounded::Done(_) => {}
                Bounded::TimedOut => warn!(
                    "play #{}: {} after {:?}, playing anyway",
                    play_id,
                    VoiceError::PermissionNotGranted,
                    grace
                ),
                Bounded::Cancelled => return PlaybackReport::cancelled(play_id),
            }
        }

        debug!("play #{} {:?}", play_id, CallPhase::RunningChain);
        let report = self.run_chain(play_id, &request, &token).await;
        debug!(
            "play #{} {:?}: {:?}",
            play_id,
            CallPhase::Resolved,
            report.played_by
        );
        report
    }

    /// Cancel the active call, if any
    pub fn stop(&self) {
        if let Some(token) = self.active.lock().token.take() {
            debug!("Stopping active playback");
            token.cancel();
        }
    }

    /// Gesture entry point for the UI layer
    ///
    /// Probes through the top-ranked backend of the current profile.
    pub async fn user_gesture(&self) -> UnlockState {
        let Some(backend) = self.chain().first().and_then(|id| self.backends.get(id)).cloned()
        else {
            return self.unlocker.state();
        };
        self.unlocker.on_user_gesture(backend.as_ref()).await
    }

    pub fn unlock_state(&self) -> UnlockState {
        self.unlocker.state()
    }

    pub fn unlocker(&self) -> &Arc<Unlocker> {
        &self.unlocker
    }

    pub fn profile(&self) -> CapabilityProfile {
        self.profile.read().clone()
    }

    /// Recompute the capability profile, e.g. after a user agent change
    pub fn redetect(&self, probe: &RuntimeProbe) -> CapabilityProfile {
        let profile = self.detector.detect(probe);
        info!(
            "Redetected {:?}, backend order {:?}",
            profile.platform_class,
            profile.backend_order()
        );
        for backend in self.backends.values() {
            backend.apply_profile(&profile);
        }
        *self.profile.write() = profile.clone();
        profile
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsReporter> {
        &self.diagnostics
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Backends registered here, in profile order, sensory last
    pub fn chain(&self) -> Vec<BackendId> {
        let mut chain: Vec<BackendId> = self
            .profile
            .read()
            .backend_order()
            .into_iter()
            .filter(|id| *id != BackendId::Sensory && self.backends.contains_key(id))
            .collect();
        chain.push(BackendId::Sensory);
        chain
    }

    /// Register a new call, cancelling whichever one was active
    fn begin_call(&self) -> (u64, CancellationToken) {
        let mut active = self.active.lock();
        if let Some(previous) = active.token.take() {
            debug!("play #{} superseded", active.last_id);
            previous.cancel();
        }
        active.last_id += 1;
        let token = CancellationToken::new();
        active.token = Some(token.clone());
        (active.last_id, token)
    }

    async fn run_chain(
        &self,
        play_id: u64,
        request: &PlaybackRequest,
        token: &CancellationToken,
    ) -> PlaybackReport {
        let chain = self.chain();
        let remote_request = request.capped(self.settings.max_remote_chars);
        let request_for = |id: BackendId| {
            if id == BackendId::Remote {
                &remote_request
            } else {
                request
            }
        };

        for id in chain.iter().copied().filter(BackendId::produces_assets) {
            let Some(backend) = self.backends.get(&id) else {
                continue;
            };
            let key = self.cache_key(request_for(id), id);
            let Some(asset) = self.cache.lock().get(&key) else {
                continue;
            };

            debug!("play #{}: cache hit for {}", play_id, id);
            let child = token.child_token();
            let deadline = Deadline::after(self.settings.budget_for(id));
            let replay = backend.replay(request_for(id), &asset, &deadline, &child);
            let outcome = self
                .run_attempt(play_id, id, &deadline, &child, true, replay)
                .await;
            match outcome {
                AttemptOutcome::Played { .. } => return PlaybackReport::played(play_id, id, true),
                AttemptOutcome::Failed(FailureReason::Cancelled) => {
                    return PlaybackReport::cancelled(play_id)
                }
                AttemptOutcome::Failed(_) => {}
            }
        }

        for id in chain {
            if token.is_cancelled() {
                return PlaybackReport::cancelled(play_id);
            }
            let Some(backend) = self.backends.get(&id) else {
                continue;
            };

            let attempt_request = request_for(id);
            let child = token.child_token();
            let deadline = Deadline::after(self.settings.budget_for(id));
            let attempt = backend.attempt(attempt_request, &deadline, &child);
            let outcome = self
                .run_attempt(play_id, id, &deadline, &child, false, attempt)
                .await;

            match outcome {
                AttemptOutcome::Played { asset, .. } => {
                    if let Some(asset) = asset {
                        let key = self.cache_key(attempt_request, id);
                        self.cache.lock().insert(key, asset);
                    }
                    return PlaybackReport::played(play_id, id, false);
                }
                AttemptOutcome::Failed(FailureReason::Cancelled) => {
                    return PlaybackReport::cancelled(play_id)
                }
                AttemptOutcome::Failed(reason) => {
                    debug!("play #{}: {} failed ({}), falling back", play_id, id, reason);
                }
            }
        }

        warn!("play #{}: {}", play_id, VoiceError::AllBackendsDegraded);
        PlaybackReport::exhausted(play_id)
    }

    /// Run one backend future until its deadline plus grace, and record it
    ///
    /// The backend extends `deadline` once its output has started, so the
    /// hard stop only cuts off attempts that never got going.
    async fn run_attempt<F>(
        &self,
        play_id: u64,
        backend: BackendId,
        deadline: &Deadline,
        cancel: &CancellationToken,
        from_cache: bool,
        attempt: F,
    ) -> AttemptOutcome
    where
        F: Future<Output = AttemptOutcome>,
    {
        let hard_stop = deadline.with_slack(self.settings.budget_grace);
        let started_at = SystemTime::now();
        let start = Instant::now();

        let outcome = match bounded_by(&hard_stop, cancel, attempt).await {
            Bounded::Done(outcome) => outcome,
            Bounded::TimedOut => AttemptOutcome::Failed(FailureReason::Timeout),
            Bounded::Cancelled => AttemptOutcome::Failed(FailureReason::Cancelled),
        };

        self.diagnostics.record(AttemptRecord::from_outcome(
            play_id,
            backend,
            started_at,
            start.elapsed(),
            &outcome,
            from_cache,
        ));
        outcome
    }

    fn cache_key(&self, request: &PlaybackRequest, backend: BackendId) -> CacheKey {
        CacheKey::new(request.text(), request.voice_profile(), backend)
    }
}

/// Assembles an [`Orchestrator`] from arbitrary backends
pub struct OrchestratorBuilder {
    settings: PlaybackSettings,
    detector: CapabilityDetector,
    profile: CapabilityProfile,
    backends: HashMap<BackendId, Arc<dyn Backend>>,
    unlocker: Option<Arc<Unlocker>>,
    cache_max_bytes: usize,
    diagnostics: Option<Arc<DiagnosticsReporter>>,
    diagnostics_capacity: usize,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            settings: PlaybackSettings::default(),
            detector: CapabilityDetector::default(),
            profile: CapabilityProfile::conservative(),
            backends: HashMap::new(),
            unlocker: None,
            cache_max_bytes: DEFAULT_CACHE_BYTES,
            diagnostics: None,
            diagnostics_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn settings(mut self, settings: PlaybackSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn detector(mut self, detector: CapabilityDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn profile(mut self, profile: CapabilityProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Detect the profile from `probe` with the current detector
    pub fn probe(mut self, probe: &RuntimeProbe) -> Self {
        self.profile = self.detector.detect(probe);
        self
    }

    /// Register a backend, replacing any earlier one with the same id
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(backend.id(), backend);
        self
    }

    /// Share an unlocker, e.g. [`Unlocker::global`]
    pub fn unlocker(mut self, unlocker: Arc<Unlocker>) -> Self {
        self.unlocker = Some(unlocker);
        self
    }

    pub fn cache_max_bytes(mut self, max_bytes: usize) -> Self {
        self.cache_max_bytes = max_bytes;
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<DiagnosticsReporter>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }

    pub fn build(mut self) -> Orchestrator {
        if !self.backends.contains_key(&BackendId::Sensory) {
            let sensory = SensoryBackend::for_profile(Box::new(TerminalSurface), &self.profile);
            self.backends.insert(BackendId::Sensory, Arc::new(sensory));
        }

        let mut registered: Vec<BackendId> = self.backends.keys().copied().collect();
        registered.sort();
        info!(
            "Playback on {:?} with backends {:?}, order {:?}",
            self.profile.platform_class,
            registered,
            self.profile.backend_order()
        );

        let capacity = self.diagnostics_capacity;
        Orchestrator {
            settings: self.settings,
            detector: self.detector,
            profile: RwLock::new(self.profile),
            backends: self.backends,
            unlocker: self.unlocker.unwrap_or_else(|| {
                Arc::new(Unlocker::new(Duration::from_millis(MAX_PROBE_TIMEOUT_MS)))
            }),
            cache: Mutex::new(AssetCache::new(self.cache_max_bytes)),
            diagnostics: self
                .diagnostics
                .unwrap_or_else(|| Arc::new(DiagnosticsReporter::new(capacity))),
            active: Mutex::new(ActiveCall::default()),
        }
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
