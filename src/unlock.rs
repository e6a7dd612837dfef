//! Audio permission state machine
//!
//! Some platforms only allow sound once a call stack rooted in a genuine user
//! gesture has produced output. The unlocker tracks that grant for the whole
//! process:
//!
//! ```text
//! Locked --gesture--> Unlocking --probe ok--> Unlocked
//!                         |
//!                         +--probe failed/timed out--> Locked
//! ```
//!
//! `Unlocked` is sticky: once granted, permission lasts for the session.

use crate::config::MAX_PROBE_TIMEOUT_MS;
use crate::speech::Backend;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

static GLOBAL: OnceCell<Arc<Unlocker>> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockState {
    Locked,
    Unlocking,
    Unlocked,
}

impl UnlockState {
    /// Whether the state machine permits `self -> to`
    pub fn can_transition_to(self, to: UnlockState) -> bool {
        matches!(
            (self, to),
            (UnlockState::Locked, UnlockState::Unlocking)
                | (UnlockState::Unlocking, UnlockState::Unlocked)
                | (UnlockState::Unlocking, UnlockState::Locked)
        )
    }
}

pub struct Unlocker {
    state: watch::Sender<UnlockState>,
    history: Mutex<Vec<(UnlockState, UnlockState)>>,
    probe_timeout: Duration,
}

impl Unlocker {
    pub fn new(probe_timeout: Duration) -> Self {
        let (state, _) = watch::channel(UnlockState::Locked);
        Self {
            state,
            history: Mutex::new(Vec::new()),
            probe_timeout: probe_timeout.min(Duration::from_millis(MAX_PROBE_TIMEOUT_MS)),
        }
    }

    /// Process-wide unlocker shared by every orchestrator that asks for it
    pub fn global() -> Arc<Unlocker> {
        GLOBAL
            .get_or_init(|| Arc::new(Unlocker::new(Duration::from_millis(MAX_PROBE_TIMEOUT_MS))))
            .clone()
    }

    pub fn state(&self) -> UnlockState {
        *self.state.borrow()
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<UnlockState> {
        self.state.subscribe()
    }

    /// Every transition taken so far, oldest first
    pub fn history(&self) -> Vec<(UnlockState, UnlockState)> {
        self.history.lock().clone()
    }

    /// Move `from -> to` if the machine is in `from` and the edge is allowed
    fn transition(&self, from: UnlockState, to: UnlockState) -> bool {
        if !from.can_transition_to(to) {
            warn!("Refusing unlock transition {:?} -> {:?}", from, to);
            return false;
        }

        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });

        if changed {
            self.history.lock().push((from, to));
            info!("Audio permission {:?} -> {:?}", from, to);
        }
        changed
    }

    /// Resolve once audio permission is granted
    ///
    /// Stays pending across failed probes; callers bound the wait themselves.
    pub async fn ensure_unlocked(&self) -> UnlockState {
        let mut rx = self.state.subscribe();
        let unlocked = rx.wait_for(|s| *s == UnlockState::Unlocked).await.is_ok();
        if unlocked {
            UnlockState::Unlocked
        } else {
            self.state()
        }
    }

    /// Gesture listener
    ///
    /// Only acts while `Locked`, so it fires at most once per locked period
    /// and re-entrant gestures during a probe are ignored. Runs `backend`'s
    /// micro-probe under the probe timeout.
    pub async fn on_user_gesture(&self, backend: &dyn Backend) -> UnlockState {
        if !self.transition(UnlockState::Locked, UnlockState::Unlocking) {
            debug!("Gesture ignored while {:?}", self.state());
            return self.state();
        }

        let mut guard = RevertOnDrop {
            unlocker: self,
            armed: true,
        };

        debug!("Probing audio output through {}", backend.id());
        match tokio::time::timeout(self.probe_timeout, backend.probe(self.probe_timeout)).await {
            Ok(Ok(())) => {
                guard.armed = false;
                self.transition(UnlockState::Unlocking, UnlockState::Unlocked);
            }
            Ok(Err(e)) => {
                warn!("Unlock probe through {} failed: {}", backend.id(), e);
            }
            Err(_) => {
                warn!(
                    "Unlock probe through {} timed out after {:?}",
                    backend.id(),
                    self.probe_timeout
                );
            }
        }
        drop(guard);
        self.state()
    }
}

/// Returns the machine to `Locked` unless the probe succeeded
///
/// Also covers a gesture future dropped mid-probe, which would otherwise
/// leave the machine stuck in `Unlocking`.
struct RevertOnDrop<'a> {
    unlocker: &'a Unlocker,
    armed: bool,
}

impl Drop for RevertOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.unlocker
                .transition(UnlockState::Unlocking, UnlockState::Locked);
        }
    }
}
