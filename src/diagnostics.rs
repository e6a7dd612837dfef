//! Playback diagnostics
//!
//! Keeps a bounded, insertion-ordered log of backend attempts plus lifetime
//! counters per backend. Recording never fails and never waits on anything
//! but a short mutex, so the orchestrator can call it inline.

use crate::speech::{AttemptOutcome, BackendId, FailureReason};
use crate::VoiceError;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default number of records kept
pub const DEFAULT_CAPACITY: usize = 200;

/// How an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Timeout,
    Rejected,
    Cancelled,
}

/// One backend attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Identifies the `play()` call the attempt belonged to
    pub play_id: u64,
    pub backend: BackendId,
    #[serde(serialize_with = "serialize_epoch_ms")]
    pub started_at: SystemTime,
    #[serde(serialize_with = "serialize_ms")]
    pub elapsed: Duration,
    pub outcome: AttemptStatus,
    pub error_detail: Option<String>,
    /// Served from the audio cache rather than a fresh synthesis
    pub from_cache: bool,
}

impl AttemptRecord {
    /// Build a record from a backend outcome
    pub fn from_outcome(
        play_id: u64,
        backend: BackendId,
        started_at: SystemTime,
        elapsed: Duration,
        outcome: &AttemptOutcome,
        from_cache: bool,
    ) -> Self {
        let (status, error_detail) = match outcome {
            AttemptOutcome::Played { verified: true, .. } => (AttemptStatus::Success, None),
            AttemptOutcome::Played {
                verified: false, ..
            } => (AttemptStatus::Success, Some("audibility unverified".to_string())),
            AttemptOutcome::Failed(FailureReason::Timeout) => (
                AttemptStatus::Timeout,
                Some(VoiceError::BackendTimeout(backend.to_string()).to_string()),
            ),
            AttemptOutcome::Failed(FailureReason::Rejected(detail)) => {
                (AttemptStatus::Rejected, Some(detail.clone()))
            }
            AttemptOutcome::Failed(FailureReason::Cancelled) => {
                (AttemptStatus::Cancelled, Some("cancelled".to_string()))
            }
        };
        Self {
            play_id,
            backend,
            started_at,
            elapsed,
            outcome: status,
            error_detail,
            from_cache,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptStatus::Success
    }
}

fn serialize_epoch_ms<S: Serializer>(time: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let ms = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    s.serialize_u64(ms)
}

fn serialize_ms<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis() as u64)
}

/// Aggregate view for operators and tests
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticsSummary {
    /// Successes over decided attempts (cancellations excluded)
    pub success_rate_by_backend: BTreeMap<BackendId, f64>,
    pub last_failure_by_backend: BTreeMap<BackendId, AttemptRecord>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    successes: u64,
    failures: u64,
}

#[derive(Default)]
struct Inner {
    records: VecDeque<AttemptRecord>,
    counters: HashMap<BackendId, Counters>,
    last_failure: HashMap<BackendId, AttemptRecord>,
}

pub struct DiagnosticsReporter {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl DiagnosticsReporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn record(&self, record: AttemptRecord) {
        match record.outcome {
            AttemptStatus::Success => debug!(
                "play #{} {} succeeded in {:?}{}",
                record.play_id,
                record.backend,
                record.elapsed,
                if record.from_cache { " (cached)" } else { "" }
            ),
            AttemptStatus::Cancelled => debug!(
                "play #{} {} cancelled after {:?}",
                record.play_id, record.backend, record.elapsed
            ),
            _ => warn!(
                "play #{} {} failed after {:?}: {}",
                record.play_id,
                record.backend,
                record.elapsed,
                record.error_detail.as_deref().unwrap_or("unknown")
            ),
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let counters = inner.counters.entry(record.backend).or_default();
        match record.outcome {
            AttemptStatus::Success => counters.successes += 1,
            AttemptStatus::Timeout | AttemptStatus::Rejected => {
                counters.failures += 1;
                inner.last_failure.insert(record.backend, record.clone());
            }
            AttemptStatus::Cancelled => {}
        }

        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }

    /// Last `n` records, oldest first
    pub fn recent_attempts(&self, n: usize) -> Vec<AttemptRecord> {
        let inner = self.inner.lock();
        let skip = inner.records.len().saturating_sub(n);
        inner.records.iter().skip(skip).cloned().collect()
    }

    /// Records belonging to one `play()` call, in insertion order
    pub fn attempts_for(&self, play_id: u64) -> Vec<AttemptRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.play_id == play_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> DiagnosticsSummary {
        let inner = self.inner.lock();
        let success_rate_by_backend = inner
            .counters
            .iter()
            .filter_map(|(backend, c)| {
                let decided = c.successes + c.failures;
                (decided > 0).then(|| (*backend, c.successes as f64 / decided as f64))
            })
            .collect();
        let last_failure_by_backend = inner
            .last_failure
            .iter()
            .map(|(backend, record)| (*backend, record.clone()))
            .collect();
        DiagnosticsSummary {
            success_rate_by_backend,
            last_failure_by_backend,
        }
    }
}

impl Default for DiagnosticsReporter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(play_id: u64, backend: BackendId, outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord::from_outcome(
            play_id,
            backend,
            SystemTime::now(),
            Duration::from_millis(5),
            &outcome,
            false,
        )
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let reporter = DiagnosticsReporter::new(3);
        for id in 0..5 {
            reporter.record(record(id, BackendId::Tone, AttemptOutcome::played()));
        }
        let ids: Vec<u64> = reporter.recent_attempts(10).iter().map(|r| r.play_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(reporter.recent_attempts(2).len(), 2);
        assert_eq!(reporter.recent_attempts(2)[1].play_id, 4);
    }

    #[test]
    fn test_summary_rates_and_failures() {
        let reporter = DiagnosticsReporter::default();
        reporter.record(record(1, BackendId::Remote, AttemptOutcome::Failed(FailureReason::Timeout)));
        reporter.record(record(1, BackendId::Tone, AttemptOutcome::played()));
        reporter.record(record(2, BackendId::Remote, AttemptOutcome::played()));
        reporter.record(record(3, BackendId::Remote, AttemptOutcome::Failed(FailureReason::Cancelled)));

        let summary = reporter.summary();
        assert_eq!(summary.success_rate_by_backend[&BackendId::Remote], 0.5);
        assert_eq!(summary.success_rate_by_backend[&BackendId::Tone], 1.0);
        let failure = &summary.last_failure_by_backend[&BackendId::Remote];
        assert_eq!(failure.outcome, AttemptStatus::Timeout);
        assert_eq!(failure.play_id, 1);
    }

    #[test]
    fn test_cancelled_only_backend_has_no_rate() {
        let reporter = DiagnosticsReporter::default();
        reporter.record(record(1, BackendId::Native, AttemptOutcome::Failed(FailureReason::Cancelled)));
        assert!(reporter.summary().success_rate_by_backend.is_empty());
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn test_attempts_for_play() {
        let reporter = DiagnosticsReporter::default();
        reporter.record(record(7, BackendId::Remote, AttemptOutcome::rejected("503")));
        reporter.record(record(8, BackendId::Tone, AttemptOutcome::played()));
        reporter.record(record(7, BackendId::Sensory, AttemptOutcome::played()));
        let backends: Vec<BackendId> = reporter.attempts_for(7).iter().map(|r| r.backend).collect();
        assert_eq!(backends, vec![BackendId::Remote, BackendId::Sensory]);
    }

    #[test]
    fn test_summary_serializes() {
        let reporter = DiagnosticsReporter::default();
        reporter.record(record(1, BackendId::Sensory, AttemptOutcome::played()));
        let json = serde_json::to_value(reporter.summary()).unwrap();
        assert_eq!(json["success_rate_by_backend"]["sensory"], 1.0);
    }
}
