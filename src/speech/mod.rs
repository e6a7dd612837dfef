//! Playback backends

pub mod backend;
pub mod backends;

pub use backend::{
    bounded, bounded_by, AttemptOutcome, AudioAsset, Backend, BackendId, Bounded, Deadline,
    FailureReason,
};
