//! Audio buffers, WAV encoding and output primitives

pub mod sink;
pub mod tone;
pub mod wav;

pub use sink::{AudioSink, PlayerCommand, ProcessSink};
pub use tone::{ToneSettings, ToneSynth};
pub use wav::{decode_wav, encode_wav};

use std::time::Duration;

/// Interleaved 16-bit PCM audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn mono(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Near-silent buffer used to probe whether output is permitted
    pub fn probe_blip(sample_rate: u32) -> Self {
        // 10ms of a barely-audible square wave
        let len = (sample_rate / 100).max(1) as usize;
        let samples = (0..len)
            .map(|i| if (i / 8) % 2 == 0 { 4 } else { -4 })
            .collect();
        Self::mono(samples, sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length of the buffer
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }
}
