//! Deterministic tone sequences for text
//!
//! Each character maps to a fixed pitch so the same word always sounds the
//! same. Letters walk a pentatonic scale, digits sit an octave higher,
//! whitespace becomes a rest and anything else a low marker tone.

use super::PcmBuffer;
use crate::config::Config;
use crate::request::PlaybackKind;
use std::f32::consts::TAU;
use std::time::Duration;

/// Semitone offsets of the major pentatonic scale
const PENTATONIC: [i32; 5] = [0, 2, 4, 7, 9];

/// A4 reference pitch
const BASE_HZ: f32 = 440.0;

/// Pitch used for punctuation and symbols
const MARKER_HZ: f32 = 196.0;

/// Attack/release ramp to avoid clicks at note edges
const RAMP: Duration = Duration::from_millis(8);

#[derive(Debug, Clone, PartialEq)]
pub struct ToneSettings {
    pub sample_rate: u32,
    pub note: Duration,
    pub gap: Duration,
    /// Peak amplitude, 0.0 - 1.0
    pub volume: f32,
    pub max_notes: usize,
}

impl ToneSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_rate: config.tone_sample_rate(),
            note: config.tone_note(),
            gap: config.tone_gap(),
            volume: config.tone_volume(),
            max_notes: config.tone_max_notes(),
        }
    }
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One step of a tone sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Note {
    Tone(f32),
    Rest,
}

/// Renders text into tone sequences
#[derive(Debug, Clone)]
pub struct ToneSynth {
    settings: ToneSettings,
}

impl ToneSynth {
    pub fn new(settings: ToneSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ToneSettings {
        &self.settings
    }

    /// Map text to notes, collapsing runs of whitespace into one rest
    pub fn notes(&self, text: &str) -> Vec<Note> {
        let mut notes = Vec::new();
        for ch in text.trim().chars() {
            if notes.len() >= self.settings.max_notes {
                break;
            }
            let note = note_for(ch);
            if note == Note::Rest && notes.last() == Some(&Note::Rest) {
                continue;
            }
            notes.push(note);
        }
        notes
    }

    /// Render text to PCM
    ///
    /// Words get full-length notes so a single word is clearly audible;
    /// sentences use shorter notes to keep the sequence brief.
    pub fn render(&self, text: &str, kind: PlaybackKind) -> PcmBuffer {
        let note_len = match kind {
            PlaybackKind::Word => self.settings.note,
            PlaybackKind::Sentence => self.settings.note / 2,
        };
        let rate = self.settings.sample_rate;
        let note_samples = samples_for(note_len, rate);
        let gap_samples = samples_for(self.settings.gap, rate);
        let ramp_samples = samples_for(RAMP, rate).min(note_samples / 2).max(1);

        let notes = self.notes(text);
        let mut samples = Vec::with_capacity(notes.len() * (note_samples + gap_samples));
        let amplitude = self.settings.volume * i16::MAX as f32;

        for note in notes {
            match note {
                Note::Tone(hz) => {
                    for i in 0..note_samples {
                        let t = i as f32 / rate as f32;
                        let envelope = envelope(i, note_samples, ramp_samples);
                        let value = (TAU * hz * t).sin() * amplitude * envelope;
                        samples.push(value as i16);
                    }
                }
                Note::Rest => samples.extend(std::iter::repeat(0).take(note_samples)),
            }
            samples.extend(std::iter::repeat(0).take(gap_samples));
        }

        PcmBuffer::mono(samples, rate)
    }
}

fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_micros() * sample_rate as u128 / 1_000_000) as usize
}

fn envelope(i: usize, len: usize, ramp: usize) -> f32 {
    if i < ramp {
        i as f32 / ramp as f32
    } else if i + ramp >= len {
        (len - i) as f32 / ramp as f32
    } else {
        1.0
    }
}

fn semitone_hz(semitones: i32) -> f32 {
    BASE_HZ * 2f32.powf(semitones as f32 / 12.0)
}

fn note_for(ch: char) -> Note {
    if ch.is_whitespace() {
        return Note::Rest;
    }
    if let Some(digit) = ch.to_digit(10) {
        let idx = digit as i32;
        return Note::Tone(semitone_hz(12 + PENTATONIC[(idx % 5) as usize] + 12 * (idx / 5)));
    }
    if ch.is_alphabetic() {
        let lower = ch.to_lowercase().next().unwrap_or(ch);
        let idx = if lower.is_ascii_lowercase() {
            (lower as u32 - 'a' as u32) as i32
        } else {
            (lower as u32 % 26) as i32
        };
        // Two and a bit octaves starting one octave below A4
        let octave = idx / 5;
        return Note::Tone(semitone_hz(-12 + PENTATONIC[(idx % 5) as usize] + 12 * (octave % 3)));
    }
    Note::Tone(MARKER_HZ)
}
