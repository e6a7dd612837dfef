//! Playback requests

use crate::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;

/// Generous per-character speaking time, words being read slowly
const WORD_CHAR_TIME: Duration = Duration::from_millis(90);
const SENTENCE_CHAR_TIME: Duration = Duration::from_millis(70);

/// Lead-in and tail of an utterance
const SPEECH_OVERHEAD: Duration = Duration::from_millis(400);

/// What the learner is listening to
///
/// Words are rendered slower and with longer tones than sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackKind {
    Word,
    Sentence,
}

/// A single validated request to make text audible
///
/// Immutable once built. The text is guaranteed to contain at least one
/// non-whitespace character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    text: String,
    kind: PlaybackKind,
    voice_profile: String,
}

impl PlaybackRequest {
    /// Build a request, rejecting empty or whitespace-only text
    pub fn new(
        text: impl Into<String>,
        kind: PlaybackKind,
        voice_profile: impl Into<String>,
    ) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(VoiceError::InvalidInput(
                "text to play must not be empty".to_string(),
            ));
        }
        Ok(Self {
            text,
            kind,
            voice_profile: voice_profile.into(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> PlaybackKind {
        self.kind
    }

    pub fn voice_profile(&self) -> &str {
        &self.voice_profile
    }

    /// Upper estimate of how long speaking the text takes
    pub fn estimated_speech(&self) -> Duration {
        let per_char = match self.kind {
            PlaybackKind::Word => WORD_CHAR_TIME,
            PlaybackKind::Sentence => SENTENCE_CHAR_TIME,
        };
        let chars = self.text.trim().chars().count() as u32;
        SPEECH_OVERHEAD + per_char * chars
    }

    /// Copy of this request with the text cut to at most `max_chars` characters
    ///
    /// Leading whitespace is dropped before counting. Cuts on a char
    /// boundary and prefers the last word boundary so the synthesized audio
    /// doesn't end mid-word.
    pub fn capped(&self, max_chars: usize) -> Self {
        match cap_text(&self.text, max_chars) {
            Cow::Borrowed(_) => self.clone(),
            Cow::Owned(text) => Self {
                text,
                kind: self.kind,
                voice_profile: self.voice_profile.clone(),
            },
        }
    }
}

fn cap_text(text: &str, max_chars: usize) -> Cow<'_, str> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }

    let body = text.trim_start();
    let Some((cut, _)) = body.char_indices().nth(max_chars) else {
        return Cow::Owned(body.to_string());
    };

    let head = &body[..cut];
    let trimmed = match head.rfind(char::is_whitespace) {
        Some(pos) if !head[..pos].trim().is_empty() => head[..pos].trim_end(),
        _ => head,
    };
    Cow::Owned(trimmed.to_string())
}
