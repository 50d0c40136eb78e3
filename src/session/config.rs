use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::document::{DocumentCreator, TranscriptWriter};
use crate::recognition::{AudioEncoding, RecognitionEngine};

/// Configuration for a live session, captured from the "start" message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Short language code as sent by the client (e.g. "ko")
    pub language: String,

    /// Label for client-supplied text and untagged utterances
    pub speaker: String,

    pub meeting_title: String,

    /// Expected participant names, in the order the client listed them
    pub participants: Vec<String>,
}

impl SessionConfig {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            language: settings.default_language.clone(),
            speaker: settings.default_speaker.clone(),
            meeting_title: settings.default_meeting_title.clone(),
            participants: Vec::new(),
        }
    }

    /// Expected speaker count for diarization (unset when no participants)
    pub fn speaker_count(&self) -> Option<u32> {
        match self.participants.len() {
            0 => None,
            n => Some(n as u32),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

/// Split a comma-separated participant list, trimming and dropping blanks
pub fn parse_participants(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Process-wide session defaults and recognition tuning
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_language: String,
    pub default_speaker: String,
    pub default_meeting_title: String,
    pub encoding: AudioEncoding,
    pub sample_rate_hz: u32,
    pub audio_poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_language: "ko".to_string(),
            default_speaker: "Unknown".to_string(),
            default_meeting_title: "Untitled".to_string(),
            encoding: AudioEncoding::WebmOpus,
            sample_rate_hz: 48000,
            audio_poll_interval: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Collaborators shared by every session
pub struct SessionServices {
    pub documents: Arc<dyn DocumentCreator>,
    pub writer: TranscriptWriter,
    pub engine: Arc<dyn RecognitionEngine>,
    pub settings: SessionSettings,
}
