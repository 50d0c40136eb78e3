use serde::{Deserialize, Serialize};

use crate::recognition::{AudioEncoding, RecognitionResult, WordInfo};

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub audio: String, // Base64-encoded audio bytes
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_count: Option<u32>,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Per-word diarization detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordMessage {
    pub word: String,
    #[serde(default)]
    pub speaker_tag: u32,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub words: Vec<WordMessage>,
    /// Sent once after the final audio frame has been processed
    #[serde(default)]
    pub end_of_stream: bool,
}

impl From<TranscriptMessage> for RecognitionResult {
    fn from(msg: TranscriptMessage) -> Self {
        Self {
            text: msg.text,
            is_final: !msg.partial,
            words: msg
                .words
                .into_iter()
                .map(|w| WordInfo {
                    word: w.word,
                    speaker_tag: w.speaker_tag,
                })
                .collect(),
            confidence: msg.confidence.unwrap_or_default(),
        }
    }
}
