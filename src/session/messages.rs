use serde::{Deserialize, Serialize};

use super::config::parse_participants;

/// Participant list as either "Alice, Bob" or ["Alice", "Bob"]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParticipantList {
    Csv(String),
    Names(Vec<String>),
}

impl ParticipantList {
    pub fn into_names(self) -> Vec<String> {
        match self {
            Self::Csv(raw) => parse_participants(&raw),
            Self::Names(names) => names
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }
}

/// Client -> server frames
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Start {
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        speaker: Option<String>,
        #[serde(default)]
        meeting_title: Option<String>,
        #[serde(default)]
        participants: Option<ParticipantList>,
    },
    Audio {
        /// Base64-encoded audio chunk
        data: String,
    },
    Transcription {
        text: String,
    },
    SpeakerMapping {
        speaker_id: u32,
        speaker_name: String,
    },
    End,
}

impl ClientMessage {
    pub const TYPES: [&'static str; 5] = ["start", "audio", "transcription", "speaker_mapping", "end"];
}

/// Server -> client frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        message: String,
        session_id: String,
        sheet_id: String,
        sheet_link: String,
    },
    SpeakerMappingRequired {
        speaker_id: u32,
        text: String,
        available_names: Vec<String>,
    },
    TranscriptionRecorded {
        text: String,
        speaker: String,
        speaker_changed: bool,
        row: u32,
    },
    SpeakerMapped {
        speaker_id: u32,
        speaker_name: String,
    },
    Completed {
        message: String,
        sheet_id: Option<String>,
        sheet_link: Option<String>,
        transcription: String,
        transcription_count: usize,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}
