use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::document::ColumnLayout;
use crate::recognition::AudioEncoding;
use crate::session::SessionSettings;

/// Environment variable prefix; nesting uses a double underscore
/// (e.g. `LIVE_MINUTES__DOCUMENT__BACKEND=sheets`).
pub const ENV_PREFIX: &str = "LIVE_MINUTES";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub session: SessionDefaults,
    pub recognition: RecognitionSettings,
    pub document: DocumentSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub log_level: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "live-minutes".to_string(),
            log_level: "info".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub default_language: String,
    pub default_speaker: String,
    pub default_meeting_title: String,
    /// Upper bound on how long teardown waits for the recognition stream
    pub stop_timeout_ms: u64,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            default_language: "ko".to_string(),
            default_speaker: "Unknown".to_string(),
            default_meeting_title: "Untitled".to_string(),
            stop_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub nats_url: String,
    pub encoding: AudioEncoding,
    pub sample_rate_hz: u32,
    /// Bounded wait on the audio queue before re-checking the stop flag
    pub audio_poll_ms: u64,
    /// How long to keep reading transcripts after the last audio frame.
    /// Must stay below `session.stop_timeout_ms`.
    pub drain_timeout_ms: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            encoding: AudioEncoding::WebmOpus,
            sample_rate_hz: 48000,
            audio_poll_ms: 500,
            drain_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentBackend {
    Memory,
    Sheets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub backend: DocumentBackend,
    pub column: String,
    /// First transcript row, right below the template header block
    pub header_offset: u32,
    pub last_row: u32,
    pub template_sheet_id: String,
    pub drive_folder_id: Option<String>,
    pub access_token: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            backend: DocumentBackend::Memory,
            column: "C".to_string(),
            header_offset: 13,
            last_row: 1000,
            template_sheet_id: String::new(),
            drive_folder_id: None,
            access_token: String::new(),
        }
    }
}

impl DocumentSettings {
    pub fn layout(&self) -> ColumnLayout {
        ColumnLayout {
            column: self.column.clone(),
            header_offset: self.header_offset,
            last_row: self.last_row,
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus `LIVE_MINUTES__*` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// A drain that outlasts the stop timeout would turn every normal
    /// session end into a forced cancellation
    pub fn validate(&self) -> Result<()> {
        if self.recognition.drain_timeout_ms >= self.session.stop_timeout_ms {
            bail!(
                "recognition.drain_timeout_ms ({}) must be less than session.stop_timeout_ms ({})",
                self.recognition.drain_timeout_ms,
                self.session.stop_timeout_ms
            );
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_language: self.session.default_language.clone(),
            default_speaker: self.session.default_speaker.clone(),
            default_meeting_title: self.session.default_meeting_title.clone(),
            encoding: self.recognition.encoding,
            sample_rate_hz: self.recognition.sample_rate_hz,
            audio_poll_interval: Duration::from_millis(self.recognition.audio_poll_ms),
            stop_timeout: Duration::from_millis(self.session.stop_timeout_ms),
        }
    }
}
