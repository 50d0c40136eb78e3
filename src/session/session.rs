use super::config::{SessionConfig, SessionServices};
use super::messages::{ClientMessage, ParticipantList, ServerMessage};
use super::registry::{SessionMonitor, SessionPhase};
use crate::document::{CreatedTab, TabRef};
use crate::recognition::{
    BridgeError, BridgeEvent, BridgeOptions, RecognitionConfig, StreamingBridge, Utterance,
};
use crate::speakers::{placeholder_label, SpeakerTable};
use base64::Engine;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Protocol and state errors reported back to the client
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid audio data: {0}")]
    InvalidAudio(#[from] base64::DecodeError),

    #[error("Session has not started; send a start message first")]
    NotStarted,

    #[error("Session has already started")]
    AlreadyStarted,

    #[error("No meeting sheet for this session; send start again to retry")]
    NoDocumentTarget,

    #[error("Session has ended")]
    Ended,

    #[error("Speaker name must not be empty")]
    EmptySpeakerName,

    #[error("Speech recognition unavailable: {0}")]
    Bridge(#[from] BridgeError),
}

/// Coordinator for one live connection.
///
/// Client frames and recognition events are applied strictly one at a
/// time by whoever owns the session, so no internal locking is needed.
pub struct LiveSession {
    id: String,
    services: Arc<SessionServices>,
    monitor: Arc<SessionMonitor>,

    config: SessionConfig,
    phase: SessionPhase,
    started_at: Option<DateTime<Local>>,

    /// Text of every line received, written or not
    transcript: Vec<String>,

    /// Speaker of the last line successfully written
    last_speaker: Option<String>,

    speakers: SpeakerTable,
    bridge: Option<StreamingBridge>,
    target: Option<CreatedTab>,

    /// Bridge callback side; results are queued here until the owner polls
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
    events_rx: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl LiveSession {
    pub fn new(id: String, services: Arc<SessionServices>, monitor: Arc<SessionMonitor>) -> Self {
        let config = SessionConfig::from_settings(&services.settings);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!("Creating live session: {}", id);

        Self {
            id,
            services,
            monitor,
            config,
            phase: SessionPhase::Idle,
            started_at: None,
            transcript: Vec::new(),
            last_speaker: None,
            speakers: SpeakerTable::default(),
            bridge: None,
            target: None,
            events_tx,
            events_rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase == SessionPhase::Ended
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn speakers(&self) -> &SpeakerTable {
        &self.speakers
    }

    pub fn target(&self) -> Option<&CreatedTab> {
        self.target.as_ref()
    }

    pub fn last_speaker(&self) -> Option<&str> {
        self.last_speaker.as_deref()
    }

    /// Wait for the next recognition event. Pending forever while no
    /// recognition stream is running.
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        self.events_rx.recv().await
    }

    /// Apply one raw text frame from the client
    pub async fn handle_text(&mut self, raw: &str) -> Vec<ServerMessage> {
        match parse_client_message(raw) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("Session {}: {}", self.id, e);
                vec![ServerMessage::error(e)]
            }
        }
    }

    /// Apply one binary frame (raw audio, no base64)
    pub async fn handle_audio_bytes(&mut self, chunk: Vec<u8>) -> Vec<ServerMessage> {
        if self.is_ended() {
            return vec![ServerMessage::error(SessionError::Ended)];
        }
        self.push_audio(chunk).await.unwrap_or_else(|e| self.report(e))
    }

    pub async fn handle_message(&mut self, message: ClientMessage) -> Vec<ServerMessage> {
        if self.is_ended() {
            return vec![ServerMessage::error(SessionError::Ended)];
        }

        let result = match message {
            ClientMessage::Start {
                language,
                speaker,
                meeting_title,
                participants,
            } => self.start(language, speaker, meeting_title, participants).await,
            ClientMessage::Audio { data } => {
                match base64::engine::general_purpose::STANDARD.decode(data.as_bytes()) {
                    Ok(chunk) => self.push_audio(chunk).await,
                    Err(e) => Err(e.into()),
                }
            }
            ClientMessage::Transcription { text } => self.record_client_text(&text).await,
            ClientMessage::SpeakerMapping {
                speaker_id,
                speaker_name,
            } => self.map_speaker(speaker_id, &speaker_name).await,
            ClientMessage::End => Ok(self.end().await),
        };

        result.unwrap_or_else(|e| self.report(e))
    }

    /// Apply one event delivered by the recognition bridge
    pub async fn handle_event(&mut self, event: BridgeEvent) -> Vec<ServerMessage> {
        if self.is_ended() {
            debug!("Session {} ended, dropping recognition event", self.id);
            return Vec::new();
        }

        match event {
            BridgeEvent::Utterance(utterance) => self.record_utterance(utterance).await,
            BridgeEvent::Failed(reason) => {
                error!("Session {}: speech recognition failed: {}", self.id, reason);
                vec![ServerMessage::error(format!(
                    "Speech recognition stopped: {}",
                    reason
                ))]
            }
        }
    }

    /// Tear down after the transport went away. Nothing is reported.
    pub async fn close(&mut self) {
        if self.is_ended() {
            return;
        }

        info!("Closing session {} after disconnect", self.id);
        self.stop_recognition().await;
        self.finish().await;
    }

    async fn start(
        &mut self,
        language: Option<String>,
        speaker: Option<String>,
        meeting_title: Option<String>,
        participants: Option<ParticipantList>,
    ) -> Result<Vec<ServerMessage>, SessionError> {
        match self.phase {
            SessionPhase::Idle => {}
            // Document creation failed earlier; allow a retry
            SessionPhase::Active if self.target.is_none() => {}
            _ => return Err(SessionError::AlreadyStarted),
        }

        let settings = &self.services.settings;
        self.config = SessionConfig {
            language: non_blank(language).unwrap_or_else(|| settings.default_language.clone()),
            speaker: non_blank(speaker).unwrap_or_else(|| settings.default_speaker.clone()),
            meeting_title: non_blank(meeting_title)
                .unwrap_or_else(|| settings.default_meeting_title.clone()),
            participants: participants.map(ParticipantList::into_names).unwrap_or_default(),
        };
        self.speakers.set_participants(self.config.participants.clone());

        let now = Local::now();
        self.started_at = Some(now);
        self.phase = SessionPhase::Active;

        info!(
            "Session {} started: speaker={}, language={}, meeting_title={}, participants={:?}",
            self.id,
            self.config.speaker,
            self.config.language,
            self.config.meeting_title,
            self.config.participants
        );

        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M").to_string();
        let created = self
            .services
            .documents
            .create_tab(&self.config.meeting_title, &date, &time)
            .await;

        let reply = match created {
            Ok(tab) => {
                info!(
                    "Session {} writing to {} ({})",
                    self.id, tab.file_id, tab.web_link
                );
                let reply = ServerMessage::Status {
                    message: "Recording started".to_string(),
                    session_id: self.id.clone(),
                    sheet_id: tab.file_id.clone(),
                    sheet_link: tab.web_link.clone(),
                };
                self.target = Some(tab);
                reply
            }
            Err(e) => {
                error!("Session {}: meeting sheet creation failed: {:#}", self.id, e);
                ServerMessage::error(format!("Failed to create meeting sheet: {:#}", e))
            }
        };

        self.publish().await;

        Ok(vec![reply])
    }

    async fn push_audio(&mut self, chunk: Vec<u8>) -> Result<Vec<ServerMessage>, SessionError> {
        if self.phase == SessionPhase::Idle {
            return Err(SessionError::NotStarted);
        }

        if let Some(bridge) = &self.bridge {
            bridge.send_audio(chunk)?;
            return Ok(Vec::new());
        }

        if self.target.is_none() {
            return Err(SessionError::NoDocumentTarget);
        }

        let settings = &self.services.settings;
        let config = RecognitionConfig {
            encoding: settings.encoding,
            sample_rate_hz: settings.sample_rate_hz,
            ..RecognitionConfig::new(&self.config.language, self.config.speaker_count())
        };
        let options = BridgeOptions {
            poll_interval: settings.audio_poll_interval,
            stop_timeout: settings.stop_timeout,
        };

        let mut bridge = StreamingBridge::new(Arc::clone(&self.services.engine), config, options);

        // Queue the first chunk before the engine call opens so it never
        // starts out waiting on empty input
        bridge.send_audio(chunk)?;

        let events = self.events_tx.clone();
        bridge.start(move |event| {
            let _ = events.send(event);
            std::future::ready(())
        })?;

        self.bridge = Some(bridge);
        self.phase = SessionPhase::Streaming;
        info!("Session {} streaming audio", self.id);
        self.publish().await;

        Ok(Vec::new())
    }

    async fn record_client_text(&mut self, text: &str) -> Result<Vec<ServerMessage>, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let tab = self.tab_ref().ok_or(SessionError::NoDocumentTarget)?;
        let speaker = self.config.speaker.clone();

        Ok(self.record_line(&tab, speaker, text.to_string()).await)
    }

    async fn record_utterance(&mut self, utterance: Utterance) -> Vec<ServerMessage> {
        if utterance.text.is_empty() {
            debug!("Session {}: skipping empty utterance", self.id);
            return Vec::new();
        }

        let Some(tab) = self.tab_ref() else {
            return vec![ServerMessage::error(SessionError::NoDocumentTarget)];
        };

        let mut replies = Vec::new();
        let speaker = match utterance.speaker_tag {
            Some(tag) => {
                let resolution = self.speakers.resolve(tag);
                if resolution.mapping_requested {
                    replies.push(ServerMessage::SpeakerMappingRequired {
                        speaker_id: tag,
                        text: utterance.text.clone(),
                        available_names: self.speakers.available_names(tag),
                    });
                }
                resolution.name
            }
            None => self.config.speaker.clone(),
        };

        replies.extend(self.record_line(&tab, speaker, utterance.text).await);
        replies
    }

    async fn record_line(&mut self, tab: &TabRef, speaker: String, text: String) -> Vec<ServerMessage> {
        self.transcript.push(text.clone());
        self.publish().await;

        let appended = self
            .services
            .writer
            .append(tab, &speaker, &text, self.last_speaker.as_deref())
            .await;

        match appended {
            Ok(outcome) => {
                info!(
                    "Session {}: row {} [{}] {}",
                    self.id, outcome.row, outcome.speaker, text
                );
                self.last_speaker = Some(speaker);
                vec![ServerMessage::TranscriptionRecorded {
                    text,
                    speaker: outcome.speaker,
                    speaker_changed: outcome.speaker_changed,
                    row: outcome.row,
                }]
            }
            Err(e) => {
                error!("Session {}: failed to record transcription: {:#}", self.id, e);
                vec![ServerMessage::error(format!(
                    "Failed to record transcription: {:#}",
                    e
                ))]
            }
        }
    }

    async fn map_speaker(&mut self, tag: u32, name: &str) -> Result<Vec<ServerMessage>, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptySpeakerName);
        }

        let placeholder = placeholder_label(tag);
        self.speakers.assign(tag, name);

        // The last turn in the document now carries the new name
        if self.last_speaker.as_deref() == Some(placeholder.as_str()) {
            self.last_speaker = Some(name.to_string());
        }

        let mut replies = vec![ServerMessage::SpeakerMapped {
            speaker_id: tag,
            speaker_name: name.to_string(),
        }];

        if let Some(tab) = self.tab_ref() {
            match self.services.writer.relabel(&tab, &placeholder, name).await {
                Ok(changed) => debug!(
                    "Session {}: relabeled {} lines for tag {}",
                    self.id, changed, tag
                ),
                Err(e) => {
                    error!("Session {}: relabel failed: {:#}", self.id, e);
                    replies.push(ServerMessage::error(format!(
                        "Failed to relabel {}: {:#}",
                        placeholder, e
                    )));
                }
            }
        }

        Ok(replies)
    }

    async fn end(&mut self) -> Vec<ServerMessage> {
        info!("Ending session {}", self.id);
        self.stop_recognition().await;

        // Results that arrived before the stream closed still get written
        let mut replies = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            replies.extend(self.handle_event(event).await);
        }

        let full_transcription = self.transcript.join(" ");
        if full_transcription.trim().is_empty() {
            replies.push(ServerMessage::error("No transcription was recorded"));
        } else {
            replies.push(ServerMessage::Completed {
                message: "Meeting transcript saved".to_string(),
                sheet_id: self.target.as_ref().map(|tab| tab.file_id.clone()),
                sheet_link: self.target.as_ref().map(|tab| tab.web_link.clone()),
                transcription: full_transcription,
                transcription_count: self.transcript.len(),
            });
        }

        self.finish().await;
        replies
    }

    async fn stop_recognition(&mut self) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.stop().await;
        }
    }

    async fn finish(&mut self) {
        self.bridge = None;
        self.transcript.clear();
        self.phase = SessionPhase::Ended;
        self.publish().await;
        info!("Session {} ended", self.id);
    }

    fn tab_ref(&self) -> Option<TabRef> {
        self.target.as_ref().map(CreatedTab::tab_ref)
    }

    fn report(&self, error: SessionError) -> Vec<ServerMessage> {
        warn!("Session {}: {}", self.id, error);
        vec![ServerMessage::error(error)]
    }

    async fn publish(&mut self) {
        let phase = self.phase;
        let speaker = self.config.speaker.clone();
        let meeting_title = self.started_at.map(|_| self.config.meeting_title.clone());
        let start_time = self.started_at;
        let count = self.transcript.len();
        let sheet_link = self.target.as_ref().map(|tab| tab.web_link.clone());

        self.monitor
            .update(move |snapshot| {
                snapshot.phase = phase;
                snapshot.speaker = speaker;
                snapshot.meeting_title = meeting_title;
                snapshot.start_time = start_time;
                snapshot.transcription_count = count;
                snapshot.sheet_link = sheet_link;
            })
            .await;
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a client frame, separating unknown types from malformed payloads
fn parse_client_message(raw: &str) -> Result<ClientMessage, SessionError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| SessionError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| SessionError::Malformed("missing \"type\" field".to_string()))?;

    if !ClientMessage::TYPES.contains(&kind) {
        return Err(SessionError::UnknownMessageType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| SessionError::Malformed(e.to_string()))
}
