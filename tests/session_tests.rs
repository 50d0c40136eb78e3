// End-to-end session flows: start, streamed audio, speaker mapping, and end.

mod fixtures;

use fixtures::{echo_audio, services, EchoEngine, FlakyDocuments, UnavailableEngine};
use live_minutes::recognition::RecognitionEngine;
use live_minutes::session::{LiveSession, ServerMessage, SessionPhase, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    session: LiveSession,
    documents: Arc<FlakyDocuments>,
    registry: Arc<SessionRegistry>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_engine(Arc::new(EchoEngine::new())).await
    }

    async fn with_engine(engine: Arc<dyn RecognitionEngine>) -> Self {
        let documents = Arc::new(FlakyDocuments::new());
        let services = services(engine, documents.clone());
        let registry = Arc::new(SessionRegistry::new());
        let monitor = registry.register("session-1", "Host").await;

        Self {
            session: LiveSession::new("session-1".to_string(), services, monitor),
            documents,
            registry,
        }
    }

    async fn send(&mut self, frame: &str) -> Vec<ServerMessage> {
        self.session.handle_text(frame).await
    }

    async fn send_audio(&mut self, tag: Option<u32>, text: &str) -> Vec<ServerMessage> {
        let frame = serde_json::json!({ "type": "audio", "data": echo_audio(tag, text) });
        self.send(&frame.to_string()).await
    }

    /// Wait for the next recognition event and apply it
    async fn recognize(&mut self) -> Vec<ServerMessage> {
        let event = tokio::time::timeout(Duration::from_secs(5), self.session.next_event())
            .await
            .expect("timed out waiting for recognition")
            .expect("recognition channel closed");
        self.session.handle_event(event).await
    }

    async fn column(&self) -> Vec<String> {
        let tab = self
            .session
            .target()
            .expect("session has a document target")
            .tab_ref();
        self.documents.inner.column_values(&tab, "C", 13).await
    }
}

fn error_message(replies: &[ServerMessage]) -> &str {
    match replies {
        [ServerMessage::Error { message }] => message.as_str(),
        other => panic!("expected a single error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_start_creates_document_and_replies_status() {
    let mut h = Harness::new().await;

    let replies = h
        .send(r#"{"type":"start","language":"en","speaker":"Dana","meeting_title":"Standup"}"#)
        .await;

    match replies.as_slice() {
        [ServerMessage::Status {
            session_id,
            sheet_id,
            sheet_link,
            ..
        }] => {
            assert_eq!(session_id, "session-1");
            assert!(sheet_id.starts_with("memory-"));
            assert!(sheet_link.starts_with("memory://"));
        }
        other => panic!("unexpected replies: {:?}", other),
    }

    assert_eq!(h.session.phase(), SessionPhase::Active);
    assert_eq!(h.session.config().speaker, "Dana");
    assert_eq!(h.session.config().language, "en");
    assert!(h.session.target().unwrap().tab_name.ends_with("Standup"));
}

#[tokio::test]
async fn test_start_defaults() {
    let mut h = Harness::new().await;

    h.send(r#"{"type":"start","speaker":"  "}"#).await;

    let config = h.session.config();
    assert_eq!(config.language, "ko");
    assert_eq!(config.speaker, "Host");
    assert_eq!(config.meeting_title, "Untitled");
    assert!(config.participants.is_empty());
}

#[tokio::test]
async fn test_diarized_meeting_with_speaker_mapping() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start","language":"en","participants":["Alice","Bob"]}"#)
        .await;

    assert!(h.send_audio(Some(1), "hello everyone").await.is_empty());
    assert_eq!(h.session.phase(), SessionPhase::Streaming);

    let replies = h.recognize().await;
    assert_eq!(
        replies,
        vec![
            ServerMessage::SpeakerMappingRequired {
                speaker_id: 1,
                text: "hello everyone".to_string(),
                available_names: vec!["Alice".to_string(), "Bob".to_string()],
            },
            ServerMessage::TranscriptionRecorded {
                text: "hello everyone".to_string(),
                speaker: "Speaker 1".to_string(),
                speaker_changed: false,
                row: 13,
            },
        ]
    );

    let replies = h
        .send(r#"{"type":"speaker_mapping","speaker_id":1,"speaker_name":"Alice"}"#)
        .await;
    assert_eq!(
        replies,
        vec![ServerMessage::SpeakerMapped {
            speaker_id: 1,
            speaker_name: "Alice".to_string(),
        }]
    );
    assert_eq!(h.column().await, vec!["[Alice] hello everyone"]);
    assert_eq!(h.session.last_speaker(), Some("Alice"));

    h.send_audio(Some(2), "hi there").await;
    let replies = h.recognize().await;
    assert_eq!(
        replies[0],
        ServerMessage::SpeakerMappingRequired {
            speaker_id: 2,
            text: "hi there".to_string(),
            available_names: vec!["Bob".to_string()],
        }
    );
    assert!(matches!(
        &replies[1],
        ServerMessage::TranscriptionRecorded { speaker, speaker_changed: true, row: 15, .. }
            if speaker == "Speaker 2"
    ));

    h.send_audio(Some(1), "welcome").await;
    let replies = h.recognize().await;
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::TranscriptionRecorded { speaker, speaker_changed: true, row: 17, .. }]
            if speaker == "Alice"
    ));

    assert_eq!(
        h.column().await,
        vec![
            "[Alice] hello everyone",
            "",
            "[Speaker 2] hi there",
            "",
            "[Alice] welcome",
        ]
    );

    let replies = h.send(r#"{"type":"end"}"#).await;
    match replies.last() {
        Some(ServerMessage::Completed {
            transcription,
            transcription_count,
            sheet_id,
            ..
        }) => {
            assert_eq!(transcription, "hello everyone hi there welcome");
            assert_eq!(*transcription_count, 3);
            assert!(sheet_id.is_some());
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(h.session.is_ended());
    assert!(h.session.transcript().is_empty());
}

#[tokio::test]
async fn test_mapping_request_sent_once_per_tag() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;

    h.send_audio(Some(3), "first").await;
    let first = h.recognize().await;
    h.send_audio(Some(3), "second").await;
    let second = h.recognize().await;

    assert_eq!(first.len(), 2);
    assert!(matches!(
        second.as_slice(),
        [ServerMessage::TranscriptionRecorded { speaker, speaker_changed: false, .. }]
            if speaker == "Speaker 3"
    ));
    assert!(h.session.speakers().is_unresolved(3));
}

#[tokio::test]
async fn test_untagged_utterance_uses_session_speaker() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start","speaker":"Dana"}"#).await;

    h.send_audio(None, "no diarization here").await;
    let replies = h.recognize().await;

    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::TranscriptionRecorded { speaker, .. }] if speaker == "Dana"
    ));
}

#[tokio::test]
async fn test_client_transcription_uses_default_speaker() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;

    let replies = h.send(r#"{"type":"transcription","text":"typed note"}"#).await;
    assert_eq!(
        replies,
        vec![ServerMessage::TranscriptionRecorded {
            text: "typed note".to_string(),
            speaker: "Host".to_string(),
            speaker_changed: false,
            row: 13,
        }]
    );

    assert!(h
        .send(r#"{"type":"transcription","text":"   "}"#)
        .await
        .is_empty());
    assert_eq!(h.session.transcript().to_vec(), vec!["typed note"]);
}

#[tokio::test]
async fn test_end_without_lines_is_an_error() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;

    let replies = h.send(r#"{"type":"end"}"#).await;

    assert_eq!(error_message(&replies), "No transcription was recorded");
    assert!(h.session.is_ended());

    let late = h.send(r#"{"type":"transcription","text":"too late"}"#).await;
    assert_eq!(error_message(&late), "Session has ended");
}

#[tokio::test]
async fn test_unknown_message_type_leaves_state_unchanged() {
    let mut h = Harness::new().await;

    let replies = h.send(r#"{"type":"pause"}"#).await;
    assert_eq!(error_message(&replies), "Unknown message type: pause");
    assert_eq!(h.session.phase(), SessionPhase::Idle);

    h.send(r#"{"type":"start"}"#).await;
    let replies = h.send(r#"{"type":"rewind"}"#).await;
    assert!(error_message(&replies).contains("rewind"));
    assert_eq!(h.session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn test_malformed_frames_are_reported() {
    let mut h = Harness::new().await;

    assert!(error_message(&h.send("{not json").await).starts_with("Malformed message"));
    assert!(
        error_message(&h.send(r#"{"type":"speaker_mapping","speaker_id":"x"}"#).await)
            .starts_with("Malformed message")
    );
}

#[tokio::test]
async fn test_audio_before_start_is_rejected() {
    let mut h = Harness::new().await;

    let replies = h.send_audio(Some(1), "early").await;
    assert!(error_message(&replies).contains("not started"));

    let replies = h.session.handle_audio_bytes(b"1|raw".to_vec()).await;
    assert!(error_message(&replies).contains("not started"));
    assert_eq!(h.session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_invalid_base64_audio() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;

    let replies = h.send(r#"{"type":"audio","data":"***"}"#).await;
    assert!(error_message(&replies).starts_with("Invalid audio data"));
    assert_eq!(h.session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn test_binary_audio_frames_feed_recognition() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;

    assert!(h.session.handle_audio_bytes(b"|raw frame".to_vec()).await.is_empty());
    let replies = h.recognize().await;

    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::TranscriptionRecorded { text, .. }] if text == "raw frame"
    ));
}

#[tokio::test]
async fn test_document_creation_failure_allows_retry() {
    let mut h = Harness::new().await;
    h.documents.set_fail_create(true);

    let replies = h.send(r#"{"type":"start","meeting_title":"Retro"}"#).await;
    assert!(error_message(&replies).contains("drive quota exceeded"));
    assert_eq!(h.session.phase(), SessionPhase::Active);
    assert!(h.session.target().is_none());

    let replies = h.send(r#"{"type":"transcription","text":"lost"}"#).await;
    assert!(error_message(&replies).contains("No meeting sheet"));
    let replies = h.send_audio(Some(1), "lost").await;
    assert!(error_message(&replies).contains("No meeting sheet"));

    h.documents.set_fail_create(false);
    let replies = h.send(r#"{"type":"start","meeting_title":"Retro"}"#).await;
    assert!(matches!(replies.as_slice(), [ServerMessage::Status { .. }]));

    let replies = h.send(r#"{"type":"start"}"#).await;
    assert_eq!(error_message(&replies), "Session has already started");
}

#[tokio::test]
async fn test_write_failure_is_reported_per_line() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;

    h.documents.set_fail_writes(true);
    let replies = h.send(r#"{"type":"transcription","text":"one"}"#).await;
    assert!(error_message(&replies).contains("sheets write rate limited"));
    assert_eq!(h.session.last_speaker(), None);

    h.documents.set_fail_writes(false);
    let replies = h.send(r#"{"type":"transcription","text":"two"}"#).await;
    assert!(matches!(
        replies.as_slice(),
        [ServerMessage::TranscriptionRecorded { row: 13, speaker_changed: false, .. }]
    ));
    assert_eq!(h.column().await, vec!["[Host] two"]);

    // Both lines count toward the final transcript
    let replies = h.send(r#"{"type":"end"}"#).await;
    assert!(matches!(
        replies.last(),
        Some(ServerMessage::Completed { transcription_count: 2, transcription, .. })
            if transcription == "one two"
    ));
}

#[tokio::test]
async fn test_speaker_mapping_validation() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;

    let replies = h
        .send(r#"{"type":"speaker_mapping","speaker_id":1,"speaker_name":"  "}"#)
        .await;
    assert_eq!(error_message(&replies), "Speaker name must not be empty");

    // Tags the engine never produced can still be named
    let replies = h
        .send(r#"{"type":"speaker_mapping","speaker_id":9,"speaker_name":"Eve"}"#)
        .await;
    assert!(matches!(replies.as_slice(), [ServerMessage::SpeakerMapped { speaker_id: 9, .. }]));
    assert_eq!(h.session.speakers().name_of(9), Some("Eve"));
}

#[tokio::test]
async fn test_recognition_failure_is_reported() {
    let mut h = Harness::with_engine(Arc::new(UnavailableEngine)).await;
    h.send(r#"{"type":"start"}"#).await;

    assert!(h.send_audio(Some(1), "hello").await.is_empty());
    let replies = h.recognize().await;
    assert!(error_message(&replies).starts_with("Speech recognition stopped"));

    let replies = h.send_audio(Some(1), "again").await;
    assert!(error_message(&replies).starts_with("Speech recognition unavailable"));

    // Typed text still works after the engine is gone
    let replies = h.send(r#"{"type":"transcription","text":"manual"}"#).await;
    assert!(matches!(replies.as_slice(), [ServerMessage::TranscriptionRecorded { .. }]));
}

#[tokio::test]
async fn test_registry_tracks_session_progress() {
    let mut h = Harness::new().await;

    let snapshot = h.registry.get("session-1").await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert!(snapshot.start_time.is_none());

    h.send(r#"{"type":"start","meeting_title":"Planning"}"#).await;
    h.send(r#"{"type":"transcription","text":"agenda"}"#).await;

    let snapshot = h.registry.get("session-1").await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Active);
    assert_eq!(snapshot.meeting_title.as_deref(), Some("Planning"));
    assert_eq!(snapshot.transcription_count, 1);
    assert!(snapshot.start_time.is_some());
    assert!(snapshot.sheet_link.is_some());

    h.send(r#"{"type":"end"}"#).await;
    let snapshot = h.registry.get("session-1").await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Ended);
}

#[tokio::test]
async fn test_close_after_disconnect() {
    let mut h = Harness::new().await;
    h.send(r#"{"type":"start"}"#).await;
    h.send_audio(Some(1), "mid sentence").await;

    h.session.close().await;
    assert!(h.session.is_ended());

    h.session.close().await;
    assert!(h.session.is_ended());
}
