pub mod config;
pub mod document;
pub mod http;
pub mod recognition;
pub mod session;
pub mod speakers;

pub use config::Config;
pub use document::{
    AppendOutcome, ColumnLayout, CreatedTab, DocumentCreator, DocumentIo, MemoryDocuments,
    SheetsDocuments, TabRef, TranscriptWriter,
};
pub use http::{create_router, AppState};
pub use recognition::{
    BridgeEvent, NatsRecognizer, RecognitionConfig, RecognitionEngine, RecognitionResult,
    StreamingBridge, Utterance,
};
pub use session::{
    ClientMessage, LiveSession, ServerMessage, SessionConfig, SessionPhase, SessionRegistry,
    SessionServices, SessionSettings,
};
pub use speakers::{SpeakerResolution, SpeakerTable};
