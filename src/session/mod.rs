//! Live transcription sessions
//!
//! This module provides the `LiveSession` coordinator that manages:
//! - The session state machine (idle -> active -> streaming -> ended)
//! - Lazy start of the recognition bridge on the first audio chunk
//! - Speaker resolution and retroactive relabeling
//! - Incremental writes to the meeting document
//! - The process-wide session registry

mod config;
mod messages;
mod registry;
mod session;

pub use config::{parse_participants, SessionConfig, SessionServices, SessionSettings};
pub use messages::{ClientMessage, ParticipantList, ServerMessage};
pub use registry::{SessionMonitor, SessionPhase, SessionRegistry, SessionSnapshot};
pub use session::{LiveSession, SessionError};
