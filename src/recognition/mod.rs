//! Streaming speech recognition
//!
//! This module provides:
//! - The blocking engine contract (`RecognitionEngine`) and its data types
//! - `StreamingBridge`, which runs one engine call on a dedicated blocking
//!   thread and hands final results to an async callback
//! - A NATS-backed engine adapter for the external STT service

mod bridge;
mod engine;
pub mod nats;

pub use bridge::{BridgeError, BridgeEvent, BridgeOptions, StreamingBridge, Utterance};
pub use engine::{
    language_code, AudioEncoding, AudioRequests, RecognitionConfig, RecognitionEngine,
    RecognitionResult, ResultStream, WordInfo,
};
pub use nats::NatsRecognizer;
