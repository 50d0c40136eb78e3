use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Audio container/codec the client streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// Browser MediaRecorder default
    WebmOpus,
    /// Raw 16-bit little-endian PCM
    Linear16,
}

/// Configuration for one streaming recognition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Engine locale, e.g. "ko-KR"
    pub language_code: String,

    /// Expected number of distinct voices, if known
    pub speaker_count: Option<u32>,

    pub encoding: AudioEncoding,

    pub sample_rate_hz: u32,

    pub enable_diarization: bool,

    pub enable_automatic_punctuation: bool,

    /// Interim results are never requested; the bridge drops them anyway
    pub interim_results: bool,
}

impl RecognitionConfig {
    pub fn new(language: &str, speaker_count: Option<u32>) -> Self {
        Self {
            language_code: language_code(language),
            speaker_count,
            encoding: AudioEncoding::WebmOpus,
            sample_rate_hz: 48000,
            enable_diarization: true,
            enable_automatic_punctuation: true,
            interim_results: false,
        }
    }
}

/// Map a short language code to an engine locale.
///
/// Already-qualified codes ("en-GB") pass through unchanged.
pub fn language_code(language: &str) -> String {
    let language = language.trim();
    if language.contains('-') {
        return language.to_string();
    }

    match language {
        "ko" => "ko-KR".to_string(),
        "en" => "en-US".to_string(),
        "ja" => "ja-JP".to_string(),
        "zh" => "zh-CN".to_string(),
        other => format!("{}-KR", other),
    }
}

/// One recognized word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordInfo {
    pub word: String,

    /// Diarization tag; 0 means the engine did not assign one
    #[serde(default)]
    pub speaker_tag: u32,
}

/// One result emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    pub is_final: bool,
    #[serde(default)]
    pub words: Vec<WordInfo>,
    #[serde(default)]
    pub confidence: f32,
}

impl RecognitionResult {
    /// Speaker of the utterance, taken from its first word
    pub fn speaker_tag(&self) -> Option<u32> {
        self.words
            .first()
            .map(|word| word.speaker_tag)
            .filter(|tag| *tag > 0)
    }
}

/// Blocking iterator over engine results
pub type ResultStream = Box<dyn Iterator<Item = Result<RecognitionResult>> + Send>;

/// Blocking, bidirectional speech engine.
///
/// `streaming_recognize` pulls audio from `audio` while the returned stream
/// is being read; both sides may block. Implementations are driven from a
/// dedicated blocking thread, never from an async worker.
pub trait RecognitionEngine: Send + Sync + 'static {
    fn streaming_recognize(
        &self,
        config: &RecognitionConfig,
        audio: AudioRequests,
    ) -> Result<ResultStream>;
}

/// Blocking audio request source fed by `StreamingBridge::send_audio`.
///
/// Each `next` waits at most `poll_interval` at a time on the queue so the
/// stop flag is observed promptly even when no audio arrives. Iteration ends
/// once the bridge is stopped or every sender is gone.
pub struct AudioRequests {
    queue: Receiver<Vec<u8>>,
    stopped: Arc<AtomicBool>,
    poll_interval: Duration,
    sent: usize,
}

impl AudioRequests {
    pub fn new(queue: Receiver<Vec<u8>>, stopped: Arc<AtomicBool>, poll_interval: Duration) -> Self {
        Self {
            queue,
            stopped,
            poll_interval,
            sent: 0,
        }
    }

    /// Number of chunks handed to the engine so far
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Iterator for AudioRequests {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                tracing::debug!("Audio feed stopped after {} chunks", self.sent);
                return None;
            }

            match self.queue.recv_timeout(self.poll_interval) {
                Ok(chunk) => {
                    self.sent += 1;
                    return Some(chunk);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}
