// Shared test doubles for the recognition engine and document backends.
#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use base64::Engine;
use live_minutes::document::{
    CellRange, ColumnLayout, CreatedTab, DocumentCreator, DocumentIo, MemoryDocuments, TabRef,
    TranscriptWriter,
};
use live_minutes::recognition::{
    AudioRequests, RecognitionConfig, RecognitionEngine, RecognitionResult, ResultStream, WordInfo,
};
use live_minutes::session::{SessionServices, SessionSettings};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Engine that answers each audio chunk with one result.
///
/// A chunk is UTF-8 `"<tag>|<text>"`; an empty tag means no speaker,
/// a text starting with `~` is an interim result, and `!fail` makes the
/// stream error out.
#[derive(Default)]
pub struct EchoEngine {
    pub received: Arc<Mutex<Vec<String>>>,
    pub configs: Arc<Mutex<Vec<RecognitionConfig>>>,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl RecognitionEngine for EchoEngine {
    fn streaming_recognize(
        &self,
        config: &RecognitionConfig,
        audio: AudioRequests,
    ) -> Result<ResultStream> {
        self.configs.lock().unwrap().push(config.clone());
        Ok(Box::new(EchoStream {
            audio,
            received: Arc::clone(&self.received),
        }))
    }
}

struct EchoStream {
    audio: AudioRequests,
    received: Arc<Mutex<Vec<String>>>,
}

impl Iterator for EchoStream {
    type Item = Result<RecognitionResult>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.audio.next()?;
        let raw = String::from_utf8_lossy(&chunk).to_string();
        self.received.lock().unwrap().push(raw.clone());

        let (tag, text) = raw.split_once('|').unwrap_or(("", raw.as_str()));
        if text == "!fail" {
            return Some(Err(anyhow!("engine exploded")));
        }

        let (is_final, text) = match text.strip_prefix('~') {
            Some(interim) => (false, interim),
            None => (true, text),
        };

        let words = match tag.parse::<u32>() {
            Ok(tag) => text
                .split_whitespace()
                .map(|word| WordInfo {
                    word: word.to_string(),
                    speaker_tag: tag,
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        Some(Ok(RecognitionResult {
            text: text.to_string(),
            is_final,
            words,
            confidence: 0.9,
        }))
    }
}

/// Engine whose result stream blocks far longer than any stop timeout
pub struct StallingEngine {
    pub stall: Duration,
}

impl RecognitionEngine for StallingEngine {
    fn streaming_recognize(
        &self,
        _config: &RecognitionConfig,
        _audio: AudioRequests,
    ) -> Result<ResultStream> {
        let stall = self.stall;
        Ok(Box::new(std::iter::from_fn(move || {
            std::thread::sleep(stall);
            None
        })))
    }
}

/// Engine that produces `results` final results without reading audio,
/// counting how many have been pulled from it
pub struct CountingEngine {
    pub results: usize,
    pub fetched: Arc<AtomicUsize>,
}

impl CountingEngine {
    pub fn new(results: usize) -> Self {
        Self {
            results,
            fetched: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl RecognitionEngine for CountingEngine {
    fn streaming_recognize(
        &self,
        _config: &RecognitionConfig,
        _audio: AudioRequests,
    ) -> Result<ResultStream> {
        let fetched = Arc::clone(&self.fetched);
        let total = self.results;
        Ok(Box::new(std::iter::from_fn(move || {
            let n = fetched.load(Ordering::SeqCst);
            if n >= total {
                return None;
            }
            fetched.store(n + 1, Ordering::SeqCst);
            Some(Ok(RecognitionResult {
                text: format!("result {}", n + 1),
                is_final: true,
                words: Vec::new(),
                confidence: 0.9,
            }))
        })))
    }
}

/// Engine that cannot open a stream at all
pub struct UnavailableEngine;

impl RecognitionEngine for UnavailableEngine {
    fn streaming_recognize(
        &self,
        _config: &RecognitionConfig,
        _audio: AudioRequests,
    ) -> Result<ResultStream> {
        bail!("speech service unreachable")
    }
}

/// Document backend wrapping `MemoryDocuments` with switchable failures
#[derive(Default)]
pub struct FlakyDocuments {
    pub inner: MemoryDocuments,
    pub fail_create: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DocumentCreator for FlakyDocuments {
    async fn create_tab(&self, title: &str, date: &str, time: &str) -> Result<CreatedTab> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("drive quota exceeded");
        }
        self.inner.create_tab(title, date, time).await
    }
}

#[async_trait::async_trait]
impl DocumentIo for FlakyDocuments {
    async fn read_column(&self, tab: &TabRef, range: &CellRange) -> Result<Vec<String>> {
        self.inner.read_column(tab, range).await
    }

    async fn write_cells(&self, tab: &TabRef, range: &CellRange, values: Vec<String>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("sheets write rate limited");
        }
        self.inner.write_cells(tab, range, values).await
    }
}

pub fn test_settings() -> SessionSettings {
    SessionSettings {
        default_speaker: "Host".to_string(),
        audio_poll_interval: Duration::from_millis(10),
        stop_timeout: Duration::from_secs(2),
        ..SessionSettings::default()
    }
}

pub fn services(
    engine: Arc<dyn RecognitionEngine>,
    documents: Arc<FlakyDocuments>,
) -> Arc<SessionServices> {
    Arc::new(SessionServices {
        documents: documents.clone(),
        writer: TranscriptWriter::new(documents, ColumnLayout::default()),
        engine,
        settings: test_settings(),
    })
}

/// Base64 audio payload understood by `EchoEngine`
pub fn echo_audio(tag: Option<u32>, text: &str) -> String {
    let raw = match tag {
        Some(tag) => format!("{}|{}", tag, text),
        None => format!("|{}", text),
    };
    base64::engine::general_purpose::STANDARD.encode(raw)
}
