use super::engine::{AudioRequests, RecognitionConfig, RecognitionEngine, RecognitionResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// At most one result is in flight between the blocking reader and the
/// callback task
const RESULT_BUFFER: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("recognition stream has stopped")]
    Stopped,
}

/// A final recognized utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub speaker_tag: Option<u32>,
    pub confidence: f32,
}

impl From<RecognitionResult> for Utterance {
    fn from(result: RecognitionResult) -> Self {
        Self {
            speaker_tag: result.speaker_tag(),
            text: result.text.trim().to_string(),
            confidence: result.confidence,
        }
    }
}

/// Delivered to the bridge callback, one at a time and in engine order
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Utterance(Utterance),
    /// The engine call failed; the bridge is stopped and will not emit again
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Bounded wait on the audio queue
    pub poll_interval: Duration,
    /// How long `stop` waits for the callback task before aborting it
    pub stop_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Adapts one blocking `RecognitionEngine` call into a non-blocking
/// audio sink plus an async result callback.
pub struct StreamingBridge {
    engine: Arc<dyn RecognitionEngine>,
    config: RecognitionConfig,
    options: BridgeOptions,

    /// Producer side of the audio queue
    audio_tx: std_mpsc::Sender<Vec<u8>>,

    /// Consumer side, handed to the engine on `start`
    audio_rx: Option<std_mpsc::Receiver<Vec<u8>>>,

    /// Set by `stop`, by engine failure, or by end of stream
    stopped: Arc<AtomicBool>,

    /// Number of chunks accepted by `send_audio`
    chunks_queued: AtomicUsize,

    started: bool,

    /// Task delivering results to the callback
    consumer: Option<JoinHandle<()>>,
}

impl StreamingBridge {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        config: RecognitionConfig,
        options: BridgeOptions,
    ) -> Self {
        let (audio_tx, audio_rx) = std_mpsc::channel();

        Self {
            engine,
            config,
            options,
            audio_tx,
            audio_rx: Some(audio_rx),
            stopped: Arc::new(AtomicBool::new(false)),
            chunks_queued: AtomicUsize::new(0),
            started: false,
            consumer: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn chunks_queued(&self) -> usize {
        self.chunks_queued.load(Ordering::SeqCst)
    }

    /// Queue an audio chunk. Never blocks; valid before `start`.
    pub fn send_audio(&self, chunk: Vec<u8>) -> Result<(), BridgeError> {
        if self.is_stopped() {
            return Err(BridgeError::Stopped);
        }

        let len = chunk.len();
        self.audio_tx.send(chunk).map_err(|_| BridgeError::Stopped)?;
        let queued = self.chunks_queued.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Queued audio chunk: {} bytes (#{})", len, queued);

        Ok(())
    }

    /// Start the engine call. `on_event` is awaited for each final result
    /// before the next one is fetched from the engine. Only the first call
    /// has any effect.
    pub fn start<F, Fut>(&mut self, mut on_event: F) -> Result<(), BridgeError>
    where
        F: FnMut(BridgeEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopped() {
            return Err(BridgeError::Stopped);
        }

        let Some(audio_rx) = self.audio_rx.take() else {
            warn!("Recognition stream already started");
            return Ok(());
        };
        self.started = true;

        info!(
            "Starting recognition stream (language={}, speakers={:?})",
            self.config.language_code, self.config.speaker_count
        );

        let requests = AudioRequests::new(
            audio_rx,
            Arc::clone(&self.stopped),
            self.options.poll_interval,
        );
        let (result_tx, mut result_rx) = mpsc::channel(RESULT_BUFFER);
        // The consumer acks each result once handled; the reader waits for
        // the ack before pulling the next one from the engine
        let (ack_tx, ack_rx) = std_mpsc::channel::<()>();

        // Blocking side: open the call and read results on the blocking pool
        let engine = Arc::clone(&self.engine);
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let stream = match engine.streaming_recognize(&config, requests) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = result_tx.blocking_send(Err(e));
                    return;
                }
            };

            for item in stream {
                let failed = item.is_err();
                if result_tx.blocking_send(item).is_err() || failed {
                    break;
                }
                if ack_rx.recv().is_err() {
                    break;
                }
            }

            debug!("Recognition reader finished");
        });

        // Async side: deliver final results one at a time
        let stopped = Arc::clone(&self.stopped);
        let consumer = tokio::spawn(async move {
            let mut delivered = 0usize;

            while let Some(item) = result_rx.recv().await {
                match item {
                    Ok(result) if !result.is_final => {
                        debug!("Dropping interim result");
                        let _ = ack_tx.send(());
                    }
                    Ok(result) => {
                        let utterance = Utterance::from(result);
                        info!(
                            "Recognized: speaker={:?}, confidence={:.2}, text={}",
                            utterance.speaker_tag, utterance.confidence, utterance.text
                        );
                        delivered += 1;
                        on_event(BridgeEvent::Utterance(utterance)).await;
                        let _ = ack_tx.send(());
                    }
                    Err(e) => {
                        error!("Recognition stream failed: {:#}", e);
                        stopped.store(true, Ordering::SeqCst);
                        on_event(BridgeEvent::Failed(format!("{:#}", e))).await;
                        break;
                    }
                }
            }

            stopped.store(true, Ordering::SeqCst);
            info!("Recognition stream ended ({} results delivered)", delivered);
        });

        self.consumer = Some(consumer);

        Ok(())
    }

    /// Stop the stream and wait (bounded) for the callback task. Idempotent.
    pub async fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Never started: dropping the queue is enough
        self.audio_rx.take();

        let Some(consumer) = self.consumer.take() else {
            return;
        };

        info!("Stopping recognition stream");
        let abort = consumer.abort_handle();

        match tokio::time::timeout(self.options.stop_timeout, consumer).await {
            Ok(Ok(())) => info!("Recognition stream stopped"),
            Ok(Err(e)) => error!("Recognition task panicked: {}", e),
            Err(_) => {
                warn!(
                    "Recognition stream did not finish within {:?}, cancelling",
                    self.options.stop_timeout
                );
                abort.abort();
            }
        }
    }
}
