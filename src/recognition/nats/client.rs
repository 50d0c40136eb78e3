use anyhow::{anyhow, Context, Result};
use async_nats::Client;
use base64::Engine;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::messages::{AudioFrameMessage, TranscriptMessage};
use crate::recognition::{
    AudioRequests, RecognitionConfig, RecognitionEngine, RecognitionResult, ResultStream,
};

/// Subject the STT service publishes partial and final transcripts on
pub const TRANSCRIPT_SUBJECT: &str = "stt.text.>";

/// How long one wait on the transcript subscription may block
const TRANSCRIPT_POLL: Duration = Duration::from_millis(250);

/// Thin async wrapper around the NATS connection
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish one audio frame for `stream_id`
    pub async fn publish_audio_frame(
        &self,
        stream_id: &str,
        config: &RecognitionConfig,
        audio: &[u8],
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("audio.frame.{}", stream_id);

        let message = AudioFrameMessage {
            session_id: stream_id.to_string(),
            sequence,
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            encoding: config.encoding,
            sample_rate: config.sample_rate_hz,
            language: config.language_code.clone(),
            speaker_count: config.speaker_count,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={}, final={})",
            subject,
            sequence,
            audio.len(),
            is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages (partial and final, all streams).
    ///
    /// The STT service publishes every stream on `stt.text.partial` and
    /// `stt.text.final`; callers filter payloads by stream id.
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        info!("Subscribing to transcripts on {}", TRANSCRIPT_SUBJECT);

        let subscriber = self
            .client
            .subscribe(TRANSCRIPT_SUBJECT)
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(subscriber)
    }
}

/// `RecognitionEngine` backed by the STT service on NATS.
///
/// The engine contract is blocking, so every NATS call is driven through
/// the runtime handle captured at construction time. Must be used from a
/// blocking thread (the bridge guarantees this).
pub struct NatsRecognizer {
    client: NatsClient,
    handle: Handle,
    drain_timeout: Duration,
}

impl NatsRecognizer {
    pub async fn connect(url: &str, drain_timeout: Duration) -> Result<Self> {
        let client = NatsClient::connect(url).await?;

        Ok(Self {
            client,
            handle: Handle::current(),
            drain_timeout,
        })
    }
}

impl RecognitionEngine for NatsRecognizer {
    fn streaming_recognize(
        &self,
        config: &RecognitionConfig,
        audio: AudioRequests,
    ) -> Result<ResultStream> {
        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());
        info!("Opening NATS recognition stream {}", stream_id);

        // Subscribe before the first frame goes out so no transcript is missed
        let subscriber = self.handle.block_on(self.client.subscribe_transcripts())?;
        let transcripts = subscriber.map(|msg| msg.payload.to_vec()).boxed();

        let client = self.client.clone();
        let handle = self.handle.clone();
        let config = config.clone();
        let frame_stream_id = stream_id.clone();
        let publish = move |chunk: &[u8], sequence: u32, is_final: bool| {
            handle.block_on(client.publish_audio_frame(
                &frame_stream_id,
                &config,
                chunk,
                sequence,
                is_final,
            ))
        };

        open_stream(
            self.handle.clone(),
            stream_id,
            audio,
            transcripts,
            publish,
            self.drain_timeout,
        )
    }
}

/// State the audio feed shares with the transcript reader
#[derive(Default)]
struct FeedStatus {
    /// Set once the final frame went out
    closed: AtomicBool,

    /// First publish error; taken once by the reader
    failure: Mutex<Option<anyhow::Error>>,
}

impl FeedStatus {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn fail(&self, error: anyhow::Error) {
        if let Ok(mut slot) = self.failure.lock() {
            slot.get_or_insert(error);
        }
    }

    fn take_failure(&self) -> Option<anyhow::Error> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Start the audio feed thread and return the transcript reader for one stream.
///
/// `publish(chunk, sequence, is_final)` sends one frame and may block.
fn open_stream<P>(
    handle: Handle,
    stream_id: String,
    audio: AudioRequests,
    transcripts: BoxStream<'static, Vec<u8>>,
    publish: P,
    drain_timeout: Duration,
) -> Result<ResultStream>
where
    P: FnMut(&[u8], u32, bool) -> Result<()> + Send + 'static,
{
    let status = Arc::new(FeedStatus::default());

    {
        let status = Arc::clone(&status);
        let stream_id = stream_id.clone();
        std::thread::Builder::new()
            .name("nats-audio-feed".to_string())
            .spawn(move || {
                let frames = feed_audio(audio, publish, &status);
                info!("Audio feed for {} finished after {} frames", stream_id, frames);
            })
            .context("Failed to spawn audio feed thread")?;
    }

    Ok(Box::new(TranscriptStream {
        transcripts,
        handle,
        stream_id,
        status,
        drain_timeout,
        drain_deadline: None,
    }))
}

/// Publish every chunk, then a final empty frame. Stops at the first
/// publish error and records it in `status`. Returns the frames published.
fn feed_audio<I, P>(audio: I, mut publish: P, status: &FeedStatus) -> u32
where
    I: IntoIterator<Item = Vec<u8>>,
    P: FnMut(&[u8], u32, bool) -> Result<()>,
{
    let mut sequence = 0u32;

    for chunk in audio {
        if let Err(e) = publish(&chunk, sequence, false) {
            error!("Failed to publish audio frame {}: {:#}", sequence, e);
            status.fail(e.context(format!("Failed to publish audio frame {}", sequence)));
            return sequence;
        }
        sequence += 1;
    }

    if let Err(e) = publish(&[], sequence, true) {
        error!("Failed to send final frame: {:#}", e);
        status.fail(e.context("Failed to send final audio frame"));
        return sequence;
    }

    status.close();
    sequence
}

/// Blocking iterator over transcripts for one stream id
struct TranscriptStream {
    /// Raw transcript payloads from every stream
    transcripts: BoxStream<'static, Vec<u8>>,
    handle: Handle,
    stream_id: String,
    status: Arc<FeedStatus>,
    drain_timeout: Duration,
    drain_deadline: Option<Instant>,
}

impl Iterator for TranscriptStream {
    type Item = Result<RecognitionResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.status.take_failure() {
                return Some(Err(e));
            }

            match self.drain_deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    info!("Transcript stream {} drained", self.stream_id);
                    return None;
                }
                None if self.status.is_closed() => {
                    self.drain_deadline = Some(Instant::now() + self.drain_timeout);
                }
                _ => {}
            }

            let next = self
                .handle
                .block_on(tokio::time::timeout(TRANSCRIPT_POLL, self.transcripts.next()));

            let payload = match next {
                Err(_) => continue,
                Ok(None) => {
                    warn!("Transcript subscription closed");
                    return Some(Err(anyhow!(
                        "Transcript subscription closed for {}",
                        self.stream_id
                    )));
                }
                Ok(Some(payload)) => payload,
            };

            match serde_json::from_slice::<TranscriptMessage>(&payload) {
                Ok(transcript) if transcript.session_id != self.stream_id => continue,
                Ok(transcript) if transcript.end_of_stream => {
                    info!("Transcript stream {} ended by STT service", self.stream_id);
                    return None;
                }
                Ok(transcript) => return Some(Ok(transcript.into())),
                Err(e) => {
                    warn!("Failed to parse transcript message: {}", e);
                }
            }
        }
    }
}
