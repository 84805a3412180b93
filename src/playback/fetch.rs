//! Retrieval of the audio resource for a narration event.

use crate::config::AudioDelivery;
use crate::error::{NarratorError, Result};
use crate::narration::NarrationEvent;
use crate::playback::stream_buffer::StreamBuffer;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Audio bytes for one narration unit, plus where they came from.
#[derive(Debug, Clone)]
pub struct AudioResource {
    pub source_url: String,
    pub buffer: StreamBuffer,
}

impl AudioResource {
    pub fn new(source_url: impl Into<String>, buffer: StreamBuffer) -> Self {
        Self {
            source_url: source_url.into(),
            buffer,
        }
    }

    /// True once the body failed mid-stream.
    pub fn is_stalled(&self) -> bool {
        self.buffer.failure().is_some()
    }
}

/// Trait for fetching the audio of a narration event.
///
/// This trait allows swapping implementations (HTTP vs mock).
#[async_trait::async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Resolve the audio resource for `event`.
    ///
    /// With streaming delivery this resolves as soon as playback can start;
    /// the body keeps filling the buffer afterwards.
    async fn fetch(&self, event: &NarrationEvent) -> Result<AudioResource>;
}

/// Fetches from the server's fixed audio endpoint.
pub struct HttpAudioFetcher {
    client: reqwest::Client,
    url: String,
    delivery: AudioDelivery,
}

impl HttpAudioFetcher {
    pub fn new(url: impl Into<String>, delivery: AudioDelivery) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            delivery,
        }
    }
}

#[async_trait::async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch(&self, event: &NarrationEvent) -> Result<AudioResource> {
        debug!(url = %self.url, chars = event.char_len(), "Requesting audio");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| NarratorError::AudioFetch {
                message: format!("Failed to request audio: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(NarratorError::AudioFetch {
                message: format!("Audio request failed with status: {}", response.status()),
            });
        }

        match self.delivery {
            AudioDelivery::Complete => {
                let body = response.bytes().await.map_err(|e| NarratorError::AudioFetch {
                    message: format!("Failed to read audio body: {e}"),
                })?;
                info!(bytes = body.len(), "Audio downloaded");
                Ok(AudioResource::new(
                    self.url.clone(),
                    StreamBuffer::from_bytes(body.to_vec()),
                ))
            }
            AudioDelivery::Streaming => {
                let buffer = StreamBuffer::new();
                let writer = buffer.clone();
                let mut stream = response.bytes_stream();
                tokio::spawn(async move {
                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(chunk) => writer.append(&chunk),
                            Err(e) => {
                                warn!("Audio stream broke off: {e}");
                                writer.fail(e.to_string());
                                return;
                            }
                        }
                    }
                    debug!(bytes = writer.len(), "Audio stream complete");
                    writer.finish();
                });
                Ok(AudioResource::new(self.url.clone(), buffer))
            }
        }
    }
}

/// Mock fetcher for testing
///
/// Resolves immediately with a small complete buffer unless a gate is held
/// for the event's text, in which case it waits for the gate to be released.
#[derive(Clone, Default)]
pub struct MockAudioFetcher {
    url: String,
    calls: Arc<Mutex<Vec<NarrationEvent>>>,
    gates: Arc<Mutex<HashMap<String, oneshot::Receiver<()>>>>,
    should_fail: bool,
}

impl MockAudioFetcher {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Configure the mock to fail every fetch
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Hold fetches for `text` until the returned sender fires (or is dropped).
    pub fn hold(&self, text: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut gates) = self.gates.lock() {
            gates.insert(text.to_string(), rx);
        }
        tx
    }

    /// Events fetched so far, in call order.
    pub fn calls(&self) -> Vec<NarrationEvent> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AudioFetcher for MockAudioFetcher {
    async fn fetch(&self, event: &NarrationEvent) -> Result<AudioResource> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(event.clone());
        }
        let gate = self
            .gates
            .lock()
            .ok()
            .and_then(|mut gates| gates.remove(&event.text));
        if let Some(gate) = gate {
            // A dropped sender releases the gate as well.
            let _released = gate.await;
        }
        if self.should_fail {
            return Err(NarratorError::AudioFetch {
                message: "mock fetch failure".to_string(),
            });
        }
        Ok(AudioResource::new(
            self.url.clone(),
            StreamBuffer::from_bytes(event.text.as_bytes().to_vec()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_stub::{respond_with, serve_once};
    use std::io::Read;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    const CHUNKED_HEAD: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nTransfer-Encoding: chunked\r\n\r\n";

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met within 5s");
    }

    fn read_all(buffer: &StreamBuffer) -> Vec<u8> {
        let mut body = Vec::new();
        buffer.reader().read_to_end(&mut body).unwrap();
        body
    }

    #[tokio::test]
    async fn mock_fetcher_records_calls_and_resolves() {
        let fetcher = MockAudioFetcher::new("http://127.0.0.1:3775/audio");
        let resource = fetcher
            .fetch(&NarrationEvent::new("Hello world", false))
            .await
            .unwrap();
        assert_eq!(resource.source_url, "http://127.0.0.1:3775/audio");
        assert!(resource.buffer.is_finished());
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn mock_fetcher_gate_holds_until_released() {
        let fetcher = MockAudioFetcher::new("mock://audio");
        let gate = fetcher.hold("slow text");

        let task = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch(&NarrationEvent::new("slow text", false)).await })
        };
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        gate.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn mock_fetcher_failure() {
        let fetcher = MockAudioFetcher::new("mock://audio").with_failure();
        let result = fetcher.fetch(&NarrationEvent::new("abc", false)).await;
        assert!(matches!(result, Err(NarratorError::AudioFetch { .. })));
    }

    #[test]
    fn stalled_resource_reports_failure() {
        let buffer = StreamBuffer::new();
        let resource = AudioResource::new("mock://audio", buffer.clone());
        assert!(!resource.is_stalled());
        buffer.fail("reset");
        assert!(resource.is_stalled());
    }

    #[tokio::test]
    async fn http_streaming_resolves_before_body_completes() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (base, seen) = serve_once(move |mut stream| async move {
            stream.write_all(CHUNKED_HEAD).await.unwrap();
            stream.write_all(b"3\r\nabc\r\n").await.unwrap();
            stream.flush().await.unwrap();
            let _ = release_rx.await;
            stream.write_all(b"3\r\ndef\r\n0\r\n\r\n").await.unwrap();
            stream.flush().await.unwrap();
        })
        .await;

        let fetcher = HttpAudioFetcher::new(format!("{base}/audio"), AudioDelivery::Streaming);
        let resource = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.fetch(&NarrationEvent::new("Hello world", false)),
        )
        .await
        .expect("fetch should resolve while the body is still open")
        .unwrap();
        assert_eq!(resource.source_url, format!("{base}/audio"));
        assert!(!resource.buffer.is_finished());
        assert_eq!(seen.await.unwrap().request_line(), "GET /audio HTTP/1.1");

        release_tx.send(()).unwrap();
        wait_until(|| resource.buffer.is_finished()).await;
        assert!(!resource.is_stalled());
        assert_eq!(read_all(&resource.buffer), b"abcdef");
    }

    #[tokio::test]
    async fn http_streaming_broken_body_marks_buffer_failed() {
        let (base, _seen) = serve_once(|mut stream| async move {
            stream.write_all(CHUNKED_HEAD).await.unwrap();
            stream.write_all(b"3\r\nabc\r\n").await.unwrap();
            stream.flush().await.unwrap();
            // Hang up without the terminating chunk.
        })
        .await;

        let fetcher = HttpAudioFetcher::new(format!("{base}/audio"), AudioDelivery::Streaming);
        let resource = fetcher
            .fetch(&NarrationEvent::new("Hello world", false))
            .await
            .unwrap();

        wait_until(|| resource.is_stalled()).await;
        assert!(resource.buffer.failure().is_some());
        assert!(!resource.buffer.is_finished());
    }

    #[tokio::test]
    async fn http_complete_delivery_buffers_whole_body() {
        let (base, _seen) =
            serve_once(|stream| respond_with(stream, "200 OK", "abcdef")).await;

        let fetcher = HttpAudioFetcher::new(format!("{base}/audio"), AudioDelivery::Complete);
        let resource = fetcher
            .fetch(&NarrationEvent::new("Hello world", false))
            .await
            .unwrap();
        assert!(resource.buffer.is_finished());
        assert_eq!(read_all(&resource.buffer), b"abcdef");
    }

    #[tokio::test]
    async fn http_error_status_is_fetch_error() {
        let (base, _seen) =
            serve_once(|stream| respond_with(stream, "500 Internal Server Error", "boom")).await;

        let fetcher = HttpAudioFetcher::new(format!("{base}/audio"), AudioDelivery::Streaming);
        let result = fetcher.fetch(&NarrationEvent::new("Hello world", false)).await;
        match result {
            Err(NarratorError::AudioFetch { message }) => assert!(message.contains("500")),
            other => panic!("Expected AudioFetch, got {other:?}"),
        }
    }
}
