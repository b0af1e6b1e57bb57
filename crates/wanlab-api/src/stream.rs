//! Server-sent telemetry stream.
//!
//! `GET /ports/stream` emits one `data:` event per second, each carrying a
//! full [`StatusMap`] for every discovered port. [`LabClient::open_status_stream`]
//! performs the request and returns a [`StatusStream`] of decoded snapshots.
//!
//! The stream never reconnects by itself: it ends with an `Err` item when
//! the connection drops, and the consumer decides when to re-open it using
//! [`ReconnectConfig`] and [`calculate_backoff`].

use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::client::LabClient;
use crate::error::Error;
use crate::models::StatusMap;

/// Boxed stream of status snapshots.
pub type StatusStream = Pin<Box<dyn Stream<Item = Result<StatusMap, Error>> + Send>>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for re-opening the stream.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first re-open attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// `delay = min(initial * 2^attempt, max)`
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
    Duration::from_secs_f64(base.min(config.max_delay.as_secs_f64()).max(0.0))
}

// ── SSE framing ──────────────────────────────────────────────────────

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field; `None` means the default `message`.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

/// Largest event accepted before its terminating blank line arrives.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Incremental `text/event-stream` decoder.
///
/// Feed it raw chunks as they arrive; complete events are returned once
/// their terminating blank line has been seen. Chunk boundaries may fall
/// anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already searched for a terminator.
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete event.
    ///
    /// Fails once the pending, unterminated event grows past
    /// [`MAX_FRAME_BYTES`]; the buffer is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, Error> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.next_frame_end() {
            let frame: Vec<u8> = self.buf.drain(..end + 2).collect();
            self.scanned = 0;
            if let Some(event) = parse_frame(&String::from_utf8_lossy(&frame)) {
                events.push(event);
            }
        }

        if self.buf.len() > MAX_FRAME_BYTES {
            self.buf = Vec::new();
            self.scanned = 0;
            return Err(Error::Stream(format!(
                "event exceeds {MAX_FRAME_BYTES} bytes without a terminator"
            )));
        }
        Ok(events)
    }

    fn next_frame_end(&mut self) -> Option<usize> {
        // Back up one byte: the terminator may straddle two chunks.
        let from = self.scanned.saturating_sub(1);
        let found = self.buf[from..]
            .windows(2)
            .position(|w| w == b"\n\n")
            .map(|pos| from + pos);
        if found.is_none() {
            self.scanned = self.buf.len();
        }
        found
    }
}

fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "data" => data.push(value),
            "event" => event = Some(value.to_owned()),
            _ => {}
        }
    }

    if data.is_empty() && event.is_none() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

// ── Stream endpoint ──────────────────────────────────────────────────

impl LabClient {
    /// Open the live status stream.
    ///
    /// `GET /ports/stream`. Returns once response headers arrive; a
    /// non-success status is reported immediately. Malformed payloads are
    /// skipped; an `error` event, a read failure, or the end of the body
    /// yields a final `Err` item.
    pub async fn open_status_stream(&self) -> Result<StatusStream, Error> {
        let url = self.url("ports/stream")?;
        info!(url = %url, "opening telemetry stream");

        let resp = self
            .stream_http()
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Backend {
                status: status.as_u16(),
                message: "telemetry stream refused".into(),
            });
        }

        let mut body = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            loop {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        let events = match decoder.push(&chunk) {
                            Ok(events) => events,
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        };
                        for event in events {
                            if event.event.as_deref() == Some("error") {
                                yield Err(Error::Stream(event.data));
                                return;
                            }
                            match serde_json::from_str::<StatusMap>(&event.data) {
                                Ok(map) => yield Ok(map),
                                Err(e) => debug!(error = %e, "skipping malformed stream payload"),
                            }
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(Error::Transport(e));
                        return;
                    }
                    None => {
                        yield Err(Error::Stream("stream ended".into()));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ── Tests ────────────────────────────────────────────────────────────
