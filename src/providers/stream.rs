//! Incremental decoding of streamed completion bodies
//!
//! Providers stream replies either as Server-Sent Events (OpenAI-compatible
//! APIs) or as newline-delimited JSON (Ollama). Both decoders here buffer raw
//! bytes and only decode complete frames, so multi-byte characters split
//! across network chunks survive intact.
//!
//! [`spawn_fragment_pump`] drives a response body through a [`FrameDecoder`]
//! on a background task and exposes the result as a [`FragmentStream`].

use crate::error::{ParleyError, Result};
use crate::providers::base::{classify_transport_error, FragmentStream, StreamEvent};
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A single Server-Sent Event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if present
    pub event: Option<String>,
    /// Value of the `id:` field, if present
    pub id: Option<String>,
    /// Joined `data:` lines
    pub data: String,
}

/// Incremental Server-Sent Events decoder
///
/// Events are separated by a blank line. Comment lines (starting with `:`),
/// `retry:` fields, `event: ping` events and empty data are dropped.
///
/// # Examples
///
/// ```
/// use parley::providers::stream::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"data: hel").is_empty());
/// let events = decoder.push(b"lo\n\n");
/// assert_eq!(events[0].data, "hello");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    /// Creates an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((pos, separator_len)) = find_event_boundary(&self.buffer) {
            let block = self.buffer.split_to(pos);
            self.buffer.advance(separator_len);
            if let Some(event) = parse_event_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes whatever remains once the body has ended
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        parse_event_block(&String::from_utf8_lossy(&rest))
    }
}

/// Finds the earliest blank-line separator, returning (position, length)
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find_subslice(buffer, b"\r\n\r\n").map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parses one event block (the text between two blank lines)
fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event = SseEvent::default();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event.event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            event.id = Some(value.trim().to_string());
        }
        // `retry:` and `:` comment lines are ignored.
    }

    if let Some(name) = &event.event {
        if name.eq_ignore_ascii_case("ping") {
            return None;
        }
    }

    event.data = data_lines.join("\n");
    if event.data.is_empty() {
        return None;
    }
    Some(event)
}

/// Incremental newline-delimited decoder
///
/// Yields each non-blank line with surrounding whitespace trimmed.
///
/// # Examples
///
/// ```
/// use parley::providers::stream::LineDecoder;
///
/// let mut decoder = LineDecoder::new();
/// assert_eq!(decoder.push(b"{\"a\":1}\n{\"b\""), vec!["{\"a\":1}".to_string()]);
/// assert_eq!(decoder.finish(), None);
/// ```
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    /// Creates an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every line completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Returns the trailing line if the body did not end with a newline
    ///
    /// A trailing fragment is only returned when it is complete JSON; a cut
    /// off object is discarded so the stream reads as interrupted.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.split();
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        if text.is_empty() || serde_json::from_str::<serde_json::Value>(&text).is_err() {
            return None;
        }
        Some(text)
    }
}

/// Turns raw body chunks into stream events for one provider wire format
pub trait FrameDecoder {
    /// Decodes a chunk into zero or more events
    ///
    /// # Errors
    ///
    /// Returns an error if the provider reported a failure mid-stream or sent
    /// a frame that cannot be understood
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>>;

    /// Flushes any buffered frame after the body ends
    fn finish(&mut self) -> Result<Vec<StreamEvent>>;
}

/// Drives a response body through a decoder on a background task
///
/// The returned stream yields decoded events in order and stops after the
/// first `Done` or error. If the body ends without `Done`, the stream simply
/// ends and the consumer reports an interruption. A body that sends nothing
/// for `timeout_seconds` yields a `Timeout` error. Dropping the returned
/// stream stops the task without reading the rest of the body.
pub fn spawn_fragment_pump<S, D>(
    provider: &'static str,
    byte_stream: S,
    mut decoder: D,
    timeout_seconds: u64,
) -> FragmentStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    D: FrameDecoder + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Result<StreamEvent>>();
    let idle_timeout = Duration::from_secs(timeout_seconds);

    tokio::spawn(async move {
        tokio::pin!(byte_stream);
        let mut fragments = 0usize;

        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!("Fragment consumer dropped; stopping stream");
                    return;
                }
                next = tokio::time::timeout(idle_timeout, byte_stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "{} stream stalled for {}s after {} fragments",
                        provider,
                        timeout_seconds,
                        fragments
                    );
                    let _ = tx.send(Err(ParleyError::Timeout {
                        seconds: timeout_seconds,
                    }
                    .into()));
                    return;
                }
            };

            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("{} stream failed after {} fragments: {}", provider, fragments, e);
                    let _ = tx.send(Err(
                        classify_transport_error(provider, e, timeout_seconds).into()
                    ));
                    return;
                }
            };

            match decoder.decode(&bytes) {
                Ok(events) => {
                    if forward(&tx, events, &mut fragments) {
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!("{} stream reported an error: {}", provider, e);
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        }

        match decoder.finish() {
            Ok(events) => {
                if forward(&tx, events, &mut fragments) {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }

        tracing::warn!(
            "{} stream ended without end-of-stream signal after {} fragments",
            provider,
            fragments
        );
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}

/// Sends events downstream; returns true when the pump should stop
fn forward(
    tx: &mpsc::UnboundedSender<Result<StreamEvent>>,
    events: Vec<StreamEvent>,
    fragments: &mut usize,
) -> bool {
    for event in events {
        let is_done = event == StreamEvent::Done;
        if !is_done {
            *fragments += 1;
        }
        if tx.send(Ok(event)).is_err() {
            tracing::debug!("Fragment consumer dropped; stopping stream");
            return true;
        }
        if is_done {
            return true;
        }
    }
    false
}
