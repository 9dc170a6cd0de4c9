//! SSE stream relay: upstream provider events in, client events out.
//!
//! Upstream bytes are buffered until a full line is available, so a frame split
//! across network packets decodes exactly as if it arrived whole. Each `data: `
//! line is either the `[DONE]` sentinel, a JSON chunk handed to the provider for
//! delta extraction, or malformed text that is forwarded as-is. Whatever
//! happens, the client stream ends with exactly one [`RelayEvent::Done`].

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use mediassist_core::Result;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use crate::providers::ProviderAdapter;

/// End-of-stream sentinel used on both sides of the relay.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";

/// One event for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Text delta extracted from a provider chunk.
    Delta(String),
    /// Payload that could not be parsed, forwarded verbatim.
    Raw(String),
    /// Upstream failure, already prefixed with the provider name.
    Error(String),
    Done,
}

impl RelayEvent {
    /// The `data:` payload for this event in the client's SSE framing.
    pub fn to_sse_data(&self) -> String {
        match self {
            RelayEvent::Delta(content) | RelayEvent::Raw(content) => {
                json!({ "content": content }).to_string()
            }
            RelayEvent::Error(message) => json!({ "error": message }).to_string(),
            RelayEvent::Done => DONE_SENTINEL.to_string(),
        }
    }
}

/// Longest unterminated line held back before it is dropped.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates raw bytes and yields only newline-terminated lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
    /// Set after an oversized line was dropped; its tail is skipped up to the next `\n`.
    discarding: bool,
}

impl SseLineBuffer {
    /// Append a chunk and drain every complete line, without its `\n` or `\r\n`.
    /// Only the new chunk is scanned for line ends.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let Some(last_newline) = chunk.iter().rposition(|b| *b == b'\n') else {
            self.hold(chunk);
            return Vec::new();
        };

        let mut complete = std::mem::take(&mut self.pending);
        complete.extend_from_slice(&chunk[..last_newline]);
        let skip_first = std::mem::take(&mut self.discarding);
        self.hold(&chunk[last_newline + 1..]);

        complete
            .split(|b| *b == b'\n')
            .skip(usize::from(skip_first))
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    fn hold(&mut self, bytes: &[u8]) {
        if self.discarding {
            return;
        }
        if self.pending.len() + bytes.len() > MAX_LINE_BYTES {
            warn!("Dropping upstream line longer than {} bytes", MAX_LINE_BYTES);
            self.pending.clear();
            self.discarding = true;
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Bytes of an unterminated trailing line still held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// A decoded `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Done,
    Chunk(Value),
    Malformed(String),
}

/// Decode one line. `None` for anything that isn't a `data: ` line.
pub fn parse_line(line: &str) -> Option<SseFrame> {
    let payload = line.strip_prefix(DATA_PREFIX)?;

    if payload == DONE_SENTINEL {
        return Some(SseFrame::Done);
    }

    Some(match serde_json::from_str::<Value>(payload) {
        Ok(chunk) => SseFrame::Chunk(chunk),
        Err(_) => SseFrame::Malformed(payload.to_string()),
    })
}

/// Open the completion and relay it. Upstream request failures become an
/// error event followed by `Done`, never a broken stream.
pub fn relay(
    provider: Arc<dyn ProviderAdapter>,
    messages: Vec<Value>,
) -> impl Stream<Item = RelayEvent> + Send + 'static {
    async_stream::stream! {
        let opened = provider.create_chat_completion(messages).await;
        match opened {
            Ok(upstream) => {
                let mut events = Box::pin(relay_upstream(upstream, provider));
                while let Some(event) = events.next().await {
                    yield event;
                }
            }
            Err(e) => {
                error!("Error from {} API: {}", provider.kind(), e);
                yield RelayEvent::Error(format!("Error from {} API: {}", provider.kind(), e));
                yield RelayEvent::Done;
            }
        }
    }
}

/// Re-frame an already open upstream body. Reads are pulled one at a time as
/// the consumer polls; dropping the returned stream drops the upstream body.
pub fn relay_upstream<S>(
    upstream: S,
    provider: Arc<dyn ProviderAdapter>,
) -> impl Stream<Item = RelayEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    async_stream::stream! {
        let provider_name = provider.kind();
        let mut upstream = Box::pin(upstream);
        let mut lines = SseLineBuffer::default();
        let mut deltas = 0usize;
        let mut finished = false;

        while !finished {
            let bytes = match upstream.next().await {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    error!("Error from {} API: {}", provider_name, e);
                    yield RelayEvent::Error(format!("Error from {} API: {}", provider_name, e));
                    break;
                }
                None => break,
            };

            for line in lines.push(&bytes) {
                match parse_line(&line) {
                    None => {}
                    Some(SseFrame::Done) => {
                        finished = true;
                        break;
                    }
                    Some(SseFrame::Chunk(chunk)) => {
                        if let Some(message) = provider.extract_error(&chunk) {
                            error!("Error from {} API: {}", provider_name, message);
                            yield RelayEvent::Error(format!("Error from {} API: {}", provider_name, message));
                            finished = true;
                            break;
                        }
                        if let Some(delta) = provider.extract_content(&chunk) {
                            deltas += 1;
                            yield RelayEvent::Delta(delta);
                        }
                    }
                    Some(SseFrame::Malformed(raw)) => {
                        warn!("Forwarding malformed {} frame: {}", provider_name, raw);
                        yield RelayEvent::Raw(raw);
                    }
                }
            }
        }

        if lines.pending_len() > 0 {
            debug!("Discarding {} bytes of unterminated upstream data", lines.pending_len());
        }
        debug!("{} stream finished after {} deltas", provider_name, deltas);
        yield RelayEvent::Done;
    }
}
